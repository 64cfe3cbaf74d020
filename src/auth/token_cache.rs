//! Bearer credential cache for the face-swap vendor.
//!
//! The cache holds at most one [`Credential`]. A credential is handed out
//! unchanged while it is valid; once it expires the next caller mints a new
//! one through the configured [`TokenMinter`]. Concurrent callers that find
//! the slot empty or stale share a single refresh.

use crate::server::metrics;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Errors that can occur while obtaining a bearer token.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    #[error("Credentials rejected (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("Token endpoint returned no token")]
    MissingToken,

    #[error("Token endpoint unreachable: {0}")]
    Transport(String),
}

/// Source of fresh bearer tokens, normally the vendor's auth endpoint.
#[async_trait]
pub trait TokenMinter: Send + Sync {
    async fn mint_token(&self) -> Result<String, AuthError>;
}

/// A bearer token together with the instant it stops being usable.
pub struct Credential {
    token: String,
    expires_at: Instant,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: Instant) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Instant::now())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub struct TokenCache {
    minter: Arc<dyn TokenMinter>,
    validity: Duration,
    slot: RwLock<Option<Arc<Credential>>>,
    refresh_lock: Mutex<()>,
}

impl TokenCache {
    /// `validity` is how long a freshly minted token is trusted. Keep it
    /// shorter than the vendor's own token lifetime.
    pub fn new(minter: Arc<dyn TokenMinter>, validity: Duration) -> Self {
        Self {
            minter,
            validity,
            slot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Returns a valid credential, minting a new one only when the cached
    /// one is missing or expired.
    pub async fn get_token(&self) -> Result<Arc<Credential>, AuthError> {
        if let Some(credential) = self.current() {
            return Ok(credential);
        }

        let _guard = self.refresh_lock.lock().await;

        // Someone else may have refreshed while we were waiting.
        if let Some(credential) = self.current() {
            debug!("Using token refreshed by a concurrent caller");
            return Ok(credential);
        }

        info!("Minting new vendor token");
        let token = match self.minter.mint_token().await {
            Ok(token) => token,
            Err(err) => {
                warn!("Failed to mint vendor token: {}", err);
                metrics::record_token_refresh("failure");
                return Err(err);
            }
        };

        let credential = Arc::new(Credential::new(token, Instant::now() + self.validity));
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = Some(credential.clone());
        metrics::record_token_refresh("success");
        Ok(credential)
    }

    /// Drops `stale` from the cache if it is still the cached credential.
    /// A credential refreshed in the meantime is left alone.
    pub fn invalidate(&self, stale: &Arc<Credential>) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|c| Arc::ptr_eq(c, stale)) {
            info!("Invalidating rejected vendor token");
            *slot = None;
        }
    }

    fn current(&self) -> Option<Arc<Credential>> {
        self.slot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .filter(|c| c.is_valid())
            .cloned()
    }
}
