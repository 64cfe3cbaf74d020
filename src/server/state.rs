use axum::extract::FromRef;

use crate::auth::TokenCache;
use crate::poller::JobPoller;
use crate::store::SwapHistory;
use crate::uploads::UploadStore;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::ServerConfig;

pub type GuardedJobPoller = Arc<JobPoller>;
pub type GuardedTokenCache = Arc<TokenCache>;
pub type OptionalSwapHistory = Option<Arc<dyn SwapHistory>>;
pub type OptionalUploadStore = Option<Arc<UploadStore>>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub poller: GuardedJobPoller,
    pub tokens: GuardedTokenCache,
    pub history: OptionalSwapHistory,
    pub uploads: OptionalUploadStore,
    /// Cancelled on shutdown; every swap runs under a child of it.
    pub shutdown: CancellationToken,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedTokenCache {
    fn from_ref(input: &ServerState) -> Self {
        input.tokens.clone()
    }
}

impl FromRef<ServerState> for OptionalSwapHistory {
    fn from_ref(input: &ServerState) -> Self {
        input.history.clone()
    }
}
