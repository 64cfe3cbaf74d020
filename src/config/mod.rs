mod file_config;

pub use file_config::{FileConfig, PollerConfig, StoreConfig, VendorConfig};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_VENDOR_BASE_URL: &str = "https://openapi.akool.com/api/open/v3";
pub const DEFAULT_DETECT_URL: &str = "https://sg3.akool.com/detect";

const SECS_PER_DAY: u64 = 24 * 60 * 60;
const MAX_TOKEN_VALIDITY_DAYS: u64 = 3650;
/// Upper bound for the polling window, the deadline and the retry pause.
const MAX_POLLING_WINDOW: Duration = Duration::from_secs(SECS_PER_DAY);

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub media_path: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub public_base_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,

    pub vendor: VendorSettings,
    pub poller: PollerSettings,

    /// None when persistence is disabled.
    pub store: Option<StoreSettings>,
    /// None when inline images are forwarded to the vendor as-is.
    pub uploads: Option<UploadSettings>,
}

#[derive(Clone)]
pub struct VendorSettings {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub detect_url: String,
    pub request_timeout_secs: u64,
    pub token_validity_days: u64,
    pub face_enhance: bool,
}

impl VendorSettings {
    pub fn token_validity(&self) -> Duration {
        Duration::from_secs(self.token_validity_days.saturating_mul(SECS_PER_DAY))
    }
}

// Keeps the secret out of logs.
impl std::fmt::Debug for VendorSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorSettings")
            .field("client_id", &self.client_id)
            .field("base_url", &self.base_url)
            .field("detect_url", &self.detect_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("token_validity_days", &self.token_validity_days)
            .field("face_enhance", &self.face_enhance)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollerSettings {
    pub max_attempts: u32,
    pub interval_secs: u64,
    pub deadline_secs: Option<u64>,
    pub detect_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval_secs: 6,
            deadline_secs: None,
            detect_retries: 1,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub db_path: PathBuf,
    pub history_limit: usize,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub media_path: PathBuf,
    pub public_base_url: String,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone());

        if let Some(dir) = &db_dir {
            if !dir.exists() {
                bail!("Database directory does not exist: {:?}", dir);
            }
            if !dir.is_dir() {
                bail!("db_dir is not a directory: {:?}", dir);
            }
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let vendor_file = file.vendor.unwrap_or_default();
        let client_id = vendor_file
            .client_id
            .or_else(|| cli.client_id.clone())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("client_id must be specified via --client-id, AKOOL_CLIENT_ID or in config file")
            })?;
        let client_secret = vendor_file
            .client_secret
            .or_else(|| cli.client_secret.clone())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("client_secret must be specified via --client-secret, AKOOL_CLIENT_SECRET or in config file")
            })?;
        let vendor = VendorSettings {
            client_id,
            client_secret,
            base_url: vendor_file
                .base_url
                .unwrap_or_else(|| DEFAULT_VENDOR_BASE_URL.to_string()),
            detect_url: vendor_file
                .detect_url
                .unwrap_or_else(|| DEFAULT_DETECT_URL.to_string()),
            request_timeout_secs: vendor_file.request_timeout_secs.unwrap_or(30),
            token_validity_days: vendor_file.token_validity_days.unwrap_or(300),
            face_enhance: vendor_file.face_enhance.unwrap_or(true),
        };

        match vendor.token_validity_days.checked_mul(SECS_PER_DAY) {
            Some(_) if (1..=MAX_TOKEN_VALIDITY_DAYS).contains(&vendor.token_validity_days) => {}
            _ => bail!(
                "vendor.token_validity_days must be between 1 and {}, got {}",
                MAX_TOKEN_VALIDITY_DAYS,
                vendor.token_validity_days
            ),
        }

        let poller_file = file.poller.unwrap_or_default();
        let defaults = PollerSettings::default();
        let poller = PollerSettings {
            max_attempts: poller_file.max_attempts.unwrap_or(defaults.max_attempts),
            interval_secs: poller_file.interval_secs.unwrap_or(defaults.interval_secs),
            deadline_secs: poller_file.deadline_secs,
            detect_retries: poller_file.detect_retries.unwrap_or(defaults.detect_retries),
            retry_delay_ms: poller_file.retry_delay_ms.unwrap_or(defaults.retry_delay_ms),
        };
        if poller.max_attempts == 0 {
            bail!("poller.max_attempts must be at least 1");
        }
        let polling_window = Duration::from_secs(poller.interval_secs)
            .checked_mul(poller.max_attempts)
            .filter(|window| *window <= MAX_POLLING_WINDOW);
        if polling_window.is_none() {
            bail!(
                "poller.interval_secs * poller.max_attempts must not exceed {}s",
                MAX_POLLING_WINDOW.as_secs()
            );
        }
        if poller
            .deadline_secs
            .is_some_and(|secs| Duration::from_secs(secs) > MAX_POLLING_WINDOW)
        {
            bail!(
                "poller.deadline_secs must not exceed {}s",
                MAX_POLLING_WINDOW.as_secs()
            );
        }
        if Duration::from_millis(poller.retry_delay_ms) > MAX_POLLING_WINDOW {
            bail!(
                "poller.retry_delay_ms must not exceed {}ms",
                MAX_POLLING_WINDOW.as_millis()
            );
        }

        // The store is on by default whenever there is somewhere to put it.
        let store_file = file.store.unwrap_or_default();
        let store = match (store_file.enabled.unwrap_or(true), &db_dir) {
            (true, Some(dir)) => Some(StoreSettings {
                db_path: dir.join("swaps.db"),
                history_limit: store_file.history_limit.unwrap_or(20),
            }),
            (true, None) if store_file.enabled == Some(true) => {
                bail!("store is enabled but db_dir is not specified")
            }
            _ => None,
        };

        let public_base_url = file
            .public_base_url
            .or_else(|| cli.public_base_url.clone());
        let media_path = file
            .media_path
            .map(PathBuf::from)
            .or_else(|| cli.media_path.clone())
            .or_else(|| db_dir.as_ref().map(|d| d.join("uploads")));
        let uploads = match (public_base_url, media_path) {
            (Some(public_base_url), Some(media_path)) => Some(UploadSettings {
                media_path,
                public_base_url: public_base_url.trim_end_matches('/').to_string(),
            }),
            (Some(_), None) => {
                bail!("public_base_url requires --media-path or --db-dir to store uploads")
            }
            (None, _) => None,
        };

        Ok(Self {
            port,
            metrics_port,
            logging_level,
            vendor,
            poller,
            store,
            uploads,
        })
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
