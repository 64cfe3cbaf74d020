use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hairgator_swap_server::config::{AppConfig, CliConfig, FileConfig};
use hairgator_swap_server::server::{self, run_server, RequestsLoggingLevel, ServerConfig};
use hairgator_swap_server::store::{NoopSink, ResultSink, SqliteSwapStore, SwapHistory};
use hairgator_swap_server::uploads::UploadStore;
use hairgator_swap_server::{AkoolClient, JobPoller, PollPolicy, ServerState, TokenCache};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Its values override the CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the swap history database. Persistence is off without it.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Directory where uploaded inline images are written.
    #[clap(long, value_parser = parse_path)]
    pub media_path: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3008)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Public URL of this server, used to build links to uploaded images.
    #[clap(long)]
    pub public_base_url: Option<String>,

    /// Akool API client id.
    #[clap(long, env = "AKOOL_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Akool API client secret.
    #[clap(long, env = "AKOOL_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            media_path: self.media_path.clone(),
            port: self.port,
            metrics_port: self.metrics_port,
            logging_level: self.logging_level.clone(),
            public_base_url: self.public_base_url.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}...", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let app_config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;
    info!("Vendor settings: {:?}", app_config.vendor);

    info!("Initializing metrics...");
    server::metrics::init_metrics();

    let client = Arc::new(AkoolClient::new(&app_config.vendor)?);
    let tokens = Arc::new(TokenCache::new(
        client.clone(),
        app_config.vendor.token_validity(),
    ));

    let (sink, history, history_limit) = match &app_config.store {
        Some(store_settings) => {
            info!("Opening swap store at {:?}...", store_settings.db_path);
            let store = Arc::new(SqliteSwapStore::new(&store_settings.db_path)?);
            let sink: Arc<dyn ResultSink> = store.clone();
            let history: Arc<dyn SwapHistory> = store;
            (sink, Some(history), store_settings.history_limit)
        }
        None => {
            warn!("No db_dir configured, swap results will not be persisted");
            (Arc::new(NoopSink) as Arc<dyn ResultSink>, None, 0)
        }
    };

    let uploads = app_config.uploads.as_ref().map(|settings| {
        info!(
            "Inline images will be stored in {:?} and served from {}/uploads",
            settings.media_path, settings.public_base_url
        );
        Arc::new(UploadStore::new(settings))
    });

    let policy = PollPolicy::from_settings(&app_config.poller);
    info!(
        "Polling up to {} times every {:?} (at most {:?})",
        policy.max_attempts,
        policy.interval,
        policy.max_polling_time()
    );
    let poller = Arc::new(JobPoller::new(client, tokens.clone(), sink, policy));

    let shutdown = CancellationToken::new();
    let state = ServerState {
        config: ServerConfig {
            requests_logging_level: app_config.logging_level.clone(),
            port: app_config.port,
            history_limit,
            face_enhance: app_config.vendor.face_enhance,
        },
        start_time: Instant::now(),
        poller,
        tokens,
        history,
        uploads,
        shutdown: shutdown.clone(),
    };

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested, cancelling in-flight swaps...");
                signal_shutdown.cancel();
            }
            Err(err) => error!("Failed to listen for shutdown signal: {}", err),
        }
    });

    info!("Ready to serve at port {}!", app_config.port);
    run_server(state, app_config.metrics_port).await
}
