//! Hairgator face swap server library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod auth;
pub mod config;
pub mod poller;
pub mod server;
pub mod sqlite_persistence;
pub mod store;
pub mod uploads;
pub mod vendor;

// Re-export commonly used types for convenience
pub use auth::{AuthError, TokenCache, TokenMinter};
pub use poller::{JobPoller, PollPolicy, PollResult, SwapError, SwapRequest, SwapSuccess};
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerConfig, ServerState};
pub use store::{ResultSink, SqliteSwapStore, SwapHistory};
pub use vendor::{AkoolClient, FaceSwapClient};
