use super::RequestsLoggingLevel;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    /// Entries returned by the history endpoint.
    pub history_limit: usize,
    /// Ask the vendor to run face enhancement on every swap.
    pub face_enhance: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 3008,
            history_limit: 20,
            face_enhance: true,
        }
    }
}
