use thiserror::Error;

/// Errors that abort a whole scan.
///
/// Per-port failures (refused, timed out, reset) never show up here; they are
/// folded into a closed classification by the prober.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Hostname could not be resolved: {host} ({reason})")]
    HostUnreachable { host: String, reason: String },

    #[error("Scan worker failed: {0}")]
    Worker(String),
}

impl ScanError {
    pub fn is_host_unreachable(&self) -> bool {
        matches!(self, ScanError::HostUnreachable { .. })
    }
}

impl From<tokio::task::JoinError> for ScanError {
    fn from(err: tokio::task::JoinError) -> Self {
        ScanError::Worker(err.to_string())
    }
}
