use thiserror::Error;

/// Rejected port specification. Never clamped or repaired.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortSpecError {
    #[error("invalid port specification `{token}`: {reason}")]
    InvalidPort { token: String, reason: String },
}

impl PortSpecError {
    pub(crate) fn invalid(token: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPort {
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}

/// Fatal errors that abort a scan stage. Per-port and per-probe failures are
/// never reported through this type.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("admission semaphore closed")]
    AdmissionClosed(#[from] tokio::sync::AcquireError),

    #[error("scan worker task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),

    #[error("scan cancelled")]
    Cancelled,

    #[error("progress tracks {progress} attempts but {ports} ports were given")]
    ProgressMismatch { progress: u64, ports: usize },
}

/// Why a status probe did not yield a server. Callers collapse all of these
/// into "not this protocol".
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out")]
    TimedOut,

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("malformed status json: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tokio::time::error::Elapsed> for ProbeError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::TimedOut
    }
}
