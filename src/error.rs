use thiserror::Error;

/// Errors surfaced across the control channel as one `ERROR: <message>`
/// line. Message text is stable; the CLI matches exit codes on variant
/// presence only.
#[derive(Debug, Error)]
pub enum Error {
    #[error("process not found: {0}")]
    NotFound(String),

    #[error("process '{0}' is already running")]
    NameConflict(String),

    #[error("process '{name}' is {status}, cannot {action}")]
    InvalidState {
        name: String,
        status: String,
        action: String,
    },

    #[error("failed to spawn '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },

    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("daemon unavailable: {0}")]
    DaemonUnavailable(String),

    #[error("io error: {0}")]
    IoFailed(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
