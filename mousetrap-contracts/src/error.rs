use thiserror::Error;

/// Failure reported by any collaborator backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// A guarded transition found the row in a different state. Expected
    /// whenever several workers race for the same task.
    #[error("Conditional update lost for {0}")]
    RaceLost(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend points at something that does not exist (table, queue).
    /// Retrying cannot succeed.
    #[error("Backend misconfigured: {0}")]
    Misconfigured(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, BackendError::Misconfigured(_))
    }

    pub fn is_race_lost(&self) -> bool {
        matches!(self, BackendError::RaceLost(_))
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;
