use mousetrap_contracts::BackendError;
use mousetrap_model::ModelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MousetrapError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Scan engine unhealthy: {0}")]
    EngineUnhealthy(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MousetrapError {
    /// Errors that no amount of retrying will fix. The scheduler stops on
    /// these and the process exits.
    pub fn is_fatal(&self) -> bool {
        match self {
            MousetrapError::Backend(err) => err.is_fatal(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MousetrapError>;
