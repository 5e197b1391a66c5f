use std::fmt::{self, Display};

/// Errors produced by model parsing and validation routines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    UnknownScanState(String),
    UnknownScanResult(String),
    InvalidMessage(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::UnknownScanState(raw) => {
                write!(f, "unknown scan state: {raw}")
            }
            ModelError::UnknownScanResult(raw) => {
                write!(f, "unknown scan result: {raw}")
            }
            ModelError::InvalidMessage(msg) => {
                write!(f, "invalid queue message: {msg}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
