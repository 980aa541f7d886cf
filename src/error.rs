// src/error.rs  -  Engine error taxonomy
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Admission denied: a Test or Send session is already active.
    #[error("Another session is already active")]
    Busy,

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn device(e: impl std::fmt::Display) -> Self {
        EngineError::Device(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
