use thiserror::Error;

use crate::types::MessageId;

pub type Result<T> = core::result::Result<T, UndertoneError>;

#[derive(Error, Debug)]
pub enum UndertoneError {
    #[error("Logging setup error: {0}")]
    LoggingSetup(String),

    #[error("Unknown service message: {0}")]
    UnknownMessage(MessageId),

    #[error("Message has no self-destruct attachment: {0}")]
    NoSelfDestruct(MessageId),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<Box<dyn std::error::Error + Send + Sync>> for UndertoneError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        UndertoneError::Other(anyhow::anyhow!(err.to_string()))
    }
}
