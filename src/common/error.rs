use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReactorError {
    #[error("Socket create error: {0}")]
    Create(String),

    #[error("Address in use: {0}")]
    AddressInUse(String),

    #[error("Bind error: {0}")]
    Bind(String),

    #[error("Socket is closed")]
    Closed,

    #[error("Accept error: {0}")]
    Accept(String),

    #[error("Close error: {0}")]
    Close(String),

    #[error("Poll error: {0}")]
    Poll(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ReactorError>;
