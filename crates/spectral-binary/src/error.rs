use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BinaryError {
    #[error("Buffer ended unexpectedly")]
    UnexpectedEof,
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, BinaryError>;
