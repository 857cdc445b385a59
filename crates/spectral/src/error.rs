use crate::protocol::StreamID;
use spectral_binary::BinaryError;
use thiserror::Error;

/// Errors surfaced by the transport. The enum is `Clone` because a close
/// cause is broadcast to every stream blocked on the connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid packet header")]
    InvalidHeader,
    #[error("unknown frame: {0}")]
    UnknownFrame(u32),
    #[error("short buffer while decoding frame")]
    ShortBuffer,
    #[error("insufficient space")]
    InsufficientSpace,
    #[error("stream {0} already exists")]
    StreamAlreadyExists(StreamID),
    #[error("failed to open stream")]
    OpenStreamFailed,
    #[error("connection refused by peer")]
    ConnectionRefused,
    #[error("connection closed by peer: {0}")]
    ClosedByPeer(String),
    #[error("connection timed out")]
    Timeout,
    #[error("closed: {0}")]
    Closed(String),
    #[error("not supported by this connection")]
    Unsupported,
    #[error("socket error: {0}")]
    Socket(String),
}

impl From<BinaryError> for Error {
    fn from(e: BinaryError) -> Self {
        match e {
            BinaryError::UnexpectedEof => Error::ShortBuffer,
            BinaryError::InvalidData(_) => Error::InvalidHeader,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Socket(e.to_string())
    }
}
