use thiserror::Error;

/// Socket-level failure. "Would block" never surfaces as one of these.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to {endpoint} failed: {reason}")]
    ConnectFailed { endpoint: String, reason: String },

    #[error("socket {endpoint} is closed")]
    Closed { endpoint: String },

    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("request already in flight on {endpoint}")]
    RequestInFlight { endpoint: String },

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

/// The peer sent something this client does not understand.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("expected msgpack-rpc {expected} message, got kind {got}")]
    UnexpectedKind { expected: &'static str, got: u64 },

    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("invalid method on stream socket: {0}")]
    UnexpectedMethod(String),

    #[error("unknown notification: {0}")]
    UnknownNotification(String),
}

/// The remote side answered with a non-empty error field.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("RPC error from {method}: {message}")]
pub struct RpcError {
    /// Method of the call that failed.
    pub method: String,
    /// Error payload as reported by the remote.
    pub message: String,
}

/// A stream packet used a sample encoding we cannot decode.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("unknown stream sample data type: {tag}")]
pub struct SampleFormatError {
    /// Extension type tag found on the sample buffer.
    pub tag: i8,
}

/// The remote rejected a register write.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("write to register {index} rejected: {reason}")]
pub struct ConflictError {
    /// Register index.
    pub index: u16,
    /// Why the write was considered rejected.
    pub reason: String,
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    SampleFormat(#[from] SampleFormatError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("unknown register index {0}")]
    UnknownRegister(u16),

    #[error("value {value} does not fit register {index}")]
    ValueOutOfRange { index: u16, value: i32 },

    #[error("stream {0} is not published by the device")]
    UnknownStream(u16),

    #[error("channel is not ready ({0})")]
    NotReady(&'static str),

    #[error("channel is closed")]
    ChannelClosed,

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error ends the connection it occurred on.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Protocol(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(Error::from(TransportError::ConnectionReset).is_terminal());
        assert!(Error::from(ProtocolError::Decode("eof".into())).is_terminal());
        assert!(!Error::from(SampleFormatError { tag: 7 }).is_terminal());
        assert!(!Error::from(RpcError {
            method: "readRegister".into(),
            message: "nope".into()
        })
        .is_terminal());
    }

    #[test]
    fn test_display_messages() {
        let err = SampleFormatError { tag: 3 };
        assert_eq!(err.to_string(), "unknown stream sample data type: 3");
        let err = ConflictError {
            index: 4,
            reason: "remote returned false".into(),
        };
        assert!(err.to_string().contains("register 4"));
    }
}
