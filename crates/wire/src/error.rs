use thiserror::Error;

/// Errors that can occur in the transport layer.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    #[error("malformed frames: {0}")]
    Framing(String),

    #[error("session closed")]
    Closed,

    #[error("remote error from {procedure}: {message}")]
    Remote { procedure: String, message: String },
}
