use thiserror::Error;

/// Failures the submission pipeline can report back to a transport.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("quantity must be > 0")]
    InvalidQuantity,
    #[error("limit price must be non-negative")]
    InvalidPrice,
    #[error("engine shut down")]
    EngineShutDown,
}

/// Failures parsing an ingress command, whether from the CLI grammar or
/// the JSON command envelope.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("malformed command: {0}")]
    Malformed(String),
}
