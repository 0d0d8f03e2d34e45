use thiserror::Error;

// Unified error type for ghostvec

#[derive(Error, Debug)]
pub enum VError {
    /// Caller misuse: bad sizes, mismatched lengths, unaligned layouts.
    #[error("configuration error: {0}")]
    Config(String),
    /// The underlying vector resource rejected the request.
    #[error("resource error: {0}")]
    Resource(String),
    #[error("vector has been finalized")]
    Finalized,
    #[error("numerical runtime has been finalized")]
    RuntimeFinalized,
    #[error("vector storage is busy: {0}")]
    Busy(&'static str),
    #[error("index {index} out of bounds for local view of length {len}")]
    OutOfBounds { index: usize, len: usize },
    #[error("vector has staged writes that have not been assembled")]
    NotAssembled,
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VError>;
