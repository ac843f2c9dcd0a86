use thiserror::Error;

/// Main error type for ordex operations
#[derive(Error, Debug)]
pub enum OrdexError {
    #[error("Invalid merge state: {0}")]
    InvalidMergeState(&'static str),

    #[error("Buffer is frozen and no longer accepts appends")]
    BufferFrozen,

    #[error("Corrupt doc map: expected a permutation of {expected} live documents, got {actual}")]
    CorruptDocMap { expected: usize, actual: usize },

    #[error("Sort error: {0}")]
    Sort(String),
}

/// Result type alias for ordex operations
pub type Result<T> = std::result::Result<T, OrdexError>;

impl OrdexError {
    /// Whether this error is a call-ordering bug in the caller.
    ///
    /// These are never retried internally; the surrounding execution engine
    /// decides whether to abandon and replan the whole merge.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            OrdexError::InvalidMergeState(_) | OrdexError::BufferFrozen
        )
    }
}
