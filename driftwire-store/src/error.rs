//! Error types for store operations.

/// Error type for outbox, sequence, and checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or the operation failed
    /// transiently. Retries are the caller's responsibility.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// An outbox entry with this sequence number already exists.
    #[error("duplicate sequence number {0}")]
    DuplicateSequence(i64),

    /// A persisted row could not be decoded.
    #[error("corrupt stored record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether a caller may reasonably retry the failed operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
