use depot_types::{BlobId, TypeError};

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested blob was not found.
    #[error("blob not found: {0}")]
    NotFound(BlobId),

    /// A named blob store is not known to the manager.
    #[error("Blob Store '{0}' not found")]
    StoreNotFound(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store rejects writes.
    #[error("blob store '{0}' is read-only")]
    ReadOnly(String),

    /// The store's backing storage cannot be reached.
    #[error("blob store '{0}' is unavailable")]
    Unavailable(String),

    /// A group's fill policy found no eligible member.
    #[error("Unable to find a member Blob Store of '{group}' for {operation}")]
    NoEligibleMember { group: String, operation: String },

    /// Declared and actual content size differ on a file-based create.
    #[error("size mismatch for {path}: declared {declared}, actual {actual}")]
    SizeMismatch {
        path: String,
        declared: u64,
        actual: u64,
    },

    /// The write does not fit in the store's remaining capacity.
    #[error("blob store '{store}' is full: {requested} bytes requested, {available} available")]
    Full {
        store: String,
        requested: u64,
        available: u64,
    },

    /// The session has already been committed, rolled back or closed.
    #[error("blob session is closed")]
    SessionClosed,

    /// Soft-quota configuration or evaluation failed.
    #[error("quota error: {0}")]
    Quota(String),

    /// Configuration attributes could not be read.
    #[error("configuration error: {0}")]
    Config(#[from] TypeError),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
