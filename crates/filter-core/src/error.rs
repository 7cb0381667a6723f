/// Result type for [`crate::FilterManager`] operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the filter manager core.
///
/// Every variant here is meant to be reported to a caller; none of them
/// should bring the process down. The one exception, opening the KV store at
/// startup, is handled by the binary that embeds this crate, not by this
/// type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The filter id or name does not exist.
    #[error("filter not found")]
    NotFound,

    /// A filter with the same case-insensitive name already exists.
    #[error("a filter named {0:?} already exists")]
    Conflict(String),

    /// The caller supplied a malformed request: an empty name/regex, a
    /// non-numeric offset, or similar.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The embedded KV store failed to read or write.
    #[error("storage error: {0}")]
    Storage(#[from] redb::Error),

    /// A persisted record could not be decoded. Treated as an empty
    /// container by callers, but still reported so it can be logged.
    #[error("failed to decode persisted record: {0}")]
    Decode(String),
}

impl From<redb::TransactionError> for Error {
    fn from(err: redb::TransactionError) -> Self {
        Error::Storage(err.into())
    }
}

impl From<redb::TableError> for Error {
    fn from(err: redb::TableError) -> Self {
        Error::Storage(err.into())
    }
}

impl From<redb::StorageError> for Error {
    fn from(err: redb::StorageError) -> Self {
        Error::Storage(err.into())
    }
}

impl From<redb::CommitError> for Error {
    fn from(err: redb::CommitError) -> Self {
        Error::Storage(err.into())
    }
}

impl From<redb::DatabaseError> for Error {
    fn from(err: redb::DatabaseError) -> Self {
        Error::Storage(err.into())
    }
}
