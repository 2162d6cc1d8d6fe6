use crate::shortcode::ShortCode;
use thiserror::Error;

/// Errors related to the core domain types.
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
}

/// Why a [`Context`][crate::Context] stopped.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage i/o failed: {0}")]
    Io(String),
    #[error("storage serialization failed: {0}")]
    Serialization(String),
    #[error(transparent)]
    Cancelled(#[from] ContextError),
}

#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("short code {code} already maps to {stored}, refusing {requested}")]
    Collision {
        code: ShortCode,
        stored: String,
        requested: String,
    },
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
    #[error("{op}: {source}")]
    Storage {
        op: &'static str,
        #[source]
        source: StorageError,
    },
    #[error(transparent)]
    Cancelled(ContextError),
}

impl From<CoreError> for ShortenerError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::InvalidShortCode(message) => Self::InvalidShortCode(message),
        }
    }
}

impl From<ContextError> for ShortenerError {
    fn from(value: ContextError) -> Self {
        Self::Cancelled(value)
    }
}

/// Attaches the failing service operation to a storage result.
pub trait StorageResultExt<T> {
    fn op(self, op: &'static str) -> std::result::Result<T, ShortenerError>;
}

impl<T> StorageResultExt<T> for std::result::Result<T, StorageError> {
    fn op(self, op: &'static str) -> std::result::Result<T, ShortenerError> {
        self.map_err(|err| ShortenerError::storage(op, err))
    }
}

impl ShortenerError {
    /// Wraps a storage failure of the service operation `op`.
    ///
    /// Cancellation and missing records keep their own variants.
    pub fn storage(op: &'static str, err: StorageError) -> Self {
        match err {
            StorageError::Cancelled(reason) => Self::Cancelled(reason),
            StorageError::NotFound(what) => Self::NotFound(what),
            source => Self::Storage { op, source },
        }
    }

    /// Returns `true` for conditions the caller should render as "nothing here".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` when the operation was aborted by its context.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_cancellation_stays_cancellation() {
        let err = ShortenerError::storage(
            "register",
            StorageError::Cancelled(ContextError::DeadlineExceeded),
        );
        assert!(err.is_cancelled());
        assert!(matches!(
            err,
            ShortenerError::Cancelled(ContextError::DeadlineExceeded)
        ));
    }

    #[test]
    fn storage_not_found_maps_to_not_found() {
        let err = ShortenerError::storage("get_short", StorageError::NotFound("abc".into()));
        assert!(err.is_not_found());
    }

    #[test]
    fn backend_failures_are_wrapped() {
        let err: std::result::Result<(), _> = Err(StorageError::Unavailable("down".into()));
        let err = err.op("stats").unwrap_err();
        assert!(matches!(
            err,
            ShortenerError::Storage {
                op: "stats",
                source: StorageError::Unavailable(_),
            }
        ));
        assert_eq!(err.to_string(), "stats: storage backend unavailable: down");
        assert!(!err.is_not_found());
        assert!(!err.is_cancelled());
    }
}
