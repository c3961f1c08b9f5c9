//! Error taxonomy shared by the scraper and the query service.

use thiserror::Error;

/// Failure talking to the upstream analytics API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network failure, timeout, rate limit or 5xx. Safe to retry.
    #[error("transient fetch error: {0}")]
    Transient(String),

    /// Bad parameter or rejected request. Retrying will not help.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A single upstream wallet entry could not be mapped into a snapshot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

impl NormalizationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be opened or is not accepting work.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("no snapshot found for {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ffi::ErrorCode;

        match &err {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code:
                        ErrorCode::CannotOpen
                        | ErrorCode::DatabaseBusy
                        | ErrorCode::DatabaseLocked
                        | ErrorCode::NotADatabase
                        | ErrorCode::PermissionDenied,
                    ..
                },
                _,
            ) => Self::Unavailable(err.to_string()),
            _ => Self::Other(err.to_string()),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for StoreError {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        match err {
            tokio_rusqlite::Error::ConnectionClosed => {
                Self::Unavailable("database connection closed".to_string())
            }
            tokio_rusqlite::Error::Close((_, err)) => {
                Self::Other(format!("database close error: {err}"))
            }
            tokio_rusqlite::Error::Error(err) => Self::from(err),
            other => Self::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_is_retryable() {
        assert!(FetchError::Transient("timeout".into()).is_retryable());
        assert!(!FetchError::InvalidRequest("bad tag".into()).is_retryable());
    }

    #[test]
    fn test_cannot_open_maps_to_unavailable() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
            Some("unable to open database file".to_string()),
        );
        assert!(StoreError::from(err).is_unavailable());
    }

    #[test]
    fn test_constraint_maps_to_other() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            None,
        );
        assert!(matches!(StoreError::from(err), StoreError::Other(_)));
    }

    #[test]
    fn test_closed_connection_maps_to_unavailable() {
        let err = tokio_rusqlite::Error::<rusqlite::Error>::ConnectionClosed;
        assert!(StoreError::from(err).is_unavailable());
    }
}
