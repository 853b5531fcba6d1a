//! Error taxonomy for the storage core

use std::fmt;

use rusqlite::ErrorCode;

use crate::models::{BodyId, EmailId, HeaderDataId, HeaderNameId, NodeId};

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// A content row that a stored tree references but that no longer exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingRef {
    /// The email has no part tree at all
    PartTree,
    /// A tree node has no PartList row
    Part(NodeId),
    Body(BodyId),
    HeaderName(HeaderNameId),
    HeaderData(HeaderDataId),
}

impl fmt::Display for MissingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingRef::PartTree => write!(f, "part tree"),
            MissingRef::Part(id) => write!(f, "part list row for node {}", id),
            MissingRef::Body(id) => write!(f, "body {}", id),
            MissingRef::HeaderName(id) => write!(f, "header name {}", id),
            MissingRef::HeaderData(id) => write!(f, "header data {}", id),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Malformed MIME input. Not retried; the delivery is rejected upstream.
    #[error("Failed to parse message: {0}")]
    Parse(String),

    /// Transaction or lock failure reported by SQLite.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Failed to migrate database: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("Failed to (de)compress body: {0}")]
    Compression(#[source] std::io::Error),

    /// A stored tree references content that is gone.
    #[error("Email {email} is missing {missing}")]
    MissingContent { email: EmailId, missing: MissingRef },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Programmer error: cross-tree parenting, double root, unknown kind.
    #[error("Invalid tree operation: {0}")]
    InvalidOperation(String),

    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Whether the caller should retry the unit of work with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Storage(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        StoreError::InvalidOperation(message.into())
    }
}

impl From<mailparse::MailParseError> for StoreError {
    fn from(err: mailparse::MailParseError) -> Self {
        StoreError::Parse(err.to_string())
    }
}
