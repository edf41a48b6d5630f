use thiserror::Error;

use crate::types::StableId;

#[derive(Debug, Error)]
pub enum Error {
    /// A lookup cache was read before `initialize()` (or after `clear()`).
    #[error("{0} cache not initialized")]
    NotInitialized(&'static str),

    #[error("unresolved {kind} reference: {id}")]
    UnresolvedReference { kind: &'static str, id: StableId },

    #[error("id collision: '{name}' hashes to {base} already held by '{existing}', assigned {assigned}")]
    IdCollision {
        name: String,
        existing: String,
        base: StableId,
        assigned: StableId,
    },

    #[error("external call '{operation}' failed after {attempts} attempt(s): {message}")]
    ExternalCall {
        operation: String,
        attempts: u32,
        message: String,
    },

    #[error("schema mismatch in table '{table}': {detail}")]
    SchemaMismatch { table: String, detail: String },

    /// A whole-table pass read fewer rows than the table holds; rewriting
    /// from that scan would delete the rest.
    #[error("table '{table}' holds {rows} rows, more than the scan cap of {cap}")]
    ScanTruncated { table: String, rows: usize, cap: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Conditions a caller may retry instead of treating as fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::NotInitialized(_) | Error::ExternalCall { .. })
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        Error::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_conditions() {
        assert!(Error::NotInitialized("concept").is_retryable());
        assert!(Error::ExternalCall {
            operation: "extract".into(),
            attempts: 3,
            message: "timeout".into()
        }
        .is_retryable());
        assert!(!Error::NotFound("x".into()).is_retryable());
        assert!(!Error::UnresolvedReference { kind: "concept", id: 7 }.is_retryable());
        assert!(!Error::ScanTruncated { table: "chunks".into(), rows: 3, cap: 2 }.is_retryable());
    }

    #[test]
    fn not_initialized_message_names_the_cache() {
        let msg = Error::NotInitialized("category").to_string();
        assert_eq!(msg, "category cache not initialized");
    }
}
