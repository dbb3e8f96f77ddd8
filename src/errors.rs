//! Error taxonomy for the scan core with stable, machine-parseable codes.

use thiserror::Error;

/// Shared `Result` alias for the core.
pub type Result<T> = std::result::Result<T, EcoError>;

#[derive(Debug, Error)]
pub enum EcoError {
    /// A value crossed the ingestion boundary in a shape the core refuses to
    /// store: a non-scalar number, a non-finite float, an empty user id.
    #[error("[ECO-1001] invalid {field}: {details}")]
    InvalidInput {
        field: &'static str,
        details: String,
    },

    #[error("[ECO-1101] taxonomy configuration error: {details}")]
    Taxonomy { details: String },

    /// The persistence collaborator could not complete a read or write.
    /// Nothing was persisted; the caller decides whether to retry.
    #[error("[ECO-2001] storage unavailable in {context}: {details}")]
    StorageUnavailable {
        context: &'static str,
        details: String,
    },

    /// A stored row cannot be decoded (unknown category, malformed
    /// timestamp). Retrying reads the same bytes, so this is not transient.
    #[error("[ECO-2002] corrupt ledger record: {details}")]
    CorruptRecord { details: String },

    /// The vision collaborator failed to produce predictions.
    #[error("[ECO-3001] classifier {name} failed: {details}")]
    Classifier { name: &'static str, details: String },
}

impl EcoError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "ECO-1001",
            Self::Taxonomy { .. } => "ECO-1101",
            Self::StorageUnavailable { .. } => "ECO-2001",
            Self::CorruptRecord { .. } => "ECO-2002",
            Self::Classifier { .. } => "ECO-3001",
        }
    }

    /// Storage and classifier failures are transient from the caller's point of view.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. } | Self::Classifier { .. })
    }

    pub(crate) fn invalid(field: &'static str, details: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            details: details.into(),
        }
    }

    pub(crate) fn storage(context: &'static str, details: impl ToString) -> Self {
        Self::StorageUnavailable {
            context,
            details: details.to_string(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for EcoError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..) => Self::CorruptRecord {
                details: err.to_string(),
            },
            other => Self::storage("sqlite", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_and_prefixed_in_display() {
        let e = EcoError::invalid("confidence", "expected a number, got an array");
        assert_eq!(e.code(), "ECO-1001");
        assert!(e.to_string().starts_with("[ECO-1001]"));
        assert!(!e.is_transient());

        let s = EcoError::storage("insert", "disk I/O error");
        assert_eq!(s.code(), "ECO-2001");
        assert!(s.is_transient());
        assert!(s.to_string().contains("insert"));

        let c = EcoError::Classifier {
            name: "static",
            details: "model offline".into(),
        };
        assert_eq!(c.code(), "ECO-3001");
        assert!(c.is_transient());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn undecodable_sqlite_values_are_corrupt_not_transient() {
        let conv = rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Text,
            "bad timestamp".into(),
        );
        let e = EcoError::from(conv);
        assert_eq!(e.code(), "ECO-2002");
        assert!(!e.is_transient());

        let busy = EcoError::from(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(busy.code(), "ECO-2001");
        assert!(busy.is_transient());
    }
}
