//! Error types for CardTest fixture drivers

use crate::types::EntityKind;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the driver error
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors raised by fixture drivers and the site backend
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Path error: {reason} at \"{}\"", path.display())]
    Path { path: PathBuf, reason: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No {kind} \"{id}\" exists")]
    NotFound { kind: String, id: String },

    #[error("No ability to {operation} in {driver}")]
    UnsupportedOperation {
        operation: &'static str,
        driver: &'static str,
    },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Teardown(#[from] TeardownError),
}

/// Coarse classification of a [`DriverError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Path,
    Validation,
    NotFound,
    UnsupportedOperation,
    Backend,
    Teardown,
}

impl DriverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::Configuration(_) => ErrorKind::Configuration,
            DriverError::Path { .. } => ErrorKind::Path,
            DriverError::Validation(_) => ErrorKind::Validation,
            DriverError::NotFound { .. } => ErrorKind::NotFound,
            DriverError::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            DriverError::Backend(_)
            | DriverError::Database(_)
            | DriverError::Serialization(_)
            | DriverError::Io(_) => ErrorKind::Backend,
            DriverError::Teardown(_) => ErrorKind::Teardown,
        }
    }

    pub fn not_found(kind: impl fmt::Display, id: impl fmt::Display) -> Self {
        DriverError::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }

    pub fn not_bootstrapped(driver: &str) -> Self {
        DriverError::Configuration(format!(
            "{} has not been bootstrapped; call bootstrap() first",
            driver
        ))
    }
}

/// A single entity that could not be removed during teardown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub kind: EntityKind,
    pub id: String,
    pub message: String,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.id, self.message)
    }
}

/// Aggregate of every deletion that failed during one teardown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownError {
    pub failures: Vec<TeardownFailure>,
    /// Fixtures that were deleted before and after the failures
    pub deleted: usize,
}

impl std::error::Error for TeardownError {}

impl fmt::Display for TeardownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Teardown failed for {} fixture(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {}", failure)?;
        }
        Ok(())
    }
}

impl TeardownError {
    /// Whether the failure list names the given entity
    pub fn names(&self, kind: EntityKind, id: &str) -> bool {
        self.failures.iter().any(|f| f.kind == kind && f.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_folds_storage_errors_into_backend() {
        let err = DriverError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert_eq!(DriverError::not_found("role", "editor").kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_teardown_error_lists_every_failure() {
        let err = TeardownError {
            deleted: 1,
            failures: vec![
                TeardownFailure {
                    kind: EntityKind::User,
                    id: "7".to_string(),
                    message: "gone".to_string(),
                },
                TeardownFailure {
                    kind: EntityKind::Node,
                    id: "3".to_string(),
                    message: "locked".to_string(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("2 fixture(s)"));
        assert!(text.contains("user 7: gone"));
        assert!(text.contains("node 3: locked"));
        assert!(err.names(EntityKind::Node, "3"));
        assert!(!err.names(EntityKind::Node, "7"));
    }
}
