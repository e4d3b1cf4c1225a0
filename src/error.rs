//! Error types for the qeval library.
//!
//! All errors are represented by the [`QevalError`] enum. The variants follow
//! the failure classes of a batch run: configuration problems are detected at
//! startup, query syntax errors while parsing a query line, model mismatches
//! when an operator is evaluated under a retrieval model that does not define
//! it, and external tool failures in the learning-to-rank pipeline.
//!
//! # Examples
//!
//! ```
//! use qeval::error::{QevalError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(QevalError::query_syntax("unbalanced parentheses"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for qeval operations.
#[derive(Error, Debug)]
pub enum QevalError {
    /// I/O errors (parameter files, query files, result files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Structured query could not be parsed
    #[error("Query syntax error: {0}")]
    QuerySyntax(String),

    /// An operator was evaluated under a retrieval model that does not support it
    #[error("Model mismatch: {0}")]
    ModelMismatch(String),

    /// An external trainer or classifier process failed
    #[error("External tool failure: {0}")]
    ExternalTool(String),

    /// Index store errors (unknown document, inconsistent postings)
    #[error("Index error: {0}")]
    Index(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with QevalError.
pub type Result<T> = std::result::Result<T, QevalError>;

impl QevalError {
    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        QevalError::Config(msg.into())
    }

    /// Create a new query syntax error.
    pub fn query_syntax<S: Into<String>>(msg: S) -> Self {
        QevalError::QuerySyntax(msg.into())
    }

    /// Create a new model mismatch error.
    pub fn model_mismatch<S: Into<String>>(msg: S) -> Self {
        QevalError::ModelMismatch(msg.into())
    }

    /// Create a new external tool error.
    pub fn external_tool<S: Into<String>>(msg: S) -> Self {
        QevalError::ExternalTool(msg.into())
    }

    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        QevalError::Index(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        QevalError::Other(msg.into())
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        QevalError::Index(format!("Not found: {}", msg.into()))
    }

    /// Whether this error is a query syntax error.
    ///
    /// The batch runner uses this to decide which failures a `skip` policy
    /// may step over.
    pub fn is_query_syntax(&self) -> bool {
        matches!(self, QevalError::QuerySyntax(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = QevalError::config("missing indexPath");
        assert_eq!(error.to_string(), "Configuration error: missing indexPath");

        let error = QevalError::query_syntax("unknown field foo");
        assert_eq!(error.to_string(), "Query syntax error: unknown field foo");
        assert!(error.is_query_syntax());

        let error = QevalError::model_mismatch("#sum under UnrankedBoolean");
        assert_eq!(
            error.to_string(),
            "Model mismatch: #sum under UnrankedBoolean"
        );
        assert!(!error.is_query_syntax());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let qeval_error = QevalError::from(io_error);

        match qeval_error {
            QevalError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }
}
