//! Unified error types for the meter-to-transformer pairing crates
//!
//! This module provides a common error type [`M2tError`] covering configuration
//! problems (fatal, surfaced before any computation) and the few data conditions
//! that cannot be absorbed as structured exclusions.
//!
//! Missing samples and customers without correlation votes are *not* errors; they
//! are reported through [`crate::Diagnostics`] and result fields instead.
//!
//! # Example
//!
//! ```ignore
//! use m2t_core::{M2tError, M2tResult};
//!
//! fn run(dataset: &AmiDataset) -> M2tResult<()> {
//!     dataset.validate()?;
//!     let corr = windowed_median_correlation(&delta, &dataset.customer_ids, &cfg)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all pairing operations.
#[derive(Error, Debug)]
pub enum M2tError {
    /// Input arrays disagree in customer or sample count
    #[error("Shape mismatch in {context}: expected {expected}, found {found}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    /// Not enough usable data to compute a statistic at all
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// A requested threshold is not part of the configured sweep grid
    #[error("Threshold {0} is not in the configured sweep grid")]
    ThresholdNotFound(f64),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Linear solve failures
    #[error("Solver error: {0}")]
    Solver(String),

    /// I/O errors (config files, exports done by callers)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

impl M2tError {
    /// Shorthand for a [`M2tError::ShapeMismatch`].
    pub fn shape(context: impl Into<String>, expected: usize, found: usize) -> Self {
        M2tError::ShapeMismatch {
            context: context.into(),
            expected,
            found,
        }
    }
}

/// Convenience type alias for Results using M2tError.
pub type M2tResult<T> = Result<T, M2tError>;

impl From<String> for M2tError {
    fn from(s: String) -> Self {
        M2tError::Other(s)
    }
}

impl From<&str> for M2tError {
    fn from(s: &str) -> Self {
        M2tError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for M2tError {
    fn from(err: serde_json::Error) -> Self {
        M2tError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_display() {
        let err = M2tError::shape("customer ids", 4, 3);
        let text = err.to_string();
        assert!(text.contains("customer ids"));
        assert!(text.contains("expected 4"));
        assert!(text.contains("found 3"));
    }

    #[test]
    fn test_threshold_not_found_display() {
        let err = M2tError::ThresholdNotFound(0.77);
        assert!(err.to_string().contains("0.77"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: M2tError = io_err.into();
        assert!(matches!(err, M2tError::Io(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> M2tResult<()> {
            Err(M2tError::Config("window size must be at least 2".into()))
        }

        fn outer() -> M2tResult<()> {
            inner()?;
            Ok(())
        }

        assert!(matches!(outer(), Err(M2tError::Config(_))));
    }
}
