//! Error types for mlsurf

use thiserror::Error;

/// Main error type for mlsurf operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed configuration or input, rejected before any work is done
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Near-zero gradient or otherwise ill-conditioned local geometry
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// A computation produced a non-finite value
    #[error("Numeric fault: {0}")]
    NumericFault(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Algorithm error: {0}")]
    Algorithm(String),
}

impl Error {
    /// Whether the error reports a caller-requested cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result type alias for mlsurf operations
pub type Result<T> = std::result::Result<T, Error>;

/// Fail with [`Error::NumericFault`] unless every coordinate is finite
pub fn ensure_finite(values: &[f64], what: &str) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(Error::NumericFault(format!("non-finite {}", what)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidArgument("resolution must be at least 2".to_string());
        assert_eq!(err.to_string(), "Invalid argument: resolution must be at least 2");
        assert_eq!(Error::Cancelled.to_string(), "Operation cancelled");
        assert!(Error::Cancelled.is_cancelled());
    }

    #[test]
    fn test_ensure_finite() {
        assert!(ensure_finite(&[0.0, 1.0, -2.5], "position").is_ok());
        let err = ensure_finite(&[0.0, f64::NAN], "position").unwrap_err();
        assert!(matches!(err, Error::NumericFault(_)));
    }
}
