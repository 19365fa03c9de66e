//! Error types for ecosdm

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for ecosdm operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TIFF error in {path}: {reason}")]
    Tiff { path: PathBuf, reason: String },

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Layer '{layer}' does not match the stack: {reason}")]
    LayerMismatch { layer: String, reason: String },

    #[error("No input: {0}")]
    NoInput(String),

    #[error("No data: {0}")]
    NoData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown {kind} '{given}'. Valid options: {expected}")]
    UnknownMethod {
        kind: &'static str,
        given: String,
        expected: &'static str,
    },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Singular covariance matrix in {context}")]
    SingularMatrix { context: String },

    #[error("Pseudo-absence sampling gave up after {attempts} draws with {accepted} of {requested} points accepted")]
    SamplingExhausted {
        accepted: usize,
        requested: usize,
        attempts: u64,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

/// Coarse classification used when reporting failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad or empty input, unknown method names, misaligned layers,
    /// malformed TIFF or CSV files
    Validation,
    /// Linear algebra failures (singular covariance)
    Numerical,
    /// Everything else: I/O, internal shape errors
    Unexpected,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::SingularMatrix { .. } => ErrorCategory::Numerical,
            Error::Tiff { .. }
            | Error::Csv(_)
            | Error::InvalidDimensions { .. }
            | Error::SizeMismatch { .. }
            | Error::LayerMismatch { .. }
            | Error::NoInput(_)
            | Error::NoData(_)
            | Error::InvalidInput(_)
            | Error::UnknownMethod { .. }
            | Error::InvalidParameter { .. } => ErrorCategory::Validation,
            _ => ErrorCategory::Unexpected,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }

    pub fn is_numerical(&self) -> bool {
        self.category() == ErrorCategory::Numerical
    }

    pub(crate) fn tiff(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Error::Tiff {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<ndarray::ShapeError> for Error {
    fn from(e: ndarray::ShapeError) -> Self {
        Error::Other(e.to_string())
    }
}

/// Result type alias for ecosdm operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let singular = Error::SingularMatrix {
            context: "Mahalanobis".into(),
        };
        assert!(singular.is_numerical());
        assert!(!singular.is_validation());

        let unknown = Error::UnknownMethod {
            kind: "central point method",
            given: "avg".into(),
            expected: "mean, median, mode",
        };
        assert!(unknown.is_validation());
        assert!(unknown.to_string().contains("mean, median, mode"));

        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(io.category(), ErrorCategory::Unexpected);
    }

    #[test]
    fn test_bad_input_files_are_validation() {
        assert!(Error::tiff("bio1.tif", "not a TIFF").is_validation());

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader("a,b\nc\n".as_bytes());
        let csv_err = reader
            .records()
            .find_map(|r| r.err())
            .map(Error::from)
            .unwrap();
        assert!(csv_err.is_validation());
    }
}
