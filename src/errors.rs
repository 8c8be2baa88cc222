//! Centralized error handling for ClimPrep
//!
//! This module provides structured error types for the preprocessing
//! pipeline, enabling better error context and type safety. Every error in
//! the preprocessing taxonomy is unrecoverable for the variable being
//! processed: callers handling multiple variables are expected to catch
//! per-variable and continue with the remainder.

use std::fmt;

/// Main error type for ClimPrep operations
#[derive(Debug)]
pub enum PrepError {
    /// Variable or axis identity could not be determined unambiguously
    Resolution { var: String, msg: String },

    /// No calendar found via any fallback location
    CalendarResolution { var: String },

    /// Requested analysis window and available data do not overlap
    DataRange { var: String, msg: String },

    /// Exact requested coordinate value absent from the vertical axis
    LevelNotFound { var: String, level: i64 },

    /// Non-concatenated dimensions, variables or attributes disagree
    /// across the files of a multi-file dataset
    MergeConsistency { msg: String },

    /// Subprocess utility missing or exited non-zero
    ExternalTool(String),

    /// Naming convention not present in the translation registry
    UnknownConvention(String),

    /// Variable descriptor failed validation at construction
    InvalidDescriptor(String),

    /// NetCDF file operation errors
    NetCDFError(netcdf::Error),

    /// I/O operation errors
    IoError(std::io::Error),

    /// Array shape or dimension error
    ArrayError(ndarray::ShapeError),

    /// Generic error for everything else
    Generic(String),
}

impl fmt::Display for PrepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrepError::Resolution { var, msg } => {
                write!(f, "Resolution error for '{}': {}", var, msg)
            }
            PrepError::CalendarResolution { var } => {
                write!(f, "No calendar info found for '{}'", var)
            }
            PrepError::DataRange { var, msg } => {
                write!(f, "Date range error for '{}': {}", var, msg)
            }
            PrepError::LevelNotFound { var, level } => write!(
                f,
                "Pressure axis of '{}' didn't provide requested level {} hPa",
                var, level
            ),
            PrepError::MergeConsistency { msg } => {
                write!(f, "Merge consistency error: {}", msg)
            }
            PrepError::ExternalTool(msg) => write!(f, "External tool error: {}", msg),
            PrepError::UnknownConvention(name) => {
                write!(f, "Unrecognized naming convention '{}'", name)
            }
            PrepError::InvalidDescriptor(msg) => {
                write!(f, "Invalid variable descriptor: {}", msg)
            }
            PrepError::NetCDFError(e) => write!(f, "NetCDF error: {}", e),
            PrepError::IoError(e) => write!(f, "I/O error: {}", e),
            PrepError::ArrayError(e) => write!(f, "Array error: {}", e),
            PrepError::Generic(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for PrepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PrepError::NetCDFError(e) => Some(e),
            PrepError::IoError(e) => Some(e),
            PrepError::ArrayError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<netcdf::Error> for PrepError {
    fn from(error: netcdf::Error) -> Self {
        PrepError::NetCDFError(error)
    }
}

impl From<std::io::Error> for PrepError {
    fn from(error: std::io::Error) -> Self {
        PrepError::IoError(error)
    }
}

impl From<ndarray::ShapeError> for PrepError {
    fn from(error: ndarray::ShapeError) -> Self {
        PrepError::ArrayError(error)
    }
}

impl From<String> for PrepError {
    fn from(error: String) -> Self {
        PrepError::Generic(error)
    }
}

impl From<&str> for PrepError {
    fn from(error: &str) -> Self {
        PrepError::Generic(error.to_string())
    }
}

/// Result type alias for ClimPrep operations
pub type Result<T> = std::result::Result<T, PrepError>;
