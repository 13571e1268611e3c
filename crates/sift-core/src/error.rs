//! Error types and error code constants for sift.
//!
//! This module provides a unified error type (`SiftError`) that bridges
//! domain-specific errors from the engine subsystems (resolution, project,
//! syntax) into a common format suitable for JSON output.
//!
//! ## Error Code Mapping
//!
//! - `2`: Invalid arguments (bad input from caller)
//! - `3`: Resolution errors (name not found, module not found, bad identifier)
//! - `4`: Parse errors (the analyzed buffer does not parse)
//! - `10`: Internal errors (bugs, unexpected state)
//!
//! ## Design
//!
//! - **Unified type**: `SiftError` is the single error type for CLI output
//! - **Bridging**: `impl From<X> for SiftError` bridges domain errors
//! - **Code mapping**: `OutputErrorCode` provides stable integer codes for JSON
//!
//! Conditions that reflect "the analyzed code is incomplete or dynamically
//! untyped" never reach this type: the engine degrades them to `Unknown`
//! internally. Only caller-facing conditions are bridged here.

use std::fmt;

use thiserror::Error;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Error codes for JSON output.
///
/// These codes map to CLI exit codes and appear in JSON error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller (bad input, malformed request).
    InvalidArguments = 2,
    /// Resolution errors (name not found, module not found, bad identifier).
    ResolutionError = 3,
    /// Parse errors in the analyzed buffer.
    ParseError = 4,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for CLI output.
///
/// This is the canonical error type that all subsystem errors are converted
/// to before being rendered as JSON output.
#[derive(Debug, Error)]
pub enum SiftError {
    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// The text at an offset is not a resolvable identifier.
    #[error("no identifier at {file}:{line}:{col}")]
    BadIdentifier { file: String, line: u32, col: u32 },

    /// An identifier resolved to no binding in any enclosing scope.
    #[error("name '{name}' not found at {file}:{line}:{col}")]
    NameNotFound {
        name: String,
        file: String,
        line: u32,
        col: u32,
    },

    /// A module could not be located on the search path.
    #[error("module not found: {name}")]
    ModuleNotFound { name: String },

    /// The analyzed buffer does not parse.
    #[error("syntax error in {file} at line {line}: {message}")]
    Syntax {
        file: String,
        line: u32,
        message: String,
    },

    /// File not found or unreadable.
    #[error("file error: {path}: {message}")]
    File { path: String, message: String },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    InternalError { message: String },
}

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&SiftError> for OutputErrorCode {
    fn from(err: &SiftError) -> Self {
        match err {
            SiftError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            SiftError::BadIdentifier { .. } => OutputErrorCode::ResolutionError,
            SiftError::NameNotFound { .. } => OutputErrorCode::ResolutionError,
            SiftError::ModuleNotFound { .. } => OutputErrorCode::ResolutionError,
            SiftError::Syntax { .. } => OutputErrorCode::ParseError,
            SiftError::File { .. } => OutputErrorCode::ResolutionError,
            SiftError::InternalError { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<SiftError> for OutputErrorCode {
    fn from(err: SiftError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl SiftError {
    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        SiftError::InvalidArguments {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        SiftError::InternalError {
            message: message.into(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================
