// Allow unused_assignments lint for error struct fields that are used in thiserror Display macros
// but appear as "never read" to the compiler.
#![allow(unused_assignments)]

//! Error types for AMR contouring with rich diagnostics.
//!
//! This module provides:
//! - Machine-readable error codes for programmatic handling
//! - Context about which block, array or exchange round failed
//! - Recovery suggestions for common issues
//! - Terminal display via miette
//!
//! # Error Codes
//!
//! Each error has a unique code in the format `AMR-XXXX`:
//! - `AMR-1xxx`: Input errors (hierarchy layout, parameters, arrays)
//! - `AMR-2xxx`: Communication errors (ghost exchange, fragment exchange)
//! - `AMR-3xxx`: Control flow (cancellation)
//!
//! All errors are fatal for the iso-value pass in progress: region ownership
//! assumes every block participates, so a partial pass could double- or
//! zero-count shared regions. Problems that only affect local completeness are
//! reported as [`ContourWarning`] instead.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for contouring operations.
pub type ContourResult<T> = Result<T, ContourError>;

/// Machine-readable error codes.
///
/// Codes follow the pattern `AMR-XXXX` where:
/// - 1xxx = Input errors
/// - 2xxx = Communication errors
/// - 3xxx = Control flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// AMR-1001: Block hierarchy is not well-formed
    InvalidInput = 1001,
    /// AMR-1002: Contour parameters are invalid
    InvalidParams = 1002,
    /// AMR-1003: Requested array is absent on a block
    MissingArray = 1003,

    /// AMR-2001: Ghost or fragment exchange failed or was malformed
    Communication = 2001,

    /// AMR-3001: Pass cancelled through the progress callback
    Cancelled = 3001,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `AMR-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "AMR-1001",
            ErrorCode::InvalidParams => "AMR-1002",
            ErrorCode::MissingArray => "AMR-1003",
            ErrorCode::Communication => "AMR-2001",
            ErrorCode::Cancelled => "AMR-3001",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for contouring errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Check the hierarchy produced by the reader.
    CheckHierarchy { checks: Vec<String> },
    /// Adjust parameters for the operation.
    AdjustParameters { parameters: Vec<(String, String)> },
    /// Make sure every rank takes part in every collective call.
    CheckCommunication { checks: Vec<String> },
    /// Re-run the pass.
    Retry,
    /// No automatic recovery available.
    None,
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::CheckHierarchy { checks } => {
                write!(f, "Check the block hierarchy for: {}", checks.join(", "))
            }
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect();
                write!(f, "Try adjusting: {}", params.join(", "))
            }
            RecoverySuggestion::CheckCommunication { checks } => {
                write!(f, "Check the process group: {}", checks.join(", "))
            }
            RecoverySuggestion::Retry => write!(f, "Run the contour pass again"),
            RecoverySuggestion::None => write!(f, "No automatic recovery available"),
        }
    }
}

/// Errors that abort a contour pass.
#[derive(Debug, Error, Diagnostic)]
pub enum ContourError {
    /// The block hierarchy is not well-formed.
    #[error("invalid AMR hierarchy: {details}")]
    #[diagnostic(
        code(amr::input::hierarchy),
        help(
            "All blocks must share one cell dimension, sit on their level's block lattice and not overlap."
        )
    )]
    InvalidInput { details: String },

    /// Contour parameters are invalid.
    #[error("invalid contour parameters: {details}")]
    #[diagnostic(code(amr::input::params))]
    InvalidParams { details: String },

    /// The requested array is absent on a block owned by this rank.
    #[error("array '{array}' is missing on block {block_id}")]
    #[diagnostic(
        code(amr::input::array),
        help("Every block owned by this process must carry the contoured array.")
    )]
    MissingArray { array: String, block_id: usize },

    /// A ghost or fragment exchange failed or delivered malformed data.
    #[error("communication failed on rank {rank}: {details}")]
    #[diagnostic(
        code(amr::comm::exchange),
        help(
            "Every rank must enter each exchange the same number of times and in the same order."
        )
    )]
    Communication { rank: usize, details: String },

    /// The pass was cancelled between blocks.
    #[error("contour pass cancelled after {completed_blocks} of {total_blocks} blocks")]
    #[diagnostic(code(amr::control::cancelled))]
    Cancelled {
        completed_blocks: usize,
        total_blocks: usize,
    },
}

impl ContourError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            ContourError::InvalidInput { .. } => ErrorCode::InvalidInput,
            ContourError::InvalidParams { .. } => ErrorCode::InvalidParams,
            ContourError::MissingArray { .. } => ErrorCode::MissingArray,
            ContourError::Communication { .. } => ErrorCode::Communication,
            ContourError::Cancelled { .. } => ErrorCode::Cancelled,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            ContourError::InvalidInput { .. } => RecoverySuggestion::CheckHierarchy {
                checks: vec![
                    "uniform block dimensions".into(),
                    "spacing halves per level".into(),
                    "non-overlapping blocks".into(),
                ],
            },
            ContourError::InvalidParams { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![
                    ("array_name".into(), "a non-empty array name".into()),
                    ("iso_values".into(), "at least one finite value".into()),
                ],
            },
            ContourError::MissingArray { array, .. } => RecoverySuggestion::CheckHierarchy {
                checks: vec![format!("cell array '{}' on every local block", array)],
            },
            ContourError::Communication { .. } => RecoverySuggestion::CheckCommunication {
                checks: vec![
                    "all ranks alive".into(),
                    "identical parameters on every rank".into(),
                    "exchange timeout".into(),
                ],
            },
            ContourError::Cancelled { .. } => RecoverySuggestion::Retry,
        }
    }

    // Constructor helpers for common error patterns

    /// Create an InvalidInput error.
    pub fn invalid_input(details: impl Into<String>) -> Self {
        ContourError::InvalidInput {
            details: details.into(),
        }
    }

    /// Create an InvalidParams error.
    pub fn invalid_params(details: impl Into<String>) -> Self {
        ContourError::InvalidParams {
            details: details.into(),
        }
    }

    /// Create a MissingArray error.
    pub fn missing_array(array: impl Into<String>, block_id: usize) -> Self {
        ContourError::MissingArray {
            array: array.into(),
            block_id,
        }
    }

    /// Create a Communication error.
    pub fn communication(rank: usize, details: impl Into<String>) -> Self {
        ContourError::Communication {
            rank,
            details: details.into(),
        }
    }
}

/// Non-fatal issues collected during a pass.
///
/// A warning only affects the completeness of the local output: the block
/// involved contributes no geometry, everything else is unaffected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContourWarning {
    /// The voxel type of an array is not a supported numeric type.
    UnsupportedScalarType {
        block_id: usize,
        array: String,
        type_name: String,
    },
}

impl ContourWarning {
    /// Returns a warning code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            ContourWarning::UnsupportedScalarType { .. } => "AMR-W001",
        }
    }
}

impl std::fmt::Display for ContourWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContourWarning::UnsupportedScalarType {
                block_id,
                array,
                type_name,
            } => write!(
                f,
                "block {} array '{}' has unsupported voxel type {}; block skipped",
                block_id, array, type_name
            ),
        }
    }
}
