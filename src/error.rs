//! Structured error handling and exit codes.

use serde::Serialize;

use crate::pipeline::PipelineError;
use crate::resolver::ResolveError;

/// Exit codes for archive-cp.
///
/// - 0: Success (every selected file is in place)
/// - 1: General error (unexpected failure)
/// - 2: Usage error (bad arguments, as clap reports them)
/// - 3: Partial success (some copies failed)
/// - 4: Conflict (duplicate integrity or immovable occupant; nothing copied)
///
/// A paranoid-mode read failure is an I/O problem, not a conflict, and maps to 1.
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: every selected file was placed or already present.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// Usage error: invalid arguments.
    UsageError = 2,
    /// Partial success: some files could not be placed.
    PartialSuccess = 3,
    /// Conflict: a destination directory could not be resolved safely.
    Conflict = 4,
    /// Interrupted: the run was interrupted by user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "AC000",
            Self::GeneralError => "AC001",
            Self::UsageError => "AC002",
            Self::PartialSuccess => "AC003",
            Self::Conflict => "AC004",
            Self::Interrupted => "AC130",
        }
    }

    /// Pick the exit code for an error returned by [`crate::run_app`].
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        if err.downcast_ref::<UsageError>().is_some() {
            return Self::UsageError;
        }
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::Interrupted) => Self::Interrupted,
            Some(PipelineError::Resolve(ResolveError::Verify { .. })) => Self::GeneralError,
            Some(PipelineError::Resolve(_)) => Self::Conflict,
            _ => Self::GeneralError,
        }
    }
}

/// Invalid invocation detected after argument parsing.
#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct UsageError(pub String);

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "AC004")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
