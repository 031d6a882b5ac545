//! Error handling for Sigflow
//!
//! Every fallible operation returns [`Result`]. Errors carry a stable code and,
//! where one exists, a recovery suggestion for the UI layer.

use std::path::PathBuf;

use thiserror::Error;

use crate::signal::SignalId;

/// Result type alias for Sigflow operations
pub type Result<T> = std::result::Result<T, SignalError>;

/// Main error type for Sigflow operations
#[derive(Error, Debug)]
pub enum SignalError {
    // Computation Errors
    #[error("Source data unavailable: {reason}")]
    MissingSourceData { reason: String },

    #[error("Cyclic dependency through signal {signal_id}: {}", format_cycle(.cycle))]
    CyclicDependency {
        signal_id: SignalId,
        cycle: Vec<SignalId>,
    },

    #[error("Computation failed for signal {signal_id}: {reason}")]
    ComputationFailure { signal_id: SignalId, reason: String },

    #[error("Stale write for signal {signal_id}: started at epoch {started_epoch}, now {current_epoch}")]
    StaleWrite {
        signal_id: SignalId,
        started_epoch: u64,
        current_epoch: u64,
    },

    #[error("Non-finite values produced by {stage}")]
    NonFiniteOutput { stage: String },

    #[error("Shape mismatch: {times} timestamps but {values} values")]
    ShapeMismatch { times: usize, values: usize },

    #[error("Source kind mismatch: expected {expected}, got {actual}")]
    SourceKindMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    // Definition Errors
    #[error("Signal not found: {signal_id}")]
    SignalNotFound { signal_id: SignalId },

    #[error("Invalid signal definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("Invalid parameter '{param}': {value} (expected {expected})")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    // Bus Errors
    #[error("Subscriber '{listener_id}' failed: {reason}")]
    SubscriberFailed { listener_id: String, reason: String },

    // Persistence Errors
    #[error("Failed to read file: {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}: {source}")]
    FileWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    JsonSerializationError(#[from] serde_json::Error),

    #[error("Invalid structure version: {version}")]
    InvalidStructureVersion { version: u64 },

    #[error("Migration failed from version {from} to {to}: {reason}")]
    MigrationError { from: u64, to: u64, reason: String },

    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

fn format_cycle(cycle: &[SignalId]) -> String {
    cycle
        .iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl SignalError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            SignalError::MissingSourceData { .. } => "MISSING_SOURCE_DATA",
            SignalError::CyclicDependency { .. } => "CYCLIC_DEPENDENCY",
            SignalError::ComputationFailure { .. } => "COMPUTATION_FAILURE",
            SignalError::StaleWrite { .. } => "STALE_WRITE",
            SignalError::NonFiniteOutput { .. } => "NON_FINITE_OUTPUT",
            SignalError::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            SignalError::SourceKindMismatch { .. } => "SOURCE_KIND_MISMATCH",
            SignalError::SignalNotFound { .. } => "SIGNAL_NOT_FOUND",
            SignalError::InvalidDefinition { .. } => "INVALID_DEFINITION",
            SignalError::InvalidParameter { .. } => "INVALID_PARAMETER",
            SignalError::SubscriberFailed { .. } => "SUBSCRIBER_FAILED",
            SignalError::FileReadError { .. } => "FILE_READ_ERROR",
            SignalError::FileWriteError { .. } => "FILE_WRITE_ERROR",
            SignalError::JsonSerializationError(_) => "SERIALIZATION_ERROR",
            SignalError::InvalidStructureVersion { .. } => "INVALID_STRUCTURE_VERSION",
            SignalError::MigrationError { .. } => "MIGRATION_ERROR",
            SignalError::ChecksumMismatch { .. } => "CHECKSUM_MISMATCH",
        }
    }

    /// Check if this error is recoverable without user intervention.
    ///
    /// Missing data resolves once upstream analysis lands; stale writes are
    /// superseded by the computation that follows the invalidation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SignalError::MissingSourceData { .. } | SignalError::StaleWrite { .. }
        )
    }

    /// Returns a user-friendly recovery suggestion.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            SignalError::MissingSourceData { .. } => {
                Some("Run the required analysis for the source, then recompute.")
            }
            SignalError::CyclicDependency { .. } => {
                Some("Point the derived reference at a signal that does not depend on this one.")
            }
            SignalError::ComputationFailure { .. } => {
                Some("Check the transform and stabilization parameters, then retry.")
            }
            SignalError::SourceKindMismatch { .. } => {
                Some("Pick an analysis function whose output shape matches the source kind.")
            }
            SignalError::ChecksumMismatch { .. } => {
                Some("The definitions file was modified outside the application; restore a backup.")
            }
            _ => None,
        }
    }
}
