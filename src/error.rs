//! Unified error handling for the heatmap reconciler.
//!
//! Pure reconciliation never fails: malformed records are resolved by the
//! invalid-coordinate rule. Errors only come from the store boundary, document
//! normalization and configuration.

use thiserror::Error;

/// Unified error type for store, normalization and configuration failures.
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    /// Listing detections from the store failed. Aborts the whole run.
    #[error("Failed to read detections: {message}")]
    StoreRead { message: String },

    /// Deleting a single detection failed. Counted per record, never fatal.
    #[error("Failed to delete detection '{id}': {message}")]
    StoreDelete { id: String, message: String },

    /// The detection was already gone. Treated as a successful delete.
    #[error("Detection '{id}' not found")]
    NotFound { id: String },

    /// A raw store document could not be mapped to a detection record.
    #[error("Document '{id}' is not a valid detection: {message}")]
    InvalidDocument { id: String, message: String },

    /// Persistence/storage error
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ReconcileError {
    /// Whether a delete that returned this error already reached the desired
    /// end state (record absent).
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReconcileError::NotFound { .. })
    }
}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for ReconcileError {
    fn from(err: rusqlite::Error) -> Self {
        ReconcileError::Persistence {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ReconcileError {
    fn from(err: serde_json::Error) -> Self {
        ReconcileError::Config {
            message: err.to_string(),
        }
    }
}

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Extension trait for converting Option to ReconcileError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an invalid document error.
    fn ok_or_invalid_document(self, id: &str, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_invalid_document(self, id: &str, message: &str) -> Result<T> {
        self.ok_or_else(|| ReconcileError::InvalidDocument {
            id: id.to_string(),
            message: message.to_string(),
        })
    }
}
