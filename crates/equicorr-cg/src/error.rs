//! Error taxonomy for the correlation core.

use equicorr_core::CoreError;
use thiserror::Error;

/// Error type for Clebsch-Gordan correlation operations.
///
/// Every variant is terminal for the current call: the core never returns
/// partial results, since a partially combined tensor would carry
/// misleading provenance metadata.
#[derive(Debug, Error)]
pub enum CgError {
    /// Invalid or mutually inconsistent configuration, or a runtime
    /// angular ceiling violation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Input tensor key or component names do not match a recognized
    /// schema.
    #[error("schema error: {0}")]
    Schema(String),

    /// Mismatched sample sets between two blocks being combined.
    #[error("shape error: {0}")]
    Shape(String),

    /// The operation is explicitly unimplemented for this input
    /// (gradient-bearing tensors).
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<CoreError> for CgError {
    fn from(error: CoreError) -> CgError {
        match error {
            CoreError::ShapeMismatch { .. } | CoreError::MetadataMismatch { .. } => {
                CgError::Shape(error.to_string())
            }
            CoreError::MissingDimension { .. } => CgError::Schema(error.to_string()),
            _ => CgError::Configuration(error.to_string()),
        }
    }
}

/// Result type for correlation operations.
pub type Result<T> = std::result::Result<T, CgError>;
