//! # Core Error Types
//!
//! Errors returned by the asset registry to its immediate caller.

use thiserror::Error;
use weft_shared::AssetKind;

/// Errors that can occur in asset lifetime management.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// No asset registered under this name and no loader supplied.
    #[error("Asset not found: {name}")]
    NotFound {
        /// Registry name that was looked up.
        name: String,
    },

    /// Loaded data disagrees with the type already registered for the name.
    #[error("Type mismatch for asset {name}: registered as {expected}, got {found}")]
    TypeMismatch {
        /// Registry name.
        name: String,
        /// Kind previously registered.
        expected: AssetKind,
        /// Kind the new data carries.
        found: AssetKind,
    },

    /// Asset exists but its backend handle has gone away.
    #[error("Asset {name} has no backend handle")]
    StaleReference {
        /// Registry name.
        name: String,
    },

    /// The asset data provider failed.
    #[error("Asset provider error: {message}")]
    Provider {
        /// Provider message.
        message: String,
    },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
