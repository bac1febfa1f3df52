//! # Simulation Error Types
//!
//! Errors returned to the immediate caller. Soft-degradation conditions
//! (unmatched bones, missing LOD) are logged instead, and programmer errors
//! (overlapping steps, double release) panic.

use thiserror::Error;
use weft_core::CoreError;
use weft_shared::AssetKind;

/// Errors that can occur in the scene, actor and clothing layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimulationError {
    /// The asset or scene cannot host a new actor right now.
    #[error("not ready: {reason}")]
    NotReady {
        /// What is missing.
        reason: String,
    },

    /// The asset is not of the kind the caller asked for.
    #[error("type mismatch on {name}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Asset name.
        name: String,
        /// Kind requested.
        expected: AssetKind,
        /// Kind the asset has.
        found: AssetKind,
    },

    /// The simulation backend reported a failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// Operation against an actor whose asset has gone away.
    #[error("stale reference: {0}")]
    StaleReference(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Asset store error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for simulation operations.
pub type SimulationResult<T> = Result<T, SimulationError>;
