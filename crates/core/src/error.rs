//! Error types for the nesting engine.

use thiserror::Error;

/// Result type alias for nesting operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preparing, evaluating or persisting a nest.
#[derive(Debug, Error)]
pub enum Error {
    /// A part or sheet outline cannot be nested (too few points, zero area,
    /// non-finite coordinates).
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A configuration value is out of range.
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    /// The boolean/Minkowski engine failed on a single computation.
    ///
    /// Recoverable: callers treat the affected part as not placeable.
    #[error("Geometry engine failure: {0}")]
    GeometryEngine(String),

    /// The accelerated Minkowski backend is unavailable or failed.
    #[error("Native Minkowski backend failure: {0}")]
    NativeInterop(String),

    /// An internal consistency check failed.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The population engine could no longer produce unique offspring.
    #[error("Population converged: {0}")]
    DegenerateConvergence(String),

    /// The run was stopped before the operation completed.
    #[error("Computation cancelled")]
    Cancelled,

    /// Snapshot (de)serialization failed.
    #[cfg(feature = "serde")]
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Snapshot file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true when the failure only affects the current part and the
    /// evaluation may continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::GeometryEngine(_))
    }
}
