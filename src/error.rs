//! Error types for chain execution.
//!
//! Every variant here is fatal: it aborts the invocation and propagates to the
//! host. Recoverable backend failures are not errors at this level — they are
//! converted to [`DispatchOutcome::Failed`](crate::DispatchOutcome::Failed)
//! inside the dispatcher and replaced with a placeholder step output.

use thiserror::Error;

/// The main error type for chain element operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The input frame was absent or carried no usable text.
    ///
    /// Raised before any frame is emitted.
    #[error("input error: {0}")]
    Input(String),

    /// The host settings store held a value the chain cannot interpret.
    #[error("invalid chain settings: {0}")]
    Settings(String),

    /// A frame could not be delivered to the output sink.
    #[error("frame emission failed: {0}")]
    Emit(String),

    /// A JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for chain element operations.
pub type Result<T> = std::result::Result<T, Error>;
