//! Error kinds for the core, per the error handling design.
//!
//! `IndexOutOfRange` and `ShapeMismatch` are programmer-bug classes and are
//! raised as panics (they indicate the caller violated a precondition, not a
//! recoverable runtime condition). The rest are recoverable: callers receive a
//! `Result` or a validity flag and continue with the next candidate. None of
//! these ever escape the core's public functions as an unwinding panic for a
//! recoverable condition.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChipletPartError {
    #[error("index {index} out of range [0, {bound})")]
    IndexOutOfRange { index: usize, bound: usize },

    #[error("shape mismatch: expected dimension {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("move rejected: balance or floorplan-gate infeasible")]
    InfeasibleMove,

    #[error("solver failed to converge: {reason}")]
    SolverFailure { reason: String },

    #[error("floorplan invalid: net violation {violation} exceeds tolerance")]
    FloorplanInvalid { violation: f32 },

    #[error("cost model unavailable: {reason}")]
    CostModelUnavailable { reason: String },
}

pub type Result<T> = std::result::Result<T, ChipletPartError>;
