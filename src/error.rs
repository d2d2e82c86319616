use thiserror::Error;

/// Errors raised while setting up or driving the QP / MPC pipeline.
///
/// Running out of iterations is not an error: it is reported through
/// [`SolveStatus`](crate::SolveStatus) and the residuals.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MpcError {
    #[error("dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{what} must be square, got {rows}x{cols}")]
    NotSquare {
        what: &'static str,
        rows: usize,
        cols: usize,
    },

    #[error("{what} must be symmetric")]
    NotSymmetric { what: &'static str },

    #[error("{what} contains non-finite entries")]
    NonFinite { what: &'static str },

    #[error("invalid bounds for {what} at index {index}: lower bound exceeds upper bound")]
    InvalidBounds { what: &'static str, index: usize },

    #[error("invalid value for {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("horizon must be at least 1, got {0}")]
    InvalidHorizon(usize),

    #[error("factorization of the {dim}x{dim} ADMM system matrix failed (not positive definite)")]
    Factorization { dim: usize },
}

pub type Result<T> = std::result::Result<T, MpcError>;
