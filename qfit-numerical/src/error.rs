use thiserror::Error;

/// Errors raised by [`crate::solve_qp`] / [`crate::solve_miqp`].
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("solver called with zero candidate rows")]
    NoCandidates,
    #[error("target vector length ({target_len}) does not match model matrix column count ({model_cols})")]
    DimensionMismatch { target_len: usize, model_cols: usize },
    #[error("QP/MIQP solve did not converge within {iterations} iterations")]
    DidNotConverge { iterations: usize },
}
