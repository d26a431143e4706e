use thiserror::Error;

use qfit_model::ModelError;
use qfit_numerical::SolverError;

/// Errors raised by the rotameric fitting engine (SPEC_FULL §7). Each
/// variant is fatal: the core never retries, it propagates to the caller.
#[derive(Debug, Error)]
pub enum FitError {
    #[error("residue {residue_id} is missing required sidechain atoms for its rotamer library entry")]
    StructureIncomplete { residue_id: String },

    #[error("no viable conformers survived clash filtering at iteration {iteration}")]
    NoViableConformers { iteration: usize },

    #[error("QP/MIQP solver failed: {source}")]
    SolverFailure {
        #[source]
        source: SolverError,
    },

    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("union footprint mask contains zero voxels")]
    MaskEmpty,

    #[error("structural model error: {0}")]
    Model(#[from] ModelError),
}

impl From<SolverError> for FitError {
    fn from(source: SolverError) -> Self {
        FitError::SolverFailure { source }
    }
}

impl FitError {
    /// Maps an error to a process exit code (SPEC_FULL §6/§6C): each kind
    /// gets a distinct nonzero code, 0 is reserved for success.
    pub fn exit_code(&self) -> i32 {
        match self {
            FitError::StructureIncomplete { .. } => 1,
            FitError::NoViableConformers { .. } => 2,
            FitError::SolverFailure { .. } => 3,
            FitError::IoFailure(_) => 4,
            FitError::MaskEmpty => 5,
            FitError::Model(_) => 6,
        }
    }
}
