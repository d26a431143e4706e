use thiserror::Error;

/// Errors raised while parsing or writing the minimal structural model
/// (SPEC_FULL §6A).
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("I/O error while reading or writing a structure: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed ATOM/HETATM line: {line:?}")]
    MalformedLine { line: String },
}
