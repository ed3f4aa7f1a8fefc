use qw_core::CoreError;

use crate::diagnostics::Diagnostic;

/// Alias for `Result<T, DslError>`.
pub type DslResult<T> = Result<T, DslError>;

/// Errors returned by the convenience entry points of this crate.
#[derive(Debug, thiserror::Error)]
pub enum DslError {
    /// The text did not lex, parse or compile.
    #[error("{}", summarize(.0))]
    Invalid(Vec<Diagnostic>),

    /// The text parsed but does not describe a valid object.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A logic file or directory could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// The path being read.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A serialized logic is not a `{"documents": [...]}` tree.
    #[error("invalid logic data: {0}")]
    Data(#[from] serde_json::Error),
}

impl DslError {
    /// The diagnostics carried by an [`DslError::Invalid`] error.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            DslError::Invalid(diagnostics) => diagnostics,
            _ => &[],
        }
    }
}

fn summarize(diagnostics: &[Diagnostic]) -> String {
    match diagnostics {
        [] => "invalid logic document".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
    }
}
