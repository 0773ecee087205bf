use thiserror::Error;

pub type Result<T> = std::result::Result<T, SuiteError>;

#[derive(Error, Debug)]
pub enum SuiteError {
    /// Caller input violates a precondition (limits, extension, pattern, selection).
    #[error("{0}")]
    Validation(String),

    /// The PDF library could not decode or build a document.
    #[error("{0}")]
    Parsing(String),

    #[error("Failed to build report: {0}")]
    Report(String),
}

impl SuiteError {
    pub fn validation(message: impl Into<String>) -> Self {
        SuiteError::Validation(message.into())
    }

    pub fn parsing(context: &str, cause: impl std::fmt::Display) -> Self {
        SuiteError::Parsing(format!("{}: {}", context, cause))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, SuiteError::Validation(_))
    }
}
