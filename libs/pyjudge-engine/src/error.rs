use pyjudge_common::StoreError;
use thiserror::Error;

/// Static screening failures. All of them reject the submission outright.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("VALIDATION ERROR: {0}")]
    Syntax(String),

    #[error("VALIDATION ERROR: Import '{module}' is not allowed.")]
    NotAllowedImport { module: String },

    #[error("VALIDATION ERROR line {line}: use of function '{name}' is not allowed.")]
    DisallowedOperation { name: String, line: usize },
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("LOAD ERROR: {0}")]
    Load(String),

    #[error("Function '{name}' not found. Please wrap your solution in a function called '{name}'.")]
    EntryPointNotFound { name: String },

    #[error("failed to start interpreter: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Reasons a submission is turned away before any test runs.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("there is already a process[{running_job_id}] running please wait...")]
    AdmissionDenied { running_job_id: String },

    #[error("INVALID TEST CASE FORMAT: duplicate test case id {0}")]
    DuplicateTestCase(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SubmitError {
    /// Stable error class name, as reported to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            SubmitError::Validation(ValidationError::Syntax(_)) => "SyntaxError",
            SubmitError::Validation(ValidationError::NotAllowedImport { .. }) => "NotAllowedImportError",
            SubmitError::Validation(ValidationError::DisallowedOperation { .. }) => "DisallowedOperationError",
            SubmitError::Extraction(ExtractionError::Load(_)) => "LoadError",
            SubmitError::Extraction(ExtractionError::EntryPointNotFound { .. }) => "EntryPointNotFoundError",
            SubmitError::Extraction(ExtractionError::Spawn(_)) => "InterpreterUnavailable",
            SubmitError::AdmissionDenied { .. } => "AdmissionDeniedError",
            SubmitError::DuplicateTestCase(_) => "InvalidTestCase",
            SubmitError::Store(_) => "StoreError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = ValidationError::NotAllowedImport { module: "os".into() };
        assert_eq!(err.to_string(), "VALIDATION ERROR: Import 'os' is not allowed.");

        let err = ValidationError::DisallowedOperation { name: "eval".into(), line: 3 };
        assert_eq!(
            err.to_string(),
            "VALIDATION ERROR line 3: use of function 'eval' is not allowed."
        );

        let err = SubmitError::AdmissionDenied { running_job_id: "abc".into() };
        assert_eq!(err.to_string(), "there is already a process[abc] running please wait...");
    }

    #[test]
    fn test_kind_passes_through_wrapped_errors() {
        let err: SubmitError = ExtractionError::EntryPointNotFound { name: "solve".into() }.into();
        assert_eq!(err.kind(), "EntryPointNotFoundError");
        assert!(err.to_string().contains("'solve'"));
    }
}
