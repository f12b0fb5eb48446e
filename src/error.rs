use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the storage backends, the offer file manager and the analyzer.
///
/// Every variant carries enough context (file name, operation, path) for the
/// user to fix the problem by hand. Nothing here is retried automatically.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read analyses from {}: {reason}", path.display())]
    StorageRead { path: PathBuf, reason: String },

    #[error("failed to save analysis '{file_name}' to {}: {reason}", path.display())]
    StorageWrite {
        path: PathBuf,
        file_name: String,
        reason: String,
    },

    #[error("no analysis recorded for '{0}'")]
    RecordNotFound(String),

    #[error("analysis '{0}' already has a cover letter")]
    CoverLetterExists(String),

    #[error("migration verification failed for '{file_name}': field '{field}' differs")]
    MigrationVerification { file_name: String, field: String },

    #[error("cannot {operation} '{file_name}': '{target}' already exists in {}", dir.display())]
    FileConflict {
        file_name: String,
        target: String,
        operation: &'static str,
        dir: PathBuf,
    },

    #[error("cannot rename '{file_name}': {component} '{value}' is not usable in a file name")]
    InvalidNameComponent {
        file_name: String,
        component: &'static str,
        value: String,
    },

    #[error("cannot {operation} '{file_name}': offer is {state}")]
    InvalidTransition {
        file_name: String,
        operation: &'static str,
        state: String,
    },

    #[error("failed to {operation} '{file_name}': {source}")]
    OfferFile {
        file_name: String,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse analysis response: {0}")]
    AnalysisParse(String),

    #[error("LLM request failed: {0}")]
    Provider(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn offer_io(file_name: &str, operation: &'static str, source: std::io::Error) -> Self {
        Error::OfferFile {
            file_name: file_name.to_string(),
            operation,
            source,
        }
    }
}
