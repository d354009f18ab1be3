//! # Errors
//!
//! Every fallible operation in the crate returns [`VocabularyError`]. The variants follow
//! how the application shell reacts to them:
//!
//! | Variant | Fatal | Typical source |
//! |---------|-------|----------------|
//! | [`Configuration`](VocabularyError::Configuration) | yes | `settings.json` missing or incomplete |
//! | [`LlmRequest`](VocabularyError::LlmRequest) | no | network failure, non-2xx status |
//! | [`LlmResponseFormat`](VocabularyError::LlmResponseFormat) | no | body without usable JSON |
//! | [`InputTooLarge`](VocabularyError::InputTooLarge) | no | text does not fit the context window |
//! | [`Storage`](VocabularyError::Storage) | yes | SQLite connection or query failure |
//! | [`Export`](VocabularyError::Export) | no | spreadsheet could not be written |
//! | [`Busy`](VocabularyError::Busy) / [`EmptyInput`](VocabularyError::EmptyInput) | no | shell gating |
//!
//! Spreadsheet import problems are not errors: they are collected as
//! [`ImportWarning`]s and the offending file is skipped.

use std::{fmt, path::PathBuf};

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, VocabularyError>;

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("LLM request failed{}: {detail}", status_suffix(.status))]
    LlmRequest { status: Option<u16>, detail: String },

    #[error("LLM response was malformed: {0}")]
    LlmResponseFormat(String),

    #[error(
        "input is too large for the configured context window: estimated input tokens {input_tokens}, \
         context limit {context_limit}, safety margin {safety_margin}, available output tokens {available} \
         (min {minimum}). Shorten the input or raise context_limit in settings.json"
    )]
    InputTooLarge {
        input_tokens: usize,
        context_limit: usize,
        safety_margin: usize,
        available: usize,
        minimum: usize,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("export failed: {0}")]
    Export(String),

    #[error("another action is still running ({0})")]
    Busy(String),

    #[error("nothing to process: the input text is empty")]
    EmptyInput,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|code| format!(" ({code})")).unwrap_or_default()
}

impl VocabularyError {
    /// Fatal errors leave the application unable to continue safely.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Storage(_))
    }
}

impl From<diesel::result::Error> for VocabularyError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<diesel::ConnectionError> for VocabularyError {
    fn from(err: diesel::ConnectionError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// A spreadsheet that could not be imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportWarning {
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for ImportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "skipped {}: {}", self.path.display(), self.reason)
    }
}
