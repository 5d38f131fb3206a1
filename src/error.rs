use crate::generation::GenerationError;

/// Every failure an editing operation can report. None of them is fatal;
/// the session is left as it was before the failing call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EditorError {
    #[error("{0}")]
    Validation(String),
    #[error("Could not read image: {0}")]
    Decode(String),
    #[error("Could not encode image: {0}")]
    Encode(String),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("A generation is already running")]
    Busy,
    #[error("Load a photo first")]
    NoImage,
}

impl EditorError {
    /// Short text suitable for the status line.
    pub fn user_message(&self) -> String {
        match self {
            EditorError::Generation(e) => e.user_message().to_string(),
            other => other.to_string(),
        }
    }
}
