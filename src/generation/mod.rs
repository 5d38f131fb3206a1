//! Seam to the external image generation service.

mod command;
mod prompt;
mod retry;

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;

pub use command::{classify_failure, CommandProvider, CommandProviderConfig};
pub use prompt::{build_prompt, ArtStyle, Quality};
pub use retry::{generate_with_retry, Delay, RetryPolicy, ThreadDelay};

/// Encoded image bytes and their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Arc<[u8]>,
    pub mime: String,
}

impl EncodedImage {
    pub fn new(bytes: impl Into<Arc<[u8]>>, mime: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime: mime.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Absent for providers that only take text.
    pub image: Option<EncodedImage>,
    pub style: ArtStyle,
    pub quality: Quality,
    pub instructions: String,
    pub references: Vec<EncodedImage>,
}

impl GenerationRequest {
    pub fn prompt(&self) -> String {
        build_prompt(
            self.style,
            self.quality,
            &self.instructions,
            !self.references.is_empty(),
        )
    }
}

/// What a provider promises about its output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub accepts_input_image: bool,
    /// The result keeps the framing of the input image, so it can be pasted
    /// back into the region it was cropped from.
    pub preserves_framing: bool,
}

impl Capabilities {
    pub fn can_composite(&self) -> bool {
        self.accepts_input_image && self.preserves_framing
    }
}

pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &str;
    fn capabilities(&self) -> Capabilities;
    /// Encoded result image on success.
    fn generate(&self, request: GenerationRequest) -> BoxFuture<'static, Result<Vec<u8>, GenerationError>>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("Provider rejected the credentials")]
    Auth,
    #[error("Provider rate limit reached")]
    RateLimited { retry_after: Option<Duration> },
    #[error("Request blocked by content policy")]
    ContentBlocked,
    #[error("Provider temporarily unavailable")]
    ServiceUnavailable,
    #[error("Provider returned no usable image: {0}")]
    MalformedResponse(String),
}

impl GenerationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenerationError::RateLimited { .. })
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            GenerationError::Auth => "The generation service rejected the API key. Check your configuration.",
            GenerationError::RateLimited { .. } => {
                "Too many requests right now. Please wait a moment and try again."
            }
            GenerationError::ContentBlocked => {
                "The request was blocked by the safety filter. Try a different photo or instructions."
            }
            GenerationError::ServiceUnavailable => {
                "The generation service is overloaded or unreachable. Please try again later."
            }
            GenerationError::MalformedResponse(_) => "The generation service did not return an image.",
        }
    }
}
