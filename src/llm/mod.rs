//! LLM transport contract.
//!
//! The assessment engine only needs one operation: send a system prompt plus
//! an ordered sequence of content blocks and get back text and metering.
//! Model selection, retries and token accounting belong to the implementor.

pub mod ollama;

pub use ollama::OllamaClient;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::models::Metering;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM endpoint is not reachable at {0}")]
    Connection(String),

    #[error("LLM endpoint returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

// ═══════════════════════════════════════════
// Request content
// ═══════════════════════════════════════════

/// Image encodings accepted as prompt attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prepared page image. Bytes are shared so prompt content can be
/// cloned per task without copying image data.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub format: ImageFormat,
    pub bytes: Arc<[u8]>,
}

impl ImageAttachment {
    pub fn new(format: ImageFormat, bytes: Vec<u8>) -> Self {
        Self {
            format,
            bytes: Arc::from(bytes),
        }
    }
}

impl fmt::Debug for ImageAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAttachment")
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// One segment of a user message.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text(String),
    Image(ImageAttachment),
    /// End of a cacheable prompt prefix.
    CachePoint,
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// Sampling parameters forwarded to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplingParams {
    pub temperature: f64,
    pub top_k: f64,
    pub top_p: f64,
    pub max_tokens: Option<u32>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            top_k: 5.0,
            top_p: 0.1,
            max_tokens: None,
        }
    }
}

/// A single model invocation.
#[derive(Debug, Clone, Copy)]
pub struct InvokeRequest<'a> {
    pub model_id: &'a str,
    pub system_prompt: &'a str,
    pub content: &'a [ContentBlock],
    pub params: &'a SamplingParams,
    /// Caller tag, used for metering keys and logs.
    pub context: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub text: String,
    pub metering: Metering,
}

/// LLM client abstraction (allows mocking).
///
/// Implementations are shared across worker threads.
pub trait LlmClient: Send + Sync {
    fn invoke(&self, request: &InvokeRequest<'_>) -> Result<LlmResponse, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_trait_is_object_safe() {
        fn _assert_client(_: &dyn LlmClient) {}
    }

    #[test]
    fn image_clone_shares_bytes() {
        let img = ImageAttachment::new(ImageFormat::Png, vec![1, 2, 3]);
        let copy = img.clone();
        assert!(Arc::ptr_eq(&img.bytes, &copy.bytes));
    }

    #[test]
    fn image_debug_omits_payload() {
        let img = ImageAttachment::new(ImageFormat::Jpeg, vec![0; 1024]);
        let dbg = format!("{img:?}");
        assert!(dbg.contains("1024"));
        assert!(!dbg.contains("[0, 0"));
    }

    #[test]
    fn sampling_defaults() {
        let p = SamplingParams::default();
        assert_eq!(p.temperature, 0.0);
        assert_eq!(p.top_k, 5.0);
        assert_eq!(p.top_p, 0.1);
        assert_eq!(p.max_tokens, None);
    }

    #[test]
    fn format_names() {
        assert_eq!(ImageFormat::Webp.to_string(), "webp");
        assert_eq!(serde_json::to_string(&ImageFormat::Png).unwrap(), "\"png\"");
    }
}
