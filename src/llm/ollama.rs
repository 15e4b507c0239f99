use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::{ContentBlock, InvokeRequest, LlmClient, LlmError, LlmResponse};
use crate::models::Metering;

/// Ollama HTTP client for local multimodal inference via `/api/chat`.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    /// Create a new OllamaClient pointing at an Ollama instance.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LlmError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    /// Default Ollama instance at localhost:11434 with 5-minute timeout.
    pub fn default_local() -> Result<Self, LlmError> {
        Self::new("http://localhost:11434", 300)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Request body for Ollama `/api/chat`.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
    /// Base64-encoded images (only for user messages).
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f64,
    top_k: u32,
    top_p: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Response body from Ollama `/api/chat` (non-streaming).
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Flatten content blocks into one user message.
///
/// Text segments are concatenated in order, images are base64-encoded,
/// cache points are dropped (Ollama keeps its own KV cache per prefix).
fn build_chat_request<'a>(request: &InvokeRequest<'a>) -> ChatRequest<'a> {
    let mut text = String::new();
    let mut images = Vec::new();

    for block in request.content {
        match block {
            ContentBlock::Text(t) => text.push_str(t),
            ContentBlock::Image(img) => {
                images.push(base64::engine::general_purpose::STANDARD.encode(&img.bytes[..]))
            }
            ContentBlock::CachePoint => {}
        }
    }

    let mut messages = Vec::with_capacity(2);
    if !request.system_prompt.trim().is_empty() {
        messages.push(ChatMessage {
            role: "system",
            content: request.system_prompt.to_string(),
            images: None,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: text,
        images: (!images.is_empty()).then_some(images),
    });

    ChatRequest {
        model: request.model_id,
        messages,
        stream: false,
        options: ChatOptions {
            temperature: request.params.temperature,
            top_k: request.params.top_k.max(0.0) as u32,
            top_p: request.params.top_p,
            num_predict: request.params.max_tokens,
        },
    }
}

fn metering_for(context: &str, model: &str, response: &ChatResponse) -> Metering {
    let input = response.prompt_eval_count.unwrap_or(0);
    let output = response.eval_count.unwrap_or(0);
    let api = format!("{context}/ollama/{model}");

    let mut metering = Metering::new();
    metering.record(&api, "inputTokens", input);
    metering.record(&api, "outputTokens", output);
    metering.record(&api, "totalTokens", input + output);
    metering
}

impl LlmClient for OllamaClient {
    fn invoke(&self, request: &InvokeRequest<'_>) -> Result<LlmResponse, LlmError> {
        if request.model_id.trim().is_empty() {
            return Err(LlmError::InvalidRequest("model_id is empty".into()));
        }

        let _span = tracing::info_span!(
            "ollama_chat",
            model = %request.model_id,
            context = %request.context,
        )
        .entered();

        let url = format!("{}/api/chat", self.base_url);
        let body = build_chat_request(request);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    LlmError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    LlmError::HttpClient(format!(
                        "Request timed out after {}s",
                        self.timeout_secs
                    ))
                } else {
                    LlmError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;

        let metering = metering_for(request.context, request.model_id, &parsed);
        tracing::debug!(
            input_tokens = parsed.prompt_eval_count.unwrap_or(0),
            output_tokens = parsed.eval_count.unwrap_or(0),
            "Ollama chat completed"
        );

        Ok(LlmResponse {
            text: parsed.message.content,
            metering,
        })
    }
}
