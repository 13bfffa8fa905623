use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use syncup_core::config::ModelConfig;
use syncup_core::error::{Result, SyncupError};
use syncup_core::traits::LlmClient;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible chat-completions client. Works with OpenAI, Ollama,
/// vLLM, Groq, OpenRouter and friends via `base_url`.
pub struct OpenAiClient {
    http: Client,
    config: ModelConfig,
}

impl OpenAiClient {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncupError::Provider(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(OPENAI_API_URL)
    }

    fn request_body<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model_id,
            messages: vec![OaiMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.config.max_tokens,
            temperature: if self.config.temperature > 0.0 {
                Some(self.config.temperature)
            } else {
                None
            },
            stream: false,
        }
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OaiMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize)]
struct OaiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn first_content(body: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| SyncupError::Provider(format!("invalid completion body: {}", e)))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| SyncupError::Provider("completion had no content".into()))
}

impl LlmClient for OpenAiClient {
    fn call<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let body = self.request_body(prompt);
            let mut req = self.http.post(self.endpoint()).json(&body);
            if let Some(api_key) = &self.config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            debug!(model = %self.config.model_id, prompt_chars = prompt.len(), "LLM request");
            let response = req.send().await.map_err(|e| {
                let kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connection"
                } else {
                    "request"
                };
                SyncupError::Provider(format!("{} error: {}", kind, e))
            })?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| SyncupError::Provider(e.to_string()))?;
            if !status.is_success() {
                return Err(SyncupError::Provider(format!("HTTP {}: {}", status, text)));
            }
            first_content(&text)
        })
    }
}
