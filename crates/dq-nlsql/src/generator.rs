//! Text-generation boundary
//!
//! The translator only sees [`TextGenerator`]; any provider that takes a
//! system and user instruction and returns text can sit behind it.

use std::time::Duration;

use async_trait::async_trait;
use dq_core::GeneratorSettings;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

/// One request to the generation service
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_instruction: String,
    pub user_instruction: String,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
    /// Ask for a JSON object instead of free text
    pub structured_output: bool,
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("No API key configured for the generation service")]
    MissingApiKey,

    #[error("Generation request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Generation service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed generation response: {0}")]
    Response(String),
}

/// Something that turns a request into generated text
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Client for OpenAI-compatible chat completion endpoints
pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiGenerator {
    pub fn new(settings: &GeneratorSettings) -> Result<Self, GenerationError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or(GenerationError::MissingApiKey)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
        })
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system_instruction},
                {"role": "user", "content": request.user_instruction}
            ],
            "temperature": request.temperature,
        });

        if let Some(max_tokens) = request.max_output_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if request.structured_output {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("Sending generation request to {} (model {})", url, self.model);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await?;
        message_content(&payload)
    }
}

/// Pull `choices[0].message.content` out of a chat completion payload
fn message_content(payload: &Value) -> Result<String, GenerationError> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(|content| content.trim().to_string())
        .ok_or_else(|| GenerationError::Response("no message content in response".to_string()))
}
