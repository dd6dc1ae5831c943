use std::sync::RwLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::store::rest::sanitize_base_url;

/// Opaque text generation backend.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, model: &str, prompt: &str, json_mode: bool) -> Result<String>;

    /// Replaces the credential used for subsequent requests.
    fn set_credential(&self, credential: String);
}

pub struct LlmClient {
    api_url: String,
    api_key: RwLock<String>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

impl LlmClient {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            api_url: sanitize_base_url(api_url.into())?,
            api_key: RwLock::new(api_key.into()),
            client,
        })
    }

    fn api_key(&self) -> String {
        match self.api_key.read() {
            Ok(key) => key.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl GenerationService for LlmClient {
    /// Generate a completion using the OpenAI chat completions format
    async fn generate(&self, model: &str, prompt: &str, json_mode: bool) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_url);

        let request = ChatCompletionRequest {
            model,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: Some(0.9),
            response_format: json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let mut req = self.client.post(&url).json(&request);

        // Local models run without a key
        let api_key = self.api_key();
        if !api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req
            .send()
            .await
            .with_context(|| format!("failed to send generation request to {model}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read body".to_string());
            return Err(ServiceError::Status {
                service: "llm",
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("failed to parse generation response")?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ServiceError::EmptyResponse { service: "llm" }.into())
    }

    fn set_credential(&self, credential: String) {
        match self.api_key.write() {
            Ok(mut key) => *key = credential,
            Err(poisoned) => *poisoned.into_inner() = credential,
        }
    }
}
