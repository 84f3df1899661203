//! Text generation backend used by the translator.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::ConfigError;

/// A generative text model: one prompt in, one completion out.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Azure OpenAI chat-completions deployment.
pub struct AzureChatModel {
    http: reqwest::Client,
    endpoint: String,
    deployment: String,
    model: String,
    api_version: String,
    api_key: Option<String>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl AzureChatModel {
    pub fn new(config: &LlmConfig, http: reqwest::Client) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.trim().trim_end_matches('/').to_string(),
            deployment: config.deployment.trim().to_string(),
            model: config.model.trim().to_string(),
            api_version: config.api_version.clone(),
            api_key: config.resolve_api_key(),
            temperature: config.temperature,
        })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.endpoint, self.deployment
        )
    }
}

#[async_trait]
impl TextModel for AzureChatModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            model: (!self.model.is_empty()).then_some(self.model.as_str()),
        };

        let mut req = self
            .http
            .post(self.completions_url())
            .query(&[("api-version", self.api_version.as_str())])
            .json(&body);
        if let Some(ref key) = self.api_key {
            req = req.header("api-key", key);
        }

        let resp = req
            .send()
            .await
            .context("Failed to connect to model endpoint")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Model error ({}): {}", status, text);
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .context("Failed to parse model response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("No content in model response")
    }
}
