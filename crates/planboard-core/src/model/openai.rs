//! OpenAI Responses API client.
//!
//! Sends one `POST {base_url}/responses` per call and returns the
//! concatenated `output_text` of the reply. No retries happen here.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use super::{GenerateOptions, ModelClient, ModelError};
use crate::config::ModelConfig;

pub struct OpenAiClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenAiClient {
    pub fn new(
        model: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            http: Client::new(),
        }
    }

    /// Build a client from config, reading the API key from the environment
    /// variable the config names.
    pub fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ModelError::MissingApiKey(config.api_key_env.clone()))?;
        Ok(Self::new(&config.model, api_key, &config.base_url))
    }

    fn endpoint(&self) -> String {
        format!("{}/responses", self.base_url)
    }
}

/// Request body for the Responses API.
pub(crate) fn build_request_body(
    model: &str,
    system: &str,
    user: &str,
    options: &GenerateOptions,
) -> Value {
    json!({
        "model": model,
        "instructions": system,
        "input": user,
        "reasoning": { "effort": options.effort.to_string() },
    })
}

/// Pull the generated text out of a Responses API reply.
///
/// Prefers the top-level `output_text` convenience field; otherwise joins
/// every `output_text` content part of every `message` output item.
pub(crate) fn extract_output_text(body: &Value) -> Result<String, ModelError> {
    if let Some(text) = body.get("output_text").and_then(Value::as_str) {
        return non_empty(text.to_owned());
    }

    let output = body
        .get("output")
        .and_then(Value::as_array)
        .ok_or_else(|| ModelError::InvalidResponse("missing `output` array".into()))?;

    let text: String = output
        .iter()
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("output_text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    non_empty(text)
}

fn non_empty(text: String) -> Result<String, ModelError> {
    if text.trim().is_empty() {
        Err(ModelError::EmptyResponse)
    } else {
        Ok(text)
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        system: &str,
        user: &str,
        options: &GenerateOptions,
    ) -> Result<String, ModelError> {
        let body = build_request_body(&self.model, system, user, options);
        debug!(model = %self.model, effort = %options.effort, "sending responses request");

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let reply: Value = response.json().await?;
        let text = extract_output_text(&reply)?;
        debug!(chars = text.len(), "received model output");
        Ok(text)
    }
}
