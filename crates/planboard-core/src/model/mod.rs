//! Model collaborator: the language model that drafts plans.
//!
//! The core only ever sees raw text back; nothing about its shape is trusted
//! until it passes the plan validator.

pub mod openai;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use openai::OpenAiClient;

/// Reasoning effort requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effort {
    #[default]
    Low,
    Medium,
    High,
}

impl fmt::Display for Effort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// Per-call options passed to [`ModelClient::generate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    pub effort: Effort,
}

/// Failures of the model collaborator. All of them surface to callers as
/// `UpstreamUnavailable`.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("model returned no text")]
    EmptyResponse,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("API key not set: export {0}")]
    MissingApiKey(String),
}

/// A language model that turns a system and user prompt into raw text.
///
/// Each call is independent. Implementations must not retry internally;
/// the ingestion pipeline owns the retry and timeout policy.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    async fn generate(
        &self,
        system: &str,
        user: &str,
        options: &GenerateOptions,
    ) -> Result<String, ModelError>;
}
