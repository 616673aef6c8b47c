pub mod error;
pub mod gemini;
pub mod json;
pub mod replay;

use serde::Serialize;
use std::fmt;

/// Binary input sent alongside the prompt (e.g. a PDF research note), already base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub mime_type: String,
    pub data_base64: String,
}

#[derive(Debug, Clone)]
pub struct GenerateInput {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub attachments: Vec<Attachment>,
    /// Let the provider ground the answer with web search.
    pub web_search: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    Replay,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gemini => f.write_str("gemini"),
            Self::Replay => f.write_str("replay"),
        }
    }
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Returns the raw completion text. No shape is guaranteed.
    async fn generate_text(&self, input: GenerateInput) -> anyhow::Result<String>;

    /// Models usable for text generation.
    async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>>;
}
