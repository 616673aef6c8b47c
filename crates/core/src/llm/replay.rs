use crate::llm::{GenerateInput, LlmClient, ModelInfo, Provider};
use tokio::sync::Mutex;

/// Answers every generation with a captured reply. Used to re-ingest a saved model response
/// offline and to drive the pipeline without network access.
#[derive(Debug, Default)]
pub struct ReplayClient {
    reply: String,
    models: Vec<ModelInfo>,
    requests: Mutex<Vec<GenerateInput>>,
}

impl ReplayClient {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            ..Default::default()
        }
    }

    pub fn with_models(mut self, models: Vec<ModelInfo>) -> Self {
        self.models = models;
        self
    }

    /// Inputs received so far, oldest first.
    pub async fn requests(&self) -> Vec<GenerateInput> {
        self.requests.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for ReplayClient {
    fn provider(&self) -> Provider {
        Provider::Replay
    }

    async fn generate_text(&self, input: GenerateInput) -> anyhow::Result<String> {
        self.requests.lock().await.push(input);
        Ok(self.reply.clone())
    }

    async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
        Ok(self.models.clone())
    }
}
