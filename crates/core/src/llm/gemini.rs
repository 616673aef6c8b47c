use crate::config::Settings;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{Attachment, GenerateInput, LlmClient, ModelInfo, Provider};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const API_VERSION: &str = "v1beta";
// Search-grounded generations routinely take more than a minute.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const LIST_PAGE_SIZE: u32 = 1000;
const GENERATE_CONTENT_METHOD: &str = "generateContent";

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_gemini_api_key()?.to_string();
        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let timeout_secs = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
        })
    }

    fn headers(&self) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", HeaderValue::from_str(&self.api_key)?);
        Ok(headers)
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{API_VERSION}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        stage: &'static str,
    ) -> anyhow::Result<T> {
        let res = req
            .headers(self.headers()?)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Gemini response body")?;
        if !status.is_success() {
            return Err(LlmDiagnosticsError {
                provider: Provider::Gemini,
                stage,
                detail: format!("status={status}"),
                raw_output: Some(text),
            }
            .into());
        }

        serde_json::from_str::<T>(&text)
            .with_context(|| format!("failed to decode Gemini {stage} response: {text}"))
    }

    async fn generate_content(
        &self,
        model: &str,
        req: &GenerateContentRequest,
    ) -> anyhow::Result<GenerateContentResponse> {
        let url = self.url(&format!(
            "models/{}:{GENERATE_CONTENT_METHOD}",
            normalize_model_id(model)
        ));
        self.send_json(self.http.post(url).json(req), "generate_content")
            .await
    }

    fn build_request(input: &GenerateInput) -> GenerateContentRequest {
        let mut parts = vec![Part::text(&input.prompt)];
        parts.extend(input.attachments.iter().map(Part::inline));

        // Google rejects a JSON response MIME type together with search grounding, so strict
        // JSON decoding is only requested when search is off.
        let (tools, generation_config) = if input.web_search {
            (
                Some(vec![Tool {
                    google_search: EmptyObject {},
                }]),
                None,
            )
        } else {
            (
                None,
                Some(GenerationConfig {
                    response_mime_type: "application/json",
                }),
            )
        };

        GenerateContentRequest {
            system_instruction: input.system.as_deref().map(|s| SystemInstruction {
                parts: vec![Part::text(s)],
            }),
            contents: vec![Content {
                role: "user",
                parts,
            }],
            tools,
            generation_config,
        }
    }

    fn response_text(res: &GenerateContentResponse) -> anyhow::Result<String> {
        if let Some(reason) = res
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(LlmDiagnosticsError {
                provider: Provider::Gemini,
                stage: "blocked",
                detail: format!("prompt blocked: {reason}"),
                raw_output: None,
            }
            .into());
        }

        let Some(candidate) = res.candidates.first() else {
            return Ok(String::new());
        };

        let mut out = String::new();
        let parts = candidate.content.as_ref().map(|c| c.parts.as_slice());
        for part in parts.unwrap_or_default() {
            if part.thought {
                continue;
            }
            if let Some(text) = part.text.as_deref() {
                out.push_str(text);
            }
        }

        if out.is_empty() {
            tracing::warn!(
                finish_reason = candidate.finish_reason.as_deref().unwrap_or("unknown"),
                "Gemini candidate carried no text"
            );
        }
        Ok(out)
    }

    fn generation_models(models: Vec<RawModel>) -> Vec<ModelInfo> {
        models
            .into_iter()
            .filter(|m| {
                m.supported_generation_methods
                    .iter()
                    .any(|method| method == GENERATE_CONTENT_METHOD)
            })
            .map(|m| ModelInfo {
                name: m.name,
                display_name: m.display_name,
                version: m.version,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl LlmClient for GeminiClient {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn generate_text(&self, input: GenerateInput) -> anyhow::Result<String> {
        let req = Self::build_request(&input);
        tracing::debug!(
            model = %input.model,
            web_search = input.web_search,
            attachments = input.attachments.len(),
            "Gemini generateContent"
        );
        let res = self.generate_content(&input.model, &req).await?;
        Self::response_text(&res)
    }

    async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("pageSize", LIST_PAGE_SIZE.to_string())];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }
            let page: ListModelsResponse = self
                .send_json(self.http.get(self.url("models")).query(&query), "list_models")
                .await?;

            out.extend(Self::generation_models(page.models));
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(out)
    }
}

/// Accepts both `gemini-2.5-flash` and the listing form `models/gemini-2.5-flash`.
fn normalize_model_id(model: &str) -> &str {
    model.trim().trim_start_matches("models/")
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl Part {
    fn text(s: &str) -> Self {
        Self::Text {
            text: s.to_string(),
        }
    }

    fn inline(attachment: &Attachment) -> Self {
        Self::Inline {
            inline_data: InlineData {
                mime_type: attachment.mime_type.clone(),
                data: attachment.data_base64.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    #[serde(rename = "googleSearch")]
    google_search: EmptyObject,
}

#[derive(Debug, Clone, Serialize)]
struct EmptyObject {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<RawModel>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawModel {
    name: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}
