use crate::domain::contract::{validate_report, ValidationIssue, ValidationMode};
use crate::domain::report::{
    NewReport, ParsedReport, ReportKind, ReportRequest, ReportTag, StoredReport,
};
use crate::llm::json::{sanitize, MalformedResponse};
use crate::llm::{Attachment, GenerateInput, LlmClient};
use crate::prompt::{build_inbound_prompt, build_prompt, InboundMaterial, Prompt};
use crate::storage::ReportStore;
use crate::time::report_clock;
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    Configuration(String),

    /// The model call failed; the upstream message is passed through as is.
    #[error("{0:#}")]
    Upstream(anyhow::Error),

    #[error(transparent)]
    MalformedResponse(#[from] MalformedResponse),

    #[error("report failed validation: {}", join_issues(.0))]
    InvalidReport(Vec<ValidationIssue>),

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),

    #[error("no report found for {0}")]
    NotFound(ReportTag),
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub model: String,
    pub web_search: bool,
    pub validation: ValidationMode,
    pub utc_offset_minutes: i32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            web_search: false,
            validation: ValidationMode::Flag,
            utc_offset_minutes: 0,
        }
    }
}

impl PipelineOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("GEMINI_MODEL") {
            if !s.trim().is_empty() {
                out.model = s.trim().to_string();
            }
        }

        if let Ok(s) = std::env::var("GEMINI_WEB_SEARCH") {
            if let Ok(b) = s.trim().parse::<bool>() {
                out.web_search = b;
            }
        }

        if let Ok(s) = std::env::var("REPORT_VALIDATION") {
            match s.parse::<ValidationMode>() {
                Ok(mode) => out.validation = mode,
                Err(err) => tracing::warn!(error = %err, "ignoring REPORT_VALIDATION"),
            }
        }

        if let Ok(s) = std::env::var("REPORT_UTC_OFFSET_MINUTES") {
            if let Ok(n) = s.trim().parse::<i32>() {
                out.utc_offset_minutes = n;
            }
        }

        out
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report_id: Uuid,
    pub kind: ReportKind,
    pub tag: ReportTag,
    pub model_used: String,
    pub report: ParsedReport,
    pub validation_issues: Vec<ValidationIssue>,
}

/// Prompt -> model -> sanitize -> validate -> append, for either report kind.
#[derive(Clone)]
pub struct ReportPipeline {
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn ReportStore>,
    options: PipelineOptions,
}

impl ReportPipeline {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn ReportStore>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            llm,
            store,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub async fn run(&self, request: &ReportRequest) -> Result<RunOutcome, PipelineError> {
        let report_date = self.report_date(request)?;
        let prompt = build_prompt(request.kind, report_date);
        self.execute(request.kind, report_date, prompt, Vec::new()).await
    }

    /// Same flow, grounded on forwarded text and attachments.
    pub async fn run_with_material(
        &self,
        request: &ReportRequest,
        text: Option<String>,
        subject: Option<String>,
        date: Option<String>,
        attachments: Vec<Attachment>,
    ) -> Result<RunOutcome, PipelineError> {
        let report_date = self.report_date(request)?;
        let material = InboundMaterial {
            text,
            subject,
            date,
            attachment_count: attachments.len(),
        };
        let prompt = build_inbound_prompt(request.kind, report_date, &material);
        self.execute(request.kind, report_date, prompt, attachments).await
    }

    pub async fn latest(&self, tag: ReportTag) -> Result<StoredReport, PipelineError> {
        latest_or_not_found(self.store.as_ref(), tag).await
    }

    fn report_date(&self, request: &ReportRequest) -> Result<NaiveDate, PipelineError> {
        report_clock::report_date(request.issued_at, self.options.utc_offset_minutes)
            .map_err(|e| PipelineError::Configuration(format!("{e:#}")))
    }

    async fn execute(
        &self,
        kind: ReportKind,
        report_date: NaiveDate,
        prompt: Prompt,
        attachments: Vec<Attachment>,
    ) -> Result<RunOutcome, PipelineError> {
        let tag = kind.tag();
        let model = self.options.model.clone();

        tracing::info!(
            %kind,
            %tag,
            model = %model,
            provider = %self.llm.provider(),
            web_search = self.options.web_search,
            attachments = attachments.len(),
            "generating market report"
        );

        let raw = self
            .llm
            .generate_text(GenerateInput {
                model: model.clone(),
                system: Some(prompt.system),
                prompt: prompt.user,
                attachments,
                web_search: self.options.web_search,
            })
            .await
            .map_err(PipelineError::Upstream)?;

        let report = sanitize(&raw).map_err(|err| {
            tracing::error!(%kind, error = %err, raw_output = %err.raw_output(), "model output is not usable JSON");
            err
        })?;

        let issues = validate_report(kind, &report);
        if !issues.is_empty() {
            match self.options.validation {
                ValidationMode::Strict => {
                    tracing::error!(%kind, issues = %join_issues(&issues), "report rejected by validation");
                    return Err(PipelineError::InvalidReport(issues));
                }
                ValidationMode::Flag => {
                    tracing::warn!(%kind, issues = %join_issues(&issues), "report stored with validation issues");
                }
            }
        }

        let report_id = self
            .store
            .append(NewReport {
                kind,
                report: report.clone(),
                model_used: model.clone(),
                report_date,
                validation_issues: issues.clone(),
            })
            .await
            .map_err(PipelineError::Storage)?;

        tracing::info!(%kind, %tag, %report_id, "persisted market report");

        Ok(RunOutcome {
            report_id,
            kind,
            tag,
            model_used: model,
            report,
            validation_issues: issues,
        })
    }
}

/// Latest report for `tag`, or `NotFound` when none has been generated yet.
pub async fn latest_or_not_found(
    store: &dyn ReportStore,
    tag: ReportTag,
) -> Result<StoredReport, PipelineError> {
    store
        .latest(tag)
        .await
        .map_err(PipelineError::Storage)?
        .ok_or(PipelineError::NotFound(tag))
}
