use crate::domain::contract::ValidationIssue;
use crate::domain::report::{NewReport, ParsedReport, ReportTag, StoredReport};
use crate::storage::{raw_inputs, RawInput, ReportStore};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PgReportStore {
    pool: sqlx::PgPool,
}

impl PgReportStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl ReportStore for PgReportStore {
    async fn append(&self, report: NewReport) -> anyhow::Result<Uuid> {
        append_report(&self.pool, &report).await
    }

    async fn latest(&self, tag: ReportTag) -> anyhow::Result<Option<StoredReport>> {
        latest_report(&self.pool, tag).await
    }

    async fn archive_raw_input(&self, input: RawInput) -> anyhow::Result<Uuid> {
        raw_inputs::archive_raw_input(&self.pool, &input).await
    }
}

pub async fn append_report(pool: &sqlx::PgPool, report: &NewReport) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let created_at: DateTime<Utc> = Utc::now();
    let tag = report.kind.tag();
    let issues = serde_json::to_value(&report.validation_issues)
        .context("serialize validation issues failed")?;

    sqlx::query(
        "INSERT INTO analysis_results (id, report_type, created_at, report_date, model_used, document, validation_issues) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(id)
    .bind(tag.as_str())
    .bind(created_at)
    .bind(report.report_date)
    .bind(&report.model_used)
    .bind(report.report.clone().into_value())
    .bind(issues)
    .execute(pool)
    .await
    .context("insert analysis_results failed")?;

    Ok(id)
}

type ReportRow = (Uuid, String, DateTime<Utc>, NaiveDate, String, Value, Value);

pub async fn latest_report(
    pool: &sqlx::PgPool,
    tag: ReportTag,
) -> anyhow::Result<Option<StoredReport>> {
    let row = sqlx::query_as::<_, ReportRow>(
        "SELECT id, report_type, created_at, report_date, model_used, document, validation_issues \
         FROM analysis_results \
         WHERE report_type = $1 \
         ORDER BY created_at DESC, seq DESC \
         LIMIT 1",
    )
    .bind(tag.as_str())
    .fetch_optional(pool)
    .await
    .with_context(|| format!("select latest analysis_results failed (tag={tag})"))?;

    row.map(stored_from_row).transpose()
}

fn stored_from_row(row: ReportRow) -> anyhow::Result<StoredReport> {
    let (id, report_type, created_at, report_date, model_used, document, issues) = row;
    let tag = report_type.parse::<ReportTag>()?;
    let report = ParsedReport::try_from(document)
        .with_context(|| format!("invalid document in analysis_results (id={id})"))?;
    let validation_issues = serde_json::from_value::<Vec<ValidationIssue>>(issues)
        .with_context(|| format!("invalid validation_issues in analysis_results (id={id})"))?;

    Ok(StoredReport {
        id,
        tag,
        created_at,
        report_date,
        model_used,
        report,
        validation_issues,
    })
}
