pub mod lock;
pub mod memory;
pub mod raw_inputs;
pub mod reports;

use crate::config::Settings;
use crate::domain::report::{NewReport, ReportTag, StoredReport};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Unprocessed inbound text (e.g. a forwarded e-mail), archived as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInput {
    pub texto: String,
    pub asunto: Option<String>,
    pub fecha: Option<String>,
}

/// Append-only store of generated reports.
#[async_trait::async_trait]
pub trait ReportStore: Send + Sync {
    /// Inserts a new report; never overwrites. Returns the new report id.
    async fn append(&self, report: NewReport) -> anyhow::Result<Uuid>;

    /// Most recently created report for `tag`.
    async fn latest(&self, tag: ReportTag) -> anyhow::Result<Option<StoredReport>>;

    async fn archive_raw_input(&self, input: RawInput) -> anyhow::Result<Uuid>;
}

pub async fn connect(settings: &Settings) -> anyhow::Result<sqlx::PgPool> {
    let opts = settings.require_pg_connect_options()?;
    let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(DEFAULT_MAX_CONNECTIONS);

    sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect_with(opts)
        .await
        .context("connect to postgres failed")
}

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}
