use anyhow::Context;
use clap::Parser;
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use outlook_core::config::Settings;
use outlook_core::domain::report::{ReportKind, ReportRequest};
use outlook_core::llm::gemini::GeminiClient;
use outlook_core::llm::replay::ReplayClient;
use outlook_core::llm::LlmClient;
use outlook_core::pipeline::{PipelineOptions, ReportPipeline};
use outlook_core::storage::memory::MemoryReportStore;
use outlook_core::storage::reports::PgReportStore;
use outlook_core::time::report_clock;

#[derive(Debug, Parser)]
#[command(name = "outlook_worker")]
struct Args {
    /// Report to generate: weekly or monthly.
    #[arg(long, default_value = "weekly")]
    kind: String,

    /// Issue date (YYYY-MM-DD) or instant (RFC 3339). Defaults to now.
    #[arg(long)]
    issued_at: Option<String>,

    /// Run against an in-memory store and print the resulting document.
    #[arg(long)]
    dry_run: bool,

    /// Use the contents of FILE as the model reply instead of calling the API.
    #[arg(long, value_name = "FILE")]
    replay: Option<std::path::PathBuf>,

    /// Print the models available for generation and exit.
    #[arg(long)]
    list_models: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(&settings, args).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "report run failed");
        return Err(err);
    }
    Ok(())
}

async fn run(settings: &Settings, args: Args) -> anyhow::Result<()> {
    let llm = build_llm(settings, args.replay.as_deref())?;

    if args.list_models {
        let models = llm.list_models().await?;
        let out = json!({ "count": models.len(), "models": models });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let kind = parse_kind(&args.kind)?;
    let issued_at = report_clock::resolve_issued_at(args.issued_at.as_deref(), chrono::Utc::now())?;
    let request = ReportRequest::new(kind, issued_at);
    let options = PipelineOptions::from_env();
    let tag = kind.tag();

    if args.dry_run {
        let store = Arc::new(MemoryReportStore::new());
        let pipeline = ReportPipeline::new(llm, store, options);
        let outcome = pipeline.run(&request).await?;
        tracing::info!(
            %kind,
            dry_run = true,
            issues = outcome.validation_issues.len(),
            "report generated"
        );

        let stored = pipeline.latest(tag).await?;
        println!("{}", serde_json::to_string_pretty(&stored.document())?);
        return Ok(());
    }

    let pool = outlook_core::storage::connect(settings).await?;
    outlook_core::storage::migrate(&pool).await?;

    let Some(lock) = outlook_core::storage::lock::try_acquire_tag_lock(&pool, tag).await? else {
        tracing::warn!(%tag, "tag lock not acquired; another run in progress");
        return Ok(());
    };

    let store = Arc::new(PgReportStore::new(pool.clone()));
    let pipeline = ReportPipeline::new(llm, store, options);
    let result = pipeline.run(&request).await;

    if let Err(e) = lock.release().await {
        tracing::warn!(%tag, error = %e, "failed to release tag lock");
    }

    let outcome = result?;
    tracing::info!(
        %kind,
        %tag,
        report_id = %outcome.report_id,
        model = %outcome.model_used,
        issues = outcome.validation_issues.len(),
        "persisted market report"
    );
    Ok(())
}

fn build_llm(
    settings: &Settings,
    replay: Option<&std::path::Path>,
) -> anyhow::Result<Arc<dyn LlmClient>> {
    match replay {
        Some(path) => {
            let reply = std::fs::read_to_string(path)
                .with_context(|| format!("read replay file failed ({})", path.display()))?;
            Ok(Arc::new(ReplayClient::new(reply)))
        }
        None => Ok(Arc::new(GeminiClient::from_settings(settings)?)),
    }
}

// Unlike the HTTP `type` parameter, the CLI rejects unknown kinds instead of defaulting.
fn parse_kind(s: &str) -> anyhow::Result<ReportKind> {
    match s.trim().to_ascii_lowercase().as_str() {
        "weekly" => Ok(ReportKind::Weekly),
        "monthly" => Ok(ReportKind::Monthly),
        other => anyhow::bail!("unknown report kind: {other} (expected weekly|monthly)"),
    }
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
