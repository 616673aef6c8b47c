use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use outlook_core::config::Settings;
use outlook_core::llm::gemini::GeminiClient;
use outlook_core::llm::LlmClient;
use outlook_core::pipeline::PipelineOptions;
use outlook_core::storage::reports::PgReportStore;
use outlook_core::storage::ReportStore;

mod routes;

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

    let store: Option<Arc<dyn ReportStore>> = if settings.has_database_config() {
        match connect_store(&settings).await {
            Ok(store) => Some(store),
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %format!("{e:#}"), "db init failed; starting API in degraded mode");
                None
            }
        }
    } else {
        tracing::error!("no database configuration; starting API in degraded mode");
        None
    };

    let llm: Option<Arc<dyn LlmClient>> = match GeminiClient::from_settings(&settings) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::error!(error = %e, "model client unavailable; generation routes will fail");
            None
        }
    };

    let options = PipelineOptions::from_env();
    tracing::info!(
        model = %options.model,
        web_search = options.web_search,
        validation = ?options.validation,
        "pipeline configured"
    );

    let analyze_body_limit = routes::analyze_body_limit_from_env();
    tracing::info!(analyze_body_limit, "request limits configured");

    let app = routes::router(routes::AppState {
        llm,
        store,
        options,
        analyze_body_limit,
    });

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn connect_store(settings: &Settings) -> anyhow::Result<Arc<dyn ReportStore>> {
    let pool = outlook_core::storage::connect(settings).await?;
    outlook_core::storage::migrate(&pool).await?;
    Ok(Arc::new(PgReportStore::new(pool)))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
