use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use outlook_core::domain::report::{ReportKind, ReportRequest};
use outlook_core::llm::{Attachment, LlmClient};
use outlook_core::pdf;
use outlook_core::pipeline::{self, PipelineError, PipelineOptions, ReportPipeline};
use outlook_core::storage::{RawInput, ReportStore};

const DEFAULT_ATTACHMENT_MIME: &str = "application/pdf";

// Base64 attachments inflate by a third; this leaves room for ~18 MB of PDFs per request.
pub const DEFAULT_ANALYZE_BODY_LIMIT: usize = 25 * 1024 * 1024;

/// Body limit for `/api/analizar`, from `ANALYZE_MAX_BODY_BYTES`.
pub fn analyze_body_limit_from_env() -> usize {
    std::env::var("ANALYZE_MAX_BODY_BYTES")
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(DEFAULT_ANALYZE_BODY_LIMIT)
}

/// Shared handles, built once at startup. Either side may be missing (degraded mode); routes
/// that need it then fail with a configuration error instead of the whole API refusing to start.
#[derive(Clone)]
pub struct AppState {
    pub llm: Option<Arc<dyn LlmClient>>,
    pub store: Option<Arc<dyn ReportStore>>,
    pub options: PipelineOptions,
    pub analyze_body_limit: usize,
}

impl AppState {
    fn llm(&self) -> Result<&Arc<dyn LlmClient>, ApiError> {
        self.llm.as_ref().ok_or_else(|| {
            PipelineError::Configuration("GEMINI_API_KEY is required".to_string()).into()
        })
    }

    fn store(&self) -> Result<&Arc<dyn ReportStore>, ApiError> {
        self.store.as_ref().ok_or_else(|| {
            PipelineError::Configuration("database is not configured".to_string()).into()
        })
    }

    fn pipeline(&self) -> Result<ReportPipeline, ApiError> {
        Ok(ReportPipeline::new(
            self.llm()?.clone(),
            self.store()?.clone(),
            self.options.clone(),
        ))
    }
}

pub fn router(state: AppState) -> Router {
    let analyze_body_limit = state.analyze_body_limit;
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/research", get(run_research).post(archive_research_input))
        .route(
            "/api/analizar",
            post(analyze_material).layer(DefaultBodyLimit::max(analyze_body_limit)),
        )
        .route("/api/export-pdf", get(export_pdf))
        .route("/api/check-models", get(check_models))
        .route("/api/reports/latest", get(latest_report))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    PayloadTooLarge(String),
    Pipeline(PipelineError),
    Internal(anyhow::Error),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self::Pipeline(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(rejection.body_text())
        } else {
            Self::BadRequest(rejection.body_text())
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Pipeline(PipelineError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Pipeline(PipelineError::InvalidReport(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Pipeline(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({ "success": false });

        match &self {
            Self::BadRequest(msg) | Self::PayloadTooLarge(msg) => body["error"] = json!(msg),
            Self::Pipeline(err) => {
                body["error"] = json!(err.to_string());
                if let PipelineError::InvalidReport(issues) = err {
                    body["validation_issues"] = json!(issues);
                }
                if status.is_server_error() {
                    sentry::capture_error(err);
                }
            }
            Self::Internal(err) => {
                body["error"] = json!(format!("{err:#}"));
                sentry_anyhow::capture_anyhow(err);
            }
        }

        if status.is_server_error() {
            tracing::error!(%status, error = %body["error"], "request failed");
        } else {
            tracing::warn!(%status, error = %body["error"], "request rejected");
        }

        (status, Json(body)).into_response()
    }
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct KindQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl KindQuery {
    fn kind(&self) -> ReportKind {
        ReportKind::from_param(self.kind.as_deref())
    }
}

async fn run_research(
    State(state): State<AppState>,
    Query(query): Query<KindQuery>,
) -> Result<Json<Value>, ApiError> {
    let pipeline = state.pipeline()?;
    let request = ReportRequest::new(query.kind(), Utc::now());
    let outcome = pipeline.run(&request).await?;

    Ok(Json(json!({
        "success": true,
        "mode": outcome.kind,
        "tag": outcome.tag,
        "report_id": outcome.report_id,
        "message": format!("Informe {} generado y guardado", outcome.tag),
        "validation_issues": outcome.validation_issues,
    })))
}

#[derive(Debug, Deserialize)]
struct RawInputBody {
    texto: Option<String>,
    asunto: Option<String>,
    fecha: Option<String>,
}

async fn archive_research_input(
    State(state): State<AppState>,
    payload: Result<Json<RawInputBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;
    let texto = body
        .texto
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("texto is required".to_string()))?;

    let id = state
        .store()?
        .archive_raw_input(RawInput {
            texto,
            asunto: body.asunto,
            fecha: body.fecha,
        })
        .await
        .map_err(PipelineError::Storage)?;

    tracing::info!(%id, "archived raw input");

    Ok(Json(json!({
        "success": true,
        "message": "Texto recibido y archivado",
        "id": id,
    })))
}

#[derive(Debug, Deserialize)]
struct AttachmentBody {
    data: String,
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeBody {
    #[serde(alias = "textoCorreo")]
    text: Option<String>,
    asunto: Option<String>,
    fecha: Option<String>,
    #[serde(default, rename = "archivosAdjuntos")]
    attachments: Vec<AttachmentBody>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

async fn analyze_material(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;

    let text = body.text.filter(|t| !t.trim().is_empty());
    let attachments: Vec<Attachment> = body
        .attachments
        .into_iter()
        .filter(|a| !a.data.trim().is_empty())
        .map(|a| Attachment {
            mime_type: a
                .mime_type
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ATTACHMENT_MIME.to_string()),
            data_base64: a.data,
        })
        .collect();
    if text.is_none() && attachments.is_empty() {
        return Err(ApiError::BadRequest(
            "text or archivosAdjuntos is required".to_string(),
        ));
    }

    let pipeline = state.pipeline()?;
    let request = ReportRequest::new(ReportKind::from_param(body.kind.as_deref()), Utc::now());
    let outcome = pipeline
        .run_with_material(&request, text, body.asunto, body.fecha, attachments)
        .await?;

    Ok(Json(json!({
        "success": true,
        "mode": outcome.tag,
        "report_id": outcome.report_id,
        "data": outcome.report,
    })))
}

async fn export_pdf(
    State(state): State<AppState>,
    Query(query): Query<KindQuery>,
) -> Result<Response, ApiError> {
    let kind = query.kind();
    let report = pipeline::latest_or_not_found(state.store()?.as_ref(), kind.tag()).await?;
    let today = Utc::now().date_naive();

    let bytes = tokio::task::spawn_blocking(move || pdf::render_report(&report, today))
        .await
        .map_err(|e| ApiError::Internal(anyhow::Error::new(e).context("pdf render task failed")))?
        .map_err(ApiError::Internal)?;

    let disposition = format!("attachment; filename=\"{}\"", pdf::export_filename(kind, today));
    Ok((
        [
            (header::CONTENT_TYPE, pdf::CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

async fn check_models(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let models = state
        .llm()?
        .list_models()
        .await
        .map_err(PipelineError::Upstream)?;

    Ok(Json(json!({
        "count": models.len(),
        "models": models,
    })))
}

async fn latest_report(
    State(state): State<AppState>,
    Query(query): Query<KindQuery>,
) -> Result<Json<Value>, ApiError> {
    let report = pipeline::latest_or_not_found(state.store()?.as_ref(), query.kind().tag()).await?;
    Ok(Json(report.document()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use outlook_core::domain::contract::ValidationMode;
    use outlook_core::llm::replay::ReplayClient;
    use outlook_core::llm::ModelInfo;
    use outlook_core::storage::memory::MemoryReportStore;
    use tower::ServiceExt;

    const WEEKLY_REPLY: &str =
        "```json\n{\"executive_summary\":\"x\",\"marketSentiment\":\"Bullish\"}\n```";

    fn state(llm: Option<Arc<ReplayClient>>, store: Option<Arc<MemoryReportStore>>) -> AppState {
        AppState {
            llm: llm.map(|c| c as Arc<dyn LlmClient>),
            store: store.map(|s| s as Arc<dyn ReportStore>),
            options: PipelineOptions::default(),
            analyze_body_limit: DEFAULT_ANALYZE_BODY_LIMIT,
        }
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Vec<u8>, axum::http::HeaderMap) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec(), headers)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn json_body(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let (status, body, _) = send(router(state(None, None)), get("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn export_without_reports_is_404_json() {
        let store = Arc::new(MemoryReportStore::new());
        let (status, body, headers) = send(
            router(state(None, Some(store))),
            get("/api/export-pdf?type=weekly"),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        let body = json_body(&body);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "no report found for WEEKLY_MACRO");
    }

    #[tokio::test]
    async fn research_run_is_readable_as_latest() {
        let llm = Arc::new(ReplayClient::new(WEEKLY_REPLY));
        let store = Arc::new(MemoryReportStore::new());
        let app = router(state(Some(llm), Some(store.clone())));

        let (status, body, _) = send(app.clone(), get("/api/research?type=weekly")).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(&body);
        assert_eq!(body["success"], true);
        assert_eq!(body["mode"], "weekly");
        assert_eq!(body["tag"], "WEEKLY_MACRO");

        let (status, body, _) = send(app, get("/api/reports/latest")).await;
        assert_eq!(status, StatusCode::OK);
        let doc = json_body(&body);
        assert_eq!(doc["type"], "WEEKLY_MACRO");
        assert_eq!(doc["executive_summary"], "x");
        assert_eq!(doc["marketSentiment"], "Bullish");
        assert!(doc["createdAt"].is_string());
        assert_eq!(store.reports().await.len(), 1);
    }

    #[tokio::test]
    async fn research_without_api_key_is_configuration_error() {
        let store = Arc::new(MemoryReportStore::new());
        let (status, body, _) = send(router(state(None, Some(store))), get("/api/research")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(&body)["error"], "GEMINI_API_KEY is required");
    }

    #[tokio::test]
    async fn research_with_prose_reply_is_500() {
        let llm = Arc::new(ReplayClient::new("Lo siento, no hay datos."));
        let store = Arc::new(MemoryReportStore::new());
        let (status, body, _) = send(
            router(state(Some(llm), Some(store.clone()))),
            get("/api/research?type=monthly"),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(&body);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "no JSON object found in model output");
        assert!(store.reports().await.is_empty());
    }

    #[tokio::test]
    async fn strict_validation_rejects_with_422() {
        let llm = Arc::new(ReplayClient::new("{\"executive_summary\":\"x\"}"));
        let store = Arc::new(MemoryReportStore::new());
        let mut app_state = state(Some(llm), Some(store));
        app_state.options.validation = ValidationMode::Strict;

        let (status, body, _) = send(router(app_state), get("/api/research?type=monthly")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(&body);
        assert!(body["validation_issues"].as_array().is_some_and(|a| !a.is_empty()));
    }

    #[tokio::test]
    async fn raw_input_is_archived() {
        let store = Arc::new(MemoryReportStore::new());
        let app = router(state(None, Some(store.clone())));

        let (status, body, _) = send(
            app.clone(),
            post_json(
                "/api/research",
                json!({"texto": "Nota de mercado", "asunto": "FW: nota", "fecha": "2026-03-06"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["success"], true);

        let archived = store.raw_inputs().await;
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].1.texto, "Nota de mercado");
        assert_eq!(archived[0].1.asunto.as_deref(), Some("FW: nota"));

        let (status, _, _) = send(app, post_json("/api/research", json!({"asunto": "vacío"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn analyze_passes_attachments_and_returns_data() {
        let llm = Arc::new(ReplayClient::new("{\"executive_summary\":\"desde adjunto\"}"));
        let store = Arc::new(MemoryReportStore::new());
        let app = router(state(Some(llm.clone()), Some(store)));

        let (status, body, _) = send(
            app,
            post_json(
                "/api/analizar",
                json!({
                    "textoCorreo": "Adjunto informe",
                    "archivosAdjuntos": [{"data": "JVBERi0xLjQK", "mimeType": "application/pdf"}],
                    "type": "monthly"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(&body);
        assert_eq!(body["success"], true);
        assert_eq!(body["mode"], "MONTHLY_PORTFOLIO");
        assert_eq!(body["data"]["executive_summary"], "desde adjunto");

        let sent = llm.requests().await;
        assert_eq!(sent[0].attachments.len(), 1);
        assert_eq!(sent[0].attachments[0].data_base64, "JVBERi0xLjQK");
        assert!(sent[0].prompt.contains("Adjunto informe"));
    }

    #[tokio::test]
    async fn analyze_without_material_is_400() {
        let llm = Arc::new(ReplayClient::new("{}"));
        let store = Arc::new(MemoryReportStore::new());
        let app = router(state(Some(llm.clone()), Some(store)));

        let (status, body, _) = send(app.clone(), post_json("/api/analizar", json!({"asunto": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&body)["success"], false);
        assert!(llm.requests().await.is_empty());

        let bad = Request::builder()
            .method("POST")
            .uri("/api/analizar")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _, _) = send(app, bad).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn analyze_accepts_multi_megabyte_attachment() {
        let llm = Arc::new(ReplayClient::new("{\"executive_summary\":\"pdf grande\"}"));
        let store = Arc::new(MemoryReportStore::new());
        let app = router(state(Some(llm.clone()), Some(store)));

        let data = "A".repeat(3 * 1024 * 1024);
        let (status, body, _) = send(
            app,
            post_json(
                "/api/analizar",
                json!({"archivosAdjuntos": [{"data": data, "mimeType": "application/pdf"}]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["data"]["executive_summary"], "pdf grande");

        let sent = llm.requests().await;
        assert_eq!(sent[0].attachments[0].data_base64.len(), 3 * 1024 * 1024);
    }

    #[tokio::test]
    async fn analyze_over_body_limit_is_413_json() {
        let llm = Arc::new(ReplayClient::new("{}"));
        let store = Arc::new(MemoryReportStore::new());
        let mut app_state = state(Some(llm.clone()), Some(store));
        app_state.analyze_body_limit = 64 * 1024;
        let app = router(app_state);

        let data = "A".repeat(128 * 1024);
        let (status, body, _) = send(
            app,
            post_json("/api/analizar", json!({"archivosAdjuntos": [{"data": data}]})),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        let body = json_body(&body);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
        assert!(llm.requests().await.is_empty());
    }

    #[tokio::test]
    async fn export_renders_latest_monthly_pdf() {
        let reply = json!({
            "executive_summary": "Cartera defensiva.",
            "model_portfolio": [{"asset_class": "Renta Fija", "region": "Global", "weight": 100, "view": "Neutral"}]
        })
        .to_string();
        let llm = Arc::new(ReplayClient::new(reply));
        let store = Arc::new(MemoryReportStore::new());
        let app = router(state(Some(llm), Some(store)));

        let (status, _, _) = send(app.clone(), get("/api/research?type=monthly")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body, headers) = send(app, get("/api/export-pdf?type=monthly")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
        let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=\"Informe_monthly_"));
        assert!(disposition.ends_with(".pdf\""));
        assert!(body.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn check_models_lists_generation_models() {
        let llm = Arc::new(ReplayClient::new("{}").with_models(vec![ModelInfo {
            name: "models/gemini-2.5-flash".to_string(),
            display_name: "Gemini 2.5 Flash".to_string(),
            version: "001".to_string(),
        }]));
        let (status, body, _) = send(router(state(Some(llm), None)), get("/api/check-models")).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(&body);
        assert_eq!(body["count"], 1);
        assert_eq!(body["models"][0]["name"], "models/gemini-2.5-flash");
        assert_eq!(body["models"][0]["displayName"], "Gemini 2.5 Flash");
        assert_eq!(body["models"][0]["version"], "001");
    }
}
