//! HTTP surface of the analysis backend.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderValue;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use sentinel::api::{
    AnalyzeRequest, AnalyzeResponse, ExecuteRequest, ExecuteResponse, HealthResponse,
    ANALYZE_PATH, ANALYZE_STREAM_PATH, EXECUTE_PATH, HEALTH_PATH,
};
use sentinel::incident::DEFAULT_NAMESPACE;
use sentinel::{AnalysisEvent, LogRecord, ToolCall};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{BackendSettings, SERVICE_NAME};
use crate::error::{BackendError, BackendResult};
use crate::ollama::OllamaClient;

/// The one tool the simulated executor can run.
const SCALE_DEPLOYMENT: &str = "scale_deployment";

/// Pod used for the fallback proposal when no log names a failing one.
const FALLBACK_POD: &str = "payment-service-7d9cf";
const FALLBACK_REPLICAS: u32 = 5;
const FALLBACK_REASON: &str = "Critical error detected. LLM analysis unavailable - using fallback recommendation to scale deployment for load distribution.";
const FALLBACK_ERROR: &str = "LLM analysis unavailable, using fallback";
const EVENT_BUFFER: usize = 64;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub ollama: Arc<OllamaClient>,
    pub settings: Arc<BackendSettings>,
}

impl AppState {
    pub fn new(settings: BackendSettings) -> BackendResult<Self> {
        Ok(Self {
            ollama: Arc::new(OllamaClient::new(&settings)?),
            settings: Arc::new(settings),
        })
    }
}

/// Build the router.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings);
    Router::new()
        .route("/", get(root))
        .route(HEALTH_PATH, get(health))
        .route(ANALYZE_PATH, post(analyze))
        .route(ANALYZE_STREAM_PATH, post(analyze_stream))
        .route(EXECUTE_PATH, post(execute))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until the process exits.
pub async fn run_server(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!("Starting analysis backend on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(settings: &BackendSettings) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if settings.allows_any_origin() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = settings
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

// =============================================================================
// Handlers
// =============================================================================

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "health": HEALTH_PATH,
        "endpoints": [ANALYZE_PATH, ANALYZE_STREAM_PATH, EXECUTE_PATH],
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = state.ollama.check_connection().await;
    Json(HealthResponse {
        status: if connected { "healthy" } else { "degraded" }.to_string(),
        backend_connected: connected,
        model: state.ollama.model().to_string(),
    })
}

async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> BackendResult<Json<AnalyzeResponse>> {
    require_logs(&request)?;

    let response = match state
        .ollama
        .analyze(&request.logs, request.model.as_deref())
        .await
    {
        Ok(proposal) => AnalyzeResponse {
            success: true,
            proposal: Some(proposal),
            error: None,
        },
        Err(err) => {
            warn!(error = %err, "Model analysis failed; answering with fallback");
            AnalyzeResponse {
                success: true,
                proposal: Some(fallback_proposal(&request.logs)),
                error: Some(FALLBACK_ERROR.to_string()),
            }
        }
    };
    Ok(Json(response))
}

async fn analyze_stream(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> BackendResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    require_logs(&request)?;

    let (tx, rx) = mpsc::channel::<AnalysisEvent>(EVENT_BUFFER);
    let ollama = Arc::clone(&state.ollama);
    tokio::spawn(async move {
        ollama
            .chat_stream(&request.logs, request.model.as_deref(), tx)
            .await;
    });

    let events = ReceiverStream::new(rx).map(|event| {
        Ok(Event::default()
            .event(event.event_name())
            .data(event.data()))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Parameters of the one tool the simulated executor knows.
#[derive(Debug, Deserialize)]
struct ScaleParameters {
    namespace: String,
    deployment: String,
    replicas: u32,
}

async fn execute(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> BackendResult<Json<ExecuteResponse>> {
    if request.tool_name != SCALE_DEPLOYMENT {
        return Err(BackendError::UnknownTool(request.tool_name));
    }
    let params: ScaleParameters = serde_json::from_value(Value::Object(request.parameters))
        .map_err(|e| BackendError::Validation(format!("Invalid parameters: {e}")))?;

    info!(
        namespace = %params.namespace,
        deployment = %params.deployment,
        replicas = params.replicas,
        "Simulating scale"
    );
    tokio::time::sleep(state.settings.execute_delay()).await;

    Ok(Json(ExecuteResponse {
        status: "success".to_string(),
        message: format!(
            "Successfully scaled deployment '{}' in namespace '{}' to {} replicas",
            params.deployment, params.namespace, params.replicas
        ),
        details: Some(json!({
            "namespace": params.namespace,
            "deployment": params.deployment,
            "replicas": params.replicas,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    }))
}

fn require_logs(request: &AnalyzeRequest) -> BackendResult<()> {
    if request.logs.is_empty() {
        return Err(BackendError::Validation(
            "logs must contain at least one entry".to_string(),
        ));
    }
    Ok(())
}

/// Scale the deployment behind the first failing pod.
///
/// The deployment name is the pod name minus its last `-suffix`.
pub fn fallback_proposal(logs: &[LogRecord]) -> ToolCall {
    let pod = logs
        .iter()
        .find(|log| log.severity.is_incident_trigger())
        .map_or(FALLBACK_POD, |log| log.source_pod.as_str());
    let deployment = pod.rsplit_once('-').map_or(pod, |(name, _)| name);

    let mut arguments = Map::new();
    arguments.insert("namespace".to_string(), json!(DEFAULT_NAMESPACE));
    arguments.insert("deployment".to_string(), json!(deployment));
    arguments.insert("replicas".to_string(), json!(FALLBACK_REPLICAS));
    ToolCall::new(SCALE_DEPLOYMENT, arguments, FALLBACK_REASON)
}
