//! Router tests against a fake model server.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use sentinel::api::{ANALYZE_PATH, ANALYZE_STREAM_PATH, EXECUTE_PATH, HEALTH_PATH};
use sentinel::{
    AnalysisClient, AnalysisEvent, AnalysisHandler, EventStreamParser, LogRecord, Severity,
    ToolCall,
};
use sentinel_backend::{build_router, AppState, BackendSettings};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Helpers
// =============================================================================

fn settings_for(model_server: &MockServer) -> BackendSettings {
    BackendSettings {
        ollama_host: model_server.uri(),
        ollama_timeout_secs: 5,
        execute_delay_ms: 0,
        ..BackendSettings::default()
    }
}

fn router_for(model_server: &MockServer) -> Router {
    build_router(AppState::new(settings_for(model_server)).unwrap())
}

fn incident_logs() -> Vec<LogRecord> {
    vec![
        LogRecord::new(Severity::Info, "api-gateway-5f8b2", "GET /api/orders 200"),
        LogRecord::new(Severity::Warn, "payment-service-7d9cf", "Memory usage at 92%"),
        LogRecord::new(Severity::Error, "payment-service-7d9cf", "OOMKilled: container exceeded memory limit"),
    ]
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn ndjson(lines: &[Value]) -> String {
    lines.iter().map(|l| format!("{l}\n")).collect()
}

fn token(content: &str) -> Value {
    json!({"model": "gpt-oss:20b", "message": {"role": "assistant", "content": content}, "done": false})
}

async fn mount_chat(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(response)
        .mount(server)
        .await;
}

fn decode_events(bytes: &[u8]) -> Vec<AnalysisEvent> {
    let mut parser = EventStreamParser::new();
    let mut frames = parser.feed(bytes);
    frames.extend(parser.finish());
    frames
        .iter()
        .filter_map(|frame| AnalysisEvent::decode(frame).unwrap())
        .collect()
}

const PROPOSAL_JSON: &str = r#"{"toolName": "scale_deployment", "args": {"namespace": "prod", "deployment": "payment-service", "replicas": 5}, "reason": "OOM under load"}"#;

// =============================================================================
// Service info and health
// =============================================================================

#[tokio::test]
async fn test_root_describes_service() {
    let model_server = MockServer::start().await;
    let response = router_for(&model_server)
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["health"], HEALTH_PATH);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_health_reports_model_connection() {
    let model_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .mount(&model_server)
        .await;

    let response = router_for(&model_server)
        .oneshot(Request::get(HEALTH_PATH).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["backend_connected"], true);
    assert_eq!(body["model"], "gpt-oss:20b");
}

#[tokio::test]
async fn test_health_degraded_without_model_server() {
    let model_server = MockServer::start().await;
    let router = router_for(&model_server);
    drop(model_server);

    let response = router
        .oneshot(Request::get(HEALTH_PATH).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["backend_connected"], false);
}

// =============================================================================
// Non-streaming analysis
// =============================================================================

#[tokio::test]
async fn test_analyze_extracts_proposal() {
    let model_server = MockServer::start().await;
    mount_chat(
        &model_server,
        ResponseTemplate::new(200).set_body_json(json!({
            "message": {
                "role": "assistant",
                "content": format!("<think>memory leak?</think>\n```json\n{PROPOSAL_JSON}\n```")
            },
            "done": true
        })),
    )
    .await;

    let response = router_for(&model_server)
        .oneshot(post_json(ANALYZE_PATH, &json!({"logs": incident_logs()})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["proposal"]["toolName"], "scale_deployment");
    assert_eq!(body["proposal"]["args"]["replicas"], 5);
    assert_eq!(body["proposal"]["reason"], "OOM under load");
    assert!(body.get("error").is_none());

    let requests = model_server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["stream"], false);
    assert_eq!(sent["model"], "gpt-oss:20b");
    assert_eq!(sent["messages"][0]["role"], "system");
    assert!(sent["messages"][1]["content"]
        .as_str()
        .unwrap()
        .contains("[ERROR] [payment-service-7d9cf] OOMKilled"));
    assert_eq!(sent["options"]["num_predict"], 2000);
}

#[tokio::test]
async fn test_analyze_fills_missing_fields() {
    let model_server = MockServer::start().await;
    mount_chat(
        &model_server,
        ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "{\"toolName\": \"restart_pod\"}"},
            "done": true
        })),
    )
    .await;

    let response = router_for(&model_server)
        .oneshot(post_json(
            ANALYZE_PATH,
            &json!({"logs": incident_logs(), "model": "llama3.1:8b"}),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["proposal"]["toolName"], "restart_pod");
    assert_eq!(body["proposal"]["args"], json!({}));
    assert_eq!(body["proposal"]["reason"], "AI analysis complete");

    let requests = model_server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["model"], "llama3.1:8b");
}

#[tokio::test]
async fn test_analyze_falls_back_when_model_fails() {
    let model_server = MockServer::start().await;
    mount_chat(&model_server, ResponseTemplate::new(500).set_body_string("boom")).await;

    let response = router_for(&model_server)
        .oneshot(post_json(ANALYZE_PATH, &json!({"logs": incident_logs()})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["error"], "LLM analysis unavailable, using fallback");
    assert_eq!(body["proposal"]["toolName"], "scale_deployment");
    assert_eq!(body["proposal"]["args"]["deployment"], "payment-service");
    assert_eq!(body["proposal"]["args"]["namespace"], "prod");
}

#[tokio::test]
async fn test_empty_logs_are_rejected() {
    let model_server = MockServer::start().await;
    for uri in [ANALYZE_PATH, ANALYZE_STREAM_PATH] {
        let response = router_for(&model_server)
            .oneshot(post_json(uri, &json!({"logs": []})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY, "{uri}");
        let body = body_json(response).await;
        assert!(body["detail"].as_str().unwrap().contains("at least one"));
    }
    assert!(model_server.received_requests().await.unwrap().is_empty());
}

// =============================================================================
// Streaming analysis
// =============================================================================

#[tokio::test]
async fn test_stream_relays_reasoning_content_and_proposal() {
    let model_server = MockServer::start().await;
    mount_chat(
        &model_server,
        ResponseTemplate::new(200)
            .insert_header("content-type", "application/x-ndjson")
            .set_body_string(ndjson(&[
                token("<think>"),
                token("Memory "),
                token("pressure</think>"),
                token(PROPOSAL_JSON),
                json!({"message": {"role": "assistant", "content": ""}, "done": true}),
            ])),
    )
    .await;

    let response = router_for(&model_server)
        .oneshot(post_json(ANALYZE_STREAM_PATH, &json!({"logs": incident_logs()})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let events = decode_events(&body_bytes(response).await);
    assert_eq!(events.len(), 4);
    assert_eq!(events[0], AnalysisEvent::Thinking("Memory ".to_string()));
    assert_eq!(events[1], AnalysisEvent::Thinking("pressure".to_string()));
    assert_eq!(events[2], AnalysisEvent::Content(PROPOSAL_JSON.to_string()));
    match &events[3] {
        AnalysisEvent::Done(proposal) => {
            assert_eq!(proposal.tool_name.as_deref(), Some("scale_deployment"));
        }
        other => panic!("expected done, got {other:?}"),
    }

    let requests = model_server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["stream"], true);
}

#[tokio::test]
async fn test_stream_reports_model_error() {
    let model_server = MockServer::start().await;
    mount_chat(&model_server, ResponseTemplate::new(503)).await;

    let response = router_for(&model_server)
        .oneshot(post_json(ANALYZE_STREAM_PATH, &json!({"logs": incident_logs()})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let events = decode_events(&body_bytes(response).await);
    assert_eq!(events, vec![AnalysisEvent::Error("Ollama error: 503".to_string())]);
}

#[tokio::test]
async fn test_stream_reports_unparseable_answer() {
    let model_server = MockServer::start().await;
    mount_chat(
        &model_server,
        ResponseTemplate::new(200).set_body_string(ndjson(&[
            token("I am not sure what to do."),
            json!({"message": {"content": ""}, "done": true}),
        ])),
    )
    .await;

    let response = router_for(&model_server)
        .oneshot(post_json(ANALYZE_STREAM_PATH, &json!({"logs": incident_logs()})))
        .await
        .unwrap();
    let events = decode_events(&body_bytes(response).await);
    match events.last() {
        Some(AnalysisEvent::Error(message)) => {
            assert!(message.starts_with("Could not parse response as JSON"));
            assert!(message.contains("I am not sure"));
        }
        other => panic!("expected error, got {other:?}"),
    }
}

// =============================================================================
// Execute
// =============================================================================

#[tokio::test]
async fn test_execute_scales_deployment() {
    let model_server = MockServer::start().await;
    let response = router_for(&model_server)
        .oneshot(post_json(
            EXECUTE_PATH,
            &json!({
                "tool_name": "scale_deployment",
                "parameters": {"namespace": "prod", "deployment": "payment-service", "replicas": 5}
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(
        body["message"],
        "Successfully scaled deployment 'payment-service' in namespace 'prod' to 5 replicas"
    );
    assert_eq!(body["details"]["replicas"], 5);
    assert!(body["details"]["timestamp"].is_string());
}

#[tokio::test]
async fn test_execute_rejects_unknown_tool_and_bad_parameters() {
    let model_server = MockServer::start().await;

    let response = router_for(&model_server)
        .oneshot(post_json(
            EXECUTE_PATH,
            &json!({"tool_name": "reboot", "parameters": {}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["detail"], "Unknown tool: reboot");

    // Known to the model prompt, but not executable.
    let response = router_for(&model_server)
        .oneshot(post_json(
            EXECUTE_PATH,
            &json!({"tool_name": "restart_pod", "parameters": {"namespace": "prod", "pod": "db-0"}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["detail"], "Unknown tool: restart_pod");

    let response = router_for(&model_server)
        .oneshot(post_json(
            EXECUTE_PATH,
            &json!({"tool_name": "scale_deployment", "parameters": {"namespace": "prod", "replicas": -1}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// =============================================================================
// Client against a live backend
// =============================================================================

#[derive(Default)]
struct Recorder {
    reasoning: String,
    result: Option<ToolCall>,
    errors: Vec<String>,
}

impl AnalysisHandler for Recorder {
    fn on_reasoning(&mut self, text: &str) {
        self.reasoning.push_str(text);
    }

    fn on_result(&mut self, proposal: ToolCall) {
        self.result = Some(proposal);
    }

    fn on_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
}

#[tokio::test]
async fn test_sentinel_client_against_backend() {
    let model_server = MockServer::start().await;
    mount_chat(
        &model_server,
        ResponseTemplate::new(200).set_body_string(ndjson(&[
            token("<think>Memory "),
            token("pressure</think>"),
            token(PROPOSAL_JSON),
            json!({"message": {"content": ""}, "done": true}),
        ])),
    )
    .await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router_for(&model_server);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = AnalysisClient::new(format!("http://{addr}")).unwrap();
    let mut recorder = Recorder::default();
    client.analyze_stream(&incident_logs(), &mut recorder).await;

    assert!(recorder.errors.is_empty(), "{:?}", recorder.errors);
    assert_eq!(recorder.reasoning, "Memory pressure");
    let proposal = recorder.result.unwrap();
    assert_eq!(proposal.tool_name, "scale_deployment");
    assert_eq!(proposal.arguments["deployment"], "payment-service");
}
