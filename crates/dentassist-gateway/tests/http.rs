// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway behaviour over mock backends: auth, limits, summarisation,
//! consultations, and the SSE framing contract.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use dentassist_audit::AuditLog;
use dentassist_config::model::{GroupRate, LimitsConfig, RagConfig, RateLimitConfig};
use dentassist_core::{AuditAction, AuditOutcome};
use dentassist_gateway::{router, GatewayState, MetricsCollector, RateLimiter};
use dentassist_pipeline::{PipelineConfig, SmartNotePipeline};
use dentassist_rag::{seed_knowledge, RagCoordinator};
use dentassist_runtime::ModelDownloadManager;
use dentassist_scheduler::{Scheduler, SchedulerOptions};
use dentassist_test_utils::{MockEmbedder, MockGenerator, MockSpeech};
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;

const API_KEY: &str = "test-api-key";

struct Fixture {
    _dir: tempfile::TempDir,
    app: Router,
    audit: Arc<AuditLog>,
    rag: Arc<RagCoordinator>,
}

fn generous_rates() -> RateLimitConfig {
    let unlimited = GroupRate {
        per_minute: 100_000,
        burst: 100_000,
    };
    RateLimitConfig {
        enabled: true,
        heavy: unlimited,
        moderate: unlimited,
        light: unlimited,
        max_buckets: 1024,
    }
}

fn build(rate_limit: RateLimitConfig) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = Arc::new(Scheduler::new(SchedulerOptions::default()));
    let audit = Arc::new(AuditLog::open(dir.path().join("audit.jsonl")).unwrap());
    let rag = Arc::new(
        RagCoordinator::open(
            dir.path().join("consultations.jsonl"),
            dir.path().join("rag_data/index.json"),
            Arc::new(MockEmbedder::new()),
            Arc::clone(&scheduler),
            Arc::clone(&audit),
            RagConfig::default(),
        )
        .unwrap(),
    );
    let speech = Arc::new(MockSpeech::new());
    let generator = Arc::new(MockGenerator::new());
    let pipeline = Arc::new(SmartNotePipeline::new(
        Arc::clone(&scheduler),
        Arc::clone(&rag),
        Arc::clone(&speech) as Arc<dyn dentassist_core::SpeechRecognizer>,
        Arc::clone(&generator) as Arc<dyn dentassist_core::GenerativeModel>,
        Arc::clone(&audit),
        PipelineConfig::default(),
    ));

    let state = GatewayState {
        expected_api_key: Arc::new(API_KEY.to_string()),
        pipeline,
        rag: Arc::clone(&rag),
        scheduler,
        audit: Arc::clone(&audit),
        metrics: Arc::new(MetricsCollector::new()),
        rate_limiter: Arc::new(RateLimiter::new(rate_limit)),
        downloads: Arc::new(ModelDownloadManager::new(Vec::new())),
        limits: Arc::new(LimitsConfig::default()),
        speech,
        generator,
        shutdown: CancellationToken::new(),
    };
    Fixture {
        _dir: dir,
        app: router(state),
        audit,
        rag,
    }
}

fn default_fixture() -> Fixture {
    build(generous_rates())
}

fn json_request(method: &str, path: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 10 * 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 10 * 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn health_needs_no_key() {
    let fixture = default_fixture();
    let response = fixture
        .app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn plain_summarize_succeeds_and_audits_once() {
    let fixture = default_fixture();
    let response = fixture
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/summarize",
            serde_json::json!({"text": "Douleur molaire 36 depuis 3 jours."}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let request_id = response.headers()["x-request-id"]
        .to_str()
        .unwrap()
        .to_string();
    let body = body_json(response).await;
    let summary = body["summary"].as_str().unwrap();
    assert!(!summary.is_empty());

    let entries: Vec<_> = fixture
        .audit
        .recent(20)
        .into_iter()
        .filter(|e| e.action == AuditAction::Summarize)
        .collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, AuditOutcome::Success);
    assert_eq!(entries[0].correlation_id, request_id);
}

#[tokio::test]
async fn missing_key_is_403_with_kind_and_audit() {
    let fixture = default_fixture();
    let request = Request::post("/summarize")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"text":"Douleur"}"#))
        .unwrap();
    let response = fixture.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "auth/missing");
    assert!(body["request_id"].as_str().is_some());

    let entries = fixture.audit.recent(5);
    assert_eq!(entries[0].action, AuditAction::Summarize);
    assert_eq!(entries[0].outcome, AuditOutcome::Failure);
}

#[tokio::test]
async fn wrong_key_is_403_invalid() {
    let fixture = default_fixture();
    let request = Request::post("/summarize")
        .header("content-type", "application/json")
        .header("x-api-key", "nope")
        .body(Body::from(r#"{"text":"Douleur"}"#))
        .unwrap();
    let response = fixture.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "auth/invalid");
}

#[tokio::test]
async fn oversize_upload_is_rejected_by_header() {
    let fixture = default_fixture();
    let request = Request::post("/transcribe")
        .header("x-api-key", API_KEY)
        .header("content-length", (150u64 * 1024 * 1024).to_string())
        .body(Body::empty())
        .unwrap();
    let response = fixture.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "input/too_large");
}

#[tokio::test]
async fn empty_text_is_400() {
    let fixture = default_fixture();
    let response = fixture
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/summarize",
            serde_json::json!({"text": "   "}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "input/empty");
}

#[tokio::test]
async fn transcribe_accepts_multipart_and_returns_text() {
    let fixture = default_fixture();
    let boundary = "dentassist-test-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"consult.wav\"\r\n\
         Content-Type: audio/wav\r\n\r\n\
         RIFFfakeaudio\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"language\"\r\n\r\n\
         fr\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::post("/transcribe")
        .header("x-api-key", API_KEY)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = fixture.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["text"].as_str().unwrap().contains("molaire"));
    assert!(body["request_id"].as_str().is_some());

    let entries = fixture.audit.recent(5);
    assert!(entries
        .iter()
        .any(|e| e.action == AuditAction::Transcribe
            && e.outcome == AuditOutcome::Success
            && e.resource == "consult.wav"));
}

#[tokio::test]
async fn transcribe_rejects_unknown_extension() {
    let fixture = default_fixture();
    let boundary = "b";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"notes.exe\"\r\n\r\n\
         MZ\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::post("/transcribe")
        .header("x-api-key", API_KEY)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = fixture.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "input/extension");
}

#[tokio::test]
async fn rag_summarize_reports_fallback_without_knowledge() {
    let fixture = default_fixture();
    // Sanity: the knowledge base is empty.
    let status = fixture
        .app
        .clone()
        .oneshot(
            Request::get("/rag/status")
                .header("x-api-key", API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status_body = body_json(status).await;
    assert_eq!(status_body["knowledge_count"], 0);

    let response = fixture
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/summarize-rag",
            serde_json::json!({"text": "Douleur molaire 36."}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["rag_enhanced"], false);
    assert!(!body["summary"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn stream_rag_fallback_announces_in_first_event() {
    let fixture = default_fixture();
    let response = fixture
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/summarize-stream-rag",
            serde_json::json!({"text": "Douleur molaire 36."}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));
    assert_eq!(response.headers()["x-accel-buffering"], "no");

    let text = body_text(response).await;
    let first_data = text
        .lines()
        .find(|line| line.starts_with("data: "))
        .expect("at least one SSE event");
    assert_eq!(first_data, "data: {\"rag_enhanced\":false}");
    assert!(text.contains("data: [DONE]"));
}

#[tokio::test]
async fn stream_with_knowledge_grounds_and_persists() {
    let fixture = default_fixture();
    fixture
        .rag
        .ingest_knowledge(&seed_knowledge())
        .await
        .unwrap();

    let response = fixture
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/summarize-stream-rag",
            serde_json::json!({"text": "Avulsion traumatique d'une dent permanente."}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(text.starts_with("data: {\"rag_enhanced\":true}"));
    assert!(text.contains("data: [DONE]"));

    // The fully delivered note was persisted by the pump.
    let mut persisted = false;
    for _ in 0..40 {
        if fixture.rag.journal().count() == 1 {
            persisted = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    assert!(persisted, "streamed note must be persisted after [DONE]");
}

#[tokio::test]
async fn consultations_save_search_export_round_trip() {
    let fixture = default_fixture();

    let save = fixture
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/consultations/save",
            serde_json::json!({
                "smartnote": "MOTIF: contrôle. DIAGNOSTIC: RAS.",
                "transcription": "Contrôle annuel sans douleur.",
                "dentist_name": "Dr Morel",
                "consultation_type": "contrôle",
                "patient_id": "P-123",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(save.status(), StatusCode::OK);
    let save_body = body_json(save).await;
    assert_eq!(save_body["status"], "saved");

    let search = fixture
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/consultations/search",
            serde_json::json!({"query": "contrôle", "top_k": 500}),
        ))
        .await
        .unwrap();
    assert_eq!(search.status(), StatusCode::OK);
    let search_body = body_json(search).await;
    assert_eq!(search_body["count"], 1);
    assert_eq!(search_body["results"][0]["dentist_name"], "Dr Morel");
    assert_eq!(search_body["results"][0]["patient_id"], "P-123");

    let export = fixture
        .app
        .clone()
        .oneshot(
            Request::get("/consultations/export")
                .header("x-api-key", API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(export.status(), StatusCode::OK);
    let export_body = body_json(export).await;
    assert_eq!(export_body["count"], 1);
    assert_eq!(
        export_body["consultations"][0]["dentist_name"],
        "Dr Morel"
    );

    // Save audited with the dentist as actor.
    let entries = fixture.audit.recent(10);
    assert!(entries.iter().any(|e| {
        e.action == AuditAction::ConsultationSave
            && e.actor == "Dr Morel"
            && e.resource == "P-123"
            && e.outcome == AuditOutcome::Success
    }));
    assert!(entries
        .iter()
        .any(|e| e.action == AuditAction::ConsultationExport && e.resource == "all"));
}

#[tokio::test]
async fn rate_limited_client_gets_429_others_pass() {
    let tight = RateLimitConfig {
        enabled: true,
        heavy: GroupRate {
            per_minute: 100_000,
            burst: 100_000,
        },
        moderate: GroupRate {
            per_minute: 100_000,
            burst: 100_000,
        },
        light: GroupRate {
            per_minute: 60,
            burst: 1,
        },
        max_buckets: 64,
    };
    let fixture = build(tight);

    let request_from = |addr: &str| {
        let mut request = Request::get("/workers/status")
            .header("x-api-key", API_KEY)
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo::<SocketAddr>(addr.parse().unwrap()));
        request
    };

    let first = fixture
        .app
        .clone()
        .oneshot(request_from("10.0.0.1:4000"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = fixture
        .app
        .clone()
        .oneshot(request_from("10.0.0.1:4000"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key("retry-after"));
    let body = body_json(second).await;
    assert_eq!(body["error_code"], "system/rate_limited");

    // A different client host is unaffected.
    let other = fixture
        .app
        .clone()
        .oneshot(request_from("10.0.0.2:4000"))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn status_and_metrics_surfaces_respond() {
    let fixture = default_fixture();

    let workers = fixture
        .app
        .clone()
        .oneshot(
            Request::get("/workers/status")
                .header("x-api-key", API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(workers.status(), StatusCode::OK);
    let workers_body = body_json(workers).await;
    for queue in ["speech", "generate", "embed"] {
        assert_eq!(workers_body[queue]["capacity"], 1);
        assert_eq!(workers_body[queue]["running"], 0);
        assert_eq!(workers_body[queue]["waiting"], 0);
    }

    let llm = fixture
        .app
        .clone()
        .oneshot(
            Request::get("/llm/status")
                .header("x-api-key", API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(llm.status(), StatusCode::OK);

    // Generate some traffic, then check the metrics shape.
    fixture
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/summarize",
            serde_json::json!({"text": "Douleur 36."}),
        ))
        .await
        .unwrap();

    let metrics = fixture
        .app
        .clone()
        .oneshot(
            Request::get("/metrics")
                .header("x-api-key", API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(metrics.status(), StatusCode::OK);
    let metrics_body = body_json(metrics).await;
    assert!(metrics_body["total_requests"].as_u64().unwrap() >= 1);
    assert!(metrics_body["endpoints"]["POST /summarize"]["requests"]
        .as_u64()
        .unwrap()
        >= 1);
    assert_eq!(metrics_body["counters"]["journal_skipped_lines"], 0);
}

#[tokio::test]
async fn audit_recent_is_bounded_and_audited() {
    let fixture = default_fixture();
    for _ in 0..3 {
        fixture
            .app
            .clone()
            .oneshot(json_request(
                "POST",
                "/summarize",
                serde_json::json!({"text": "Douleur 36."}),
            ))
            .await
            .unwrap();
    }

    let response = fixture
        .app
        .clone()
        .oneshot(
            Request::get("/audit/recent?n=2")
                .header("x-api-key", API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["count"], 2);
    assert!(fixture
        .audit
        .recent(5)
        .iter()
        .any(|e| e.action == AuditAction::AuditRead));
}

#[tokio::test]
async fn setup_progress_starts_idle() {
    let fixture = default_fixture();
    let response = fixture
        .app
        .clone()
        .oneshot(
            Request::get("/setup/progress")
                .header("x-api-key", API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "idle");
}
