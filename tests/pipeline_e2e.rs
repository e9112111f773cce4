//! End-to-end tests of the evaluation pipeline against a stubbed scoring engine.
//!
//! Uses wiremock to stand in for the engine's `/gtp`, `/model`, `/scorejson` and
//! `/scorefile` endpoints.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pronscore::domain::{
    AppConfig, AudioConfig, AudioPayload, EngineConfig, EvaluationRequest, FailedStage,
    ScoreTransport,
};
use pronscore::{AppController, FfmpegPreprocessor, HttpEngineClient, PipelineOrchestrator};

const WAV: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt fake-pcm";

fn engine_config(server: &MockServer) -> EngineConfig {
    EngineConfig {
        base_url: format!("{}/speechpro", server.uri()),
        gtp_timeout_secs: 2,
        model_timeout_secs: 2,
        score_timeout_secs: 1,
        ..EngineConfig::default()
    }
}

fn pipeline(config: &EngineConfig) -> PipelineOrchestrator {
    let client = HttpEngineClient::new(config).unwrap();
    PipelineOrchestrator::new(Arc::new(client), config.score_transport)
}

fn request(text: &str) -> EvaluationRequest {
    EvaluationRequest::new(text, AudioPayload::new(WAV.to_vec(), "clip.wav"))
}

fn gtp_body() -> Value {
    json!({"id": "echo", "error code": 0, "syll ltrs": "안녕", "syll phns": "a n n yv ng"})
}

fn model_body() -> Value {
    json!({"id": "echo", "error code": 0, "fst": "FST-BLOB", "syll ltrs": "안녕", "syll phns": "a n n yv ng"})
}

async fn mount(server: &MockServer, endpoint: &str, response: ResponseTemplate, calls: u64) {
    Mock::given(method("POST"))
        .and(path(format!("/speechpro{}", endpoint)))
        .respond_with(response)
        .expect(calls)
        .mount(server)
        .await;
}

fn ok(body: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

#[tokio::test]
async fn test_full_run_passes_score_through() {
    let server = MockServer::start().await;
    mount(&server, "/gtp", ok(gtp_body()), 1).await;
    mount(&server, "/model", ok(model_body()), 1).await;
    mount(&server, "/scorejson", ok(json!({"score": 87.25, "quality": {"score": 10}})), 1).await;

    let result = pipeline(&engine_config(&server))
        .evaluate(request("안녕\u{00A0}하세요"))
        .await;

    assert!(result.success, "{:?}", result.raw_detail);
    assert_eq!(result.score, Some(87.25));
    assert!(result.feedback.is_some());
    assert!(result.failed_stage.is_none());
    assert_eq!(result.raw_detail["score"], 87.25);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    let bodies: Vec<Value> = requests.iter().map(|r| r.body_json().unwrap()).collect();

    let id = result.correlation_id.unwrap();
    for body in &bodies {
        assert_eq!(body["id"], id.as_str());
        assert_eq!(body["text"], "안녕 하세요");
    }
    assert_eq!(bodies[1]["syll ltrs"], "안녕");
    assert_eq!(bodies[2]["fst"], "FST-BLOB");
    let sent = base64::engine::general_purpose::STANDARD
        .decode(bodies[2]["wav usr"].as_str().unwrap())
        .unwrap();
    assert_eq!(sent, WAV);
}

#[tokio::test]
async fn test_gtp_error_code_never_reaches_model_or_score() {
    let server = MockServer::start().await;
    mount(&server, "/gtp", ok(json!({"error code": 4, "message": "unknown word"})), 1).await;
    mount(&server, "/model", ok(model_body()), 0).await;
    mount(&server, "/scorejson", ok(json!({"score": 90})), 0).await;

    let result = pipeline(&engine_config(&server)).evaluate(request("안녕")).await;

    assert!(!result.success);
    assert_eq!(result.failed_stage, Some(FailedStage::Gtp));
    assert_eq!(result.raw_detail["error"], "engine_stage_error");
    assert!(result.raw_detail["detail"].as_str().unwrap().contains("error code 4"));
}

#[tokio::test]
async fn test_model_without_fst_fails_at_model() {
    let server = MockServer::start().await;
    mount(&server, "/gtp", ok(gtp_body()), 1).await;
    mount(&server, "/model", ok(json!({"error code": 0, "syll ltrs": "안녕"})), 1).await;
    mount(&server, "/scorejson", ok(json!({"score": 90})), 0).await;

    let result = pipeline(&engine_config(&server)).evaluate(request("안녕")).await;

    assert!(!result.success);
    assert_eq!(result.failed_stage, Some(FailedStage::Model));
}

#[tokio::test]
async fn test_score_timeout_fails_at_score() {
    let server = MockServer::start().await;
    mount(&server, "/gtp", ok(gtp_body()), 1).await;
    mount(&server, "/model", ok(model_body()), 1).await;
    mount(
        &server,
        "/scorejson",
        ok(json!({"score": 90})).set_delay(Duration::from_secs(3)),
        1,
    )
    .await;

    let result = pipeline(&engine_config(&server)).evaluate(request("안녕")).await;

    assert!(!result.success);
    assert_eq!(result.failed_stage, Some(FailedStage::Score));
    assert_eq!(result.raw_detail["error"], "engine_unreachable");
}

#[tokio::test]
async fn test_score_http_error_keeps_status_and_body() {
    let server = MockServer::start().await;
    mount(&server, "/gtp", ok(gtp_body()), 1).await;
    mount(&server, "/model", ok(model_body()), 1).await;
    mount(
        &server,
        "/scorejson",
        ResponseTemplate::new(500).set_body_string("x".repeat(2000)),
        1,
    )
    .await;

    let result = pipeline(&engine_config(&server)).evaluate(request("안녕")).await;

    assert_eq!(result.failed_stage, Some(FailedStage::Score));
    assert_eq!(result.raw_detail["status"], 500);
    assert!(result.raw_detail["body"].as_str().unwrap().ends_with("...(truncated)"));
}

#[tokio::test]
async fn test_undecodable_gtp_body_is_protocol_error() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/gtp",
        ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"),
        1,
    )
    .await;
    mount(&server, "/model", ok(model_body()), 0).await;

    let result = pipeline(&engine_config(&server)).evaluate(request("안녕")).await;

    assert_eq!(result.failed_stage, Some(FailedStage::Gtp));
    assert_eq!(result.raw_detail["error"], "engine_protocol_error");
}

#[tokio::test]
async fn test_double_encoded_score_is_unwrapped() {
    let server = MockServer::start().await;
    mount(&server, "/gtp", ok(gtp_body()), 1).await;
    mount(&server, "/model", ok(model_body()), 1).await;
    let inner = json!({
        "quality": {
            "sentences": [
                {"text": "!SIL", "score": 99.0},
                {"text": "안녕", "score": 78.8}
            ]
        }
    });
    mount(&server, "/scorejson", ok(json!({"result": inner.to_string()})), 1).await;

    let result = pipeline(&engine_config(&server)).evaluate(request("안녕")).await;

    assert!(result.success);
    assert_eq!(result.score, Some(78.8));
    assert_eq!(result.sentences.len(), 1);
    assert_eq!(result.raw_detail, inner);
}

#[tokio::test]
async fn test_file_transport_uploads_multipart() {
    let server = MockServer::start().await;
    mount(&server, "/gtp", ok(gtp_body()), 1).await;
    mount(&server, "/model", ok(model_body()), 1).await;
    Mock::given(method("POST"))
        .and(path("/speechpro/scorefile"))
        .and(body_string_contains("name=\"config\""))
        .and(body_string_contains("name=\"wav usr\""))
        .and(body_string_contains("FST-BLOB"))
        .respond_with(ok(json!({"score": 91})))
        .expect(1)
        .mount(&server)
        .await;
    mount(&server, "/scorejson", ok(json!({"score": 0})), 0).await;

    let config = EngineConfig {
        score_transport: ScoreTransport::File,
        ..engine_config(&server)
    };
    let result = pipeline(&config).evaluate(request("안녕")).await;

    assert!(result.success, "{:?}", result.raw_detail);
    assert_eq!(result.score, Some(91.0));

    let requests = server.received_requests().await.unwrap();
    let upload = String::from_utf8_lossy(&requests[2].body).into_owned();
    assert!(upload.contains("name=\"wav usr\"; filename=\"clip.wav\""), "{}", upload);
    assert!(!upload.contains("name*="), "{}", upload);
}

#[tokio::test]
async fn test_error_code_on_double_encoded_wrapper_fails_score() {
    let server = MockServer::start().await;
    mount(&server, "/gtp", ok(gtp_body()), 1).await;
    mount(&server, "/model", ok(model_body()), 1).await;
    mount(
        &server,
        "/scorejson",
        ok(json!({"error code": 7, "result": "{\"score\": 0}"})),
        1,
    )
    .await;

    let result = pipeline(&engine_config(&server)).evaluate(request("안녕")).await;

    assert!(!result.success);
    assert!(result.score.is_none());
    assert_eq!(result.failed_stage, Some(FailedStage::Score));
    assert_eq!(result.raw_detail["error"], "engine_stage_error");
}

#[tokio::test]
async fn test_unreachable_engine() {
    let config = EngineConfig {
        base_url: "http://127.0.0.1:1/speechpro".to_string(),
        ..EngineConfig::default()
    };
    let result = pipeline(&config).evaluate(request("안녕")).await;

    assert_eq!(result.failed_stage, Some(FailedStage::Gtp));
    assert_eq!(result.raw_detail["error"], "engine_unreachable");
}

#[tokio::test]
async fn test_concurrent_runs_use_distinct_correlation_ids() {
    let server = MockServer::start().await;
    mount(&server, "/gtp", ok(gtp_body()), 200).await;
    mount(&server, "/model", ok(model_body()), 200).await;
    mount(&server, "/scorejson", ok(json!({"score": 85})), 200).await;

    let pipeline = Arc::new(pipeline(&engine_config(&server)));
    let handles: Vec<_> = (0..200)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.evaluate(request("안녕")).await })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        let result = handle.await.unwrap();
        assert!(result.success);
        ids.insert(result.correlation_id.unwrap());
    }
    assert_eq!(ids.len(), 200);
}

#[tokio::test]
async fn test_failed_conversion_still_scores_original_file() {
    let server = MockServer::start().await;
    let original = b"definitely-not-audio".to_vec();
    let encoded = base64::engine::general_purpose::STANDARD.encode(&original);

    mount(&server, "/gtp", ok(gtp_body()), 1).await;
    mount(&server, "/model", ok(model_body()), 1).await;
    Mock::given(method("POST"))
        .and(path("/speechpro/scorejson"))
        .and(body_partial_json(json!({"wav usr": encoded})))
        .respond_with(ok(json!({"score": 12})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("upload.webm");
    std::fs::write(&input, &original).unwrap();

    let config = AppConfig {
        engine: engine_config(&server),
        audio: AudioConfig {
            ffmpeg_path: "pronscore-missing-transcoder".to_string(),
            ..AudioConfig::default()
        },
        ..AppConfig::default()
    };
    let controller = AppController::from_parts(
        config.clone(),
        Arc::new(HttpEngineClient::new(&config.engine).unwrap()),
        Arc::new(FfmpegPreprocessor::new(&config.audio)),
    );

    let result = controller.evaluate_file("안녕", &input).await.unwrap();

    assert!(result.success);
    assert_eq!(result.score, Some(12.0));
    assert_eq!(result.diagnostics.len(), 1);
    assert!(result.diagnostics[0].contains("not found"));
    assert!(input.exists());
}
