use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::CONNECTION;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::domain::error::truncate_body;
use crate::domain::stage::{error_code_in, fields};
use crate::domain::{DomainError, EngineConfig, ScoreBody, Stage, StageOutput};
use crate::ports::{EngineStageClient, StagePayload};

/// Scoring engine client over HTTP.
///
/// Constructed explicitly from an [`EngineConfig`] and shared by reference between runs;
/// the underlying connection pool is safe for concurrent use.
pub struct HttpEngineClient {
    client: Client,
    config: EngineConfig,
}

impl HttpEngineClient {
    pub fn new(config: &EngineConfig) -> Result<Self, DomainError> {
        config.validate()?;

        let client = Client::builder()
            .use_rustls_tls()
            .connect_timeout(config.connect_timeout())
            .user_agent(format!("PronScore/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DomainError::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            base_url = %config.base_url,
            transport = ?config.score_transport,
            "Engine client initialized"
        );

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn endpoint_url(&self, suffix: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), suffix)
    }

    fn build_request(
        &self,
        stage: Stage,
        url: &str,
        payload: StagePayload,
    ) -> Result<reqwest::RequestBuilder, DomainError> {
        let request = self
            .client
            .post(url)
            .timeout(self.config.stage_timeout(stage))
            .header(CONNECTION, "close");

        match payload {
            StagePayload::Json(body) => Ok(request.json(&body)),
            StagePayload::Multipart { config, audio } => {
                let config_text = serde_json::to_string(&config)?;
                let file_part = Part::bytes(audio.bytes().to_vec())
                    .file_name(audio.file_name().to_string())
                    .mime_str("audio/wav")
                    .map_err(|e| DomainError::EngineProtocol {
                        stage,
                        detail: e.to_string(),
                    })?;
                // Part names go out verbatim; the engine expects `name="wav usr"`, not `name*=`.
                let form = Form::new()
                    .percent_encode_noop()
                    .text(fields::CONFIG, config_text)
                    .part(fields::WAV_USR, file_part);
                Ok(request.multipart(form))
            }
        }
    }
}

fn transport_error(stage: Stage, err: reqwest::Error) -> DomainError {
    let reason = if err.is_timeout() {
        format!("timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    };
    DomainError::EngineUnreachable { stage, reason }
}

/// Decode a 2xx body into a stage output.
///
/// Score bodies go through [`ScoreBody`] first, since the engine may encode them twice.
fn decode_body(stage: Stage, body: &[u8]) -> Result<StageOutput, DomainError> {
    let text = String::from_utf8_lossy(body);
    if text.trim().is_empty() {
        return Err(DomainError::EngineProtocol {
            stage,
            detail: "empty response body".to_string(),
        });
    }

    let value: Value = serde_json::from_str(&text).map_err(|e| DomainError::EngineProtocol {
        stage,
        detail: format!("{}: {}", e, truncate_body(&text)),
    })?;

    let value = match stage {
        Stage::Score => {
            // The wrapper of a double-encoded body can carry the error code itself.
            if let Value::Object(outer) = &value {
                check_error_code(stage, outer)?;
            }
            ScoreBody::decode(value).into_payload()
        }
        Stage::Gtp | Stage::Model => value,
    };

    match value {
        Value::Object(map) => Ok(StageOutput::new(map)),
        other => Err(DomainError::EngineProtocol {
            stage,
            detail: format!("expected a JSON object, got {}", truncate_body(&other.to_string())),
        }),
    }
}

fn check_error_code(stage: Stage, body: &Map<String, Value>) -> Result<(), DomainError> {
    match error_code_in(body) {
        0 => Ok(()),
        code => Err(DomainError::EngineStage {
            stage,
            detail: format!(
                "error code {}: {}",
                code,
                truncate_body(&Value::Object(body.clone()).to_string())
            ),
        }),
    }
}

/// Reject engine-reported failures and responses missing required fields.
fn validate(stage: Stage, output: StageOutput) -> Result<StageOutput, DomainError> {
    check_error_code(stage, output.as_map())?;

    let missing = output.missing_fields(stage);
    if !missing.is_empty() {
        return Err(DomainError::EngineStage {
            stage,
            detail: format!(
                "missing required field(s) {}: {}",
                missing.join(", "),
                truncate_body(&Value::Object(output.as_map().clone()).to_string())
            ),
        });
    }

    Ok(output)
}

#[async_trait]
impl EngineStageClient for HttpEngineClient {
    async fn call(&self, stage: Stage, payload: StagePayload) -> Result<StageOutput, DomainError> {
        let url = self.endpoint_url(payload.endpoint(stage));
        let request = self.build_request(stage, &url, payload)?;

        debug!(stage = %stage, url = %url, "Calling engine stage");
        let started = Instant::now();

        let response = request.send().await.map_err(|e| {
            warn!(stage = %stage, url = %url, error = %e, "Engine stage transport failure");
            transport_error(stage, e)
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                transport_error(stage, e)
            } else {
                DomainError::EngineProtocol {
                    stage,
                    detail: format!("incomplete response body: {}", e),
                }
            }
        })?;

        if !status.is_success() {
            warn!(stage = %stage, status = status.as_u16(), "Engine stage returned error status");
            return Err(DomainError::EngineHttp {
                stage,
                status: status.as_u16(),
                body: truncate_body(&String::from_utf8_lossy(&body)),
            });
        }

        let output = validate(stage, decode_body(stage, &body)?)?;

        debug!(
            stage = %stage,
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = body.len(),
            "Engine stage completed"
        );
        Ok(output)
    }
}
