use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::{AudioPayload, DomainError, Stage, StageOutput};

/// Body of one stage request.
#[derive(Debug, Clone)]
pub enum StagePayload {
    /// JSON object body.
    Json(Map<String, Value>),
    /// Multipart body: a `config` text part with `config` serialized as JSON, plus the WAV
    /// as a file part. Only meaningful for the score stage.
    Multipart {
        config: Map<String, Value>,
        audio: AudioPayload,
    },
}

impl StagePayload {
    /// Path suffix appended to the engine base URL.
    pub fn endpoint(&self, stage: Stage) -> &'static str {
        match (stage, self) {
            (Stage::Gtp, _) => "/gtp",
            (Stage::Model, _) => "/model",
            (Stage::Score, StagePayload::Json(_)) => "/scorejson",
            (Stage::Score, StagePayload::Multipart { .. }) => "/scorefile",
        }
    }
}

/// One HTTP exchange with the scoring engine.
///
/// Implementations never retry. Each failure class maps to its own [`DomainError`] variant:
/// transport problems to `EngineUnreachable`, non-2xx to `EngineHttp`, undecodable bodies to
/// `EngineProtocol`, and engine-reported errors or missing required fields to `EngineStage`.
#[async_trait]
pub trait EngineStageClient: Send + Sync {
    async fn call(&self, stage: Stage, payload: StagePayload) -> Result<StageOutput, DomainError>;
}
