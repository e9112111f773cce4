use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::domain::correlation::CorrelationId;
use crate::domain::error::DomainError;
use crate::domain::scoring::{Grade, ScoreSummary, SentenceScore};
use crate::domain::stage::FailedStage;

/// Recorded learner audio. Wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AudioPayload {
    bytes: Vec<u8>,
    file_name: String,
}

impl AudioPayload {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// File name reported in multipart uploads.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for AudioPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioPayload")
            .field("len", &self.bytes.len())
            .field("file_name", &self.file_name)
            .finish()
    }
}

/// Input of one pipeline run. Owned by that run alone.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub text: String,
    pub audio: AudioPayload,
    /// Notes from earlier steps (e.g. an audio conversion fallback) carried into the result.
    pub diagnostics: Vec<String>,
}

impl EvaluationRequest {
    pub fn new(text: impl Into<String>, audio: AudioPayload) -> Self {
        Self {
            text: text.into(),
            audio,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostic(mut self, note: impl Into<String>) -> Self {
        self.diagnostics.push(note.into());
        self
    }
}

/// Outcome of one evaluation. Built once, never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub success: bool,
    pub score: Option<f64>,
    pub feedback: Option<String>,
    pub grade: Option<Grade>,
    pub sentences: Vec<SentenceScore>,
    /// Score-stage body on success, error description on failure.
    pub raw_detail: Value,
    pub failed_stage: Option<FailedStage>,
    pub correlation_id: Option<CorrelationId>,
    pub diagnostics: Vec<String>,
}

impl EvaluationResult {
    pub fn succeeded(
        correlation_id: CorrelationId,
        summary: ScoreSummary,
        raw_detail: Value,
        diagnostics: Vec<String>,
    ) -> Self {
        let grade = Grade::from_score(summary.score);
        Self {
            success: true,
            score: Some(summary.score),
            feedback: Some(grade.feedback().to_string()),
            grade: Some(grade),
            sentences: summary.sentences,
            raw_detail,
            failed_stage: None,
            correlation_id: Some(correlation_id),
            diagnostics,
        }
    }

    pub fn failed(
        stage: FailedStage,
        correlation_id: Option<CorrelationId>,
        error: &DomainError,
        diagnostics: Vec<String>,
    ) -> Self {
        Self {
            success: false,
            score: None,
            feedback: None,
            grade: None,
            sentences: Vec::new(),
            raw_detail: error_detail(error, &diagnostics),
            failed_stage: Some(stage),
            correlation_id,
            diagnostics,
        }
    }
}

fn error_detail(error: &DomainError, diagnostics: &[String]) -> Value {
    let mut detail = Map::new();
    detail.insert("error".to_string(), json!(error.kind()));
    detail.insert("message".to_string(), json!(error.to_string()));

    match error {
        DomainError::EngineHttp { status, body, .. } => {
            detail.insert("status".to_string(), json!(status));
            detail.insert("body".to_string(), json!(body));
        }
        DomainError::EngineStage { detail: d, .. } | DomainError::EngineProtocol { detail: d, .. } => {
            detail.insert("detail".to_string(), json!(d));
        }
        _ => {}
    }

    if !diagnostics.is_empty() {
        detail.insert("diagnostics".to_string(), json!(diagnostics));
    }
    Value::Object(detail)
}
