use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::domain::error::truncate_body;
use crate::domain::stage::fields;
use crate::domain::{
    extract_score, normalize_text, AudioPayload, CorrelationId, DomainError, EvaluationRequest,
    EvaluationResult, FailedStage, ScoreSummary, ScoreTransport, Stage, StageOutput,
};
use crate::ports::{EngineStageClient, StagePayload};

/// Syllable fields produced by GTP and forwarded, untouched, to the later stages.
#[derive(Debug, Clone)]
struct Syllables {
    letters: Value,
    phonemes: Value,
}

impl Syllables {
    fn from_gtp(output: &StageOutput) -> Result<Self, DomainError> {
        let letters = output.get_present(fields::SYLL_LTRS_ALIASES);
        let phonemes = output.get_present(fields::SYLL_PHNS_ALIASES);
        match (letters, phonemes) {
            (Some(letters), Some(phonemes)) => Ok(Self {
                letters: letters.clone(),
                phonemes: phonemes.clone(),
            }),
            _ => Err(DomainError::EngineStage {
                stage: Stage::Gtp,
                detail: "response has no syllable letters/phonemes".to_string(),
            }),
        }
    }

    /// The model stage may echo the syllables back; echoed values win.
    fn refined_by(self, model: &StageOutput) -> Self {
        Self {
            letters: model
                .get_present(fields::SYLL_LTRS_ALIASES)
                .cloned()
                .unwrap_or(self.letters),
            phonemes: model
                .get_present(fields::SYLL_PHNS_ALIASES)
                .cloned()
                .unwrap_or(self.phonemes),
        }
    }
}

/// States of one run. `ScoreDone` and `Failed` are terminal.
#[derive(Debug)]
enum RunState {
    Init {
        text: String,
    },
    Normalized {
        id: CorrelationId,
        text: String,
    },
    GtpDone {
        id: CorrelationId,
        text: String,
        syllables: Syllables,
    },
    ModelDone {
        id: CorrelationId,
        text: String,
        syllables: Syllables,
        fst: Value,
    },
    ScoreDone {
        id: CorrelationId,
        summary: ScoreSummary,
        raw: Value,
    },
    Failed {
        stage: FailedStage,
        id: Option<CorrelationId>,
        error: DomainError,
    },
}

/// How far a run got, readable after the run future is dropped.
#[derive(Debug, Default)]
struct Progress {
    stage: AtomicU8,
    correlation_id: Mutex<Option<CorrelationId>>,
}

impl Progress {
    fn start(&self, id: &CorrelationId) {
        *self.correlation_id.lock() = Some(id.clone());
    }

    fn enter(&self, stage: Stage) {
        let code = match stage {
            Stage::Gtp => 0,
            Stage::Model => 1,
            Stage::Score => 2,
        };
        self.stage.store(code, Ordering::SeqCst);
    }

    fn current(&self) -> Stage {
        match self.stage.load(Ordering::SeqCst) {
            0 => Stage::Gtp,
            1 => Stage::Model,
            _ => Stage::Score,
        }
    }

    fn correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id.lock().clone()
    }
}

/// Runs GTP, model and score strictly in order, feeding each stage's output into the next.
///
/// Holds no per-run state, so one instance serves any number of concurrent runs.
pub struct PipelineOrchestrator {
    engine: Arc<dyn EngineStageClient>,
    transport: ScoreTransport,
}

impl PipelineOrchestrator {
    pub fn new(engine: Arc<dyn EngineStageClient>, transport: ScoreTransport) -> Self {
        Self { engine, transport }
    }

    /// Execute one run to completion. Never retries a stage.
    pub async fn evaluate(&self, request: EvaluationRequest) -> EvaluationResult {
        let progress = Progress::default();
        self.run(request, &progress)
            .instrument(info_span!("evaluation", correlation_id = tracing::field::Empty))
            .await
    }

    /// Execute one run, abandoning it as a whole if `cancel` resolves first.
    ///
    /// A partially completed run is never resumed; the error names the stage in flight.
    pub async fn evaluate_until<F>(
        &self,
        request: EvaluationRequest,
        cancel: F,
    ) -> Result<EvaluationResult, DomainError>
    where
        F: Future<Output = ()>,
    {
        self.evaluate_or_abandon(request, cancel, "cancelled by caller".to_string())
            .await
    }

    /// Execute one run within `budget`.
    pub async fn evaluate_with_timeout(
        &self,
        request: EvaluationRequest,
        budget: Duration,
    ) -> Result<EvaluationResult, DomainError> {
        let reason = format!("run exceeded {}ms budget", budget.as_millis());
        self.evaluate_or_abandon(request, tokio::time::sleep(budget), reason)
            .await
    }

    async fn evaluate_or_abandon<F>(
        &self,
        request: EvaluationRequest,
        cancel: F,
        reason: String,
    ) -> Result<EvaluationResult, DomainError>
    where
        F: Future<Output = ()>,
    {
        let progress = Progress::default();
        let span = info_span!("evaluation", correlation_id = tracing::field::Empty);
        let diagnostics = request.diagnostics.clone();

        tokio::select! {
            result = self.run(request, &progress).instrument(span) => Ok(result),
            _ = cancel => {
                let stage = progress.current();
                let correlation_id = progress.correlation_id();
                warn!(
                    stage = %stage,
                    correlation_id = correlation_id.as_ref().map(|id| id.as_str()),
                    reason = %reason,
                    "Evaluation abandoned"
                );
                Err(DomainError::Abandoned {
                    stage,
                    reason,
                    correlation_id,
                    diagnostics,
                })
            }
        }
    }

    async fn run(&self, request: EvaluationRequest, progress: &Progress) -> EvaluationResult {
        let EvaluationRequest {
            text,
            audio,
            diagnostics,
        } = request;

        let mut state = RunState::Init { text };
        loop {
            state = match state {
                RunState::Init { text } => Self::normalize(text, &audio),
                RunState::Normalized { id, text } => {
                    progress.start(&id);
                    progress.enter(Stage::Gtp);
                    self.gtp(id, text).await
                }
                RunState::GtpDone {
                    id,
                    text,
                    syllables,
                } => {
                    progress.enter(Stage::Model);
                    self.model(id, text, syllables).await
                }
                RunState::ModelDone {
                    id,
                    text,
                    syllables,
                    fst,
                } => {
                    progress.enter(Stage::Score);
                    self.score(id, text, syllables, fst, &audio).await
                }
                RunState::ScoreDone { id, summary, raw } => {
                    info!(score = summary.score, "Evaluation succeeded");
                    return EvaluationResult::succeeded(id, summary, raw, diagnostics);
                }
                RunState::Failed { stage, id, error } => {
                    warn!(stage = %stage, error = %error, "Evaluation failed");
                    return EvaluationResult::failed(stage, id, &error, diagnostics);
                }
            };
        }
    }

    fn normalize(text: String, audio: &AudioPayload) -> RunState {
        let text = normalize_text(&text);
        let invalid = if text.is_empty() {
            Some("text is empty after normalization")
        } else if audio.is_empty() {
            Some("audio is empty")
        } else {
            None
        };
        if let Some(reason) = invalid {
            return RunState::Failed {
                stage: FailedStage::Input,
                id: None,
                error: DomainError::InvalidInput(reason.to_string()),
            };
        }

        let id = CorrelationId::generate();
        Span::current().record("correlation_id", id.as_str());
        info!(text_chars = text.chars().count(), audio_bytes = audio.len(), "Evaluation started");
        RunState::Normalized { id, text }
    }

    async fn gtp(&self, id: CorrelationId, text: String) -> RunState {
        let body = base_body(&id, &text);
        let syllables = self
            .engine
            .call(Stage::Gtp, StagePayload::Json(body))
            .await
            .and_then(|output| Syllables::from_gtp(&output));

        match syllables {
            Ok(syllables) => {
                debug!("GTP stage done");
                RunState::GtpDone {
                    id,
                    text,
                    syllables,
                }
            }
            Err(error) => failed(Stage::Gtp, id, error),
        }
    }

    async fn model(&self, id: CorrelationId, text: String, syllables: Syllables) -> RunState {
        let mut body = base_body(&id, &text);
        insert_syllables(&mut body, &syllables);

        let output = match self.engine.call(Stage::Model, StagePayload::Json(body)).await {
            Ok(output) => output,
            Err(error) => return failed(Stage::Model, id, error),
        };

        let Some(fst) = output.get_present(fields::FST_ALIASES).cloned() else {
            let error = DomainError::EngineStage {
                stage: Stage::Model,
                detail: "response has no fst model".to_string(),
            };
            return failed(Stage::Model, id, error);
        };

        debug!("Model stage done");
        RunState::ModelDone {
            id,
            text,
            syllables: syllables.refined_by(&output),
            fst,
        }
    }

    async fn score(
        &self,
        id: CorrelationId,
        text: String,
        syllables: Syllables,
        fst: Value,
        audio: &AudioPayload,
    ) -> RunState {
        let mut body = base_body(&id, &text);
        insert_syllables(&mut body, &syllables);
        body.insert(fields::FST.to_string(), fst);

        let payload = match self.transport {
            ScoreTransport::Json => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(audio.bytes());
                body.insert(fields::WAV_USR.to_string(), Value::String(encoded));
                StagePayload::Json(body)
            }
            ScoreTransport::File => StagePayload::Multipart {
                config: body,
                audio: audio.clone(),
            },
        };

        let raw = match self.engine.call(Stage::Score, payload).await {
            Ok(output) => output.into_value(),
            Err(error) => return failed(Stage::Score, id, error),
        };

        match extract_score(&raw) {
            Some(summary) => RunState::ScoreDone { id, summary, raw },
            None => {
                let error = DomainError::EngineStage {
                    stage: Stage::Score,
                    detail: format!("response has no numeric score: {}", truncate_body(&raw.to_string())),
                };
                failed(Stage::Score, id, error)
            }
        }
    }
}

fn failed(stage: Stage, id: CorrelationId, error: DomainError) -> RunState {
    RunState::Failed {
        stage: stage.into(),
        id: Some(id),
        error,
    }
}

fn base_body(id: &CorrelationId, text: &str) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert(fields::ID.to_string(), json!(id.as_str()));
    body.insert(fields::TEXT.to_string(), json!(text));
    body
}

fn insert_syllables(body: &mut Map<String, Value>, syllables: &Syllables) {
    body.insert(fields::SYLL_LTRS.to_string(), syllables.letters.clone());
    body.insert(fields::SYLL_PHNS.to_string(), syllables.phonemes.clone());
}
