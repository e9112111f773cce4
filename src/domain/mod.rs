pub mod config;
pub mod correlation;
pub mod error;
pub mod evaluation;
pub mod scoring;
pub mod stage;
pub mod text;

pub use config::{AppConfig, AudioConfig, EngineConfig, LoggingConfig, ScoreTransport};
pub use correlation::CorrelationId;
pub use error::DomainError;
pub use evaluation::{AudioPayload, EvaluationRequest, EvaluationResult};
pub use scoring::{extract_score, Grade, ScoreBody, ScoreSummary, SentenceScore};
pub use stage::{FailedStage, Stage, StageOutput};
pub use text::normalize_text;
