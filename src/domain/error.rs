use thiserror::Error;

use crate::domain::correlation::CorrelationId;
use crate::domain::stage::Stage;

/// Longest error body kept from a failed engine response.
pub const MAX_ERROR_BODY_CHARS: usize = 800;

/// Domain-level errors for PronScore.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Audio conversion failed: {0}")]
    AudioConversion(String),

    #[error("Engine unreachable during {stage}: {reason}")]
    EngineUnreachable { stage: Stage, reason: String },

    #[error("Engine returned HTTP {status} during {stage}: {body}")]
    EngineHttp {
        stage: Stage,
        status: u16,
        body: String,
    },

    #[error("Engine response for {stage} could not be decoded: {detail}")]
    EngineProtocol { stage: Stage, detail: String },

    #[error("Engine rejected {stage}: {detail}")]
    EngineStage { stage: Stage, detail: String },

    /// The caller gave up on a run. Carries what the run had produced so far.
    #[error("Evaluation abandoned during {stage}: {reason}")]
    Abandoned {
        stage: Stage,
        reason: String,
        correlation_id: Option<CorrelationId>,
        diagnostics: Vec<String>,
    },
}

impl DomainError {
    /// Engine stage the error belongs to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            DomainError::EngineUnreachable { stage, .. }
            | DomainError::EngineHttp { stage, .. }
            | DomainError::EngineProtocol { stage, .. }
            | DomainError::EngineStage { stage, .. }
            | DomainError::Abandoned { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Short machine-readable kind, used in result details.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::Config(_) => "config",
            DomainError::Serialization(_) => "serialization",
            DomainError::Io(_) => "io",
            DomainError::InvalidInput(_) => "invalid_input",
            DomainError::AudioConversion(_) => "audio_conversion_failed",
            DomainError::EngineUnreachable { .. } => "engine_unreachable",
            DomainError::EngineHttp { .. } => "engine_http_error",
            DomainError::EngineProtocol { .. } => "engine_protocol_error",
            DomainError::EngineStage { .. } => "engine_stage_error",
            DomainError::Abandoned { .. } => "abandoned",
        }
    }
}

/// Cut an engine body down to [`MAX_ERROR_BODY_CHARS`].
pub fn truncate_body(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((idx, _)) => format!("{}...(truncated)", &body[..idx]),
        None => body.to_string(),
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for DomainError {
    fn from(err: toml::de::Error) -> Self {
        DomainError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DomainError {
    fn from(err: toml::ser::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body_keeps_short_bodies() {
        assert_eq!(truncate_body("  oops \n"), "oops");
    }

    #[test]
    fn test_truncate_body_cuts_on_char_boundary() {
        let body = "가".repeat(MAX_ERROR_BODY_CHARS + 5);
        let cut = truncate_body(&body);
        assert!(cut.ends_with("...(truncated)"));
        assert_eq!(cut.chars().filter(|c| *c == '가').count(), MAX_ERROR_BODY_CHARS);
    }

    #[test]
    fn test_stage_and_kind() {
        let err = DomainError::EngineHttp {
            stage: Stage::Score,
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.stage(), Some(Stage::Score));
        assert_eq!(err.kind(), "engine_http_error");
        assert!(DomainError::Config("x".into()).stage().is_none());
    }
}
