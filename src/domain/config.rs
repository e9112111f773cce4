use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::error::DomainError;
use crate::domain::stage::Stage;

/// Environment variable overriding [`EngineConfig::base_url`].
pub const ENGINE_URL_ENV: &str = "SPEECHPRO_ENGINE_URL";

/// How the score stage carries the audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreTransport {
    /// Base64 WAV inside a JSON body, posted to `/scorejson`.
    #[default]
    Json,
    /// Multipart upload of the raw WAV, posted to `/scorefile`.
    File,
}

impl std::str::FromStr for ScoreTransport {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ScoreTransport::Json),
            "file" => Ok(ScoreTransport::File),
            other => Err(DomainError::Config(format!(
                "Unknown score transport '{}' (expected 'json' or 'file')",
                other
            ))),
        }
    }
}

/// Scoring engine connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL; stage suffixes (`/gtp`, `/model`, ...) are appended to it.
    pub base_url: String,
    /// TCP connect timeout for every stage.
    pub connect_timeout_secs: u64,
    pub gtp_timeout_secs: u64,
    pub model_timeout_secs: u64,
    /// The score stage uploads audio, so it gets a longer budget.
    pub score_timeout_secs: u64,
    pub score_transport: ScoreTransport,
    /// Budget for a whole run. `None` disables it.
    pub run_timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://112.220.79.222:33005/speechpro".to_string(),
            connect_timeout_secs: 5,
            gtp_timeout_secs: 10,
            model_timeout_secs: 10,
            score_timeout_secs: 30,
            score_transport: ScoreTransport::Json,
            run_timeout_secs: Some(60),
        }
    }
}

impl EngineConfig {
    /// Request timeout for one stage.
    pub fn stage_timeout(&self, stage: Stage) -> Duration {
        let secs = match stage {
            Stage::Gtp => self.gtp_timeout_secs,
            Stage::Model => self.model_timeout_secs,
            Stage::Score => self.score_timeout_secs,
        };
        Duration::from_secs(secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| DomainError::Config(format!("Invalid engine base_url '{}': {}", self.base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DomainError::Config(format!(
                "Engine base_url must be http(s), got '{}'",
                url.scheme()
            )));
        }

        let timeouts = [
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("gtp_timeout_secs", self.gtp_timeout_secs),
            ("model_timeout_secs", self.model_timeout_secs),
            ("score_timeout_secs", self.score_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, v)| *v == 0) {
            return Err(DomainError::Config(format!("{} must be greater than zero", name)));
        }
        if self.run_timeout_secs == Some(0) {
            return Err(DomainError::Config(
                "run_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Audio preprocessing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Transcoder executable (looked up on PATH when not absolute).
    pub ffmpeg_path: String,
    /// Target sample rate in Hz.
    pub sample_rate: u32,
    pub conversion_timeout_secs: u64,
    /// Check the transcoded file's WAV header before using it.
    pub verify_output: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            sample_rate: 16000,
            conversion_timeout_secs: 30,
            verify_output: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Enable file logging with rotation.
    pub file_logging: bool,
    /// Maximum number of log files to keep.
    pub max_files: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: false,
            max_files: 7,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub audio: AudioConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Create a new AppConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply [`ENGINE_URL_ENV`] if it is set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        self.apply_engine_url(std::env::var(ENGINE_URL_ENV).ok());
    }

    fn apply_engine_url(&mut self, url: Option<String>) {
        if let Some(url) = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
            self.engine.base_url = url;
        }
    }
}
