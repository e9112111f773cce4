use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use crate::adapters::{FfmpegPreprocessor, HttpEngineClient, TomlConfigStore};
use crate::app::pipeline::PipelineOrchestrator;
use crate::domain::{
    AppConfig, AudioPayload, DomainError, EvaluationRequest, EvaluationResult, FailedStage,
    ScoreTransport,
};
use crate::infrastructure::init_logging;
use crate::ports::{AudioPreprocessor, ConfigStore, EngineStageClient};

/// Startup overrides applied on top of the stored configuration.
#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    /// Use this directory instead of the OS config directory.
    pub data_dir: Option<PathBuf>,
    pub engine_url: Option<String>,
    pub score_transport: Option<ScoreTransport>,
    pub run_timeout_secs: Option<u64>,
    pub log_level: Option<String>,
}

/// Wires configuration, logging, the engine client, the preprocessor and the pipeline,
/// and exposes the two caller entry points (file on disk, bytes in memory).
pub struct AppController {
    config: AppConfig,
    config_store: Option<Arc<TomlConfigStore>>,
    pipeline: PipelineOrchestrator,
    preprocessor: Arc<dyn AudioPreprocessor>,
    _log_guard: Option<WorkerGuard>,
}

impl AppController {
    /// Initialize the application controller.
    /// Configuration is fixed after this returns.
    pub fn new(options: ControllerOptions) -> Result<Self, DomainError> {
        // Step 1: Initialize config store
        let config_store = Arc::new(match &options.data_dir {
            Some(dir) => TomlConfigStore::with_data_dir(dir)?,
            None => TomlConfigStore::new()?,
        });

        // Step 2: Load configuration and apply overrides
        let config = config_store.load_effective(|c| Self::apply_options(c, &options))?;

        // Step 3: Initialize logging
        let log_guard = init_logging(
            &config_store.logs_dir(),
            &config.logging.level,
            config.logging.file_logging,
            config.logging.max_files,
        )?;

        info!("PronScore starting up");

        // Step 4: Build the engine client and preprocessor
        let engine: Arc<dyn EngineStageClient> = Arc::new(HttpEngineClient::new(&config.engine)?);
        let preprocessor: Arc<dyn AudioPreprocessor> =
            Arc::new(FfmpegPreprocessor::new(&config.audio));

        let mut controller = Self::from_parts(config, engine, preprocessor);
        controller.config_store = Some(config_store);
        controller._log_guard = log_guard;

        info!(
            base_url = %controller.config.engine.base_url,
            "AppController initialized"
        );
        Ok(controller)
    }

    /// Assemble a controller from explicit collaborators, without touching disk or logging.
    pub fn from_parts(
        config: AppConfig,
        engine: Arc<dyn EngineStageClient>,
        preprocessor: Arc<dyn AudioPreprocessor>,
    ) -> Self {
        let pipeline = PipelineOrchestrator::new(engine, config.engine.score_transport);
        Self {
            config,
            config_store: None,
            pipeline,
            preprocessor,
            _log_guard: None,
        }
    }

    fn apply_options(config: &mut AppConfig, options: &ControllerOptions) {
        if let Some(url) = &options.engine_url {
            config.engine.base_url = url.clone();
        }
        if let Some(transport) = options.score_transport {
            config.engine.score_transport = transport;
        }
        if let Some(secs) = options.run_timeout_secs {
            config.engine.run_timeout_secs = Some(secs);
        }
        if let Some(level) = &options.log_level {
            config.logging.level = level.clone();
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &PipelineOrchestrator {
        &self.pipeline
    }

    /// Evaluate a recording already on disk.
    ///
    /// The transcoded copy is deleted before this returns. Only an abandoned run
    /// (run budget exceeded) is an `Err`; every other failure is a failed result.
    pub async fn evaluate_file(
        &self,
        text: &str,
        audio_path: &Path,
    ) -> Result<EvaluationResult, DomainError> {
        let prepared = self.preprocessor.preprocess(audio_path).await;

        let bytes = match tokio::fs::read(prepared.path()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let error = DomainError::InvalidInput(format!(
                    "cannot read audio {}: {}",
                    prepared.path().display(),
                    e
                ));
                warn!(error = %error, "Evaluation rejected");
                let diagnostics = prepared.diagnostic().into_iter().collect();
                return Ok(EvaluationResult::failed(FailedStage::Input, None, &error, diagnostics));
            }
        };

        let file_name = prepared
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());

        let mut request = EvaluationRequest::new(text, AudioPayload::new(bytes, file_name));
        if let Some(note) = prepared.diagnostic() {
            request = request.with_diagnostic(note);
        }

        match self.config.engine.run_timeout() {
            Some(budget) => self.pipeline.evaluate_with_timeout(request, budget).await,
            None => Ok(self.pipeline.evaluate(request).await),
        }
    }

    /// Evaluate an uploaded recording held in memory.
    ///
    /// `extension` (e.g. `webm`) names the container so the transcoder can probe it. The
    /// scratch copy and its transcoded sibling are removed on every path.
    pub async fn evaluate_bytes(
        &self,
        text: &str,
        bytes: &[u8],
        extension: &str,
    ) -> Result<EvaluationResult, DomainError> {
        let extension = extension.trim().trim_start_matches('.');
        let suffix = if extension.is_empty() {
            String::new()
        } else {
            format!(".{}", extension)
        };

        let mut scratch = tempfile::Builder::new()
            .prefix("pronscore_up_")
            .suffix(&suffix)
            .tempfile()?;
        scratch.write_all(bytes)?;
        scratch.flush()?;

        self.evaluate_file(text, scratch.path()).await
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> Option<String> {
        self.config_store
            .as_ref()
            .map(|s| s.data_dir().to_string_lossy().to_string())
    }

    /// Get the logs directory path.
    pub fn logs_dir(&self) -> Option<String> {
        self.config_store
            .as_ref()
            .map(|s| s.logs_dir().to_string_lossy().to_string())
    }

    /// Get the config file path.
    pub fn config_path(&self) -> Option<String> {
        self.config_store
            .as_ref()
            .map(|s| s.config_path().to_string_lossy().to_string())
    }
}
