use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempPath;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::domain::{AudioConfig, DomainError};
use crate::ports::{AudioPreprocessor, PreparedAudio};

/// Transcodes recordings to 16-bit mono PCM WAV with an external ffmpeg process.
pub struct FfmpegPreprocessor {
    config: AudioConfig,
}

impl FfmpegPreprocessor {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Create an empty, uniquely named `<stem>.<random>.wav` next to `input`.
    ///
    /// The file belongs to one run; existing siblings such as `<stem>.wav` are never reused.
    pub fn allocate_output(input: &Path) -> Result<TempPath, DomainError> {
        let parent = match input.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        let file = tempfile::Builder::new()
            .prefix(&format!("{}.", stem))
            .suffix(".wav")
            .tempfile_in(parent)
            .map_err(|e| {
                DomainError::AudioConversion(format!(
                    "cannot create output next to {}: {}",
                    input.display(),
                    e
                ))
            })?;
        Ok(file.into_temp_path())
    }

    /// Transcode `input` into a fresh sibling file. On error the partial output is removed.
    async fn transcode(&self, input: &Path) -> Result<TempPath, DomainError> {
        if !input.is_file() {
            return Err(DomainError::AudioConversion(format!(
                "input file not found: {}",
                input.display()
            )));
        }

        let output = Self::allocate_output(input)?;
        let sample_rate = self.config.sample_rate.to_string();
        let mut command = Command::new(&self.config.ffmpeg_path);
        command
            .args(["-nostdin", "-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(input)
            .args(["-ar", sample_rate.as_str(), "-ac", "1", "-acodec", "pcm_s16le", "-f", "wav"])
            .arg(output.as_os_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(input = ?input, output = ?output, "Starting audio transcode");

        let budget = Duration::from_secs(self.config.conversion_timeout_secs);
        let result = tokio::time::timeout(budget, command.output())
            .await
            .map_err(|_| {
                DomainError::AudioConversion(format!(
                    "transcoder timed out after {}s",
                    self.config.conversion_timeout_secs
                ))
            })?
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => DomainError::AudioConversion(format!(
                    "transcoder '{}' not found",
                    self.config.ffmpeg_path
                )),
                _ => DomainError::AudioConversion(format!("failed to start transcoder: {}", e)),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
            return Err(DomainError::AudioConversion(format!(
                "transcoder exited with {}: {}",
                result.status,
                last_line.trim()
            )));
        }

        if self.config.verify_output {
            self.verify(&output)?;
        }
        Ok(output)
    }

    /// Check the transcoded header matches what the engine expects.
    fn verify(&self, output: &Path) -> Result<(), DomainError> {
        let reader = hound::WavReader::open(output)
            .map_err(|e| DomainError::AudioConversion(format!("unreadable WAV output: {}", e)))?;
        let spec = reader.spec();

        if spec.channels != 1
            || spec.sample_rate != self.config.sample_rate
            || spec.bits_per_sample != 16
            || spec.sample_format != hound::SampleFormat::Int
        {
            return Err(DomainError::AudioConversion(format!(
                "unexpected WAV format: {} Hz, {} channel(s), {}-bit {:?}",
                spec.sample_rate, spec.channels, spec.bits_per_sample, spec.sample_format
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AudioPreprocessor for FfmpegPreprocessor {
    async fn preprocess(&self, input: &Path) -> PreparedAudio {
        match self.transcode(input).await {
            Ok(output) => {
                info!(input = ?input, output = ?output, "Audio transcoded");
                PreparedAudio::converted(output)
            }
            Err(e) => {
                warn!(input = ?input, error = %e, "Audio conversion failed, using original file");
                PreparedAudio::fallback(input, e.to_string())
            }
        }
    }
}
