use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::TempPath;
use tracing::{debug, warn};

/// Result of preprocessing one input file.
///
/// Owns the transcoded WAV (if one was produced) and deletes it on drop. The original input
/// is never owned and never deleted.
#[derive(Debug)]
pub struct PreparedAudio {
    path: PathBuf,
    converted: Option<TempPath>,
    fallback_reason: Option<String>,
}

impl PreparedAudio {
    /// A file this run created, removed when this value is dropped.
    pub fn converted(output: TempPath) -> Self {
        Self {
            path: output.to_path_buf(),
            converted: Some(output),
            fallback_reason: None,
        }
    }

    /// Conversion failed; the original input is used unchanged and left in place.
    pub fn fallback(original: &Path, reason: impl Into<String>) -> Self {
        Self {
            path: original.to_path_buf(),
            converted: None,
            fallback_reason: Some(reason.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }

    /// Note recorded in the evaluation result when the fallback was taken.
    pub fn diagnostic(&self) -> Option<String> {
        self.fallback_reason
            .as_ref()
            .map(|reason| format!("audio conversion failed, original file sent unconverted: {}", reason))
    }
}

impl Drop for PreparedAudio {
    fn drop(&mut self) {
        let Some(output) = self.converted.take() else {
            return;
        };
        match output.close() {
            Ok(()) => debug!(path = ?self.path, "Removed transcoded audio"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = ?self.path, error = %e, "Failed to remove transcoded audio"),
        }
    }
}

/// Port for turning arbitrary recordings into the engine's PCM WAV format.
#[async_trait]
pub trait AudioPreprocessor: Send + Sync {
    /// Convert `input` to 16-bit mono PCM WAV.
    ///
    /// Never fails: when conversion is impossible the original path comes back with a
    /// fallback reason attached.
    async fn preprocess(&self, input: &Path) -> PreparedAudio;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converted_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let output = tempfile::NamedTempFile::new_in(dir.path()).unwrap().into_temp_path();
        std::fs::write(&output, b"RIFF").unwrap();
        let path = output.to_path_buf();

        let prepared = PreparedAudio::converted(output);
        assert_eq!(prepared.path(), path.as_path());
        assert!(!prepared.is_fallback());
        assert!(prepared.diagnostic().is_none());
        drop(prepared);

        assert!(!path.exists());
    }

    #[test]
    fn test_fallback_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.webm");
        std::fs::write(&path, b"webm").unwrap();

        let prepared = PreparedAudio::fallback(&path, "ffmpeg not found");
        assert_eq!(prepared.path(), path.as_path());
        assert_eq!(prepared.fallback_reason(), Some("ffmpeg not found"));
        assert!(prepared.diagnostic().unwrap().contains("ffmpeg not found"));
        drop(prepared);

        assert!(path.exists());
    }
}
