use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::domain::{AppConfig, DomainError};
use crate::ports::ConfigStore;

const APP_DIR: &str = "PronScore";
const CONFIG_FILE: &str = "config.toml";

/// TOML-based configuration store.
pub struct TomlConfigStore {
    data_dir: PathBuf,
    logs_dir: PathBuf,
}

impl TomlConfigStore {
    /// Store under the OS configuration directory:
    /// - macOS: ~/Library/Application Support/PronScore/
    /// - Windows: %APPDATA%\PronScore\
    /// - Linux: ~/.config/PronScore/
    pub fn new() -> Result<Self, DomainError> {
        let data_dir = dirs::config_dir()
            .map(|p| p.join(APP_DIR))
            .ok_or_else(|| DomainError::Config("Could not find application data directory".to_string()))?;
        let logs_dir = dirs::data_local_dir()
            .map(|p| p.join(APP_DIR).join("logs"))
            .unwrap_or_else(|| data_dir.join("logs"));
        Self::open(data_dir, logs_dir)
    }

    /// Store rooted at an explicit directory; logs go to `<dir>/logs`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Result<Self, DomainError> {
        let data_dir = data_dir.into();
        let logs_dir = data_dir.join("logs");
        Self::open(data_dir, logs_dir)
    }

    fn open(data_dir: PathBuf, logs_dir: PathBuf) -> Result<Self, DomainError> {
        fs::create_dir_all(&data_dir)?;
        info!(data_dir = ?data_dir, "ConfigStore initialized");
        Ok(Self { data_dir, logs_dir })
    }

    fn write_defaults(&self, path: &Path) -> Result<AppConfig, DomainError> {
        let config = AppConfig::new();
        self.save(&config)?;
        info!(path = ?path, "Wrote default configuration");
        Ok(config)
    }
}

impl ConfigStore for TomlConfigStore {
    fn load(&self) -> Result<AppConfig, DomainError> {
        let path = self.config_path();

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return self.write_defaults(&path),
            Err(e) => return Err(e.into()),
        };

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| DomainError::Config(format!("{}: {}", path.display(), e)))?;
        debug!(path = ?path, base_url = %config.engine.base_url, "Configuration loaded");
        Ok(config)
    }

    /// Replaces `config.toml` atomically.
    fn save(&self, config: &AppConfig) -> Result<(), DomainError> {
        let path = self.config_path();
        let content = toml::to_string_pretty(config)?;

        fs::create_dir_all(&self.data_dir)?;
        let mut staged = tempfile::NamedTempFile::new_in(&self.data_dir)?;
        staged.write_all(content.as_bytes())?;
        staged
            .persist(&path)
            .map_err(|e| DomainError::Io(format!("{}: {}", path.display(), e.error)))?;

        debug!(path = ?path, "Configuration saved");
        Ok(())
    }

    fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    fn logs_dir(&self) -> PathBuf {
        self.logs_dir.clone()
    }
}
