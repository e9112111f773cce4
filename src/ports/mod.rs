pub mod audio;
pub mod config;
pub mod engine;

pub use audio::{AudioPreprocessor, PreparedAudio};
pub use config::ConfigStore;
pub use engine::{EngineStageClient, StagePayload};
