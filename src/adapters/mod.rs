pub mod config_store;
pub mod engine_client;
pub mod ffmpeg;

pub use config_store::TomlConfigStore;
pub use engine_client::HttpEngineClient;
pub use ffmpeg::FfmpegPreprocessor;
