#![forbid(unsafe_code)]
//! Pronunciation evaluation against a remote phonetic scoring engine.
//!
//! A run normalizes the target text, then calls the engine's GTP, model and score stages in
//! order, threading each stage's output into the next, and folds the outcome into one
//! [`domain::EvaluationResult`].

pub mod adapters;
pub mod app;
pub mod commands;
pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use adapters::{FfmpegPreprocessor, HttpEngineClient, TomlConfigStore};
pub use app::{AppController, ControllerOptions, PipelineOrchestrator};
pub use domain::{AppConfig, DomainError, EvaluationRequest, EvaluationResult};
