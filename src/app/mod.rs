pub mod controller;
pub mod pipeline;

pub use controller::{AppController, ControllerOptions};
pub use pipeline::PipelineOrchestrator;
