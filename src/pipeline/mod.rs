//! Per-image reconciliation pipeline and the bounded orchestrator driving it

mod orchestrator;
mod state;

pub use orchestrator::{ImagePipeline, Orchestrator, RunSummary};
pub use state::{ImageOutcome, ImageState, SkipReason};
