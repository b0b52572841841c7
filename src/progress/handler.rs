//! Progress handler trait and events

use crate::image::ImageRef;
use crate::os::OsFamily;
use crate::pipeline::{ImageState, SkipReason};
use std::path::PathBuf;
use std::time::Duration;

/// Events emitted while a run reconciles images
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Run started
    RunStarted { images: usize, workers: usize },

    /// An image moved to a new pipeline state
    StateChanged { image: ImageRef, state: ImageState },

    /// Package manifest collected
    ManifestExtracted {
        image: ImageRef,
        family: OsFamily,
        owned_paths: usize,
        duration: Duration,
    },

    /// Filesystem sweep completed
    ScanComplete {
        image: ImageRef,
        executables: usize,
        duration: Duration,
    },

    /// Diff record written
    Persisted {
        image: ImageRef,
        unaccounted: usize,
        path: PathBuf,
    },

    /// Image not processed
    Skipped { image: ImageRef, reason: SkipReason },

    /// Image pipeline failed at `stage`
    Failed {
        image: ImageRef,
        stage: &'static str,
        error: String,
    },

    /// Run finished or was cancelled
    RunCompleted {
        persisted: usize,
        skipped: usize,
        failed: usize,
        cancelled: usize,
        total_time: Duration,
    },
}

/// Trait for handling progress events during a run
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}
