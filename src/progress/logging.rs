//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, error, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { images, workers } => {
                info!(images, workers, "Starting reconciliation run");
            }
            ProgressEvent::StateChanged { image, state } => {
                debug!(image = %image, state = %state, "State changed");
            }
            ProgressEvent::ManifestExtracted {
                image,
                family,
                owned_paths,
                duration,
            } => {
                info!(
                    image = %image,
                    family = %family,
                    owned_paths,
                    duration_ms = duration.as_millis(),
                    "Manifest extracted"
                );
            }
            ProgressEvent::ScanComplete {
                image,
                executables,
                duration,
            } => {
                info!(
                    image = %image,
                    executables,
                    duration_ms = duration.as_millis(),
                    "Scan complete"
                );
            }
            ProgressEvent::Persisted {
                image,
                unaccounted,
                path,
            } => {
                info!(
                    image = %image,
                    unaccounted,
                    path = %path.display(),
                    "Diff record persisted"
                );
            }
            ProgressEvent::Skipped { image, reason } => {
                info!(image = %image, reason = %reason, "Image skipped");
            }
            ProgressEvent::Failed {
                image,
                stage,
                error,
            } => {
                error!(image = %image, stage = %stage, error = %error, "Image failed");
            }
            ProgressEvent::RunCompleted {
                persisted,
                skipped,
                failed,
                cancelled,
                total_time,
            } => {
                if *cancelled > 0 {
                    warn!(
                        persisted,
                        skipped,
                        failed,
                        cancelled,
                        total_time_ms = total_time.as_millis(),
                        "Run cancelled"
                    );
                } else {
                    info!(
                        persisted,
                        skipped,
                        failed,
                        total_time_ms = total_time.as_millis(),
                        "Run complete"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageRef;
    use crate::os::OsFamily;
    use crate::pipeline::{ImageState, SkipReason};
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_logging_all_events() {
        let handler = LoggingHandler;
        let image = ImageRef::new("alpine:3.10");

        let events = vec![
            ProgressEvent::RunStarted {
                images: 3,
                workers: 2,
            },
            ProgressEvent::StateChanged {
                image: image.clone(),
                state: ImageState::Scanning,
            },
            ProgressEvent::ManifestExtracted {
                image: image.clone(),
                family: OsFamily::Alpine,
                owned_paths: 120,
                duration: Duration::from_millis(900),
            },
            ProgressEvent::ScanComplete {
                image: image.clone(),
                executables: 40,
                duration: Duration::from_secs(3),
            },
            ProgressEvent::Persisted {
                image: image.clone(),
                unaccounted: 2,
                path: PathBuf::from("data/alpine:3.10-diff.json"),
            },
            ProgressEvent::Skipped {
                image: image.clone(),
                reason: SkipReason::ProbeFailed("no release file".to_string()),
            },
            ProgressEvent::Failed {
                image,
                stage: "manifest",
                error: "Permission denied".to_string(),
            },
            ProgressEvent::RunCompleted {
                persisted: 1,
                skipped: 1,
                failed: 1,
                cancelled: 0,
                total_time: Duration::from_secs(5),
            },
            ProgressEvent::RunCompleted {
                persisted: 0,
                skipped: 0,
                failed: 0,
                cancelled: 2,
                total_time: Duration::from_secs(1),
            },
        ];

        for event in events {
            handler.on_progress(&event);
        }
    }
}
