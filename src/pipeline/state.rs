use crate::error::ReconcileError;
use std::fmt;
use std::path::PathBuf;

/// Per-image pipeline state.
///
/// `Pending → Classifying → ExtractingManifest → Scanning → Reconciling`,
/// ending in one of `Persisted`, `Skipped` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageState {
    Pending,
    Classifying,
    ExtractingManifest,
    Scanning,
    Reconciling,
    Persisted,
    Skipped,
    Failed,
}

impl ImageState {
    pub fn name(&self) -> &'static str {
        match self {
            ImageState::Pending => "pending",
            ImageState::Classifying => "classifying",
            ImageState::ExtractingManifest => "extracting-manifest",
            ImageState::Scanning => "scanning",
            ImageState::Reconciling => "reconciling",
            ImageState::Persisted => "persisted",
            ImageState::Skipped => "skipped",
            ImageState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImageState::Persisted | ImageState::Skipped | ImageState::Failed
        )
    }
}

impl fmt::Display for ImageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A diff record from an earlier run exists
    AlreadyPersisted,
    /// Listed in `sentinel_images`
    Sentinel,
    /// Release descriptor matched no supported family
    UnknownOs,
    /// The image could not be pulled or probed
    ProbeFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyPersisted => f.write_str("already persisted"),
            SkipReason::Sentinel => f.write_str("sentinel image"),
            SkipReason::UnknownOs => f.write_str("unknown OS family"),
            SkipReason::ProbeFailed(error) => write!(f, "probe failed: {}", error),
        }
    }
}

/// Terminal result of one image's pipeline
#[derive(Debug)]
pub enum ImageOutcome {
    Persisted {
        path: PathBuf,
        executables: usize,
        unaccounted: usize,
    },
    Skipped(SkipReason),
    Failed(ReconcileError),
}

impl ImageOutcome {
    pub fn state(&self) -> ImageState {
        match self {
            ImageOutcome::Persisted { .. } => ImageState::Persisted,
            ImageOutcome::Skipped(_) => ImageState::Skipped,
            ImageOutcome::Failed(_) => ImageState::Failed,
        }
    }

    /// Maps a pipeline error to its outcome; probe failures skip the image
    pub fn from_error(error: ReconcileError) -> Self {
        match error {
            ReconcileError::Probe { source, .. } => {
                ImageOutcome::Skipped(SkipReason::ProbeFailed(source.to_string()))
            }
            other => ImageOutcome::Failed(other),
        }
    }
}

impl fmt::Display for ImageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageOutcome::Persisted {
                executables,
                unaccounted,
                ..
            } => write!(
                f,
                "persisted ({} unaccounted of {} executables)",
                unaccounted, executables
            ),
            ImageOutcome::Skipped(reason) => write!(f, "skipped ({})", reason),
            ImageOutcome::Failed(error) => write!(f, "failed at {}: {}", error.stage(), error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecError;
    use crate::image::ImageRef;

    #[test]
    fn test_terminal_states() {
        assert!(ImageState::Persisted.is_terminal());
        assert!(ImageState::Skipped.is_terminal());
        assert!(ImageState::Failed.is_terminal());
        assert!(!ImageState::Scanning.is_terminal());
        assert_eq!(ImageState::ExtractingManifest.to_string(), "extracting-manifest");
    }

    #[test]
    fn test_probe_failure_skips() {
        let outcome = ImageOutcome::from_error(ReconcileError::Probe {
            image: ImageRef::new("scratch-app"),
            source: ExecError::Other("no shell".to_string()),
        });
        assert_eq!(outcome.state(), ImageState::Skipped);
        assert!(matches!(
            outcome,
            ImageOutcome::Skipped(SkipReason::ProbeFailed(_))
        ));
    }

    #[test]
    fn test_scan_failure_fails() {
        let outcome = ImageOutcome::from_error(ReconcileError::Scan {
            image: ImageRef::new("alpine"),
            source: ExecError::Timeout {
                command: "sh /binfinder/alpine-sweep.sh".to_string(),
                seconds: 600,
            },
        });
        assert_eq!(outcome.state(), ImageState::Failed);
        assert!(outcome.to_string().starts_with("failed at scan"));
    }
}
