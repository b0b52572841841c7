use super::state::{ImageOutcome, ImageState, SkipReason};
use crate::config::BinfinderConfig;
use crate::diff::reconcile;
use crate::error::ReconcileError;
use crate::exec::ExecutionPort;
use crate::image::ImageRef;
use crate::manifest::ManifestRegistry;
use crate::os::{OsClassifier, OsFamily};
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::scanner::BinaryScanner;
use crate::scripts::ScriptSet;
use crate::store::DiffStore;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Classification, manifest extraction, scan and diff for a single image.
///
/// Cheap to clone; every clone shares the same collaborators.
#[derive(Clone)]
pub struct ImagePipeline {
    executor: Arc<dyn ExecutionPort>,
    classifier: Arc<OsClassifier>,
    manifests: Arc<ManifestRegistry>,
    scanner: Arc<BinaryScanner>,
    store: Arc<dyn DiffStore>,
    config: Arc<BinfinderConfig>,
    progress: Arc<dyn ProgressHandler>,
}

impl ImagePipeline {
    pub fn new(
        executor: Arc<dyn ExecutionPort>,
        scripts: ScriptSet,
        store: Arc<dyn DiffStore>,
        config: Arc<BinfinderConfig>,
        progress: Arc<dyn ProgressHandler>,
    ) -> Self {
        let classifier = OsClassifier::new(executor.clone(), config.linux_fallback);
        let manifests = ManifestRegistry::new(executor.clone(), &scripts, &config);
        let scanner = BinaryScanner::new(executor.clone(), scripts, config.tooling_marker.clone());
        Self {
            executor,
            classifier: Arc::new(classifier),
            manifests: Arc::new(manifests),
            scanner: Arc::new(scanner),
            store,
            config,
            progress,
        }
    }

    /// Skip decision made before the image is admitted; costs no container calls
    pub fn precheck(&self, image: &ImageRef) -> Option<SkipReason> {
        if self.config.is_sentinel(image) {
            return Some(SkipReason::Sentinel);
        }
        if self.store.contains(image) {
            return Some(SkipReason::AlreadyPersisted);
        }
        None
    }

    pub async fn process(&self, image: &ImageRef) -> ImageOutcome {
        match self.run_stages(image).await {
            Ok(outcome) => outcome,
            Err(e) => ImageOutcome::from_error(e),
        }
    }

    fn transition(&self, image: &ImageRef, state: ImageState) {
        self.progress.on_progress(&ProgressEvent::StateChanged {
            image: image.clone(),
            state,
        });
    }

    async fn run_stages(&self, image: &ImageRef) -> Result<ImageOutcome, ReconcileError> {
        self.transition(image, ImageState::Classifying);
        if self.config.pull_images {
            self.executor
                .prepare(image)
                .await
                .map_err(|source| ReconcileError::Probe {
                    image: image.clone(),
                    source,
                })?;
        }
        let family = self.classifier.classify(image).await?;
        let provider = match (family, self.manifests.provider_for(family)) {
            (OsFamily::Unknown, _) | (_, None) => {
                return Ok(ImageOutcome::Skipped(SkipReason::UnknownOs))
            }
            (_, Some(provider)) => provider,
        };

        self.transition(image, ImageState::ExtractingManifest);
        let started = Instant::now();
        let manifest = provider.owned_paths(image).await?;
        self.progress.on_progress(&ProgressEvent::ManifestExtracted {
            image: image.clone(),
            family,
            owned_paths: manifest.len(),
            duration: started.elapsed(),
        });

        self.transition(image, ImageState::Scanning);
        let started = Instant::now();
        let scan = self.scanner.scan_executables(image, family).await?;
        self.progress.on_progress(&ProgressEvent::ScanComplete {
            image: image.clone(),
            executables: scan.executable_count(),
            duration: started.elapsed(),
        });

        self.transition(image, ImageState::Reconciling);
        let record = reconcile(
            image,
            &manifest,
            &scan,
            self.config.baseline.for_family(family),
        );
        let path = self
            .store
            .save(&record)
            .map_err(|source| ReconcileError::Persist {
                image: image.clone(),
                source,
            })?;

        Ok(ImageOutcome::Persisted {
            path,
            executables: scan.executable_count(),
            unaccounted: record.elf_names.len(),
        })
    }

    fn report(&self, image: &ImageRef, outcome: &ImageOutcome) {
        let event = match outcome {
            ImageOutcome::Persisted {
                path, unaccounted, ..
            } => ProgressEvent::Persisted {
                image: image.clone(),
                unaccounted: *unaccounted,
                path: path.clone(),
            },
            ImageOutcome::Skipped(reason) => ProgressEvent::Skipped {
                image: image.clone(),
                reason: reason.clone(),
            },
            ImageOutcome::Failed(error) => ProgressEvent::Failed {
                image: image.clone(),
                stage: error.stage(),
                error: error.to_string(),
            },
        };
        self.progress.on_progress(&event);
    }
}

/// Outcome of every image in a run, in completion order
#[derive(Debug, Default)]
pub struct RunSummary {
    pub results: Vec<(ImageRef, ImageOutcome)>,
    /// Admitted images whose tasks were aborted by cancellation
    pub cancelled: Vec<ImageRef>,
    pub elapsed: Duration,
}

impl RunSummary {
    fn count(&self, state: ImageState) -> usize {
        self.results
            .iter()
            .filter(|(_, outcome)| outcome.state() == state)
            .count()
    }

    pub fn persisted(&self) -> usize {
        self.count(ImageState::Persisted)
    }

    pub fn skipped(&self) -> usize {
        self.count(ImageState::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(ImageState::Failed)
    }

    pub fn outcome(&self, image: &str) -> Option<&ImageOutcome> {
        self.results
            .iter()
            .find(|(i, _)| i.as_str() == image)
            .map(|(_, outcome)| outcome)
    }

    pub fn was_cancelled(&self) -> bool {
        !self.cancelled.is_empty()
    }
}

/// Runs [`ImagePipeline`] over many images, at most `workers` at a time
pub struct Orchestrator {
    pipeline: ImagePipeline,
    workers: usize,
}

impl Orchestrator {
    pub fn new(pipeline: ImagePipeline, workers: usize) -> Self {
        Self {
            pipeline,
            workers: workers.max(1),
        }
    }

    pub async fn run(&self, images: Vec<ImageRef>) -> RunSummary {
        self.run_until(images, std::future::pending()).await
    }

    /// Like [`Orchestrator::run`], but aborts in-flight images once `shutdown`
    /// completes. Records already persisted stay persisted.
    pub async fn run_until<F>(&self, images: Vec<ImageRef>, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let mut seen = HashSet::new();
        let images: Vec<ImageRef> = images
            .into_iter()
            .filter(|image| seen.insert(image.clone()))
            .collect();

        self.pipeline.progress.on_progress(&ProgressEvent::RunStarted {
            images: images.len(),
            workers: self.workers,
        });

        let mut summary = RunSummary::default();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        let mut admitted = Vec::new();

        for image in images {
            if let Some(reason) = self.pipeline.precheck(&image) {
                let outcome = ImageOutcome::Skipped(reason);
                self.pipeline.report(&image, &outcome);
                summary.results.push((image, outcome));
                continue;
            }

            admitted.push(image.clone());
            let pipeline = self.pipeline.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                pipeline.transition(&image, ImageState::Pending);
                // The semaphore is never closed, so this always holds a permit
                let _permit = semaphore.acquire_owned().await;
                let outcome = pipeline.process(&image).await;
                (image, outcome)
            });
        }
        debug!(admitted = admitted.len(), "Images admitted to worker pool");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((image, outcome))) => {
                        self.pipeline.report(&image, &outcome);
                        summary.results.push((image, outcome));
                    }
                    Some(Err(e)) => error!("Image task panicked: {}", e),
                    None => break,
                },
                _ = &mut shutdown => {
                    warn!(in_flight = tasks.len(), "Shutdown requested, aborting in-flight images");
                    tasks.abort_all();
                    while let Some(joined) = tasks.join_next().await {
                        if let Ok((image, outcome)) = joined {
                            self.pipeline.report(&image, &outcome);
                            summary.results.push((image, outcome));
                        }
                    }
                    break;
                }
            }
        }

        let finished: HashSet<&ImageRef> = summary.results.iter().map(|(i, _)| i).collect();
        let cancelled: Vec<ImageRef> = admitted
            .into_iter()
            .filter(|image| !finished.contains(image))
            .collect();
        summary.cancelled = cancelled;
        summary.elapsed = started.elapsed();

        self.pipeline.progress.on_progress(&ProgressEvent::RunCompleted {
            persisted: summary.persisted(),
            skipped: summary.skipped(),
            failed: summary.failed(),
            cancelled: summary.cancelled.len(),
            total_time: summary.elapsed,
        });
        info!(
            persisted = summary.persisted(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "Run finished"
        );
        summary
    }
}
