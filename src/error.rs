//! Error taxonomy for the reconciliation pipeline

use crate::image::ImageRef;
use crate::store::StoreError;
use thiserror::Error;

/// Failure of a single command run inside an image
#[derive(Debug, Error)]
pub enum ExecError {
    /// The container runtime binary could not be started
    #[error("failed to spawn `{runtime}`: {source}")]
    Spawn {
        runtime: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran but exited unsuccessfully
    #[error("`{command}` exited with {status}: {stderr}")]
    NonZeroExit {
        command: String,
        status: String,
        stderr: String,
    },

    /// The command did not finish within the configured timeout
    #[error("`{command}` timed out after {seconds} seconds")]
    Timeout { command: String, seconds: u64 },

    /// The image could not be made available locally
    #[error("failed to pull {image}: {message}")]
    Pull { image: String, message: String },

    #[error("{0}")]
    Other(String),
}

/// Terminal failure of one image's pipeline
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Neither release descriptor could be read, or the image could not be pulled
    #[error("unable to determine OS of {image}: {source}")]
    Probe {
        image: ImageRef,
        #[source]
        source: ExecError,
    },

    /// The package database could not be read
    #[error("unable to read package database of {image}: {source}")]
    Manifest {
        image: ImageRef,
        #[source]
        source: ExecError,
    },

    /// The filesystem sweep could not run
    #[error("filesystem sweep failed for {image}: {source}")]
    Scan {
        image: ImageRef,
        #[source]
        source: ExecError,
    },

    /// The diff record could not be serialized or written
    #[error("failed to persist diff for {image}: {source}")]
    Persist {
        image: ImageRef,
        #[source]
        source: StoreError,
    },
}

impl ReconcileError {
    pub fn image(&self) -> &ImageRef {
        match self {
            ReconcileError::Probe { image, .. }
            | ReconcileError::Manifest { image, .. }
            | ReconcileError::Scan { image, .. }
            | ReconcileError::Persist { image, .. } => image,
        }
    }

    /// Short stage label used in logs and summaries
    pub fn stage(&self) -> &'static str {
        match self {
            ReconcileError::Probe { .. } => "probe",
            ReconcileError::Manifest { .. } => "manifest",
            ReconcileError::Scan { .. } => "scan",
            ReconcileError::Persist { .. } => "persist",
        }
    }
}
