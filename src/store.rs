//! Diff record persistence
//!
//! One pretty-printed JSON document per image, named by
//! [`ImageRef::diff_file_name`]. Records are written to a hidden temporary file
//! and renamed into place, so a record either exists complete or not at all.

use crate::diff::DiffRecord;
use crate::image::ImageRef;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize diff record: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Records read back from a store, plus the files that could not be parsed
#[derive(Debug, Default)]
pub struct LoadedRecords {
    pub records: Vec<DiffRecord>,
    pub skipped: Vec<PathBuf>,
}

pub trait DiffStore: Send + Sync {
    /// Whether a completed record exists for `image`
    fn contains(&self, image: &ImageRef) -> bool;

    fn save(&self, record: &DiffRecord) -> Result<PathBuf, StoreError>;

    fn load_all(&self) -> Result<LoadedRecords, StoreError>;
}

#[derive(Debug, Clone)]
pub struct JsonDiffStore {
    dir: PathBuf,
}

impl JsonDiffStore {
    /// Opens `dir` as a store, creating it if needed
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self { dir })
    }

    /// Reads an existing directory without creating it
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(StoreError::io(
                &dir,
                io::Error::new(io::ErrorKind::NotFound, "not a directory"),
            ));
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, image: &ImageRef) -> PathBuf {
        self.dir.join(image.diff_file_name())
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

impl DiffStore for JsonDiffStore {
    fn contains(&self, image: &ImageRef) -> bool {
        self.record_path(image).is_file()
    }

    fn save(&self, record: &DiffRecord) -> Result<PathBuf, StoreError> {
        let path = self.record_path(&record.image_name);
        let temp = self
            .dir
            .join(format!(".{}.tmp", record.image_name.diff_file_name()));

        let json = serde_json::to_string_pretty(record)?;
        fs::write(&temp, json).map_err(|e| StoreError::io(&temp, e))?;
        if let Err(e) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(StoreError::io(&path, e));
        }

        debug!(path = %path.display(), "Persisted diff record");
        Ok(path)
    }

    fn load_all(&self) -> Result<LoadedRecords, StoreError> {
        let mut loaded = LoadedRecords::default();

        for entry in WalkDir::new(&self.dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
        {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&self.dir).to_path_buf();
                StoreError::io(&path, e.into())
            })?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some("json")
            {
                continue;
            }

            let parsed = fs::read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|content| {
                    serde_json::from_str::<DiffRecord>(&content).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(record) => loaded.records.push(record),
                Err(e) => {
                    warn!(path = %path.display(), "Skipping unreadable diff record: {}", e);
                    loaded.skipped.push(path.to_path_buf());
                }
            }
        }

        Ok(loaded)
    }
}
