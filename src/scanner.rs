//! Filesystem sweep and native-executable classification
//!
//! The sweep prints one `path: description` line per regular file, as produced
//! by `file`. A path counts as a native executable when its description starts
//! with `ELF`, it is not a shared object, and it does not belong to the
//! scanner's own tooling.

use crate::error::{ExecError, ReconcileError};
use crate::exec::{ExecutionPort, Invocation};
use crate::image::ImageRef;
use crate::os::OsFamily;
use crate::scripts::{Script, ScriptSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

const EXECUTABLE_FORMAT_MARKER: &str = "ELF";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub path: String,
    pub description: String,
}

impl ScanEntry {
    pub fn is_native_executable(&self, tooling_marker: &str) -> bool {
        !self.path.is_empty()
            && self.description.starts_with(EXECUTABLE_FORMAT_MARKER)
            && !is_shared_object(&self.path)
            && (tooling_marker.is_empty() || !self.path.contains(tooling_marker))
    }
}

/// `.so` suffix or a versioned `.so.` infix such as `libc.so.6`
pub fn is_shared_object(path: &str) -> bool {
    path.ends_with(".so") || path.contains(".so.")
}

/// Splits a sweep line on its first `:`
pub fn parse_type_line(line: &str) -> Option<ScanEntry> {
    let (path, description) = line.split_once(':')?;
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    Some(ScanEntry {
        path: path.to_string(),
        description: description.trim().to_string(),
    })
}

/// Harvested sweep output; transient, never persisted
#[derive(Debug, Clone, Default)]
pub struct ScanRecord {
    file_count: usize,
    executables: Vec<String>,
}

impl ScanRecord {
    pub fn from_sweep_output(output: &str, tooling_marker: &str) -> Self {
        let mut file_count = 0;
        let mut executables = Vec::new();
        for entry in output.lines().filter_map(parse_type_line) {
            file_count += 1;
            if entry.is_native_executable(tooling_marker) {
                executables.push(entry.path);
            }
        }
        Self {
            file_count,
            executables,
        }
    }

    /// Files the sweep listed, executable or not
    pub fn file_count(&self) -> usize {
        self.file_count
    }

    /// Native executable paths in sweep order
    pub fn executables(&self) -> &[String] {
        &self.executables
    }

    /// Every executable found, accounted or not
    pub fn executable_count(&self) -> usize {
        self.executables.len()
    }
}

pub struct BinaryScanner {
    executor: Arc<dyn ExecutionPort>,
    scripts: ScriptSet,
    tooling_marker: String,
}

impl BinaryScanner {
    pub fn new(
        executor: Arc<dyn ExecutionPort>,
        scripts: ScriptSet,
        tooling_marker: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            scripts,
            tooling_marker: tooling_marker.into(),
        }
    }

    pub async fn scan_executables(
        &self,
        image: &ImageRef,
        family: OsFamily,
    ) -> Result<ScanRecord, ReconcileError> {
        let scan_error = |source: ExecError| ReconcileError::Scan {
            image: image.clone(),
            source,
        };

        let script = Script::sweep_for(family)
            .ok_or_else(|| scan_error(ExecError::Other(format!("no sweep for {} images", family))))?;

        let started = Instant::now();
        let output = self
            .executor
            .execute(image, &Invocation::script(&self.scripts, script))
            .await
            .map_err(scan_error)?;

        let record = ScanRecord::from_sweep_output(&output, &self.tooling_marker);
        // A root filesystem always has files; nothing listed means the sweep never ran
        if record.file_count() == 0 {
            return Err(scan_error(ExecError::Other(format!(
                "{} listed no files",
                script.file_name()
            ))));
        }
        info!(
            image = %image,
            files = record.file_count(),
            executables = record.executable_count(),
            elapsed_ms = started.elapsed().as_millis(),
            "Filesystem sweep complete"
        );
        Ok(record)
    }
}
