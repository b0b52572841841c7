//! Companion shell scripts mounted into scanned containers
//!
//! The scripts ship inside the binary and are written to disk at startup, so a
//! release build needs nothing beside the executable. Operators can point
//! `scripts_dir` at their own copies instead.

use crate::os::OsFamily;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory inside the container where scripts are mounted
pub const CONTAINER_SCRIPT_DIR: &str = "/binfinder";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {
    AlpineSweep,
    DebianSweep,
    RhelSweep,
    RhelPackages,
}

impl Script {
    pub fn all() -> &'static [Script] {
        &[
            Script::AlpineSweep,
            Script::DebianSweep,
            Script::RhelSweep,
            Script::RhelPackages,
        ]
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Script::AlpineSweep => "alpine-sweep.sh",
            Script::DebianSweep => "debian-sweep.sh",
            Script::RhelSweep => "rhel-sweep.sh",
            Script::RhelPackages => "rhel-packages.sh",
        }
    }

    pub fn contents(&self) -> &'static str {
        match self {
            Script::AlpineSweep => include_str!("../scripts/alpine-sweep.sh"),
            Script::DebianSweep => include_str!("../scripts/debian-sweep.sh"),
            Script::RhelSweep => include_str!("../scripts/rhel-sweep.sh"),
            Script::RhelPackages => include_str!("../scripts/rhel-packages.sh"),
        }
    }

    /// Filesystem sweep matching the image's package manager
    pub fn sweep_for(family: OsFamily) -> Option<Script> {
        match family {
            OsFamily::Alpine => Some(Script::AlpineSweep),
            OsFamily::DebianLike => Some(Script::DebianSweep),
            OsFamily::RhelLike => Some(Script::RhelSweep),
            OsFamily::Unknown => None,
        }
    }

    /// Absolute path of the script inside the container
    pub fn container_path(&self) -> String {
        format!("{}/{}", CONTAINER_SCRIPT_DIR, self.file_name())
    }
}

/// Host directory holding every [`Script`]
#[derive(Debug, Clone)]
pub struct ScriptSet {
    dir: PathBuf,
}

impl ScriptSet {
    /// Wraps a directory without touching the filesystem
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Writes the embedded scripts into `dir`, replacing stale copies
    pub fn materialize(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        for script in Script::all() {
            let path = dir.join(script.file_name());
            fs::write(&path, script.contents())?;
            debug!(path = %path.display(), "Wrote companion script");
        }
        Ok(Self::new(fs::canonicalize(dir)?))
    }

    /// Uses operator-supplied scripts, failing if any is missing
    pub fn from_dir(dir: &Path) -> io::Result<Self> {
        for script in Script::all() {
            let path = dir.join(script.file_name());
            if !path.is_file() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("missing companion script {}", path.display()),
                ));
            }
        }
        Ok(Self::new(fs::canonicalize(dir)?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, script: Script) -> PathBuf {
        self.dir.join(script.file_name())
    }
}
