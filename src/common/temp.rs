//! Scratch workspace for staging files extracted from an image.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{AnalyzerError, Result};

/// A per-scan temporary directory.
///
/// The directory is allocated by the OS with a random suffix, so concurrent
/// scans never share a path.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
}

impl Workspace {
    /// Create a fresh, uniquely named workspace under the system temp dir.
    pub fn new(prefix: &str) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
        debug!(path = %dir.path().display(), "created scratch workspace");
        Ok(Self { dir: Some(dir) })
    }

    /// Path of the workspace, or `None` after [`Workspace::cleanup`].
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(|d| d.path())
    }

    /// Reserve a uniquely named, empty file inside the workspace.
    ///
    /// The caller owns the file and must release it with
    /// [`Workspace::release`].
    pub fn stage_file(&self) -> Result<PathBuf> {
        let dir = self
            .dir
            .as_ref()
            .ok_or_else(|| AnalyzerError::Config("scratch workspace already removed".into()))?;
        let staged = tempfile::NamedTempFile::new_in(dir.path())?;
        staged
            .into_temp_path()
            .keep()
            .map_err(|e| AnalyzerError::Io(e.error))
    }

    /// Whether `path` lies inside the live workspace.
    pub fn owns(&self, path: &Path) -> bool {
        let Some(root) = self.path() else {
            return false;
        };
        path.starts_with(root) && !path.components().any(|c| c == Component::ParentDir)
    }

    /// Remove a staged file. Missing files are not an error; other failures
    /// are logged and the file is left behind.
    pub fn release(&self, path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "could not release staged file"),
        }
    }

    /// Remove the whole workspace.
    ///
    /// Idempotent: calling it again, or on a workspace that never staged
    /// anything, is a no-op.
    pub fn cleanup(&mut self) -> Result<()> {
        if let Some(dir) = self.dir.take() {
            debug!(path = %dir.path().display(), "removing scratch workspace");
            dir.close()?;
        }
        Ok(())
    }
}
