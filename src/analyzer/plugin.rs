//! Contracts between the engine and its checks.

use serde_json::Value;
use std::path::{Path, PathBuf};

use super::report::ImageInfo;
use crate::error::Result;
use crate::fsparser::FileInfo;

/// A check run over every entry of an image.
///
/// The engine calls `start` once, `check_file` once per visited entry and
/// `finalize` once after the walk, always in registration order.
pub trait Plugin {
    /// Display name, used in logs and error messages.
    fn name(&self) -> &str;

    fn start(&mut self) {}

    /// Inspect one entry. `parent` is the directory holding it (`/` for the
    /// root itself). Any error aborts the whole scan.
    fn check_file(
        &mut self,
        analyzer: &mut dyn AnalyzerType,
        fi: &FileInfo,
        parent: &str,
    ) -> Result<()>;

    /// Called after the walk. A returned JSON object has its top-level keys
    /// merged into the report; anything else is ignored.
    fn finalize(&mut self, analyzer: &mut dyn AnalyzerType) -> Result<Option<Value>> {
        let _ = analyzer;
        Ok(None)
    }
}

/// Engine services available to plugins while a scan runs.
pub trait AnalyzerType {
    /// Metadata for a single entry of the image.
    fn get_file_info(&self, path: &str) -> Result<FileInfo>;

    /// Release a file previously returned by [`AnalyzerType::file_get`].
    /// Paths outside the scratch workspace are refused.
    fn remove_file(&self, path: &Path) -> Result<()>;

    /// Hex sha256 of an entry's content. Leaves no staged file behind.
    fn file_get_sha256(&self, path: &str) -> Result<String>;

    /// Extract an entry into the scratch workspace and return the host path.
    /// The caller must hand it back through [`AnalyzerType::remove_file`].
    fn file_get(&self, path: &str) -> Result<PathBuf>;

    fn add_offender(&mut self, path: &str, value: &str);

    fn add_informational(&mut self, path: &str, value: &str);

    /// Walk the subtree below `path`, calling `visit(entry, parent)` for
    /// every entry in pre-order. Independent of the main dispatch walk.
    fn check_all_files_with_path(
        &self,
        path: &str,
        visit: &mut dyn FnMut(&FileInfo, &str),
    ) -> Result<()>;

    fn add_data(&mut self, key: &str, value: &str);

    fn image_info(&self) -> ImageInfo;
}
