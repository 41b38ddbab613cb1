//! The scan engine.
//!
//! An [`Analyzer`] owns one image, the registered checks, the report and a
//! scratch workspace. [`Analyzer::run_plugins`] walks the image once and
//! fans every entry out to every plugin in registration order.

pub mod plugin;
pub mod report;

use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::common::{join_path, to_json_pretty, Workspace};
use crate::config::{Config, GlobalConfig};
use crate::digest::sha256_file;
use crate::error::{AnalyzerError, Result};
use crate::fsparser::{DirFs, FileInfo, FsParser, SquashFs};
use crate::timing::PhaseTimer;

pub use plugin::{AnalyzerType, Plugin};
pub use report::{AnalyzerReport, FindingValue, ImageInfo};

const WORKSPACE_PREFIX: &str = "fwaudit-";

/// Everything a plugin may touch during a scan.
pub struct ScanContext {
    fs: Box<dyn FsParser>,
    report: AnalyzerReport,
    workspace: Workspace,
    aborted: bool,
}

/// One scan of one image.
pub struct Analyzer {
    plugins: Vec<Box<dyn Plugin>>,
    state: ScanContext,
}

impl Analyzer {
    /// Build an analyzer around an already opened image.
    ///
    /// With `DigestImage` the whole image is hashed up front. Directory
    /// images have no single file to hash and are reported without a digest.
    pub fn new(fs: Box<dyn FsParser>, config: &GlobalConfig) -> Result<Self> {
        let workspace = Workspace::new(WORKSPACE_PREFIX)?;
        let image_name = fs.image_name();

        let image_digest = if config.digest_image {
            let image = Path::new(&image_name);
            if image.is_file() {
                Some(sha256_file(image)?)
            } else {
                warn!(image = %image_name, "DigestImage set but image is not a file, skipping digest");
                None
            }
        } else {
            None
        };

        let report = AnalyzerReport::new(ImageInfo {
            fs_type: config.fs_type.to_string(),
            image_name,
            image_digest,
        });

        Ok(Self {
            plugins: Vec::new(),
            state: ScanContext {
                fs,
                report,
                workspace,
                aborted: false,
            },
        })
    }

    /// Open `image` with the backend selected by `[GlobalConfig] FsType`.
    pub fn from_config(image: &str, config: &Config) -> Result<Self> {
        use crate::config::FsType;

        let global = &config.global;
        let fs: Box<dyn FsParser> = match global.fs_type {
            FsType::DirFs => Box::new(DirFs::new(image)),
            FsType::SquashFs => Box::new(SquashFs::new(image, global.selinux())),
        };
        Self::new(fs, global)
    }

    /// Register a plugin. Dispatch follows registration order.
    pub fn add_plugin(&mut self, plugin: Box<dyn Plugin>) {
        debug!(plugin = plugin.name(), "registered plugin");
        self.plugins.push(plugin);
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Check that the host has the tools the backend needs.
    pub fn fs_type_supported(&self) -> Result<()> {
        if self.state.fs.supported() {
            return Ok(());
        }
        Err(AnalyzerError::Unsupported(format!(
            "{}: requires additional tools, please refer to documentation.",
            self.state.report.image.fs_type
        )))
    }

    /// Start every plugin, walk the image, then finalize every plugin.
    ///
    /// Any error stops the scan where it happened. The findings gathered so
    /// far are discarded and [`Analyzer::report`] refuses to hand out a
    /// report afterwards.
    pub fn run_plugins(&mut self) -> Result<()> {
        let result = self.dispatch();
        if let Err(e) = &result {
            error!(error = %e, "scan aborted");
            self.state.report.clear_findings();
            self.state.aborted = true;
        }
        result
    }

    fn dispatch(&mut self) -> Result<()> {
        let Self { plugins, state } = self;

        for plugin in plugins.iter_mut() {
            debug!(plugin = plugin.name(), "start");
            plugin.start();
        }

        let timer = PhaseTimer::start("walk");
        let root = state
            .fs
            .get_file_info("/")
            .map_err(|e| AnalyzerError::walk("/", e))?;
        check_entry(plugins, state, &root, "/")?;
        let visited = walk_dir(plugins, state, "/")? + 1;
        info!(entries = visited, "walk complete");
        timer.finish();

        let timer = PhaseTimer::start("finalize");
        for plugin in plugins.iter_mut() {
            debug!(plugin = plugin.name(), "finalize");
            let fragment = plugin
                .finalize(state)
                .map_err(|e| AnalyzerError::plugin(plugin.name(), "finalize", e))?;
            if let Some(fragment) = fragment {
                state.report.merge_plugin_report(fragment);
            }
        }
        timer.finish();
        Ok(())
    }

    /// The report, or [`AnalyzerError::Aborted`] after a failed run.
    pub fn report(&self) -> Result<&AnalyzerReport> {
        if self.state.aborted {
            return Err(AnalyzerError::Aborted);
        }
        Ok(&self.state.report)
    }

    /// The report as tab-indented JSON.
    pub fn json_report(&self) -> Result<String> {
        to_json_pretty(self.report()?)
    }

    pub fn has_offenders(&self) -> bool {
        !self.state.report.offenders.is_empty()
    }

    /// Current scratch directory, `None` once cleaned up.
    pub fn scratch_dir(&self) -> Option<&Path> {
        self.state.workspace.path()
    }

    /// Remove the scratch workspace. Safe to call more than once.
    pub fn cleanup(&mut self) -> Result<()> {
        self.state.workspace.cleanup()
    }
}

impl Drop for Analyzer {
    fn drop(&mut self) {
        if let Err(e) = self.state.workspace.cleanup() {
            warn!(error = %e, "failed to remove scratch workspace");
        }
    }
}

/// Hand one entry to every plugin in order.
fn check_entry(
    plugins: &mut [Box<dyn Plugin>],
    state: &mut ScanContext,
    fi: &FileInfo,
    parent: &str,
) -> Result<()> {
    for plugin in plugins.iter_mut() {
        plugin
            .check_file(state, fi, parent)
            .map_err(|e| AnalyzerError::plugin(plugin.name(), join_path(parent, &fi.name), e))?;
    }
    Ok(())
}

/// Pre-order walk below `dir`. Returns the number of entries visited.
fn walk_dir(plugins: &mut [Box<dyn Plugin>], state: &mut ScanContext, dir: &str) -> Result<usize> {
    let entries = state
        .fs
        .get_dir_info(dir)
        .map_err(|e| AnalyzerError::walk(dir, e))?;

    let mut visited = 0;
    for fi in &entries {
        check_entry(plugins, state, fi, dir)?;
        visited += 1;
        if fi.is_dir() {
            visited += walk_dir(plugins, state, &join_path(dir, &fi.name))?;
        }
    }
    Ok(visited)
}

impl ScanContext {
    fn walk_subtree(&self, dir: &str, visit: &mut dyn FnMut(&FileInfo, &str)) -> Result<()> {
        let entries = self
            .fs
            .get_dir_info(dir)
            .map_err(|e| AnalyzerError::walk(dir, e))?;
        for fi in &entries {
            visit(fi, dir);
            if fi.is_dir() {
                self.walk_subtree(&join_path(dir, &fi.name), visit)?;
            }
        }
        Ok(())
    }
}

impl AnalyzerType for ScanContext {
    fn get_file_info(&self, path: &str) -> Result<FileInfo> {
        self.fs.get_file_info(path)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        if !self.workspace.owns(path) {
            return Err(AnalyzerError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{} is not inside the scratch workspace", path.display()),
            )));
        }
        self.workspace.release(path);
        Ok(())
    }

    fn file_get_sha256(&self, path: &str) -> Result<String> {
        let staged = self.file_get(path)?;
        let digest = sha256_file(&staged);
        self.workspace.release(&staged);
        digest
    }

    fn file_get(&self, path: &str) -> Result<PathBuf> {
        let staged = self.workspace.stage_file()?;
        match self.fs.copy_file(path, &staged) {
            Ok(()) => Ok(staged),
            Err(e) => {
                self.workspace.release(&staged);
                warn!(path, error = %e, "extraction failed");
                Err(e)
            }
        }
    }

    fn add_offender(&mut self, path: &str, value: &str) {
        self.report.add_offender(path, value);
    }

    fn add_informational(&mut self, path: &str, value: &str) {
        self.report.add_informational(path, value);
    }

    fn check_all_files_with_path(
        &self,
        path: &str,
        visit: &mut dyn FnMut(&FileInfo, &str),
    ) -> Result<()> {
        self.walk_subtree(path, visit)
    }

    fn add_data(&mut self, key: &str, value: &str) {
        self.report.add_data(key, value);
    }

    fn image_info(&self) -> ImageInfo {
        self.report.image.clone()
    }
}

impl AnalyzerType for Analyzer {
    fn get_file_info(&self, path: &str) -> Result<FileInfo> {
        self.state.get_file_info(path)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.state.remove_file(path)
    }

    fn file_get_sha256(&self, path: &str) -> Result<String> {
        self.state.file_get_sha256(path)
    }

    fn file_get(&self, path: &str) -> Result<PathBuf> {
        self.state.file_get(path)
    }

    fn add_offender(&mut self, path: &str, value: &str) {
        self.state.add_offender(path, value);
    }

    fn add_informational(&mut self, path: &str, value: &str) {
        self.state.add_informational(path, value);
    }

    fn check_all_files_with_path(
        &self,
        path: &str,
        visit: &mut dyn FnMut(&FileInfo, &str),
    ) -> Result<()> {
        self.state.check_all_files_with_path(path, visit)
    }

    fn add_data(&mut self, key: &str, value: &str) {
        self.state.add_data(key, value);
    }

    fn image_info(&self) -> ImageInfo {
        self.state.image_info()
    }
}
