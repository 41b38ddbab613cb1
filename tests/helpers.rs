//! Shared test utilities for fwaudit tests.
#![allow(dead_code)]

use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

use fwaudit::analyzer::{Analyzer, AnalyzerType, Plugin};
use fwaudit::common::{base_name, clean_path, join_path, split_path};
use fwaudit::config::GlobalConfig;
use fwaudit::error::{AnalyzerError, Result};
use fwaudit::fsparser::{FileInfo, FsParser, S_IFDIR, S_IFLNK, S_IFREG};

struct MemEntry {
    info: FileInfo,
    content: Option<Vec<u8>>,
}

/// In-memory image. Paths are absolute; the root always exists.
pub struct MemFs {
    entries: BTreeMap<String, MemEntry>,
    image_name: String,
    broken_dir: Option<String>,
    supported: bool,
}

impl MemFs {
    pub fn new() -> Self {
        let mut fs = Self {
            entries: BTreeMap::new(),
            image_name: "memfs.img".to_string(),
            broken_dir: None,
            supported: true,
        };
        fs.insert("/", S_IFDIR | 0o755, None);
        fs
    }

    fn insert(&mut self, path: &str, mode: u64, content: Option<Vec<u8>>) {
        let path = clean_path(path);
        let info = FileInfo {
            name: base_name(&path),
            size: content.as_ref().map_or(0, |c| c.len() as i64),
            mode,
            selinux_label: "-".to_string(),
            ..Default::default()
        };
        self.entries.insert(path, MemEntry { info, content });
    }

    pub fn dir(mut self, path: &str, perm: u64) -> Self {
        self.insert(path, S_IFDIR | perm, None);
        self
    }

    pub fn file(mut self, path: &str, perm: u64, content: &str) -> Self {
        self.insert(path, S_IFREG | perm, Some(content.as_bytes().to_vec()));
        self
    }

    /// A regular file whose content cannot be extracted.
    pub fn unreadable_file(mut self, path: &str, perm: u64) -> Self {
        self.insert(path, S_IFREG | perm, None);
        self
    }

    pub fn link(mut self, path: &str, target: &str) -> Self {
        self.insert(path, S_IFLNK | 0o777, None);
        if let Some(entry) = self.entries.get_mut(&clean_path(path)) {
            entry.info.link_target = target.to_string();
        }
        self
    }

    pub fn owner(mut self, path: &str, uid: i64, gid: i64) -> Self {
        if let Some(entry) = self.entries.get_mut(&clean_path(path)) {
            entry.info.uid = uid;
            entry.info.gid = gid;
        }
        self
    }

    pub fn capabilities(mut self, path: &str, caps: &[&str]) -> Self {
        if let Some(entry) = self.entries.get_mut(&clean_path(path)) {
            entry.info.capabilities = caps.iter().map(|c| c.to_string()).collect();
        }
        self
    }

    pub fn label(mut self, path: &str, label: &str) -> Self {
        if let Some(entry) = self.entries.get_mut(&clean_path(path)) {
            entry.info.selinux_label = label.to_string();
        }
        self
    }

    /// Listing this directory fails.
    pub fn broken_dir(mut self, path: &str) -> Self {
        self.broken_dir = Some(clean_path(path));
        self
    }

    pub fn image_name(mut self, name: &str) -> Self {
        self.image_name = name.to_string();
        self
    }

    pub fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }
}

impl FsParser for MemFs {
    fn get_dir_info(&self, dir_path: &str) -> Result<Vec<FileInfo>> {
        let dir = clean_path(dir_path);
        if self.broken_dir.as_deref() == Some(dir.as_str()) {
            return Err(AnalyzerError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "listing denied",
            )));
        }
        Ok(self
            .entries
            .iter()
            .filter(|(path, _)| path.as_str() != "/" && split_path(path).0 == dir)
            .map(|(_, entry)| entry.info.clone())
            .collect())
    }

    fn get_file_info(&self, path: &str) -> Result<FileInfo> {
        self.entries
            .get(&clean_path(path))
            .map(|entry| entry.info.clone())
            .ok_or_else(|| AnalyzerError::NotFound(path.to_string()))
    }

    fn copy_file(&self, path: &str, dest: &Path) -> Result<()> {
        let content = self
            .entries
            .get(&clean_path(path))
            .and_then(|entry| entry.content.as_ref())
            .ok_or_else(|| AnalyzerError::extraction(path, "no content"))?;
        fs::write(dest, content)?;
        Ok(())
    }

    fn image_name(&self) -> String {
        self.image_name.clone()
    }

    fn supported(&self) -> bool {
        self.supported
    }
}

/// Shared call log.
pub type CallLog = Rc<RefCell<Vec<String>>>;

pub fn new_log() -> CallLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// Plugin that records every call as `<name>.<event>`.
pub struct RecordingPlugin {
    name: String,
    log: CallLog,
    fail_on: Option<String>,
    offender_per_entry: bool,
    fragment: Option<Value>,
}

impl RecordingPlugin {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: Rc::clone(log),
            fail_on: None,
            offender_per_entry: false,
            fragment: None,
        }
    }

    /// Return an error from `check_file` on this path.
    pub fn fail_on(mut self, path: &str) -> Self {
        self.fail_on = Some(path.to_string());
        self
    }

    /// Add an offender for every entry seen.
    pub fn flag_everything(mut self) -> Self {
        self.offender_per_entry = true;
        self
    }

    pub fn with_fragment(mut self, fragment: Value) -> Self {
        self.fragment = Some(fragment);
        self
    }
}

impl Plugin for RecordingPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) {
        self.log.borrow_mut().push(format!("{}.start", self.name));
    }

    fn check_file(
        &mut self,
        analyzer: &mut dyn AnalyzerType,
        fi: &FileInfo,
        parent: &str,
    ) -> Result<()> {
        let path = join_path(parent, &fi.name);
        self.log.borrow_mut().push(format!("{}.check:{}", self.name, path));
        if self.offender_per_entry {
            analyzer.add_offender(&path, &format!("seen by {}", self.name));
        }
        if self.fail_on.as_deref() == Some(path.as_str()) {
            return Err(AnalyzerError::Config(format!("{} refuses {}", self.name, path)));
        }
        Ok(())
    }

    fn finalize(&mut self, _analyzer: &mut dyn AnalyzerType) -> Result<Option<Value>> {
        self.log.borrow_mut().push(format!("{}.finalize", self.name));
        Ok(self.fragment.clone())
    }
}

/// Analyzer over `fs` with default global settings.
pub fn analyzer_for(fs: MemFs) -> Analyzer {
    Analyzer::new(Box::new(fs), &GlobalConfig::default()).expect("analyzer should build")
}

/// Run a scan and return the parsed JSON report.
pub fn scan_report(analyzer: &mut Analyzer) -> Value {
    analyzer.run_plugins().expect("scan should succeed");
    let report = analyzer.json_report().expect("report should serialize");
    serde_json::from_str(&report).expect("report should be valid JSON")
}

/// Temporary directory for snapshots and other scan outputs.
pub struct TestEnv {
    /// Kept alive for the lifetime of the env
    pub _temp_dir: TempDir,
    pub dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let dir = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            dir,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn path_str(&self, name: &str) -> String {
        self.path(name).to_string_lossy().into_owned()
    }
}
