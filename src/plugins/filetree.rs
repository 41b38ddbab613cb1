//! File tree drift detection.
//!
//! Every scan records a snapshot of the image (path, owner, mode, size,
//! label and content digest) and compares it against a baseline snapshot
//! from an earlier build. Differences are reported as informational
//! findings. When the tree changed, the fresh snapshot is written next to
//! the baseline with a `.new` suffix; the baseline itself is never touched,
//! so promoting a new baseline is a manual step.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use super::config_section;
use crate::analyzer::{AnalyzerType, Plugin};
use crate::common::{clean_path_dir, join_path, to_json_pretty, write_file_with_dirs};
use crate::error::Result;
use crate::fsparser::FileInfo;

/// Suffix of the snapshot written by a scan that found drift.
pub const NEW_TREE_EXT: &str = ".new";

/// Digest recorded when content is not hashed.
pub const DIGEST_SKIPPED: &str = "0";

/// The `[FileTreeCheck]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileTreeConfig {
    /// Baseline snapshot; empty disables the check.
    #[serde(default)]
    pub old_tree_file_path: String,
    /// Path prefixes that take part in the comparison. Unset means `/`.
    #[serde(default)]
    pub check_path: Option<Vec<String>>,
    #[serde(default)]
    pub check_perms_owner_change: bool,
    #[serde(default)]
    pub check_file_size: bool,
    #[serde(default)]
    pub check_file_digest: bool,
    #[serde(default)]
    pub skip_file_digest: bool,
}

/// One recorded entry: metadata keyed by full path plus content digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    #[serde(flatten)]
    pub info: FileInfo,
    pub digest: String,
}

impl SnapshotEntry {
    /// `<octal mode> <uid>:<gid> <size> <digest> SELinux label: <label>`
    pub fn summary(&self) -> String {
        let fi = &self.info;
        format!(
            "{:o} {}:{} {} {} SELinux label: {}",
            fi.mode, fi.uid, fi.gid, fi.size, self.digest, fi.selinux_label
        )
    }
}

/// On-disk snapshot format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub image_name: String,
    #[serde(default)]
    pub image_digest: String,
    #[serde(default)]
    pub files: Option<Vec<SnapshotEntry>>,
}

impl Snapshot {
    pub fn read(path: &Path) -> Result<BTreeMap<String, SnapshotEntry>> {
        let data = fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&data)?;
        Ok(snapshot
            .files
            .unwrap_or_default()
            .into_iter()
            .map(|entry| (entry.info.name.clone(), entry))
            .collect())
    }
}

/// Result of comparing two trees, each list sorted by path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl TreeDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Which optional attributes count as a change.
#[derive(Debug, Clone, Copy, Default)]
pub struct Compare {
    pub size: bool,
    pub digest: bool,
}

fn in_scope(path: &str, scope: &[String]) -> bool {
    scope.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

fn entry_changed(old: &SnapshotEntry, cur: &SnapshotEntry, compare: Compare) -> bool {
    old.info.mode != cur.info.mode
        || old.info.uid != cur.info.uid
        || old.info.gid != cur.info.gid
        || old.info.selinux_label != cur.info.selinux_label
        || (compare.size && old.info.size != cur.info.size)
        || (compare.digest && old.digest != cur.digest)
}

/// Compare `current` against `baseline`, looking only at paths under one of
/// the `scope` prefixes.
pub fn diff_trees(
    baseline: &BTreeMap<String, SnapshotEntry>,
    current: &BTreeMap<String, SnapshotEntry>,
    scope: &[String],
    compare: Compare,
) -> TreeDiff {
    let mut diff = TreeDiff::default();
    for (path, old) in baseline.iter().filter(|(p, _)| in_scope(p, scope)) {
        match current.get(path) {
            None => diff.removed.push(path.clone()),
            Some(cur) if entry_changed(old, cur, compare) => diff.changed.push(path.clone()),
            Some(_) => {}
        }
    }
    diff.added = current
        .keys()
        .filter(|p| in_scope(p, scope) && !baseline.contains_key(*p))
        .cloned()
        .collect();
    diff
}

/// Snapshot-and-compare check.
pub struct FileTree {
    config: FileTreeConfig,
    scope: Vec<String>,
    tree: BTreeMap<String, SnapshotEntry>,
}

impl FileTree {
    /// Read `[FileTreeCheck]` from `config_text`. A relative or absolute
    /// `OldTreeFilePath` is placed below `extra_dir` when one is given.
    pub fn new(config_text: &str, extra_dir: Option<&Path>) -> Result<Self> {
        let mut config: FileTreeConfig =
            config_section(config_text, "FileTreeCheck")?.unwrap_or_default();

        let scope = config
            .check_path
            .clone()
            .unwrap_or_else(|| vec!["/".to_string()])
            .iter()
            .map(|p| clean_path_dir(p))
            .collect();

        if let Some(dir) = extra_dir {
            if !config.old_tree_file_path.is_empty() {
                config.old_tree_file_path = dir
                    .join(config.old_tree_file_path.trim_start_matches('/'))
                    .to_string_lossy()
                    .into_owned();
            }
        }

        Ok(Self {
            config,
            scope,
            tree: BTreeMap::new(),
        })
    }

    fn enabled(&self) -> bool {
        !self.config.old_tree_file_path.is_empty()
    }

    fn new_tree_path(&self) -> String {
        format!("{}{}", self.config.old_tree_file_path, NEW_TREE_EXT)
    }

    /// Entries recorded by the current scan.
    pub fn tree(&self) -> &BTreeMap<String, SnapshotEntry> {
        &self.tree
    }

    fn save_tree(&self, analyzer: &dyn AnalyzerType) -> Result<String> {
        let image = analyzer.image_info();
        let snapshot = Snapshot {
            image_name: image.image_name,
            image_digest: image.image_digest.unwrap_or_default(),
            files: Some(self.tree.values().cloned().collect()),
        };
        let path = self.new_tree_path();
        write_file_with_dirs(&path, to_json_pretty(&snapshot)?)?;
        info!(path = %path, files = self.tree.len(), "wrote file tree snapshot");
        Ok(path)
    }

    fn report_diff(
        &self,
        analyzer: &mut dyn AnalyzerType,
        baseline: &BTreeMap<String, SnapshotEntry>,
        diff: &TreeDiff,
    ) {
        for path in &diff.added {
            let summary = self.tree[path].summary();
            analyzer.add_informational(path, &format!("CheckFileTree: new file: {summary}"));
        }
        for path in &diff.removed {
            let summary = baseline[path].summary();
            analyzer.add_informational(path, &format!("CheckFileTree: file removed: {summary}"));
        }
        if self.config.check_perms_owner_change {
            for path in &diff.changed {
                analyzer.add_informational(
                    path,
                    &format!(
                        "CheckFileTree: file perms/owner/size/digest changed from: {} to: {}",
                        baseline[path].summary(),
                        self.tree[path].summary()
                    ),
                );
            }
        }
    }
}

impl Plugin for FileTree {
    fn name(&self) -> &str {
        "FileTreeCheck"
    }

    fn start(&mut self) {
        self.tree.clear();
    }

    fn check_file(
        &mut self,
        analyzer: &mut dyn AnalyzerType,
        fi: &FileInfo,
        parent: &str,
    ) -> Result<()> {
        if !self.enabled() {
            return Ok(());
        }
        let path = join_path(parent, &fi.name);

        let digest = if fi.is_file() && !self.config.skip_file_digest {
            match analyzer.file_get_sha256(&path) {
                Ok(digest) => digest,
                Err(e) if e.is_extraction() => {
                    analyzer.add_informational(&path, &format!("CheckFileTree: could not digest file: {e}"));
                    DIGEST_SKIPPED.to_string()
                }
                Err(e) => return Err(e),
            }
        } else {
            DIGEST_SKIPPED.to_string()
        };

        let entry = SnapshotEntry {
            info: FileInfo {
                name: path.clone(),
                size: fi.size,
                mode: fi.mode,
                uid: fi.uid,
                gid: fi.gid,
                selinux_label: fi.selinux_label.clone(),
                ..Default::default()
            },
            digest,
        };
        self.tree.insert(path, entry);
        Ok(())
    }

    fn finalize(&mut self, analyzer: &mut dyn AnalyzerType) -> Result<Option<Value>> {
        if !self.enabled() {
            return Ok(None);
        }
        let old_path = self.config.old_tree_file_path.clone();

        let baseline = match Snapshot::read(Path::new(&old_path)) {
            Ok(baseline) => baseline,
            Err(e) => {
                // first scan of this lineage: no findings, just a baseline candidate
                warn!(path = %old_path, error = %e, "no usable baseline file tree, bootstrapping");
                let new_path = self.save_tree(analyzer)?;
                return Ok(Some(json!({
                    "old_file_tree_path": old_path,
                    "current_file_tree_path": new_path,
                })));
            }
        };

        let compare = Compare {
            size: self.config.check_file_size,
            digest: self.config.check_file_digest,
        };
        let diff = diff_trees(&baseline, &self.tree, &self.scope, compare);
        debug!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            changed = diff.changed.len(),
            "file tree compared"
        );

        let tree_updated = !diff.added.is_empty()
            || !diff.removed.is_empty()
            || (!diff.changed.is_empty() && self.config.check_perms_owner_change);

        let mut fragment = json!({ "old_file_tree_path": old_path });
        if tree_updated {
            let new_path = self.save_tree(analyzer)?;
            fragment["current_file_tree_path"] = Value::String(new_path);
        }

        self.report_diff(analyzer, &baseline, &diff);
        Ok(Some(fragment))
    }
}
