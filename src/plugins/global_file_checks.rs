//! Checks applied to every entry of the image: SUID bits, world writable
//! files, missing SELinux labels, owner allowlists, forbidden file names and
//! file capabilities.

use globset::{Glob, GlobBuilder, GlobMatcher};
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};

use super::{config_section, flag, format_caps};
use crate::analyzer::{AnalyzerType, Plugin};
use crate::common::{clean_path, join_path};
use crate::error::{AnalyzerError, Result};
use crate::fsparser::{FileInfo, SELINUX_NO_LABEL};

/// The `[GlobalFileChecks]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GlobalFileChecksConfig {
    #[serde(default)]
    pub suid: bool,
    /// Older name of `SuidAllowedList`, merged into it.
    #[serde(default)]
    pub suid_white_list: Vec<String>,
    #[serde(default)]
    pub suid_allowed_list: Vec<String>,
    #[serde(default)]
    pub world_write: bool,
    #[serde(rename = "SELinuxLabel", default)]
    pub selinux_label: bool,
    #[serde(default)]
    pub uids: Vec<i64>,
    #[serde(default)]
    pub gids: Vec<i64>,
    #[serde(default)]
    pub bad_files: Vec<String>,
    #[serde(default)]
    pub bad_files_informational_only: bool,
    #[serde(default)]
    pub flag_capability_informational_only: bool,
}

struct BadFile {
    pattern: String,
    /// Absolute patterns match the full path, others the base name.
    full_path: bool,
    matcher: GlobMatcher,
}

/// Per-entry policy checks.
pub struct GlobalFileChecks {
    config: GlobalFileChecksConfig,
    suid_allowed: HashSet<String>,
    uids: HashSet<i64>,
    gids: HashSet<i64>,
    bad_files: Vec<BadFile>,
}

fn compile_bad_file(pattern: String) -> Result<BadFile> {
    let glob: Glob = GlobBuilder::new(&pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| AnalyzerError::Config(format!("GlobalFileChecks: bad BadFiles pattern {pattern}: {e}")))?;
    Ok(BadFile {
        full_path: pattern.starts_with('/'),
        matcher: glob.compile_matcher(),
        pattern,
    })
}

impl GlobalFileChecks {
    pub fn new(config_text: &str) -> Result<Self> {
        let config: GlobalFileChecksConfig =
            config_section(config_text, "GlobalFileChecks")?.unwrap_or_default();

        let suid_allowed = config
            .suid_allowed_list
            .iter()
            .chain(&config.suid_white_list)
            .map(|p| clean_path(p))
            .collect();

        // sorted and deduplicated so findings come out in a stable order
        let patterns: BTreeSet<String> = config.bad_files.iter().map(|p| clean_path(p)).collect();
        let bad_files = patterns
            .into_iter()
            .map(compile_bad_file)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            suid_allowed,
            uids: config.uids.iter().copied().collect(),
            gids: config.gids.iter().copied().collect(),
            bad_files,
            config,
        })
    }

    fn check_bad_files(&self, analyzer: &mut dyn AnalyzerType, fi: &FileInfo, path: &str) {
        for bad in &self.bad_files {
            let candidate = if bad.full_path { path } else { fi.name.as_str() };
            if !bad.matcher.is_match(candidate) {
                continue;
            }
            let msg = if bad.pattern == candidate {
                "File not allowed".to_string()
            } else {
                format!("File not allowed for pattern: {}", bad.pattern)
            };
            flag(analyzer, path, &msg, self.config.bad_files_informational_only);
        }
    }
}

impl Plugin for GlobalFileChecks {
    fn name(&self) -> &str {
        "GlobalFileChecks"
    }

    fn check_file(
        &mut self,
        analyzer: &mut dyn AnalyzerType,
        fi: &FileInfo,
        parent: &str,
    ) -> Result<()> {
        let path = join_path(parent, &fi.name);

        if self.config.suid && (fi.is_suid() || fi.is_sgid()) && !self.suid_allowed.contains(&path) {
            analyzer.add_offender(&path, "File is SUID, not allowed");
        }
        if self.config.world_write && fi.is_world_writable() && !fi.is_link() && !fi.is_dir() {
            analyzer.add_offender(&path, "File is WorldWriteable, not allowed");
        }
        if self.config.selinux_label && fi.selinux_label == SELINUX_NO_LABEL {
            analyzer.add_offender(&path, "File does not have SELinux label");
        }
        if !self.uids.is_empty() && !self.uids.contains(&fi.uid) {
            analyzer.add_offender(&path, &format!("File Uid not allowed, Uid = {}", fi.uid));
        }
        if !self.gids.is_empty() && !self.gids.contains(&fi.gid) {
            analyzer.add_offender(&path, &format!("File Gid not allowed, Gid = {}", fi.gid));
        }
        if self.config.flag_capability_informational_only && !fi.capabilities.is_empty() {
            analyzer.add_informational(
                &path,
                &format!("Capabilities found: {}", format_caps(&fi.capabilities)),
            );
        }

        self.check_bad_files(analyzer, fi, &path);
        Ok(())
    }
}
