//! Expected metadata for specific paths.
//!
//! Each `[FileStatCheck."<path>"]` table names one entry and the attributes
//! it must have. The checks run once the walk is over, looking the entries up
//! directly, so a missing file is reported too.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use super::{config_section, flag, format_caps};
use crate::analyzer::{AnalyzerType, Plugin};
use crate::capability::caps_equal;
use crate::error::{AnalyzerError, Result};
use crate::fsparser::FileInfo;

/// Expected attributes of one path. Unset fields are not checked.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileStatConfig {
    #[serde(default)]
    pub allow_empty: bool,
    /// Octal mode including the type bits, e.g. `"0100755"`.
    #[serde(default)]
    pub mode: String,
    pub uid: Option<i64>,
    pub gid: Option<i64>,
    #[serde(rename = "SELinuxLabel", default)]
    pub selinux_label: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub informational_only: bool,
}

struct StatRule {
    config: FileStatConfig,
    mode: Option<u64>,
}

pub struct FileStatCheck {
    rules: BTreeMap<String, StatRule>,
}

impl FileStatCheck {
    pub fn new(config_text: &str) -> Result<Self> {
        let section: BTreeMap<String, FileStatConfig> =
            config_section(config_text, "FileStatCheck")?.unwrap_or_default();

        let mut rules = BTreeMap::new();
        for (path, config) in section {
            let mode = if config.mode.is_empty() {
                None
            } else {
                let mode = u64::from_str_radix(&config.mode, 8).map_err(|e| {
                    AnalyzerError::Config(format!("FileStatCheck: bad Mode {} for {path}: {e}", config.mode))
                })?;
                Some(mode)
            };
            rules.insert(path, StatRule { config, mode });
        }
        Ok(Self { rules })
    }

    fn check_rule(analyzer: &mut dyn AnalyzerType, path: &str, rule: &StatRule, fi: &FileInfo) {
        let cfg = &rule.config;
        let desc = &cfg.desc;
        let mut failed = Vec::new();

        if !cfg.allow_empty && fi.size == 0 {
            failed.push(format!(
                "File State Check failed: size: {} AllowEmpty=false : {desc}",
                fi.size
            ));
        }
        if let Some(mode) = rule.mode {
            if fi.mode != mode {
                failed.push(format!(
                    "File State Check failed: mode found {:o} should be {} : {desc}",
                    fi.mode, cfg.mode
                ));
            }
        }
        if let Some(gid) = cfg.gid {
            if fi.gid != gid {
                failed.push(format!(
                    "File State Check failed: group found {} should be {gid} : {desc}",
                    fi.gid
                ));
            }
        }
        if let Some(uid) = cfg.uid {
            if fi.uid != uid {
                failed.push(format!(
                    "File State Check failed: owner found {} should be {uid} : {desc}",
                    fi.uid
                ));
            }
        }
        if !cfg.selinux_label.is_empty() && !cfg.selinux_label.eq_ignore_ascii_case(&fi.selinux_label) {
            failed.push(format!(
                "File State Check failed: selinux label found = {} should be = {} : {desc}",
                fi.selinux_label, cfg.selinux_label
            ));
        }
        if !cfg.capabilities.is_empty() && !caps_equal(&cfg.capabilities, &fi.capabilities) {
            failed.push(format!(
                "Capabilities found: {} expected: {}",
                format_caps(&fi.capabilities),
                format_caps(&cfg.capabilities)
            ));
        }

        for msg in failed {
            flag(analyzer, path, &msg, cfg.informational_only);
        }
    }
}

impl Plugin for FileStatCheck {
    fn name(&self) -> &str {
        "FileStatCheck"
    }

    fn check_file(&mut self, _: &mut dyn AnalyzerType, _: &FileInfo, _: &str) -> Result<()> {
        Ok(())
    }

    fn finalize(&mut self, analyzer: &mut dyn AnalyzerType) -> Result<Option<Value>> {
        for (path, rule) in &self.rules {
            match analyzer.get_file_info(path) {
                Ok(fi) => Self::check_rule(analyzer, path, rule, &fi),
                Err(e) => {
                    debug!(path = %path, error = %e, "stat target missing");
                    analyzer.add_offender(path, "file does not exist");
                }
            }
        }
        Ok(None)
    }
}
