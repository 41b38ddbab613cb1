//! Configuration loading for fwaudit.
//!
//! A config is TOML. `[GlobalConfig]` selects the filesystem backend; every
//! check reads its own section from the same text. `[Include."<file>"]`
//! tables pull further files in, appended after the including file.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{AnalyzerError, Result};

/// Supported image backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum FsType {
    #[default]
    DirFs,
    SquashFs,
}

impl TryFrom<String> for FsType {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "dirfs" => Ok(Self::DirFs),
            "squashfs" => Ok(Self::SquashFs),
            other => Err(format!("unsupported FsType: {other}")),
        }
    }
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirFs => write!(f, "dirfs"),
            Self::SquashFs => write!(f, "squashfs"),
        }
    }
}

/// The `[GlobalConfig]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GlobalConfig {
    pub fs_type: FsType,
    #[serde(default)]
    pub fs_type_options: String,
    #[serde(default)]
    pub digest_image: bool,
}

impl GlobalConfig {
    /// `FsTypeOptions = "selinux"` asks the backend for labels and
    /// capabilities.
    pub fn selinux(&self) -> bool {
        self.fs_type_options.eq_ignore_ascii_case("selinux")
    }
}

#[derive(Deserialize)]
struct ConfigRoot {
    #[serde(rename = "GlobalConfig")]
    global: GlobalConfig,
}

#[derive(Deserialize)]
struct IncludeRoot {
    #[serde(rename = "Include", default)]
    include: toml::Table,
}

/// A fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Concatenated text of the config and everything it includes.
    pub text: String,
    pub global: GlobalConfig,
}

impl Config {
    /// Read `path` and its includes. Each file is looked up in `cfg_paths`
    /// first, then as given.
    pub fn load(path: &str, cfg_paths: &[PathBuf]) -> Result<Self> {
        let mut seen = BTreeSet::new();
        let text = read_with_includes(path, cfg_paths, &mut seen)?;
        Self::from_text(text)
    }

    /// Parse already concatenated config text.
    pub fn from_text(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let root: ConfigRoot = toml::from_str(&text)?;
        Ok(Self {
            text,
            global: root.global,
        })
    }
}

fn read_with_cfg_path(path: &str, cfg_paths: &[PathBuf]) -> Result<String> {
    for dir in cfg_paths {
        let candidate = dir.join(path.trim_start_matches('/'));
        if let Ok(text) = fs::read_to_string(&candidate) {
            debug!(path = %candidate.display(), "read config");
            return Ok(text);
        }
    }
    fs::read_to_string(Path::new(path))
        .map_err(|e| AnalyzerError::Config(format!("could not read config file {path}: {e}")))
}

fn read_with_includes(
    path: &str,
    cfg_paths: &[PathBuf],
    seen: &mut BTreeSet<String>,
) -> Result<String> {
    if !seen.insert(path.to_string()) {
        return Err(AnalyzerError::Config(format!("config include cycle at {path}")));
    }
    let mut text = read_with_cfg_path(path, cfg_paths)?;
    let includes: IncludeRoot = toml::from_str(&text)?;

    // toml::Table is ordered by key
    for include in includes.include.keys() {
        let included = read_with_includes(include, cfg_paths, seen)?;
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&included);
    }
    seen.remove(path);
    Ok(text)
}
