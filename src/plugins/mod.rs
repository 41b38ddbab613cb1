//! Concrete checks run by the analyzer.
//!
//! Each check reads its own top-level section out of the shared config text;
//! a missing section leaves the check with its defaults (usually disabled).

pub mod file_stat_check;
pub mod filetree;
pub mod global_file_checks;

use serde::de::DeserializeOwned;

use crate::analyzer::AnalyzerType;
use crate::error::Result;

pub use file_stat_check::FileStatCheck;
pub use filetree::FileTree;
pub use global_file_checks::GlobalFileChecks;

/// Deserialize the `[name]` table of `text`, if present.
pub fn config_section<T: DeserializeOwned>(text: &str, name: &str) -> Result<Option<T>> {
    let table: toml::Table = toml::from_str(text)?;
    let section = table
        .get(name)
        .cloned()
        .map(|value| value.try_into::<T>())
        .transpose()?;
    Ok(section)
}

/// Record `msg` as an informational finding or an offender.
pub(crate) fn flag(analyzer: &mut dyn AnalyzerType, path: &str, msg: &str, informational: bool) {
    if informational {
        analyzer.add_informational(path, msg);
    } else {
        analyzer.add_offender(path, msg);
    }
}

/// Render a capability list as `[cap_a+p cap_b+i]`.
pub(crate) fn format_caps<S: AsRef<str>>(caps: &[S]) -> String {
    let joined: Vec<&str> = caps.iter().map(|c| c.as_ref()).collect();
    format!("[{}]", joined.join(" "))
}
