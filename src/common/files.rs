//! Utilities for writing output files with automatic parent directory creation.

use std::fs;
use std::path::Path;

use crate::error::Result;

/// Write a file, creating parent directories as needed.
///
/// Used for reports and tree snapshots, which may target an output
/// directory that does not exist yet.
pub fn write_file_with_dirs<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, content: C) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, content)?;
    Ok(())
}

/// Serialize a value as JSON indented with tabs.
pub fn to_json_pretty<T: serde::Serialize>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    // serde_json only ever emits UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_parents() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("a/b/report.json");
        write_file_with_dirs(&target, "{}").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "{}");
    }

    #[test]
    fn test_pretty_uses_tabs() {
        let json = to_json_pretty(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(json, "{\n\t\"a\": 1\n}");
    }
}
