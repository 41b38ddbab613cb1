//! Report accumulated over one scan.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A single finding or data value.
///
/// The variant is chosen once, when the value is added: anything that parses
/// as a JSON object or array is kept structured, everything else is text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FindingValue {
    PlainText(String),
    Structured(Value),
}

impl FindingValue {
    /// Classify `raw` as structured JSON or plain text.
    pub fn sniff(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(value @ (Value::Object(_) | Value::Array(_))) => Self::Structured(value),
            _ => Self::PlainText(raw.to_string()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::PlainText(s) => Some(s),
            Self::Structured(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Structured(v) => Some(v),
            Self::PlainText(_) => None,
        }
    }
}

/// Image metadata shared with plugins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub fs_type: String,
    pub image_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_digest: Option<String>,
}

/// The final scan report.
///
/// Empty maps are left out of the serialized form entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzerReport {
    #[serde(flatten)]
    pub image: ImageInfo,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, FindingValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub offenders: BTreeMap<String, Vec<FindingValue>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub informational: BTreeMap<String, Vec<FindingValue>>,
    /// Top-level keys contributed by plugin `finalize` fragments.
    #[serde(flatten)]
    pub plugin_reports: Map<String, Value>,
}

impl AnalyzerReport {
    pub fn new(image: ImageInfo) -> Self {
        Self {
            image,
            ..Default::default()
        }
    }

    pub fn add_offender(&mut self, path: &str, value: &str) {
        self.offenders
            .entry(path.to_string())
            .or_default()
            .push(FindingValue::sniff(value));
    }

    pub fn add_informational(&mut self, path: &str, value: &str) {
        self.informational
            .entry(path.to_string())
            .or_default()
            .push(FindingValue::sniff(value));
    }

    /// Later writes to the same key replace earlier ones.
    pub fn add_data(&mut self, key: &str, value: &str) {
        self.data.insert(key.to_string(), FindingValue::sniff(value));
    }

    /// Merge the top-level keys of a plugin fragment. Anything other than a
    /// JSON object is ignored.
    pub fn merge_plugin_report(&mut self, fragment: Value) {
        if let Value::Object(map) = fragment {
            self.plugin_reports.extend(map);
        }
    }

    /// Drop every finding, keeping only the image metadata.
    pub fn clear_findings(&mut self) {
        self.data.clear();
        self.offenders.clear();
        self.informational.clear();
        self.plugin_reports.clear();
    }
}
