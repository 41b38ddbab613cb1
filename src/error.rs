//! Error taxonomy for a scan.
//!
//! Configuration and walk errors are fatal: the run stops and no report is
//! produced. Extraction errors are handed back to the requesting plugin,
//! which turns them into findings. Decode problems never become errors.

use thiserror::Error;

/// Result type alias for analyzer operations.
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Errors that can occur while configuring or running a scan.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    /// Malformed or inconsistent configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// TOML syntax or type error in a config file
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Reading the root entry or a directory listing failed
    #[error("walk failed at {path}")]
    Walk {
        /// Path that could not be read
        path: String,
        #[source]
        source: Box<AnalyzerError>,
    },

    /// A plugin rejected an entry; the whole run is aborted
    #[error("plugin {plugin} failed on {path}")]
    Plugin {
        /// Display name of the failing plugin
        plugin: String,
        /// Entry being checked (or "finalize")
        path: String,
        #[source]
        source: Box<AnalyzerError>,
    },

    /// Copying a file out of the image failed
    #[error("could not extract {path}: {reason}")]
    Extraction {
        /// Path inside the image
        path: String,
        /// Why the copy failed
        reason: String,
    },

    /// Entry does not exist in the image
    #[error("no such file in image: {0}")]
    NotFound(String),

    /// The filesystem abstraction cannot run in this environment
    #[error("{0}")]
    Unsupported(String),

    /// An external tool could not be started or exited non-zero
    #[error("{0}")]
    Command(String),

    /// A previous `run_plugins` failed, so there is no report to hand out
    #[error("scan aborted, no report available")]
    Aborted,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnalyzerError {
    /// Wrap an error that stopped the walk at `path`.
    pub fn walk(path: impl Into<String>, source: AnalyzerError) -> Self {
        Self::Walk {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Wrap an error returned by a plugin.
    pub fn plugin(plugin: impl Into<String>, path: impl Into<String>, source: AnalyzerError) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Build an extraction error.
    pub fn extraction(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Extraction {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors a plugin is expected to absorb as a finding.
    pub fn is_extraction(&self) -> bool {
        matches!(self, Self::Extraction { .. })
    }
}
