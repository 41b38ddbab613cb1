//! fwaudit library.
//!
//! Exposes the scan engine, the capability codec, the filesystem backends
//! and the checks so they can be driven from integration tests and other
//! tools.

pub mod analyzer;
pub mod capability;
pub mod common;
pub mod config;
pub mod digest;
pub mod error;
pub mod fsparser;
pub mod plugins;
pub mod process;
pub mod timing;

pub use analyzer::{Analyzer, AnalyzerReport, AnalyzerType, FindingValue, ImageInfo, Plugin};
pub use error::{AnalyzerError, Result};
pub use fsparser::{FileInfo, FsParser};
