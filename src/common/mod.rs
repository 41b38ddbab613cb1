//! Shared utilities across fwaudit modules.

pub mod files;
pub mod paths;
pub mod temp;

pub use files::{to_json_pretty, write_file_with_dirs};
pub use paths::{base_name, clean_path, clean_path_dir, join_path, split_path};
pub use temp::Workspace;
