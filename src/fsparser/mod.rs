//! Filesystem abstraction over a firmware image.
//!
//! The analyzer never touches an image directly. It asks an [`FsParser`]
//! for directory listings and file metadata, and for copies of individual
//! files when a check needs their content.

pub mod dirfs;
pub mod squashfs;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

pub use dirfs::DirFs;
pub use squashfs::SquashFs;

/// SELinux label value meaning "no label present".
pub const SELINUX_NO_LABEL: &str = "-";

pub const S_IFMT: u64 = 0o170000;
pub const S_IFSOCK: u64 = 0o140000;
pub const S_IFLNK: u64 = 0o120000;
pub const S_IFREG: u64 = 0o100000;
pub const S_IFBLK: u64 = 0o060000;
pub const S_IFDIR: u64 = 0o040000;
pub const S_IFCHR: u64 = 0o020000;
pub const S_IFIFO: u64 = 0o010000;
pub const S_ISUID: u64 = 0o004000;
pub const S_ISGID: u64 = 0o002000;
pub const S_ISVTX: u64 = 0o001000;
pub const S_IRUSR: u64 = 0o0400;
pub const S_IWUSR: u64 = 0o0200;
pub const S_IXUSR: u64 = 0o0100;
pub const S_IRGRP: u64 = 0o0040;
pub const S_IWGRP: u64 = 0o0020;
pub const S_IXGRP: u64 = 0o0010;
pub const S_IROTH: u64 = 0o0004;
pub const S_IWOTH: u64 = 0o0002;
pub const S_IXOTH: u64 = 0o0001;

/// Metadata for one entry of an image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    #[serde(default)]
    pub size: i64,
    /// POSIX mode including the file type bits.
    #[serde(default)]
    pub mode: u64,
    #[serde(default)]
    pub uid: i64,
    #[serde(default)]
    pub gid: i64,
    #[serde(rename = "se_linux_label", default, skip_serializing_if = "String::is_empty")]
    pub selinux_label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub link_target: String,
}

impl FileInfo {
    pub fn is_suid(&self) -> bool {
        self.mode & S_ISUID != 0
    }

    pub fn is_sgid(&self) -> bool {
        self.mode & S_ISGID != 0
    }

    pub fn is_world_writable(&self) -> bool {
        self.mode & S_IWOTH != 0
    }

    pub fn is_file(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_link(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }
}

/// Access to one parsed or mounted image.
pub trait FsParser {
    /// Direct children of `dir_path`; never recurses.
    fn get_dir_info(&self, dir_path: &str) -> Result<Vec<FileInfo>>;

    /// Metadata for a single entry. The root is addressed as `/`.
    fn get_file_info(&self, path: &str) -> Result<FileInfo>;

    /// Copy the entry at `path` onto the host file `dest`.
    fn copy_file(&self, path: &str, dest: &Path) -> Result<()>;

    /// Name (path) of the image being inspected.
    fn image_name(&self) -> String;

    /// Whether the host tools this backend needs are available.
    fn supported(&self) -> bool;
}
