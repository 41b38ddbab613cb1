//! Plain directory backend (`FsType = "dirfs"`).
//!
//! Audits an already unpacked root filesystem. Ownership and mode come from
//! `lstat`; file capabilities are read with `getfattr` when it is installed.
//!
//! Image paths are strings. Host names that are not valid UTF-8 are shown
//! with each bad byte escaped as `\xNN`, and the listing remembers the real
//! host path so later lookups and copies reach the right file.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs::Metadata;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{FileInfo, FsParser, SELINUX_NO_LABEL};
use crate::capability;
use crate::common::{base_name, clean_path, join_path};
use crate::error::{AnalyzerError, Result};
use crate::process::{self, Cmd};

const CP_CLI: &str = "cp";
const GETFATTR_CLI: &str = "getfattr";
const CAP_XATTR: &str = "security.capability";

/// A directory on the host treated as an image root.
#[derive(Debug, Clone)]
pub struct DirFs {
    root: PathBuf,
    getfattr: Option<PathBuf>,
    /// Image path to host path, for entries whose host path is not the
    /// plain join of the root and the image path.
    escaped: RefCell<HashMap<String, PathBuf>>,
}

/// Image-side name for a host file name.
pub fn display_name(name: &OsStr) -> String {
    if let Some(s) = name.to_str() {
        return s.to_string();
    }
    let mut out = String::new();
    for chunk in name.as_bytes().utf8_chunks() {
        out.push_str(chunk.valid());
        for b in chunk.invalid() {
            out.push_str(&format!("\\x{b:02x}"));
        }
    }
    out
}

impl DirFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let getfattr = process::which(GETFATTR_CLI);
        if getfattr.is_none() {
            debug!("getfattr not found, file capabilities will not be reported");
        }
        Self {
            root: root.into(),
            getfattr,
            escaped: RefCell::new(HashMap::new()),
        }
    }

    fn plain_host_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn host_path(&self, path: &str) -> PathBuf {
        let path = clean_path(path);
        match self.escaped.borrow().get(&path) {
            Some(host) => host.clone(),
            None => self.plain_host_path(&path),
        }
    }

    fn read_capabilities(&self, host: &Path) -> Vec<String> {
        if self.getfattr.is_none() {
            return Vec::new();
        }
        let result = Cmd::new(GETFATTR_CLI)
            .args(["--absolute-names", "-h", "-e", "hex", "-n", CAP_XATTR])
            .arg_path(host)
            .allow_fail()
            .run();
        // no attribute is the normal case and exits non-zero
        match result {
            Ok(out) if out.success() => parse_getfattr_caps(&out.stdout),
            Ok(_) => Vec::new(),
            Err(e) => {
                warn!(path = %host.display(), error = %e, "getfattr failed");
                Vec::new()
            }
        }
    }

    fn file_info_at(&self, host: &Path, name: String, meta: &Metadata) -> Result<FileInfo> {
        let mut fi = FileInfo {
            name,
            size: meta.size() as i64,
            mode: u64::from(meta.mode()),
            uid: i64::from(meta.uid()),
            gid: i64::from(meta.gid()),
            selinux_label: SELINUX_NO_LABEL.to_string(),
            ..Default::default()
        };

        if fi.is_file() {
            fi.capabilities = self.read_capabilities(host);
        }
        if fi.is_link() {
            fi.link_target = display_name(std::fs::read_link(host)?.as_os_str());
        }
        Ok(fi)
    }
}

/// Pull the capability blob out of `getfattr -e hex` output and decode it.
pub fn parse_getfattr_caps(output: &str) -> Vec<String> {
    let prefix = format!("{}=0x", CAP_XATTR);
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix(prefix.as_str()))
        .and_then(|hex| hex::decode(hex).ok())
        .map(|raw| capability::decode_bytes(&raw))
        .unwrap_or_default()
}

impl FsParser for DirFs {
    fn get_dir_info(&self, dir_path: &str) -> Result<Vec<FileInfo>> {
        let host = self.host_path(dir_path);
        let mut files = Vec::new();
        for entry in WalkDir::new(&host)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| AnalyzerError::Io(e.into()))?;
            let name = display_name(entry.file_name());
            let image_path = join_path(dir_path, &name);
            if entry.path() != self.plain_host_path(&image_path) {
                self.escaped
                    .borrow_mut()
                    .insert(image_path, entry.path().to_path_buf());
            }
            let meta = entry.metadata().map_err(|e| AnalyzerError::Io(e.into()))?;
            files.push(self.file_info_at(entry.path(), name, &meta)?);
        }
        Ok(files)
    }

    fn get_file_info(&self, path: &str) -> Result<FileInfo> {
        let host = self.host_path(path);
        let meta = std::fs::symlink_metadata(&host).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AnalyzerError::NotFound(path.to_string())
            } else {
                AnalyzerError::Io(e)
            }
        })?;
        self.file_info_at(&host, base_name(path), &meta)
    }

    fn copy_file(&self, path: &str, dest: &Path) -> Result<()> {
        let host = self.host_path(path);
        if std::fs::symlink_metadata(&host).is_err() {
            return Err(AnalyzerError::extraction(path, "no such file"));
        }
        Cmd::new(CP_CLI)
            .arg("-a")
            .arg_path(&host)
            .arg_path(dest)
            .error_msg(format!("{} -a {} failed", CP_CLI, host.display()))
            .run()
            .map_err(|e| AnalyzerError::extraction(path, e.to_string()))?;
        Ok(())
    }

    fn image_name(&self) -> String {
        self.root.to_string_lossy().into_owned()
    }

    fn supported(&self) -> bool {
        process::exists(CP_CLI)
    }
}
