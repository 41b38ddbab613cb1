//! SquashFS backend (`FsType = "squashfs"`), driven by `unsquashfs`.
//!
//! The full listing is read once with `unsquashfs -lln` (numeric owners) and
//! cached; files are extracted one at a time with `unsquashfs -e`.

use regex::Regex;
use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::*;
use crate::capability;
use crate::common::{clean_path, split_path};
use crate::error::{AnalyzerError, Result};
use crate::process::{self, Cmd};

const UNSQUASHFS_CLI: &str = "unsquashfs";
const CP_CLI: &str = "cp";

// drwxr-xr-x 0/0                  66 2019-04-08 18:49 /bin
const LINE_PATTERN: &str =
    r"^([A-Za-z-]+)\s+([\-\.\w]+)/([\-\.\w]+)\s+(\d+)\s+(\d+-\d+-\d+)\s+(\d+:\d+)\s*(.*)$";
// same, followed by a tab, the capability text and the SELinux label
const SECURITY_LINE_PATTERN: &str =
    r"^([A-Za-z-]+)\s+([\-\.\w]+)/([\-\.\w]+)\s+(\d+)\s+(\d+-\d+-\d+)\s+(\d+:\d+)\s+([\S ]+)\t(\S+)\s+(\S+)\s*$";

/// Mode string position, character and resulting bits, following the
/// table in squashfs-tools' `unsquashfs.c`.
const MODE_FLAGS: &[(usize, u8, u64)] = &[
    (0, b'-', S_IFREG),
    (0, b's', S_IFSOCK),
    (0, b'l', S_IFLNK),
    (0, b'b', S_IFBLK),
    (0, b'd', S_IFDIR),
    (0, b'c', S_IFCHR),
    (0, b'p', S_IFIFO),
    (1, b'r', S_IRUSR),
    (2, b'w', S_IWUSR),
    (3, b'x', S_IXUSR),
    (3, b's', S_IXUSR | S_ISUID),
    (3, b'S', S_ISUID),
    (4, b'r', S_IRGRP),
    (5, b'w', S_IWGRP),
    (6, b'x', S_IXGRP),
    (6, b's', S_IXGRP | S_ISGID),
    (6, b'S', S_ISGID),
    (7, b'r', S_IROTH),
    (8, b'w', S_IWOTH),
    (9, b'x', S_IXOTH),
    (9, b't', S_IXOTH | S_ISVTX),
    (9, b'T', S_ISVTX),
];

/// Parse an `ls -l` style mode string (`drwxr-sr-x`) into mode bits.
pub fn parse_mode(mode: &str) -> Option<u64> {
    let bytes = mode.as_bytes();
    if bytes.len() != 10 {
        return None;
    }
    Some(
        MODE_FLAGS
            .iter()
            .filter(|(pos, chr, _)| bytes[*pos] == *chr)
            .fold(0, |acc, (_, _, val)| acc | val),
    )
}

/// A squashfs image file.
pub struct SquashFs {
    image: PathBuf,
    line_regex: Regex,
    security_info: bool,
    files: OnceCell<BTreeMap<String, Vec<FileInfo>>>,
}

impl SquashFs {
    /// Open `image`. With `security_info`, capabilities and SELinux labels
    /// are read too if the installed `unsquashfs` supports `-llS`.
    pub fn new(image: impl Into<PathBuf>, security_info: bool) -> Self {
        let security_info = security_info && security_info_supported();
        let pattern = if security_info {
            SECURITY_LINE_PATTERN
        } else {
            LINE_PATTERN
        };
        Self {
            image: image.into(),
            // constant pattern, covered by tests
            line_regex: Regex::new(pattern).unwrap_or_else(|e| panic!("bad listing regex: {e}")),
            security_info,
            files: OnceCell::new(),
        }
    }

    /// Parse one listing line into `(directory, FileInfo)`.
    pub fn parse_line(&self, line: &str) -> Option<(String, FileInfo)> {
        let caps = self.line_regex.captures(line)?;
        let mut fi = FileInfo {
            mode: parse_mode(&caps[1])?,
            uid: caps[2].parse().ok()?,
            gid: caps[3].parse().ok()?,
            size: caps[4].parse().ok()?,
            ..Default::default()
        };

        let dir = if fi.is_link() {
            let (path, target) = caps[7].split_once(" -> ")?;
            fi.link_target = target.to_string();
            let (dir, name) = split_path(path);
            fi.name = name;
            dir
        } else {
            let (dir, name) = split_path(&caps[7]);
            fi.name = name;
            dir
        };

        if self.security_info {
            if &caps[8] != "-" {
                fi.capabilities = capability::decode_text(&caps[8]);
            }
            fi.selinux_label = caps[9].to_string();
        } else {
            fi.selinux_label = SELINUX_NO_LABEL.to_string();
        }
        Some((dir, fi))
    }

    fn load_listing(&self) -> Result<BTreeMap<String, Vec<FileInfo>>> {
        let mut cmd = Cmd::new(UNSQUASHFS_CLI);
        if self.security_info {
            cmd = cmd.arg("-llS");
        }
        let out = cmd
            .args(["-d", "", "-lln"])
            .arg_path(&self.image)
            .error_msg(format!("{} listing failed", UNSQUASHFS_CLI))
            .run()?;

        let mut files: BTreeMap<String, Vec<FileInfo>> = BTreeMap::new();
        let mut skipped = 0usize;
        for line in out.stdout.lines().filter(|l| !l.trim().is_empty()) {
            match self.parse_line(line) {
                Some((dir, fi)) => files.entry(dir).or_default().push(fi),
                None => skipped += 1,
            }
        }
        debug!(dirs = files.len(), skipped, "loaded squashfs listing");
        Ok(files)
    }

    fn listing(&self) -> Result<&BTreeMap<String, Vec<FileInfo>>> {
        if let Some(files) = self.files.get() {
            return Ok(files);
        }
        let files = self.load_listing()?;
        Ok(self.files.get_or_init(|| files))
    }
}

impl FsParser for SquashFs {
    fn get_dir_info(&self, dir_path: &str) -> Result<Vec<FileInfo>> {
        let key = clean_path(dir_path);
        Ok(self.listing()?.get(&key).cloned().unwrap_or_default())
    }

    fn get_file_info(&self, path: &str) -> Result<FileInfo> {
        let (mut dir, mut name) = split_path(path);
        // the root is listed as an empty path, which cleans to "."
        if dir == "/" && name.is_empty() {
            dir = ".".to_string();
            name = ".".to_string();
        }
        let mut fi = self
            .listing()?
            .get(&dir)
            .and_then(|entries| entries.iter().find(|fi| fi.name == name))
            .cloned()
            .ok_or_else(|| AnalyzerError::NotFound(path.to_string()))?;
        if name == "." {
            fi.name = "/".to_string();
        }
        Ok(fi)
    }

    fn copy_file(&self, path: &str, dest: &Path) -> Result<()> {
        let extract = |reason: String| AnalyzerError::extraction(path, reason);

        // unsquashfs reads the list of paths to extract from a file
        let mut list = tempfile::NamedTempFile::new().map_err(|e| extract(e.to_string()))?;
        list.write_all(path.as_bytes())
            .map_err(|e| extract(e.to_string()))?;

        // -d must not exist yet and receives the full path
        let tmp = tempfile::tempdir().map_err(|e| extract(e.to_string()))?;
        let out_dir = tmp.path().join("files");

        Cmd::new(UNSQUASHFS_CLI)
            .arg("-d")
            .arg_path(&out_dir)
            .arg("-e")
            .arg_path(list.path())
            .arg_path(&self.image)
            .run()
            .map_err(|e| extract(e.to_string()))?;

        let extracted = out_dir.join(path.trim_start_matches('/'));
        Cmd::new(CP_CLI)
            .arg("-a")
            .arg_path(&extracted)
            .arg_path(dest)
            .run()
            .map_err(|e| extract(e.to_string()))?;
        Ok(())
    }

    fn image_name(&self) -> String {
        self.image.to_string_lossy().into_owned()
    }

    fn supported(&self) -> bool {
        process::exists(UNSQUASHFS_CLI) && process::exists(CP_CLI)
    }
}

fn security_info_supported() -> bool {
    let Ok(out) = Cmd::new(UNSQUASHFS_CLI).allow_fail().run() else {
        return false;
    };
    // patched builds advertise -ll[S] in their usage text
    if out.stdout.contains("-ll[S]") || out.stderr.contains("-ll[S]") {
        return true;
    }
    warn!("security info (selinux + capabilities) not supported by this unsquashfs");
    false
}
