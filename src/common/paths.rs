//! Path helpers for image-internal paths.
//!
//! Paths inside an image are always `/`-separated strings rooted at `/`,
//! independent of the host platform, so they are handled lexically here
//! rather than through `std::path`.

/// Lexically clean an image path: collapse repeated separators, drop `.`
/// segments and resolve `..` against earlier segments.
///
/// An empty path cleans to `"."`, matching how relative listings name the
/// current directory.
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Clean a directory path and guarantee a trailing `/`.
///
/// Used for prefix matching so that `/etc` does not match `/etcetera`.
pub fn clean_path_dir(path: &str) -> String {
    let mut cleaned = clean_path(path);
    if !cleaned.ends_with('/') {
        cleaned.push('/');
    }
    cleaned
}

/// Join a parent directory and an entry name into a clean absolute path.
///
/// `join_path("/", "/")` is `/`, which is how the root entry is addressed.
pub fn join_path(parent: &str, name: &str) -> String {
    if name.is_empty() {
        return clean_path(parent);
    }
    clean_path(&format!("{}/{}", parent, name))
}

/// Split a path into its cleaned directory and final element.
///
/// The root of a relative listing (`""`, `"."`) yields `(".", ".")`.
pub fn split_path(path: &str) -> (String, String) {
    let cleaned = clean_path(path);
    match cleaned.rfind('/') {
        Some(idx) => {
            let dir = if idx == 0 { "/" } else { &cleaned[..idx] };
            (dir.to_string(), cleaned[idx + 1..].to_string())
        }
        None if cleaned == "." => (".".to_string(), ".".to_string()),
        None => (".".to_string(), cleaned),
    }
}

/// Final element of a path; the root is its own base name.
pub fn base_name(path: &str) -> String {
    let cleaned = clean_path(path);
    if cleaned == "/" {
        return cleaned;
    }
    split_path(&cleaned).1
}
