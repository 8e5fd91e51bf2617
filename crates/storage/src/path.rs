//! Path normalization and classification.
//!
//! Every path handed to a connector is normalized first. The canonical form
//! uses `/` separators, has no leading separator, and keeps a trailing `/`
//! on directories. The root is the empty string and means "all containers";
//! the first segment of any other path is its container (bucket, drive,
//! database, top-level directory).
//!
//! Classification is purely syntactic: `a/b/` is a directory and `a/b` is a
//! file, whatever the backend holds.

use crate::error::{ErrorKind, Result};

pub const SEPARATOR: char = '/';
pub const ROOT: &str = "";

/// Normalize a path into its canonical form.
///
/// # Examples
///
/// ```
/// use ferry_storage::path::normalize;
/// assert_eq!(normalize("\\bucket\\\\docs\\.\\a.txt").unwrap(), "bucket/docs/a.txt");
/// assert_eq!(normalize("bucket/docs/../img/").unwrap(), "bucket/img/");
/// assert_eq!(normalize("/").unwrap(), "");
/// assert!(normalize("bucket/../../etc").is_err());
/// ```
pub fn normalize(path: &str) -> Result<String> {
    if path.contains('\0') {
        exn::bail!(ErrorKind::InvalidPath(path.replace('\0', "\\0")));
    }
    let unified = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    let mut directory = unified.ends_with(SEPARATOR);
    for segment in unified.split(SEPARATOR) {
        match segment {
            "" => {},
            "." => directory = true,
            ".." => {
                if segments.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.to_string()));
                }
                directory = true;
            },
            segment => {
                segments.push(segment);
                directory = unified.ends_with(SEPARATOR);
            },
        }
    }
    if segments.is_empty() {
        return Ok(ROOT.to_string());
    }
    let mut normalized = segments.join("/");
    if directory {
        normalized.push(SEPARATOR);
    }
    Ok(normalized)
}

/// The container (first segment) and the remainder of a normalized path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathParts<'a> {
    pub container: &'a str,
    /// Path inside the container, empty for the container itself. Keeps
    /// the trailing separator of directory paths.
    pub relative: &'a str,
}

pub fn split(path: &str) -> PathParts<'_> {
    match path.split_once(SEPARATOR) {
        Some((container, relative)) => PathParts { container, relative },
        None => PathParts { container: path, relative: "" },
    }
}

pub fn is_root(path: &str) -> bool {
    path.is_empty() || path == "/"
}

pub fn is_directory(path: &str) -> bool {
    is_root(path) || path.ends_with(SEPARATOR)
}

pub fn is_file(path: &str) -> bool {
    !is_directory(path)
}

/// Final segment without its trailing separator. Empty for the root.
pub fn name(path: &str) -> &str {
    let trimmed = path.trim_end_matches(SEPARATOR);
    trimmed.rsplit_once(SEPARATOR).map(|(_, name)| name).unwrap_or(trimmed)
}

/// The directory containing `path`, or `None` for the root itself.
pub fn parent(path: &str) -> Option<&str> {
    if is_root(path) {
        return None;
    }
    let trimmed = path.trim_end_matches(SEPARATOR);
    Some(trimmed.rfind(SEPARATOR).map(|index| &trimmed[..=index]).unwrap_or(ROOT))
}

/// Resolve `relative` against the directory `base`, normalizing the result.
pub fn join(base: &str, relative: &str) -> Result<String> {
    if is_root(base) {
        return normalize(relative);
    }
    let base = base.trim_end_matches(SEPARATOR);
    normalize(&format!("{base}/{relative}"))
}

/// `path` relative to the directory `base`, or `None` when `path` is not
/// below `base`.
pub fn relative_to<'a>(path: &'a str, base: &str) -> Option<&'a str> {
    if is_root(base) {
        return Some(path);
    }
    path.strip_prefix(base).filter(|_| base.ends_with(SEPARATOR))
}

/// Normalize and require a non-root directory path.
pub(crate) fn require_directory(path: &str) -> Result<String> {
    let normalized = normalize(path)?;
    if is_root(&normalized) {
        exn::bail!(ErrorKind::EmptyPath);
    }
    if !is_directory(&normalized) {
        exn::bail!(ErrorKind::NotADirectory(normalized));
    }
    Ok(normalized)
}

/// Normalize and require a file path inside a container. A bare container
/// name is not a file.
pub(crate) fn require_file(path: &str) -> Result<String> {
    let normalized = normalize(path)?;
    check_file(&normalized)?;
    Ok(normalized)
}

/// Require an already normalized path to name a file inside a container.
pub(crate) fn check_file(normalized: &str) -> Result<()> {
    if is_root(normalized) {
        exn::bail!(ErrorKind::EmptyPath);
    }
    if !is_file(normalized) || split(normalized).relative.is_empty() {
        exn::bail!(ErrorKind::NotAFile(normalized.to_string()));
    }
    Ok(())
}
