//! Read-only directory listings used across valrun.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Whether `path` has one of `extensions` (compared case-insensitively,
/// without the leading dot).
pub fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Regular files directly inside `dir` whose extension is in `extensions`,
/// sorted by path.
pub fn files_with_extensions(dir: &Path, extensions: &[String]) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if matches_extension(&path, extensions) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Like [`files_with_extensions`], keeping only files modified at or after
/// `since`. Files whose modification time cannot be read are left out.
pub fn files_modified_since(
    dir: &Path,
    extensions: &[String],
    since: SystemTime,
) -> io::Result<Vec<PathBuf>> {
    let mut found = files_with_extensions(dir, extensions)?;
    found.retain(|path| {
        path.metadata()
            .and_then(|meta| meta.modified())
            .map(|modified| modified >= since)
            .unwrap_or(false)
    });
    Ok(found)
}

/// Regular files directly inside `dir` named exactly `name`.
///
/// Always zero or one entry on case-sensitive filesystems; kept as a list so
/// callers count matches the same way for every file kind.
pub fn files_named(dir: &Path, name: &str) -> io::Result<Vec<PathBuf>> {
    let candidate = dir.join(name);
    match fs::metadata(&candidate) {
        Ok(meta) if meta.is_file() => Ok(vec![candidate]),
        Ok(_) => Ok(Vec::new()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// Non-hidden sub-directories of `dir`, skipping any name in `excluded`.
/// Returned as `(name, path)` pairs in directory order.
pub fn mesh_candidates(dir: &Path, excluded: &[&str]) -> io::Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || excluded.contains(&name.as_str()) {
            continue;
        }
        found.push((name, entry.path()));
    }
    Ok(found)
}
