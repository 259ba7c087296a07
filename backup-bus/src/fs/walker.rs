//! Source directory scan for backups.
//!
//! Produces the file list declared in `begin_backup`: regular files only,
//! keyed by a `/`-separated path relative to the scanned root.

use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Follow symbolic links
    pub follow_links: bool,

    /// Maximum depth (None = unlimited)
    pub max_depth: Option<usize>,

    /// Entries whose file name contains one of these are skipped, along with
    /// everything below them
    pub exclude_patterns: Vec<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            follow_links: false,
            max_depth: None,
            exclude_patterns: vec![
                ".git".to_string(),
                "node_modules".to_string(),
                ".DS_Store".to_string(),
            ],
        }
    }
}

/// A file discovered under the backup root.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Full path to the file
    pub path: PathBuf,

    /// Path relative to the root, always `/`-separated
    pub relative_path: String,

    /// File size in bytes
    pub size: u64,
}

impl SourceFile {
    /// Returns None for anything that is not (or does not resolve to) a
    /// regular file.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let path = entry.path().to_path_buf();
        let metadata = if entry.path_is_symlink() {
            match std::fs::metadata(&path) {
                Ok(resolved) => resolved,
                // Broken symlink
                Err(_) => return Ok(None),
            }
        } else {
            entry.metadata()?
        };

        if !metadata.is_file() {
            return Ok(None);
        }

        let relative = path.strip_prefix(root).unwrap_or(&path);
        Ok(Some(Self {
            relative_path: to_relative_key(relative),
            path,
            size: metadata.len(),
        }))
    }
}

/// Walk `root` and collect every regular file, sorted by relative path.
pub fn scan_source(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<SourceFile>> {
    let mut walker = WalkDir::new(root).follow_links(options.follow_links);
    if let Some(max_depth) = options.max_depth {
        walker = walker.max_depth(max_depth);
    }

    let mut files = Vec::new();
    for entry in walker
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !should_exclude(e, &options.exclude_patterns))
    {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }
        if let Some(file) = SourceFile::from_entry(&entry, root)? {
            files.push(file);
        }
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

fn to_relative_key(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn should_exclude(entry: &DirEntry, patterns: &[String]) -> bool {
    let file_name = entry.file_name().to_string_lossy();
    patterns.iter().any(|pattern| file_name.contains(pattern.as_str()))
}
