//! File system source
//!
//! Walks a local directory, yielding files that match a glob pattern.

use super::{ContentSource, SourceEntry};
use crate::error::{Error, Result};
use futures::stream::{self, BoxStream, StreamExt};
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Directories to exclude from scanning
const EXCLUDE_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".cache",
    "vendor",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    "target",
];

/// Files larger than this are skipped by default
const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Options controlling which files a [`FileSource`] yields
#[derive(Debug, Clone)]
pub struct FileSourceOptions {
    /// Glob matched against the root-relative path
    pub pattern: String,
    pub exclude_dirs: Vec<String>,
    pub exclude_hidden: bool,
    pub follow_symlinks: bool,
    pub max_file_size: u64,
}

impl Default for FileSourceOptions {
    fn default() -> Self {
        Self {
            pattern: "**/*".to_string(),
            exclude_dirs: EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect(),
            exclude_hidden: true,
            follow_symlinks: false,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Content source over a local directory tree
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
    pattern: Pattern,
    options: FileSourceOptions,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_options(root, FileSourceOptions::default())
    }

    pub fn with_options(root: impl Into<PathBuf>, options: FileSourceOptions) -> Result<Self> {
        let pattern = Pattern::new(&options.pattern)?;
        Ok(Self {
            root: root.into(),
            pattern,
            options,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root-relative path with `/` separators
    fn relative_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn accept(&self, entry: &DirEntry) -> Option<(String, PathBuf)> {
        if !entry.file_type().is_file() {
            return None;
        }
        let relative = self.relative_path(entry.path());
        if !self.pattern.matches(&relative) {
            return None;
        }
        if let Ok(meta) = entry.metadata() {
            if meta.len() > self.options.max_file_size {
                debug!(path = %relative, size = meta.len(), "Skipping oversized file");
                return None;
            }
        }
        Some((relative, entry.path().to_path_buf()))
    }
}

impl ContentSource for FileSource {
    fn source_type(&self) -> &'static str {
        "file"
    }

    fn enumerate(&self) -> BoxStream<'_, Result<SourceEntry>> {
        if !self.root.is_dir() {
            let err = Error::SourceUnavailable(format!(
                "{} is not a readable directory",
                self.root.display()
            ));
            return stream::once(async move { Err(err) }).boxed();
        }

        let walker = WalkDir::new(&self.root)
            .follow_links(self.options.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !should_skip(e, &self.options));

        stream::iter(walker)
            .filter_map(move |entry| async move {
                match entry {
                    Ok(entry) => self.accept(&entry).map(Ok),
                    Err(e) => Some(Err(Error::SourceUnavailable(e.to_string()))),
                }
            })
            .then(read_entry)
            .boxed()
    }
}

async fn read_entry(accepted: Result<(String, PathBuf)>) -> Result<SourceEntry> {
    let (relative, path) = accepted?;
    let bytes = tokio::fs::read(&path).await.map_err(Error::from);
    Ok(SourceEntry {
        path: relative,
        locator: path.display().to_string(),
        bytes,
    })
}

fn should_skip(entry: &DirEntry, options: &FileSourceOptions) -> bool {
    let name = entry.file_name().to_string_lossy();

    if options.exclude_hidden && name.starts_with('.') {
        return true;
    }

    if entry.file_type().is_dir() && options.exclude_dirs.iter().any(|d| name == d.as_str()) {
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::fs;
    use tempfile::TempDir;

    async fn paths(source: &FileSource) -> Vec<String> {
        let entries: Vec<SourceEntry> = source.enumerate().try_collect().await.unwrap();
        entries.into_iter().map(|e| e.path).collect()
    }

    #[tokio::test]
    async fn test_file_source_lists_matching_files() {
        let temp = TempDir::new().unwrap();
        let base = temp.path();
        fs::create_dir_all(base.join("src/nested")).unwrap();
        fs::create_dir_all(base.join("target")).unwrap();
        fs::create_dir_all(base.join(".git")).unwrap();
        fs::write(base.join("README.md"), "# Readme").unwrap();
        fs::write(base.join("src/lib.rs"), "fn a() {}").unwrap();
        fs::write(base.join("src/nested/mod.rs"), "fn b() {}").unwrap();
        fs::write(base.join("target/out.rs"), "fn c() {}").unwrap();
        fs::write(base.join(".git/HEAD"), "ref").unwrap();

        let source = FileSource::new(base).unwrap();
        assert_eq!(
            paths(&source).await,
            vec!["README.md", "src/lib.rs", "src/nested/mod.rs"]
        );

        let options = FileSourceOptions {
            pattern: "**/*.rs".to_string(),
            ..Default::default()
        };
        let source = FileSource::with_options(base, options).unwrap();
        assert_eq!(paths(&source).await, vec!["src/lib.rs", "src/nested/mod.rs"]);
    }

    #[tokio::test]
    async fn test_file_source_reads_bytes_and_locator() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "hello").unwrap();

        let source = FileSource::new(temp.path()).unwrap();
        let entries: Vec<SourceEntry> = source.enumerate().try_collect().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].bytes.as_deref().unwrap(), b"hello");
        assert!(entries[0].locator.ends_with("a.txt"));
    }

    #[tokio::test]
    async fn test_file_source_skips_oversized() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("big.txt"), vec![b'x'; 64]).unwrap();
        fs::write(temp.path().join("small.txt"), "x").unwrap();

        let options = FileSourceOptions {
            max_file_size: 16,
            ..Default::default()
        };
        let source = FileSource::with_options(temp.path(), options).unwrap();
        assert_eq!(paths(&source).await, vec!["small.txt"]);
    }

    #[tokio::test]
    async fn test_missing_root_is_source_unavailable() {
        let temp = TempDir::new().unwrap();
        let source = FileSource::new(temp.path().join("missing")).unwrap();
        let result: Result<Vec<SourceEntry>> = source.enumerate().try_collect().await;
        assert!(matches!(result, Err(Error::SourceUnavailable(_))));
    }

    #[test]
    fn test_invalid_pattern() {
        let options = FileSourceOptions {
            pattern: "[".to_string(),
            ..Default::default()
        };
        assert!(FileSource::with_options("/tmp", options).is_err());
    }
}
