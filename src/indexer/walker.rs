use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use ignore::WalkBuilder;

use crate::context::RequestContext;
use crate::error::Result;
use crate::languages::AnalyzerRegistry;

/// Stop walking this long before the request deadline.
pub const DEFAULT_DEADLINE_MARGIN: Duration = Duration::from_millis(200);
const DEFAULT_MAX_FILE_BYTES: u64 = 16 << 20;

/// Sources found under a root, keyed by language name then by
/// root-relative path with `/` separators.
#[derive(Debug, Default)]
pub struct WalkOutput {
    pub languages: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    /// Set when the walk stopped at the soft deadline.
    pub truncated: bool,
}

impl WalkOutput {
    pub fn file_count(&self) -> usize {
        self.languages.values().map(BTreeMap::len).sum()
    }
}

pub struct FileWalker<'r> {
    registry: &'r AnalyzerRegistry,
    deadline_margin: Duration,
    max_file_bytes: u64,
}

impl<'r> FileWalker<'r> {
    pub fn new(registry: &'r AnalyzerRegistry) -> Self {
        Self {
            registry,
            deadline_margin: DEFAULT_DEADLINE_MARGIN,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    pub fn with_deadline_margin(mut self, margin: Duration) -> Self {
        self.deadline_margin = margin;
        self
    }

    pub fn with_max_file_bytes(mut self, limit: u64) -> Self {
        self.max_file_bytes = limit;
        self
    }

    pub fn walk(&self, root: &Path, ctx: &RequestContext) -> Result<WalkOutput> {
        let mut output = WalkOutput::default();

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .ignore(true)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker.flatten() {
            if ctx.soft_deadline_reached(self.deadline_margin) {
                tracing::warn!("walk of {} stopped at the deadline", root.display());
                output.truncated = true;
                break;
            }
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(language) = self.get_language(path) else {
                continue;
            };
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if size > self.max_file_bytes {
                tracing::warn!("skipping {}: {} bytes", path.display(), size);
                continue;
            }
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            output
                .languages
                .entry(language)
                .or_default()
                .insert(relative_path(root, path), bytes);
        }

        tracing::debug!("walked {}: {} files", root.display(), output.file_count());
        Ok(output)
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.registry.get_for_file(path).is_some()
    }

    pub fn get_language(&self, path: &Path) -> Option<String> {
        self.registry.get_for_file(path).map(|a| a.name().to_string())
    }
}

/// `path` relative to `root`, joined with `/`.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteSettings;
    use std::fs::{self, File};
    use std::io::Write;
    use std::time::Instant;
    use tempfile::TempDir;

    fn create_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_walk_groups_go_files() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "main.go", "package main\n");
        create_file(temp_dir.path(), "pkg/util/util.go", "package util\n");
        create_file(temp_dir.path(), "README.md", "# Readme");

        let registry = AnalyzerRegistry::new();
        let output = FileWalker::new(&registry)
            .walk(temp_dir.path(), &RequestContext::new())
            .unwrap();

        assert!(!output.truncated);
        let go = &output.languages["go"];
        let paths: Vec<&str> = go.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["main.go", "pkg/util/util.go"]);
        assert_eq!(go["main.go"], b"package main\n".to_vec());
    }

    #[test]
    fn test_walk_groups_by_language() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "a.go", "package a\n");
        create_file(temp_dir.path(), "b.py", "x = 1\n");

        let mut registry = AnalyzerRegistry::new();
        registry
            .register_remote(
                "python",
                &RemoteSettings {
                    endpoint: "http://127.0.0.1:9".to_string(),
                    extensions: vec!["py".to_string()],
                    timeout_ms: None,
                },
            )
            .unwrap();
        let output = FileWalker::new(&registry)
            .walk(temp_dir.path(), &RequestContext::new())
            .unwrap();

        assert_eq!(output.file_count(), 2);
        assert!(output.languages["python"].contains_key("b.py"));
    }

    #[test]
    fn test_walk_skips_hidden_and_large_files() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), ".hidden/x.go", "package x\n");
        create_file(temp_dir.path(), "big.go", "package big\n\nvar X = 1\n");
        create_file(temp_dir.path(), "small.go", "package s\n");

        let registry = AnalyzerRegistry::new();
        let output = FileWalker::new(&registry)
            .with_max_file_bytes(12)
            .walk(temp_dir.path(), &RequestContext::new())
            .unwrap();

        let paths: Vec<&str> = output.languages["go"].keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["small.go"]);
    }

    #[test]
    fn test_walk_stops_at_soft_deadline() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "a.go", "package a\n");

        let registry = AnalyzerRegistry::new();
        let ctx = RequestContext::new().with_deadline(Instant::now());
        let output = FileWalker::new(&registry).walk(temp_dir.path(), &ctx).unwrap();

        assert!(output.truncated);
        assert_eq!(output.file_count(), 0);
    }

    #[test]
    fn test_walk_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let registry = AnalyzerRegistry::new();
        let output = FileWalker::new(&registry)
            .walk(temp_dir.path(), &RequestContext::new())
            .unwrap();
        assert!(output.languages.is_empty());
    }

    #[test]
    fn test_is_supported() {
        let registry = AnalyzerRegistry::new();
        let walker = FileWalker::new(&registry);
        assert!(walker.is_supported(Path::new("cmd/main.go")));
        assert!(!walker.is_supported(Path::new("Main.java")));
        assert_eq!(walker.get_language(Path::new("x.go")).as_deref(), Some("go"));
    }

    #[test]
    fn test_relative_path() {
        let root = Path::new("/work/repo");
        assert_eq!(relative_path(root, Path::new("/work/repo/a/b.go")), "a/b.go");
    }
}
