use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;

pub const MODULE_KEY: &str = "go.module";
pub const IMPORT_PATH_PREFIX: &str = "go.import_path.";
pub const ROOTS_KEY: &str = "go.roots";
pub const MAX_FILE_BYTES_KEY: &str = "go.max_file_bytes";

/// Files above this size are not parsed.
pub const DEFAULT_MAX_FILE_BYTES: usize = 16 * 1024 * 1024;

/// Go-specific hints read from an operation's config map.
#[derive(Debug, Clone)]
pub struct GoConfig {
    pub module: Option<String>,
    pub import_paths: BTreeMap<String, String>,
    pub roots: Vec<PathBuf>,
    pub max_file_bytes: usize,
}

impl Default for GoConfig {
    fn default() -> Self {
        Self {
            module: None,
            import_paths: BTreeMap::new(),
            roots: Vec::new(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

impl GoConfig {
    /// Reads recognised keys; anything else in the map is ignored.
    /// `default_roots` apply when the map has no `go.roots`.
    pub fn from_map(config: &BTreeMap<String, String>, default_roots: &[PathBuf]) -> Self {
        let mut go = GoConfig::default();

        for (key, value) in config {
            if key == MODULE_KEY {
                let module = value.trim().trim_end_matches('/');
                if !module.is_empty() {
                    go.module = Some(module.to_string());
                }
            } else if let Some(dir) = key.strip_prefix(IMPORT_PATH_PREFIX) {
                go.import_paths
                    .insert(normalize_dir(dir), value.trim().to_string());
            } else if key == ROOTS_KEY {
                go.roots = std::env::split_paths(value)
                    .filter(|p| !p.as_os_str().is_empty())
                    .collect();
            } else if key == MAX_FILE_BYTES_KEY {
                match value.trim().parse() {
                    Ok(limit) => go.max_file_bytes = limit,
                    Err(_) => tracing::warn!("ignoring invalid {}: {}", MAX_FILE_BYTES_KEY, value),
                }
            }
        }

        if !config.contains_key(ROOTS_KEY) {
            go.roots = default_roots.to_vec();
        }
        go
    }

    /// Import path declared for a source directory, if any.
    pub fn import_path_for(&self, dir: &str) -> Option<String> {
        let dir = normalize_dir(dir);
        if let Some(path) = self.import_paths.get(&dir) {
            return Some(path.clone());
        }
        self.module.as_ref().map(|module| {
            if dir == "." {
                module.clone()
            } else {
                format!("{}/{}", module, dir)
            }
        })
    }
}

/// Search roots implied by `GOROOT` and `GOPATH`.
pub fn env_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(goroot) = std::env::var_os("GOROOT") {
        roots.push(PathBuf::from(goroot));
    }
    if let Some(gopath) = std::env::var_os("GOPATH") {
        roots.extend(std::env::split_paths(&gopath).filter(|p| !p.as_os_str().is_empty()));
    }
    roots
}

/// Directory part of a source path, `.` for files at the root.
pub fn dir_of(path: &str) -> String {
    match path.rfind('/') {
        Some(i) => normalize_dir(&path[..i]),
        None => ".".to_string(),
    }
}

pub fn normalize_dir(dir: &str) -> String {
    let dir = dir.trim_matches('/');
    let dir = dir.strip_prefix("./").unwrap_or(dir);
    if dir.is_empty() {
        ".".to_string()
    } else {
        dir.to_string()
    }
}

// =====================================================
// Settings file
// =====================================================

pub const SETTINGS_FILE: &str = ".code-xref.toml";

/// Front-end settings loaded from `.code-xref.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub deadline_ms: Option<u64>,
    pub go: GoSettings,
    pub remote: BTreeMap<String, RemoteSettings>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GoSettings {
    pub module: Option<String>,
    pub roots: Vec<PathBuf>,
    pub import_paths: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSettings {
    pub endpoint: String,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Settings {
    /// Loads settings; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Operation config entries implied by these settings.
    pub fn op_config(&self) -> BTreeMap<String, String> {
        let mut config = BTreeMap::new();
        if let Some(module) = &self.go.module {
            config.insert(MODULE_KEY.to_string(), module.clone());
        }
        for (dir, path) in &self.go.import_paths {
            config.insert(format!("{}{}", IMPORT_PATH_PREFIX, dir), path.clone());
        }
        if !self.go.roots.is_empty() {
            if let Ok(joined) = std::env::join_paths(&self.go.roots) {
                config.insert(ROOTS_KEY.to_string(), joined.to_string_lossy().into_owned());
            }
        }
        config
    }
}
