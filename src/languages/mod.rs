pub mod go;
pub mod remote;

pub use go::GoAnalyzer;
pub use remote::RemoteAnalyzer;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::{RemoteSettings, Settings};
use crate::context::RequestContext;
use crate::error::{Result, XrefError};
use crate::model::{DefsOp, DefsResult, RefsOp, RefsResult, ToksOp, ToksResult};

/// One language backend, in-process or behind a network call.
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;
    fn file_extensions(&self) -> &[String];
    fn defs(&self, ctx: &RequestContext, op: &DefsOp) -> Result<DefsResult>;
    fn refs(&self, ctx: &RequestContext, op: &RefsOp) -> Result<RefsResult>;
    fn toks(&self, ctx: &RequestContext, op: &ToksOp) -> Result<ToksResult>;
}

pub struct AnalyzerRegistry {
    analyzers: HashMap<String, Arc<dyn Analyzer>>,
    extension_map: HashMap<String, String>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(GoAnalyzer::new()));
        registry
    }

    pub fn empty() -> Self {
        Self {
            analyzers: HashMap::new(),
            extension_map: HashMap::new(),
        }
    }

    /// The in-process analyzers plus every `[remote]` entry of `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut registry = Self::new();
        for (name, remote) in &settings.remote {
            registry.register_remote(name, remote)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, analyzer: Arc<dyn Analyzer>) {
        let name = analyzer.name().to_string();
        for ext in analyzer.file_extensions() {
            self.extension_map.insert(ext.trim_start_matches('.').to_string(), name.clone());
        }
        self.analyzers.insert(name, analyzer);
    }

    pub fn register_remote(&mut self, name: &str, settings: &RemoteSettings) -> Result<()> {
        let analyzer = RemoteAnalyzer::new(name, settings)?;
        tracing::debug!("registered remote analyzer {} at {}", name, settings.endpoint);
        self.register(Arc::new(analyzer));
        Ok(())
    }

    /// Unregistered languages are a hard error; callers filter files by
    /// language availability first.
    pub fn analyzer_for(&self, name: &str) -> Result<Arc<dyn Analyzer>> {
        self.analyzers
            .get(name)
            .cloned()
            .ok_or_else(|| XrefError::UnsupportedLanguage(name.to_string()))
    }

    pub fn get_by_extension(&self, ext: &str) -> Option<Arc<dyn Analyzer>> {
        self.extension_map
            .get(ext)
            .and_then(|name| self.analyzers.get(name))
            .cloned()
    }

    pub fn get_for_file(&self, path: &Path) -> Option<Arc<dyn Analyzer>> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.get_by_extension(ext))
    }

    pub fn supported_extensions(&self) -> Vec<&str> {
        let mut extensions: Vec<&str> = self.extension_map.keys().map(|s| s.as_str()).collect();
        extensions.sort_unstable();
        extensions
    }

    pub fn supported_languages(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = self.analyzers.keys().map(|s| s.as_str()).collect();
        languages.sort_unstable();
        languages
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(endpoint: &str, extensions: &[&str]) -> RemoteSettings {
        RemoteSettings {
            endpoint: endpoint.to_string(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            timeout_ms: None,
        }
    }

    #[test]
    fn test_go_registered_by_default() {
        let registry = AnalyzerRegistry::new();
        assert_eq!(registry.supported_languages(), vec!["go"]);
        assert_eq!(registry.analyzer_for("go").unwrap().name(), "go");
        assert!(registry.get_for_file(Path::new("cmd/main.go")).is_some());
        assert!(registry.get_for_file(Path::new("README.md")).is_none());
    }

    #[test]
    fn test_unsupported_language_is_error() {
        let registry = AnalyzerRegistry::new();
        let err = registry.analyzer_for("cobol").err().unwrap();
        assert!(matches!(err, XrefError::UnsupportedLanguage(ref name) if name == "cobol"));
    }

    #[test]
    fn test_register_remote() {
        let mut registry = AnalyzerRegistry::new();
        registry
            .register_remote("python", &remote("http://127.0.0.1:9", &["py", ".pyi"]))
            .unwrap();

        assert_eq!(registry.supported_languages(), vec!["go", "python"]);
        assert_eq!(registry.supported_extensions(), vec!["go", "py", "pyi"]);
        assert_eq!(
            registry.get_for_file(Path::new("pkg/mod.pyi")).unwrap().name(),
            "python"
        );
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings::parse(
            r#"
[remote.java]
endpoint = "http://127.0.0.1:9/"
extensions = ["java"]
"#,
        )
        .unwrap();
        let registry = AnalyzerRegistry::from_settings(&settings).unwrap();
        assert!(registry.analyzer_for("java").is_ok());
    }
}
