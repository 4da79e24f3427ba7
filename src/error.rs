use thiserror::Error;

#[derive(Error, Debug)]
pub enum XrefError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Language not supported: {0}")]
    UnsupportedLanguage(String),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("Remote analyzer error: {0}")]
    Remote(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, XrefError>;

/// Failure to load a dependency package.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("import cycle detected: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    #[error("cannot find package {path:?} from {src_dir}")]
    NotFound { path: String, src_dir: String },

    #[error("no Go files for package {path:?} in {dir}")]
    NoGoFiles { path: String, dir: String },

    #[error("import of {0:?} cancelled")]
    Cancelled(String),
}

impl ImportError {
    pub fn is_cycle(&self) -> bool {
        matches!(self, ImportError::Cycle { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_chain() {
        let err = ImportError::Cycle {
            chain: vec!["ex/a".into(), "ex/b".into(), "ex/a".into()],
        };
        assert_eq!(err.to_string(), "import cycle detected: ex/a -> ex/b -> ex/a");
        assert!(err.is_cycle());
    }

    #[test]
    fn test_import_error_converts() {
        let err: XrefError = ImportError::Cancelled("fmt".into()).into();
        assert!(matches!(err, XrefError::Import(_)));
        assert_eq!(err.to_string(), "import of \"fmt\" cancelled");
    }
}
