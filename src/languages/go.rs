use std::collections::BTreeMap;
use std::path::PathBuf;

use super::Analyzer;
use crate::config::{dir_of, env_roots, GoConfig};
use crate::context::RequestContext;
use crate::error::Result;
use crate::indexer::extractor::extract_defs;
use crate::indexer::resolver::{parse_sources, resolve_refs, AnalyzerStats};
use crate::indexer::tokenizer::tokenize;
use crate::model::{DefsOp, DefsResult, Messages, RefsOp, RefsResult, ToksOp, ToksResult};

/// In-process Go analyzer.
pub struct GoAnalyzer {
    extensions: Vec<String>,
    /// Search roots used when a request carries no `go.roots`.
    default_roots: Vec<PathBuf>,
    stats: AnalyzerStats,
}

impl GoAnalyzer {
    /// Default roots come from `GOROOT` and `GOPATH`.
    pub fn new() -> Self {
        Self::with_roots(env_roots())
    }

    pub fn with_roots(default_roots: Vec<PathBuf>) -> Self {
        Self {
            extensions: vec!["go".to_string()],
            default_roots,
            stats: AnalyzerStats::default(),
        }
    }

    pub fn stats(&self) -> &AnalyzerStats {
        &self.stats
    }
}

impl Default for GoAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for GoAnalyzer {
    fn name(&self) -> &str {
        "go"
    }

    fn file_extensions(&self) -> &[String] {
        &self.extensions
    }

    fn defs(&self, ctx: &RequestContext, op: &DefsOp) -> Result<DefsResult> {
        let config = GoConfig::from_map(&op.config, &self.default_roots);
        let mut origins: Vec<&String> = op.origins.iter().collect();
        origins.sort();
        origins.dedup();

        // Only origins contribute definitions.
        let sources: BTreeMap<String, Vec<u8>> = origins
            .iter()
            .filter_map(|path| op.sources.get(*path).map(|bytes| ((*path).clone(), bytes.clone())))
            .collect();
        let parsed = parse_sources(&sources, &config);

        let mut defs = Vec::new();
        let mut messages = Messages::default();
        for path in origins {
            if ctx.is_done() {
                messages.push(format!("{}: deadline exceeded, definitions not extracted", path));
                continue;
            }
            let Some(file) = parsed.files.get(path) else {
                messages.push(parsed.not_parsed(path));
                continue;
            };
            if let Some(message) = file.syntax_error_message() {
                tracing::warn!("{}", message);
                messages.push(message);
                continue;
            }
            let import_path = config.import_path_for(&dir_of(path));
            defs.extend(extract_defs(file, import_path.as_deref()));
        }

        tracing::info!(
            "defs: {} origins, {} definitions, {} messages",
            op.origins.len(),
            defs.len(),
            messages.len()
        );
        let complete = messages.is_empty();
        Ok(DefsResult {
            defs,
            messages: messages.into_vec(),
            complete,
        })
    }

    fn refs(&self, ctx: &RequestContext, op: &RefsOp) -> Result<RefsResult> {
        let result = resolve_refs(ctx, op, &self.default_roots, &self.stats);
        let refs: usize = result.files.values().map(|f| f.refs.len()).sum();
        tracing::info!(
            "refs: {} files, {} references, {} messages",
            result.files.len(),
            refs,
            result.messages.len()
        );
        Ok(result)
    }

    fn toks(&self, ctx: &RequestContext, op: &ToksOp) -> Result<ToksResult> {
        if ctx.is_done() {
            return Ok(ToksResult {
                toks: Vec::new(),
                messages: vec!["deadline exceeded, source not tokenized".to_string()],
                complete: false,
            });
        }
        let result = tokenize(&op.source);
        tracing::debug!("toks: {} tokens, {} messages", result.toks.len(), result.messages.len());
        Ok(result)
    }
}
