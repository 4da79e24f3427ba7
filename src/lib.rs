pub mod config;
pub mod context;
pub mod coverage;
pub mod error;
pub mod indexer;
pub mod languages;
pub mod model;
pub mod span;

use once_cell::sync::Lazy;

pub use config::{GoConfig, Settings};
pub use context::RequestContext;
pub use coverage::{compute_coverage, compute_coverage_excluding, Stats};
pub use error::{ImportError, Result, XrefError};
pub use indexer::{AnalyzerStats, FileWalker, ParsedFile, Parser, WalkOutput};
pub use languages::{Analyzer, AnalyzerRegistry, GoAnalyzer, RemoteAnalyzer};
pub use model::{
    Def, DefKind, DefsOp, DefsResult, FileRefs, Origin, Ref, RefsOp, RefsResult, Target, Tok,
    TokType, ToksOp, ToksResult,
};
pub use span::{LineIndex, Span};

/// Global analyzer registry with the in-process analyzers (lazily initialized)
pub static REGISTRY: Lazy<AnalyzerRegistry> = Lazy::new(AnalyzerRegistry::new);
