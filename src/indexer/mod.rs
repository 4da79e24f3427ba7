pub mod checker;
pub mod extractor;
pub mod import_resolver;
pub mod package;
pub mod parser;
pub mod resolver;
pub mod scope_builder;
pub mod syntax;
pub mod tokenizer;
pub mod types;
pub mod universe;
pub mod walker;

pub use extractor::{consumed_name_spans, extract_defs, DefExtractor, Extraction};
pub use import_resolver::{ImportEntry, Importer, Package, SourceTree};
pub use package::{DeclKind, Declaration, PackageScope};
pub use parser::{ParsedFile, Parser};
pub use resolver::{parse_sources, resolve_refs, AnalyzerStats, ParsedSources, StatsSnapshot};
pub use scope_builder::{bind_file, FileBindings, ScopeBuilder};
pub use tokenizer::tokenize;
pub use walker::{FileWalker, WalkOutput};
