use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use code_xref::config::{Settings, SETTINGS_FILE};
use code_xref::coverage::{compute_coverage_excluding, Stats};
use code_xref::indexer::extractor::consumed_name_spans;
use code_xref::indexer::{FileWalker, Parser as GoParser, WalkOutput};
use code_xref::model::{DefsOp, DefsResult, Origin, RefsOp, RefsResult, ToksOp};
use code_xref::{AnalyzerRegistry, RequestContext, XrefError};

#[derive(Parser)]
#[command(name = "code-xref")]
#[command(about = "Go definitions, references and tokens using tree-sitter")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Definitions of every Go file under the current directory
    code-xref defs

    # References of one file, resolved against its whole tree
    code-xref refs ./service --file api/handler.go

    # References inside a byte selection
    code-xref refs . --file main.go --selection 120:40

    # Tokens of a single file
    code-xref toks main.go

    # Reference coverage report
    code-xref coverage ./service
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (defaults to .code-xref.toml under the analyzed path)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Request deadline in milliseconds
    #[arg(long, global = true)]
    pub deadline_ms: Option<u64>,

    /// Only run the analyzer for this language
    #[arg(long, global = true)]
    pub language: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract definitions
    Defs {
        /// Directory to analyze
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Origin files relative to the path (default: every file)
        #[arg(long = "file")]
        files: Vec<String>,
    },

    /// Resolve references
    Refs {
        /// Directory to analyze
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Origin files relative to the path (default: every file)
        #[arg(long = "file")]
        files: Vec<String>,

        /// Byte selection START:LEN applied to every origin file
        #[arg(long)]
        selection: Option<String>,
    },

    /// Tokenize one file
    Toks {
        /// File to tokenize
        file: PathBuf,
    },

    /// Report how many name tokens carry a reference
    Coverage {
        /// Directory to analyze
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// List registered languages and extensions
    Languages,
}

/// Options shared by every command.
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub deadline_ms: Option<u64>,
    pub language: Option<String>,
}

impl From<&Cli> for GlobalOptions {
    fn from(cli: &Cli) -> Self {
        Self {
            config: cli.config.clone(),
            deadline_ms: cli.deadline_ms,
            language: cli.language.clone(),
        }
    }
}

/// Settings, registry and request context for one invocation.
struct Session {
    root: PathBuf,
    settings: Settings,
    registry: AnalyzerRegistry,
    ctx: RequestContext,
    language: Option<String>,
}

impl Session {
    fn open(root: &Path, opts: &GlobalOptions) -> anyhow::Result<Self> {
        let settings_path = match &opts.config {
            Some(path) => path.clone(),
            None if root.is_dir() => root.join(SETTINGS_FILE),
            None => PathBuf::from(SETTINGS_FILE),
        };
        let settings = Settings::load(&settings_path)?;
        let registry = AnalyzerRegistry::from_settings(&settings)?;
        let ctx = match opts.deadline_ms.or(settings.deadline_ms) {
            Some(ms) => RequestContext::with_timeout(Duration::from_millis(ms)),
            None => RequestContext::new(),
        };

        Ok(Self {
            root: root.to_path_buf(),
            settings,
            registry,
            ctx,
            language: opts.language.clone(),
        })
    }

    fn walk(&self) -> anyhow::Result<WalkOutput> {
        let output = FileWalker::new(&self.registry).walk(&self.root, &self.ctx)?;
        if output.truncated {
            tracing::warn!("file discovery stopped at the deadline, results are partial");
        }
        tracing::info!("found {} files under {}", output.file_count(), self.root.display());
        Ok(output)
    }

    /// Walked sources per language, restricted to `--language`.
    fn sources(&self, output: WalkOutput) -> anyhow::Result<BTreeMap<String, BTreeMap<String, Vec<u8>>>> {
        let mut languages = output.languages;
        if let Some(language) = &self.language {
            self.registry.analyzer_for(language)?;
            languages.retain(|name, _| name == language);
        }
        Ok(languages)
    }
}

fn select_origins(sources: &BTreeMap<String, Vec<u8>>, files: &[String]) -> Vec<String> {
    if files.is_empty() {
        return sources.keys().cloned().collect();
    }
    files
        .iter()
        .map(|f| f.trim_start_matches("./").to_string())
        .filter(|f| sources.contains_key(f))
        .collect()
}

fn parse_selection(selection: &str) -> anyhow::Result<(usize, usize)> {
    let (start, len) = selection
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("selection must be START:LEN, got {:?}", selection))?;
    Ok((start.trim().parse()?, len.trim().parse()?))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn defs(path: &Path, files: &[String], opts: &GlobalOptions) -> anyhow::Result<()> {
    let session = Session::open(path, opts)?;
    let sources = session.sources(session.walk()?)?;

    let mut results: BTreeMap<String, DefsResult> = BTreeMap::new();
    for (language, sources) in sources {
        let analyzer = session.registry.analyzer_for(&language)?;
        let op = DefsOp {
            origins: select_origins(&sources, files),
            sources,
            config: session.settings.op_config(),
        };
        results.insert(language, analyzer.defs(&session.ctx, &op)?);
    }
    print_json(&results)
}

pub fn refs(
    path: &Path,
    files: &[String],
    selection: Option<&str>,
    opts: &GlobalOptions,
) -> anyhow::Result<()> {
    let session = Session::open(path, opts)?;
    let sources = session.sources(session.walk()?)?;
    let selection = selection.map(parse_selection).transpose()?;

    let mut results: BTreeMap<String, RefsResult> = BTreeMap::new();
    for (language, sources) in sources {
        let analyzer = session.registry.analyzer_for(&language)?;
        let origins = select_origins(&sources, files)
            .into_iter()
            .map(|file| match selection {
                Some((start, len)) => Origin::selection(file, start, len),
                None => Origin::file(file),
            })
            .collect();
        let op = RefsOp {
            sources,
            origins,
            config: session.settings.op_config(),
        };
        results.insert(language, analyzer.refs(&session.ctx, &op)?);
    }
    print_json(&results)
}

pub fn toks(file: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let root = file.parent().unwrap_or(Path::new("."));
    let session = Session::open(root, opts)?;
    let analyzer = match &session.language {
        Some(language) => session.registry.analyzer_for(language)?,
        None => session
            .registry
            .get_for_file(file)
            .ok_or_else(|| XrefError::UnsupportedLanguage(file.display().to_string()))?,
    };

    let op = ToksOp {
        source: std::fs::read(file)?,
    };
    print_json(&analyzer.toks(&session.ctx, &op)?)
}

#[derive(Serialize)]
struct CoverageReport {
    files: BTreeMap<String, FileCoverage>,
    total: Stats,
    missed: usize,
    messages: Vec<String>,
}

#[derive(Serialize)]
struct FileCoverage {
    #[serde(flatten)]
    stats: Stats,
    missed: usize,
}

/// Coverage of the in-process Go analyzer: every file is an origin and
/// names consumed by definitions are not expected to carry a ref.
pub fn coverage(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let session = Session::open(path, opts)?;
    let mut sources = session.walk()?.languages;
    let sources = sources.remove("go").unwrap_or_default();
    let analyzer = session.registry.analyzer_for("go")?;

    let op = RefsOp {
        origins: sources.keys().map(Origin::file).collect(),
        sources: sources.clone(),
        config: session.settings.op_config(),
    };
    let refs = analyzer.refs(&session.ctx, &op)?;
    let mut messages = refs.messages.clone();

    let mut parser = GoParser::new()?;
    let mut report = CoverageReport {
        files: BTreeMap::new(),
        total: Stats::default(),
        missed: 0,
        messages: Vec::new(),
    };
    for (file, bytes) in &sources {
        let toks = analyzer.toks(&session.ctx, &ToksOp { source: bytes.clone() })?;
        messages.extend(toks.messages.iter().map(|m| format!("{}:{}", file, m)));
        let consumed = consumed_name_spans(&parser.parse_source(file, bytes.clone())?);
        let file_refs = refs.files.get(file).map(|f| f.refs.as_slice()).unwrap_or(&[]);

        let stats = compute_coverage_excluding(&toks.toks, file_refs, &consumed);
        if stats.missed() > 0 || stats.invalid > 0 {
            tracing::warn!("{}: {} missed, {} invalid", file, stats.missed(), stats.invalid);
        }
        report.total.add(stats);
        report.files.insert(
            file.clone(),
            FileCoverage {
                stats,
                missed: stats.missed(),
            },
        );
    }
    report.missed = report.total.missed();
    report.messages = messages;
    print_json(&report)
}

pub fn languages() -> anyhow::Result<()> {
    let registry = &*code_xref::REGISTRY;
    let languages: BTreeMap<&str, Vec<String>> = registry
        .supported_languages()
        .into_iter()
        .map(|name| {
            let extensions = registry
                .analyzer_for(name)
                .map(|a| a.file_extensions().to_vec())
                .unwrap_or_default();
            (name, extensions)
        })
        .collect();
    print_json(&languages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection("10:5").unwrap(), (10, 5));
        assert!(parse_selection("10").is_err());
        assert!(parse_selection("a:b").is_err());
    }

    #[test]
    fn test_select_origins() {
        let sources = BTreeMap::from([
            ("a.go".to_string(), Vec::new()),
            ("b/b.go".to_string(), Vec::new()),
        ]);
        assert_eq!(select_origins(&sources, &[]), vec!["a.go", "b/b.go"]);
        assert_eq!(
            select_origins(&sources, &["./b/b.go".to_string(), "c.py".to_string()]),
            vec!["b/b.go"]
        );
    }

    #[test]
    fn test_cli_parses_global_options() {
        let cli = Cli::parse_from(["code-xref", "refs", "src", "--file", "a.go", "--deadline-ms", "500"]);
        let opts = GlobalOptions::from(&cli);
        assert_eq!(opts.deadline_ms, Some(500));
        assert!(matches!(cli.command, Commands::Refs { ref files, .. } if files == &["a.go".to_string()]));
    }
}
