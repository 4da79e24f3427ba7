//! Reference Resolver for Go sources
//!
//! Each identifier occurrence of an origin file is resolved by the
//! cheapest tier that can answer it:
//!
//! 1. the origin file alone: local bindings, file-level declarations and
//!    import names,
//! 2. the merged declarations of every file of the package,
//! 3. the declaration checker, which loads imported packages and types
//!    selector operands.
//!
//! The checker is created on first use, so files whose names all resolve
//! syntactically never load a dependency.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::unsync::OnceCell;
use rayon::prelude::*;
use tree_sitter::Node;

use super::checker::{Checker, Env, Operand};
use super::extractor::consumed_name_spans;
use super::import_resolver::{ImportEntry, Importer, SourceTree};
use super::package::{file_declarations, Declaration, PackageScope};
use super::parser::{ParsedFile, Parser};
use super::scope_builder::{bind_file, FileBindings, Occurrence, Role};
use super::syntax::{import_name_guess, import_path, named_children, specs};
use super::types::{Member, Object, Type, TypeSource};
use super::universe::universe;
use crate::config::{dir_of, GoConfig};
use crate::context::RequestContext;
use crate::model::{FileRefs, Messages, Ref, RefsOp, RefsResult, Target};
use crate::span::Span;

/// Per-tier resolution counters, shared by every pass of an analyzer.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerStats {
    pub tier1: Arc<AtomicUsize>,
    pub tier2: Arc<AtomicUsize>,
    /// Occurrences handed to the checker.
    pub tier3: Arc<AtomicUsize>,
    /// Dependency packages loaded by importers.
    pub imports: Arc<AtomicUsize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub tier1: usize,
    pub tier2: usize,
    pub tier3: usize,
    pub imports: usize,
}

impl AnalyzerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            tier1: self.tier1.load(Ordering::Relaxed),
            tier2: self.tier2.load(Ordering::Relaxed),
            tier3: self.tier3.load(Ordering::Relaxed),
            imports: self.imports.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Parsed `.go` sources keyed by path, plus the reason each other
/// source was left out.
pub struct ParsedSources {
    pub files: BTreeMap<String, Arc<ParsedFile>>,
    pub skipped: BTreeMap<String, String>,
}

impl ParsedSources {
    /// "not parsed" diagnostic for an origin that is missing.
    pub fn not_parsed(&self, path: &str) -> String {
        match self.skipped.get(path) {
            Some(reason) => format!("{}: not parsed: {}", path, reason),
            None => format!("{}: not parsed", path),
        }
    }
}

/// Parses every Go source in parallel, one parser per worker.
pub fn parse_sources(sources: &BTreeMap<String, Vec<u8>>, config: &GoConfig) -> ParsedSources {
    let entries: Vec<(&String, &Vec<u8>)> = sources.iter().collect();
    let results: Vec<(String, std::result::Result<ParsedFile, String>)> = entries
        .par_iter()
        .map_init(Parser::new, |parser, (path, bytes)| {
            let path = path.to_string();
            if !path.ends_with(".go") {
                return (path, Err("not a Go source file".to_string()));
            }
            if bytes.len() > config.max_file_bytes {
                let reason = format!("file is {} bytes, limit is {}", bytes.len(), config.max_file_bytes);
                return (path, Err(reason));
            }
            let parsed = match parser.as_mut() {
                Ok(parser) => parser.parse_source(&path, bytes.to_vec()).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            (path, parsed)
        })
        .collect();

    let mut out = ParsedSources {
        files: BTreeMap::new(),
        skipped: BTreeMap::new(),
    };
    for (path, parsed) in results {
        match parsed {
            Ok(file) => {
                out.files.insert(path, Arc::new(file));
            }
            Err(reason) => {
                tracing::debug!("{}: {}", path, reason);
                out.skipped.insert(path, reason);
            }
        }
    }
    out
}

/// Origin file with the selections to resolve; `None` is the whole file.
#[derive(Debug, Clone)]
struct FileRequest {
    path: String,
    selections: Option<Vec<Span>>,
}

/// Resolves references for every origin of a request. Packages are
/// resolved in parallel, each with its own importer.
pub fn resolve_refs(ctx: &RequestContext, op: &RefsOp, default_roots: &[PathBuf], stats: &AnalyzerStats) -> RefsResult {
    let config = GoConfig::from_map(&op.config, default_roots);
    let parsed = parse_sources(&op.sources, &config);
    let mut messages = Messages::default();

    let mut requests: BTreeMap<String, Option<Vec<Span>>> = BTreeMap::new();
    for origin in &op.origins {
        if !parsed.files.contains_key(&origin.file) {
            messages.push(parsed.not_parsed(&origin.file));
            continue;
        }
        let entry = requests
            .entry(origin.file.clone())
            .or_insert_with(|| Some(Vec::new()));
        match (entry.as_mut(), origin.span) {
            (Some(spans), Some(span)) => spans.push(span),
            (_, None) => *entry = None,
            (None, Some(_)) => {}
        }
    }

    let mut groups: BTreeMap<(String, String), Vec<FileRequest>> = BTreeMap::new();
    for (path, selections) in requests {
        let Some(file) = parsed.files.get(&path) else {
            continue;
        };
        groups
            .entry((dir_of(&path), file.package.clone()))
            .or_default()
            .push(FileRequest { path, selections });
    }

    let tree = SourceTree::new(parsed.files.values().cloned());
    let results: Vec<(Vec<(String, FileRefs)>, Vec<String>)> = groups
        .par_iter()
        .map(|((dir, package), requests)| resolve_package(ctx, &config, &tree, dir, package, requests, stats))
        .collect();

    let mut files = BTreeMap::new();
    for (refs, package_messages) in results {
        files.extend(refs);
        messages.extend(package_messages);
    }

    let complete = messages.is_empty();
    RefsResult {
        files,
        messages: messages.into_vec(),
        complete,
    }
}

fn resolve_package(
    ctx: &RequestContext,
    config: &GoConfig,
    tree: &SourceTree,
    dir: &str,
    package: &str,
    requests: &[FileRequest],
    stats: &AnalyzerStats,
) -> (Vec<(String, FileRefs)>, Vec<String>) {
    let is_origin = |path: &str| requests.iter().any(|r| r.path == path);
    // Files with syntax errors only take part when they are themselves origins.
    let files: Vec<Arc<ParsedFile>> = tree
        .files_in(dir)
        .iter()
        .filter(|f| f.package == package && (is_origin(&f.path) || !f.has_syntax_error()))
        .cloned()
        .collect();

    let mut import_path = config
        .import_path_for(dir)
        .unwrap_or_else(|| dir.to_string());
    if package.ends_with("_test") {
        import_path.push_str("_test");
    }

    let importer = Importer::new(ctx.clone(), config, tree, stats.clone());
    let pass = PackagePass {
        importer: &importer,
        files: &files,
        scope: PackageScope::build(&files),
        checker: OnceCell::new(),
        config,
        dir,
        import_path,
        stats,
    };

    let mut out = Vec::new();
    let mut messages = Vec::new();
    for request in requests {
        if ctx.is_done() {
            messages.push(format!("{}: deadline exceeded, references not resolved", request.path));
            continue;
        }
        let Some(idx) = files.iter().position(|f| f.path == request.path) else {
            continue;
        };
        let (refs, file_messages) = pass.resolve_file(idx, request.selections.as_deref());
        messages.extend(file_messages);
        out.push((request.path.clone(), FileRefs { refs }));
    }

    if let Some(checker) = pass.checker.get() {
        for message in checker.soft_errors() {
            tracing::debug!("{}", message);
        }
    }
    tracing::debug!(
        "resolved {} files of {} ({} packages loaded)",
        out.len(),
        pass.import_path,
        importer.len()
    );
    (out, messages)
}

/// Shared state of one package's resolution.
struct PackagePass<'p> {
    importer: &'p Importer<'p>,
    files: &'p [Arc<ParsedFile>],
    scope: PackageScope<'p>,
    checker: OnceCell<Checker<'p>>,
    config: &'p GoConfig,
    dir: &'p str,
    import_path: String,
    stats: &'p AnalyzerStats,
}

impl<'p> PackagePass<'p> {
    fn checker(&self) -> &Checker<'p> {
        self.checker.get_or_init(|| {
            let id = self.importer.begin(&self.import_path, self.dir);
            Checker::new(self.importer, id, &self.import_path, self.dir, self.files)
        })
    }

    fn resolve_file(&self, idx: usize, selections: Option<&[Span]>) -> (Vec<Ref>, Vec<String>) {
        let file: &'p ParsedFile = &self.files[idx];
        let mut messages = Vec::new();
        if let Some(message) = file.syntax_error_message() {
            messages.push(message);
        }

        let consumed = consumed_name_spans(file);
        let bindings = bind_file(file, &consumed);
        let resolver = FileResolver::new(self, idx, file, &bindings);

        let mut refs = Vec::new();
        for occ in &bindings.occurrences {
            let span = file.span(&occ.node);
            if let Some(selections) = selections {
                if !selections.iter().any(|s| s.contains(&span)) {
                    continue;
                }
            }
            let (target, message) = resolver.resolve(occ);
            if let Some(message) = message {
                messages.push(message);
            }
            refs.push(Ref { span, target });
        }
        (refs, messages)
    }
}

type Resolution = (Option<Target>, Option<String>);

struct FileResolver<'r, 'p> {
    pass: &'r PackagePass<'p>,
    idx: usize,
    file: &'p ParsedFile,
    bindings: &'r FileBindings<'p>,
    decls: HashMap<&'p str, Declaration<'p>>,
    imports: HashMap<String, String>,
}

impl<'r, 'p> FileResolver<'r, 'p> {
    fn new(pass: &'r PackagePass<'p>, idx: usize, file: &'p ParsedFile, bindings: &'r FileBindings<'p>) -> Self {
        let mut decls = HashMap::new();
        for decl in file_declarations(file, idx) {
            decls.entry(file.node_text(&decl.name)).or_insert(decl);
        }

        let mut imports = HashMap::new();
        for decl in named_children(file.root_node()) {
            if decl.kind() != "import_declaration" {
                continue;
            }
            for spec in specs(decl, &["import_spec"]) {
                let Some(path) = import_path(spec, file.source_bytes()) else {
                    continue;
                };
                let name = match spec.child_by_field_name("name") {
                    Some(alias) if alias.kind() == "package_identifier" => Some(file.node_text(&alias).to_string()),
                    Some(_) => None,
                    None => import_name_guess(&path).map(str::to_string),
                };
                if let Some(name) = name {
                    imports.insert(name, path);
                }
            }
        }

        Self {
            pass,
            idx,
            file,
            bindings,
            decls,
            imports,
        }
    }

    fn env(&self) -> Env<'r, 'p> {
        Env::local(self.idx, self.bindings)
    }

    fn text(&self, node: &Node) -> &'p str {
        self.file.node_text(node)
    }

    fn resolve(&self, occ: &Occurrence<'p>) -> Resolution {
        let node = occ.node;
        match &occ.role {
            Role::Use(Some(binding)) => {
                AnalyzerStats::bump(&self.pass.stats.tier1);
                (self.local_target(*binding), None)
            }
            Role::Decl { id, .. } => {
                AnalyzerStats::bump(&self.pass.stats.tier1);
                (Some(Target::exact(&self.file.path, self.file.span(&node), id.clone())), None)
            }
            Role::Import(path) => {
                AnalyzerStats::bump(&self.pass.stats.tier1);
                (Some(Target::Package { path: path.clone() }), None)
            }
            Role::Use(None) => self.free_name(node),
            Role::Member => self.member(node),
            Role::Qualified => self.qualified(node),
            Role::Key(fallback) => self.key(node, *fallback),
        }
    }

    fn local_target(&self, binding: usize) -> Option<Target> {
        let binding = self.bindings.bindings.get(binding)?;
        Some(Target::exact(&self.file.path, self.file.span(&binding.node), None))
    }

    /// Search constraints describing where the occurrence lives.
    fn context(&self) -> BTreeMap<String, String> {
        let mut constraints = BTreeMap::new();
        if !self.file.package.is_empty() {
            constraints.insert("package".to_string(), self.file.package.clone());
        }
        if let Some(path) = self.pass.config.import_path_for(self.pass.dir) {
            constraints.insert("import_path".to_string(), path);
        }
        constraints.insert("dir".to_string(), self.pass.dir.to_string());
        constraints
    }

    fn fuzzy(&self, name: &str) -> Option<Target> {
        Some(Target::fuzzy(name, self.context()))
    }

    fn free_name(&self, node: Node<'p>) -> Resolution {
        let name = self.text(&node);
        let stats = self.pass.stats;
        if node.kind() == "label_name" {
            return (self.fuzzy(name), None);
        }

        if let Some(decl) = self.decls.get(name) {
            AnalyzerStats::bump(&stats.tier1);
            let target = Target::exact(&self.file.path, self.file.span(&decl.name), Some(name.to_string()));
            return (Some(target), None);
        }
        if let Some(path) = self.imports.get(name) {
            AnalyzerStats::bump(&stats.tier1);
            return (Some(Target::Package { path: path.clone() }), None);
        }
        if let Some(decl) = self.pass.scope.get(name) {
            AnalyzerStats::bump(&stats.tier2);
            let loc = self.pass.scope.decl_loc(decl);
            return (Some(Target::exact(loc.file, loc.span, Some(name.to_string()))), None);
        }
        if universe().lookup(name).is_some() {
            AnalyzerStats::bump(&stats.tier1);
            return (Some(Target::Builtin { id: name.to_string() }), None);
        }

        AnalyzerStats::bump(&stats.tier3);
        let checker = self.pass.checker();
        if let Some((pkg, object)) = checker.dot_object(self.idx, name) {
            return (Some(object_target(&pkg.path, &object)), None);
        }
        if let Some(entry) = checker.file_import(self.idx, name) {
            return (Some(Target::Package { path: entry.path.clone() }), None);
        }
        (self.fuzzy(name), None)
    }

    fn member(&self, node: Node<'p>) -> Resolution {
        let name = self.text(&node);
        let operand = node
            .parent()
            .filter(|p| p.kind() == "selector_expression")
            .and_then(|p| p.child_by_field_name("operand"));
        let Some(operand) = operand else {
            let message = self.file.message_at(node.start_byte(), &format!("cannot resolve selector {}", name));
            return (None, Some(message));
        };

        AnalyzerStats::bump(&self.pass.stats.tier3);
        let checker = self.pass.checker();
        match checker.type_of(operand, self.env()) {
            Operand::Package(entry) => self.package_member(&entry, node),
            Operand::Value(ty) | Operand::TypeExpr(ty) => match checker.select(&ty, name) {
                Some(member) => (Some(member_target(&member)), None),
                None => (self.fuzzy_receiver(name, &ty), None),
            },
            Operand::Builtin(_) => (self.fuzzy(name), None),
            Operand::Unknown => {
                let mut constraints = self.context();
                let unbound = operand.kind() == "identifier" && self.bindings.binding_index(&operand).is_none();
                if unbound {
                    constraints.insert("package".to_string(), self.text(&operand).to_string());
                }
                (Some(Target::fuzzy(name, constraints)), None)
            }
        }
    }

    fn fuzzy_receiver(&self, name: &str, ty: &Type) -> Option<Target> {
        let mut constraints = self.context();
        if let Type::Named(named) = ty.deref() {
            constraints.insert("receiver".to_string(), named.name.clone());
        }
        Some(Target::fuzzy(name, constraints))
    }

    fn package_member(&self, entry: &ImportEntry, node: Node<'p>) -> Resolution {
        let name = self.text(&node);
        match &entry.package {
            Ok(pkg) => match pkg.objects.get(name) {
                Some(object) => (Some(object_target(&pkg.path, object)), None),
                None => {
                    let constraints = BTreeMap::from([
                        ("package".to_string(), pkg.name.clone()),
                        ("import_path".to_string(), pkg.path.clone()),
                    ]);
                    (Some(Target::fuzzy(name, constraints)), None)
                }
            },
            Err(err) => {
                let constraints = BTreeMap::from([
                    ("package".to_string(), entry.name.clone()),
                    ("import_path".to_string(), entry.path.clone()),
                ]);
                let message = self.file.message_at(node.start_byte(), &err.to_string());
                (Some(Target::fuzzy(name, constraints)), Some(message))
            }
        }
    }

    fn qualified(&self, node: Node<'p>) -> Resolution {
        let name = self.text(&node);
        let qualifier = node
            .parent()
            .and_then(|p| p.child_by_field_name("package"))
            .map(|q| self.text(&q))
            .unwrap_or("");

        AnalyzerStats::bump(&self.pass.stats.tier3);
        match self.pass.checker().file_import(self.idx, qualifier) {
            Some(entry) => self.package_member(entry, node),
            None => {
                let mut constraints = BTreeMap::new();
                constraints.insert("package".to_string(), qualifier.to_string());
                if let Some(path) = self.imports.get(qualifier) {
                    constraints.insert("import_path".to_string(), path.clone());
                }
                (Some(Target::fuzzy(name, constraints)), None)
            }
        }
    }

    /// Composite literal keys name struct fields; other literals key by value.
    fn key(&self, node: Node<'p>, fallback: Option<usize>) -> Resolution {
        let name = self.text(&node);
        let mut literal = node.parent();
        while let Some(parent) = literal {
            if parent.kind() == "literal_value" {
                break;
            }
            literal = parent.parent();
        }

        AnalyzerStats::bump(&self.pass.stats.tier3);
        let checker = self.pass.checker();
        let ty = literal
            .map(|lv| checker.literal_type(lv, self.env()))
            .unwrap_or(Type::Unknown);
        if let Type::Struct(_) = checker.underlying(ty.deref()) {
            return match checker.select(&ty, name) {
                Some(member) => (Some(member_target(&member)), None),
                None => (self.fuzzy_receiver(name, &ty), None),
            };
        }

        match fallback {
            Some(binding) => (self.local_target(binding), None),
            None => self.free_name(node),
        }
    }
}

fn member_target(member: &Member) -> Target {
    match &member.loc {
        Some(loc) => Target::exact(&loc.file, loc.span, Some(member.id())),
        None => Target::Builtin { id: member.id() },
    }
}

fn object_target(pkg_path: &str, object: &Object) -> Target {
    match &object.loc {
        Some(loc) => Target::exact(&loc.file, loc.span, Some(object.name.clone())),
        None => Target::Builtin {
            id: format!("{}.{}", pkg_path, object.name),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Origin;

    fn op(files: &[(&str, &str)], origins: Vec<Origin>, config: &[(&str, &str)]) -> RefsOp {
        RefsOp {
            sources: files
                .iter()
                .map(|(p, s)| (p.to_string(), s.as_bytes().to_vec()))
                .collect(),
            origins,
            config: config
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn refs_named<'a>(result: &'a RefsResult, file: &str, source: &str, name: &str) -> Vec<&'a Ref> {
        result.files[file]
            .refs
            .iter()
            .filter(|r| &source[r.span.start_byte..r.span.end_byte()] == name)
            .collect()
    }

    #[test]
    fn test_local_and_builtin_targets() {
        let source = "package p\n\nfunc f(n int) int {\n\tm := n * 2\n\treturn len(\"x\") + m\n}\n";
        let stats = AnalyzerStats::default();
        let result = resolve_refs(
            &RequestContext::new(),
            &op(&[("p/a.go", source)], vec![Origin::file("p/a.go")], &[]),
            &[],
            &stats,
        );
        assert!(result.complete, "{:?}", result.messages);

        let n_uses = refs_named(&result, "p/a.go", source, "n");
        let decl_start = source.find("n int").unwrap();
        assert!(n_uses
            .iter()
            .all(|r| matches!(&r.target, Some(Target::Exact { span, .. }) if span.start_byte == decl_start)));

        let len = refs_named(&result, "p/a.go", source, "len");
        assert_eq!(len[0].target, Some(Target::Builtin { id: "len".into() }));
        assert_eq!(stats.snapshot().tier3, 0);
        assert_eq!(stats.snapshot().imports, 0);
    }

    #[test]
    fn test_selection_limits_refs() {
        let source = "package p\n\nvar a, b int\n\nfunc f() {\n\t_ = a\n\t_ = b\n}\n";
        let start = source.find("_ = b").unwrap();
        let result = resolve_refs(
            &RequestContext::new(),
            &op(&[("p/a.go", source)], vec![Origin::selection("p/a.go", start, 5)], &[]),
            &[],
            &AnalyzerStats::default(),
        );
        let refs = &result.files["p/a.go"].refs;
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].span.start_byte, start + 4);
    }

    #[test]
    fn test_missing_origin_reported() {
        let result = resolve_refs(
            &RequestContext::new(),
            &op(&[("p/a.go", "package p\n")], vec![Origin::file("p/missing.go")], &[]),
            &[],
            &AnalyzerStats::default(),
        );
        assert!(!result.complete);
        assert_eq!(result.messages, vec!["p/missing.go: not parsed".to_string()]);
        assert!(result.files.is_empty());
    }

    #[test]
    fn test_struct_literal_key_targets_field() {
        let source = "package p\n\ntype T struct{ Name string }\n\nfunc f(Name string) T {\n\treturn T{Name: Name}\n}\n";
        let result = resolve_refs(
            &RequestContext::new(),
            &op(&[("p/a.go", source)], vec![Origin::file("p/a.go")], &[]),
            &[],
            &AnalyzerStats::default(),
        );
        let names = refs_named(&result, "p/a.go", source, "Name");
        let field = source.find("Name string }").unwrap();
        let key = names
            .iter()
            .find(|r| r.span.start_byte == source.find("Name: Name").unwrap())
            .unwrap();
        assert_eq!(
            key.target.as_ref().and_then(|t| t.id()),
            Some("T.Name"),
            "{:?}",
            key.target
        );
        assert!(matches!(&key.target, Some(Target::Exact { span, .. }) if span.start_byte == field));
    }

    #[test]
    fn test_unknown_qualifier_carries_constraint() {
        let source = "package p\n\nfunc f() {\n\tmissing.Call()\n}\n";
        let result = resolve_refs(
            &RequestContext::new(),
            &op(&[("p/a.go", source)], vec![Origin::file("p/a.go")], &[]),
            &[],
            &AnalyzerStats::default(),
        );
        let call = refs_named(&result, "p/a.go", source, "Call");
        let constraints = call[0].target.as_ref().unwrap().constraints();
        assert_eq!(constraints.get("package").map(String::as_str), Some("missing"));
    }

    #[test]
    fn test_deadline_stops_resolution() {
        let ctx = RequestContext::new();
        ctx.cancel();
        let result = resolve_refs(
            &ctx,
            &op(&[("p/a.go", "package p\n")], vec![Origin::file("p/a.go")], &[]),
            &[],
            &AnalyzerStats::default(),
        );
        assert!(!result.complete);
        assert!(result.messages[0].contains("deadline exceeded"));
    }
}
