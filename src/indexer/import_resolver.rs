//! Import Resolution for Go packages
//!
//! The importer locates a dependency package (request sources first, then
//! the configured roots), parses it, and checks its declarations with a
//! [`Checker`] that uses this same importer for its own imports. Packages
//! live in an arena owned by one resolution pass; a package that is still
//! being checked when it is requested again closes an import cycle.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use walkdir::WalkDir;

use super::checker::Checker;
use super::parser::{ParsedFile, Parser};
use super::resolver::AnalyzerStats;
use super::types::{Member, NamedRef, Object, ObjectKind, PkgId, Signature, Type};
use super::universe::{universe, UNSAFE_FUNCS};
use crate::config::{dir_of, GoConfig};
use crate::context::RequestContext;
use crate::error::ImportError;

/// A checked dependency package.
#[derive(Debug)]
pub struct Package {
    pub id: PkgId,
    pub path: String,
    pub dir: String,
    pub name: String,
    pub files: Vec<Arc<ParsedFile>>,
    pub objects: BTreeMap<String, Object>,
    pub soft_errors: Vec<String>,
    /// Set when one of the package's own imports closed a cycle.
    pub cycle: Option<ImportError>,
}

/// One import of a file, as seen by the checker.
#[derive(Debug, Clone)]
pub struct ImportEntry {
    pub path: String,
    /// Local name the file refers to the package by.
    pub name: String,
    pub package: Result<Arc<Package>, ImportError>,
}

/// Parsed request sources grouped by directory.
#[derive(Debug, Default)]
pub struct SourceTree {
    dirs: BTreeMap<String, Vec<Arc<ParsedFile>>>,
}

impl SourceTree {
    pub fn new(files: impl IntoIterator<Item = Arc<ParsedFile>>) -> Self {
        let mut dirs: BTreeMap<String, Vec<Arc<ParsedFile>>> = BTreeMap::new();
        for file in files {
            dirs.entry(dir_of(&file.path)).or_default().push(file);
        }
        for files in dirs.values_mut() {
            files.sort_by(|a, b| a.path.cmp(&b.path));
        }
        Self { dirs }
    }

    pub fn files_in(&self, dir: &str) -> &[Arc<ParsedFile>] {
        self.dirs.get(dir).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_dir(&self, dir: &str) -> bool {
        self.dirs.contains_key(dir)
    }

    pub fn dirs(&self) -> impl Iterator<Item = &String> {
        self.dirs.keys()
    }
}

enum Slot {
    Pending,
    Complete(Arc<Package>),
}

enum Location {
    Memory(String),
    Disk(PathBuf),
}

impl Location {
    fn key(&self) -> String {
        match self {
            Location::Memory(dir) => dir.clone(),
            Location::Disk(path) => path.display().to_string(),
        }
    }
}

pub struct Importer<'s> {
    ctx: RequestContext,
    config: &'s GoConfig,
    memory: &'s SourceTree,
    slots: RefCell<Vec<Slot>>,
    index: RefCell<HashMap<(String, String), PkgId>>,
    /// Import paths currently being checked, outermost first.
    stack: RefCell<Vec<String>>,
    parser: RefCell<Option<Parser>>,
    stats: AnalyzerStats,
}

impl<'s> Importer<'s> {
    pub fn new(ctx: RequestContext, config: &'s GoConfig, memory: &'s SourceTree, stats: AnalyzerStats) -> Self {
        Self {
            ctx,
            config,
            memory,
            slots: RefCell::new(Vec::new()),
            index: RefCell::new(HashMap::new()),
            stack: RefCell::new(Vec::new()),
            parser: RefCell::new(None),
            stats,
        }
    }

    /// Reserves a slot for a package about to be checked. Requests for
    /// it before [`Importer::complete`] report a cycle.
    pub fn begin(&self, path: &str, dir: &str) -> PkgId {
        let mut slots = self.slots.borrow_mut();
        let id = PkgId(slots.len());
        slots.push(Slot::Pending);
        self.index
            .borrow_mut()
            .insert((path.to_string(), dir.to_string()), id);
        self.stack.borrow_mut().push(path.to_string());
        id
    }

    pub fn complete(&self, package: Arc<Package>) {
        {
            let mut stack = self.stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|p| *p == package.path) {
                stack.remove(pos);
            }
        }
        if let Some(slot) = self.slots.borrow_mut().get_mut(package.id.0) {
            *slot = Slot::Complete(package);
        }
    }

    pub fn package(&self, id: PkgId) -> Option<Arc<Package>> {
        match self.slots.borrow().get(id.0)? {
            Slot::Complete(pkg) => Some(Arc::clone(pkg)),
            Slot::Pending => None,
        }
    }

    /// Number of packages loaded so far, the origin included.
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn import_from(&self, path: &str, src_dir: &str) -> Result<Arc<Package>, ImportError> {
        if self.ctx.is_done() {
            return Err(ImportError::Cancelled(path.to_string()));
        }
        if path == "unsafe" {
            return Ok(self.unsafe_package());
        }

        let location = self.locate(path, src_dir).ok_or_else(|| ImportError::NotFound {
            path: path.to_string(),
            src_dir: src_dir.to_string(),
        })?;
        let dir = location.key();

        let existing = self.index.borrow().get(&(path.to_string(), dir.clone())).copied();
        if let Some(id) = existing {
            return match self.slots.borrow().get(id.0) {
                Some(Slot::Complete(pkg)) => match self.cycle_through_stack(pkg) {
                    Some(err) => Err(err),
                    None => Ok(Arc::clone(pkg)),
                },
                _ => Err(self.cycle_error(path)),
            };
        }

        let files = self.load(&location, path)?;
        let id = self.begin(path, &dir);
        let checked = Checker::new(self, id, path, &dir, &files).finish();
        for message in &checked.soft_errors {
            tracing::debug!("{}: {}", path, message);
        }

        let package = Arc::new(Package {
            id,
            path: path.to_string(),
            dir,
            name: checked.name,
            files,
            objects: checked.objects,
            soft_errors: checked.soft_errors,
            cycle: checked.cycle,
        });
        self.complete(Arc::clone(&package));
        self.stats.imports.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "imported {} ({} objects) from {}",
            package.path,
            package.objects.len(),
            package.dir
        );

        match self.cycle_through_stack(&package) {
            Some(err) => Err(err),
            None => Ok(package),
        }
    }

    /// The package's cycle, if it runs through a package still being
    /// checked. Importers outside the cycle get the package as is.
    fn cycle_through_stack(&self, package: &Package) -> Option<ImportError> {
        let err = package.cycle.as_ref()?;
        let ImportError::Cycle { chain } = err else {
            return Some(err.clone());
        };
        let stack = self.stack.borrow();
        chain
            .iter()
            .any(|path| stack.contains(path))
            .then(|| err.clone())
    }

    fn cycle_error(&self, path: &str) -> ImportError {
        let stack = self.stack.borrow();
        let start = stack.iter().position(|p| p == path).unwrap_or(0);
        let mut chain: Vec<String> = stack[start..].to_vec();
        chain.push(path.to_string());
        ImportError::Cycle { chain }
    }

    /// Vendor directories of the request sources, then source directories
    /// whose configured import path matches, then the search roots.
    fn locate(&self, path: &str, src_dir: &str) -> Option<Location> {
        let mut dir = src_dir.to_string();
        loop {
            let vendored = if dir == "." {
                format!("vendor/{}", path)
            } else {
                format!("{}/vendor/{}", dir, path)
            };
            if self.memory.has_dir(&vendored) {
                return Some(Location::Memory(vendored));
            }
            if dir == "." || dir.is_empty() {
                break;
            }
            dir = dir_of(&dir);
        }

        if let Some(dir) = self
            .memory
            .dirs()
            .find(|dir| self.config.import_path_for(dir).as_deref() == Some(path))
        {
            return Some(Location::Memory(dir.clone()));
        }

        let disk_dir = Path::new(src_dir);
        if disk_dir.is_absolute() {
            if let Some(vendored) = disk_dir
                .ancestors()
                .map(|dir| dir.join("vendor").join(path))
                .find(|candidate| candidate.is_dir())
            {
                return Some(Location::Disk(vendored));
            }
        }

        self.config
            .roots
            .iter()
            .flat_map(|root| [root.join("src").join(path), root.join(path)])
            .find(|candidate| candidate.is_dir())
            .map(Location::Disk)
    }

    fn load(&self, location: &Location, path: &str) -> Result<Vec<Arc<ParsedFile>>, ImportError> {
        let candidates: Vec<Arc<ParsedFile>> = match location {
            Location::Memory(dir) => self
                .memory
                .files_in(dir)
                .iter()
                .filter(|f| !f.is_test_file())
                .cloned()
                .collect(),
            Location::Disk(dir) => self.load_disk(dir),
        };

        let name = candidates
            .iter()
            .map(|f| f.package.as_str())
            .find(|name| !name.is_empty() && *name != "main" && !name.ends_with("_test"))
            .or_else(|| candidates.iter().map(|f| f.package.as_str()).find(|n| !n.is_empty()))
            .map(str::to_string);
        let Some(name) = name else {
            return Err(ImportError::NoGoFiles {
                path: path.to_string(),
                dir: location.key(),
            });
        };

        Ok(candidates
            .into_iter()
            .filter(|f| f.package == name)
            .filter(|f| {
                if let Some(message) = f.syntax_error_message() {
                    tracing::debug!("{}", message);
                    return false;
                }
                true
            })
            .collect())
    }

    fn load_disk(&self, dir: &Path) -> Vec<Arc<ParsedFile>> {
        let mut parser_slot = self.parser.borrow_mut();
        if parser_slot.is_none() {
            match Parser::new() {
                Ok(parser) => *parser_slot = Some(parser),
                Err(e) => {
                    tracing::warn!("cannot create parser: {}", e);
                    return Vec::new();
                }
            }
        }
        let Some(parser) = parser_slot.as_mut() else {
            return Vec::new();
        };

        let mut files = Vec::new();
        let entries = WalkDir::new(dir)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file());

        for entry in entries {
            let file_path = entry.path();
            let name = entry.file_name().to_string_lossy();
            if !name.ends_with(".go") || name.ends_with("_test.go") {
                continue;
            }
            let too_large = entry
                .metadata()
                .map(|m| m.len() as usize > self.config.max_file_bytes)
                .unwrap_or(true);
            if too_large {
                tracing::debug!("skipping {}: over size limit", file_path.display());
                continue;
            }
            match parser.parse_file(file_path) {
                Ok(parsed) => files.push(Arc::new(parsed)),
                Err(e) => tracing::debug!("skipping {}: {}", file_path.display(), e),
            }
        }
        files
    }

    fn unsafe_package(&self) -> Arc<Package> {
        let key = ("unsafe".to_string(), String::new());
        let existing = self.index.borrow().get(&key).copied();
        if let Some(pkg) = existing.and_then(|id| self.package(id)) {
            return pkg;
        }

        let mut objects = BTreeMap::new();
        for name in UNSAFE_FUNCS {
            objects.insert(
                name.to_string(),
                Object {
                    name: name.to_string(),
                    loc: None,
                    kind: ObjectKind::Func(Signature::default()),
                },
            );
        }
        objects.insert(
            "Pointer".to_string(),
            Object {
                name: "Pointer".to_string(),
                loc: None,
                kind: ObjectKind::TypeName {
                    rhs: Type::basic("uintptr"),
                    alias: false,
                    methods: Vec::new(),
                },
            },
        );

        let id = {
            let mut slots = self.slots.borrow_mut();
            let id = PkgId(slots.len());
            slots.push(Slot::Pending);
            id
        };
        let package = Arc::new(Package {
            id,
            path: "unsafe".to_string(),
            dir: String::new(),
            name: "unsafe".to_string(),
            files: Vec::new(),
            objects,
            soft_errors: Vec::new(),
            cycle: None,
        });
        if let Some(slot) = self.slots.borrow_mut().get_mut(id.0) {
            *slot = Slot::Complete(Arc::clone(&package));
        }
        self.index.borrow_mut().insert(key, id);
        package
    }

    // =====================================================
    // Cross-package type queries
    // =====================================================

    fn type_object(&self, named: &NamedRef) -> Option<ObjectKind> {
        let pkg = self.package(named.pkg?)?;
        pkg.objects.get(&named.name).map(|o| o.kind.clone())
    }

    /// Right-hand side of a named type declared in a loaded package.
    pub fn named_rhs(&self, named: &NamedRef) -> Type {
        if named.pkg.is_none() {
            return universe().underlying(&named.name);
        }
        match self.type_object(named) {
            Some(ObjectKind::TypeName { rhs, .. }) => rhs,
            _ => Type::Unknown,
        }
    }

    pub fn methods(&self, named: &NamedRef) -> Vec<Member> {
        match self.type_object(named) {
            Some(ObjectKind::TypeName { methods, .. }) => methods,
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    fn tree(files: &[(&str, &str)]) -> SourceTree {
        let mut parser = Parser::new().unwrap();
        SourceTree::new(
            files
                .iter()
                .map(|(path, source)| Arc::new(parser.parse_source(path, source.as_bytes().to_vec()).unwrap())),
        )
    }

    fn module_config(module: &str) -> GoConfig {
        let mut map = BTreeMap::new();
        map.insert("go.module".to_string(), module.to_string());
        GoConfig::from_map(&map, &[])
    }

    #[test]
    fn test_imports_memory_package_once() {
        let tree = tree(&[
            ("lib/lib.go", "package lib\n\ntype T struct{ A int }\n\nfunc New() *T { return nil }\n"),
            ("lib/lib_test.go", "package lib\n\nvar Hidden = 1\n"),
        ]);
        let config = module_config("ex");
        let stats = AnalyzerStats::default();
        let importer = Importer::new(RequestContext::new(), &config, &tree, stats.clone());

        let pkg = importer.import_from("ex/lib", "cmd").unwrap();
        assert_eq!(pkg.name, "lib");
        assert!(pkg.objects.contains_key("T"));
        assert!(pkg.objects.contains_key("New"));
        assert!(!pkg.objects.contains_key("Hidden"));

        let again = importer.import_from("ex/lib", "other").unwrap();
        assert_eq!(again.id, pkg.id);
        assert_eq!(stats.imports.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_not_found() {
        let tree = SourceTree::default();
        let config = GoConfig::default();
        let importer = Importer::new(RequestContext::new(), &config, &tree, AnalyzerStats::default());
        let err = importer.import_from("example.com/missing", ".").unwrap_err();
        assert!(matches!(err, ImportError::NotFound { .. }));
    }

    fn cycle_tree() -> SourceTree {
        tree(&[
            ("a/a.go", "package a\n\nimport \"ex/b\"\n\nvar X = b.Y\n"),
            ("b/b.go", "package b\n\nimport \"ex/a\"\n\nvar Y = 1\nvar _ = a.X\n"),
            ("c/c.go", "package c\n\nimport \"ex/b\"\n\nvar Z = b.Y\n"),
        ])
    }

    #[test]
    fn test_cycle_detected() {
        let tree = cycle_tree();
        let config = module_config("ex");
        let importer = Importer::new(RequestContext::new(), &config, &tree, AnalyzerStats::default());

        importer.begin("ex/a", "a");
        let err = importer.import_from("ex/b", "a").unwrap_err();
        assert_eq!(
            err,
            ImportError::Cycle {
                chain: vec!["ex/a".into(), "ex/b".into(), "ex/a".into()]
            }
        );
        // still a member of the open cycle
        assert!(importer.import_from("ex/b", "a").unwrap_err().is_cycle());
    }

    #[test]
    fn test_cycle_hidden_from_outside_importers() {
        let tree = cycle_tree();
        let config = module_config("ex");
        let importer = Importer::new(RequestContext::new(), &config, &tree, AnalyzerStats::default());

        let c = importer.import_from("ex/c", ".").unwrap();
        assert!(c.cycle.is_none());
        assert!(c.objects.contains_key("Z"));

        let b = importer.import_from("ex/b", "c").unwrap();
        assert!(b.cycle.as_ref().is_some_and(ImportError::is_cycle));
        assert!(b.objects.contains_key("Y"));
        assert!(importer.import_from("ex/a", ".").is_ok());
    }

    #[test]
    fn test_cancelled_context() {
        let tree = SourceTree::default();
        let config = GoConfig::default();
        let ctx = RequestContext::new();
        ctx.cancel();
        let importer = Importer::new(ctx, &config, &tree, AnalyzerStats::default());
        assert!(matches!(
            importer.import_from("fmt", "."),
            Err(ImportError::Cancelled(_))
        ));
    }

    #[test]
    fn test_unsafe_is_synthetic() {
        let tree = SourceTree::default();
        let config = GoConfig::default();
        let importer = Importer::new(RequestContext::new(), &config, &tree, AnalyzerStats::default());
        let pkg = importer.import_from("unsafe", ".").unwrap();
        assert!(pkg.objects["Sizeof"].loc.is_none());
        assert_eq!(importer.import_from("unsafe", "x").unwrap().id, pkg.id);
    }

    #[test]
    fn test_vendor_directory_preferred() {
        let tree = tree(&[
            ("vendor/github.com/x/y/y.go", "package y\n\nvar V = 1\n"),
            ("cmd/main.go", "package main\n"),
        ]);
        let config = GoConfig::default();
        let importer = Importer::new(RequestContext::new(), &config, &tree, AnalyzerStats::default());
        let pkg = importer.import_from("github.com/x/y", "cmd").unwrap();
        assert_eq!(pkg.dir, "vendor/github.com/x/y");
    }

    #[test]
    fn test_disk_root_lookup() {
        let temp_dir = TempDir::new().unwrap();
        let pkg_dir = temp_dir.path().join("src").join("example.com").join("util");
        fs::create_dir_all(&pkg_dir).unwrap();
        fs::write(pkg_dir.join("util.go"), "package util\n\nfunc Helper() int { return 1 }\n").unwrap();
        fs::write(pkg_dir.join("util_test.go"), "package util\n\nfunc TestOnly() {}\n").unwrap();

        let tree = SourceTree::default();
        let config = GoConfig::from_map(&BTreeMap::new(), &[temp_dir.path().to_path_buf()]);
        let importer = Importer::new(RequestContext::new(), &config, &tree, AnalyzerStats::default());

        let pkg = importer.import_from("example.com/util", ".").unwrap();
        assert_eq!(pkg.name, "util");
        assert!(pkg.objects.contains_key("Helper"));
        assert!(!pkg.objects.contains_key("TestOnly"));
        assert!(pkg.objects["Helper"].loc.as_ref().unwrap().file.ends_with("util.go"));
    }

    #[test]
    fn test_no_go_files() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("empty")).unwrap();
        let tree = SourceTree::default();
        let config = GoConfig::from_map(&BTreeMap::new(), &[temp_dir.path().to_path_buf()]);
        let importer = Importer::new(RequestContext::new(), &config, &tree, AnalyzerStats::default());
        assert!(matches!(
            importer.import_from("empty", "."),
            Err(ImportError::NoGoFiles { .. })
        ));
    }

    #[test]
    fn test_disk_vendor_preferred_over_roots() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        let app = temp_dir.path().join("app");
        fs::create_dir_all(root.join("src").join("dep")).unwrap();
        fs::write(root.join("src/dep/dep.go"), "package dep

var FromRoot = 1
").unwrap();
        fs::create_dir_all(app.join("vendor").join("dep")).unwrap();
        fs::write(app.join("vendor/dep/dep.go"), "package dep

var FromVendor = 1
").unwrap();
        fs::create_dir_all(app.join("cmd")).unwrap();

        let tree = SourceTree::default();
        let config = GoConfig::from_map(&BTreeMap::new(), &[root]);
        let importer = Importer::new(RequestContext::new(), &config, &tree, AnalyzerStats::default());

        let src_dir = app.join("cmd").display().to_string();
        let pkg = importer.import_from("dep", &src_dir).unwrap();
        assert!(pkg.objects.contains_key("FromVendor"));
        assert!(!pkg.objects.contains_key("FromRoot"));
    }
}
