//! Syntax-only package scope: the merged top-level declarations of
//! every file of one package. Built read-only, never mutates the trees.

use std::collections::HashMap;
use std::sync::Arc;

use tree_sitter::Node;

use super::parser::ParsedFile;
use super::syntax::{field_children, named_children, receiver_type_name, specs};
use super::types::Loc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Func,
    Type,
    Var,
    Const,
}

/// One package-level name.
#[derive(Debug, Clone, Copy)]
pub struct Declaration<'t> {
    pub kind: DeclKind,
    /// Index of the declaring file in the package file list.
    pub file: usize,
    pub name: Node<'t>,
    /// `function_declaration`, `type_spec`, `type_alias`, `var_spec` or `const_spec`.
    pub spec: Node<'t>,
    /// Position of the name among the names of its spec.
    pub index: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct MethodDecl<'t> {
    pub file: usize,
    pub decl: Node<'t>,
    pub name: Node<'t>,
}

pub struct PackageScope<'t> {
    pub name: String,
    files: &'t [Arc<ParsedFile>],
    decls: HashMap<String, Declaration<'t>>,
    methods: HashMap<String, Vec<MethodDecl<'t>>>,
}

impl<'t> PackageScope<'t> {
    pub fn build(files: &'t [Arc<ParsedFile>]) -> Self {
        let mut decls = HashMap::new();
        let mut methods: HashMap<String, Vec<MethodDecl<'t>>> = HashMap::new();

        for (idx, file) in files.iter().enumerate() {
            for decl in file_declarations(file, idx) {
                let name = file.node_text(&decl.name).to_string();
                if name == "_" || (name == "init" && decl.kind == DeclKind::Func) {
                    continue;
                }
                if decls.contains_key(&name) {
                    tracing::debug!("{}: {} redeclared in package", file.path, name);
                    continue;
                }
                decls.insert(name, decl);
            }
            for method in method_declarations(file, idx) {
                if let Some((receiver, _)) = receiver_type_name(method.decl, file.source_bytes()) {
                    methods.entry(receiver.to_string()).or_default().push(method);
                }
            }
        }

        let name = files.first().map(|f| f.package.clone()).unwrap_or_default();
        Self {
            name,
            files,
            decls,
            methods,
        }
    }

    pub fn files(&self) -> &'t [Arc<ParsedFile>] {
        self.files
    }

    pub fn get(&self, name: &str) -> Option<&Declaration<'t>> {
        self.decls.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.decls.keys()
    }

    pub fn methods_of(&self, type_name: &str) -> &[MethodDecl<'t>] {
        self.methods.get(type_name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn loc(&self, file: usize, node: &Node) -> Loc {
        let parsed = &self.files[file];
        Loc {
            file: parsed.path.clone(),
            span: parsed.span(node),
        }
    }

    pub fn decl_loc(&self, decl: &Declaration) -> Loc {
        self.loc(decl.file, &decl.name)
    }
}

/// Top-level funcs, types, vars and consts of one file (methods excluded).
pub fn file_declarations(file: &ParsedFile, idx: usize) -> Vec<Declaration<'_>> {
    let mut out = Vec::new();
    let root = file.root_node();

    for decl in named_children(root) {
        match decl.kind() {
            "function_declaration" => {
                if let Some(name) = decl.child_by_field_name("name") {
                    out.push(Declaration {
                        kind: DeclKind::Func,
                        file: idx,
                        name,
                        spec: decl,
                        index: 0,
                    });
                }
            }
            "type_declaration" => {
                for spec in specs(decl, &["type_spec", "type_alias"]) {
                    if let Some(name) = spec.child_by_field_name("name") {
                        out.push(Declaration {
                            kind: DeclKind::Type,
                            file: idx,
                            name,
                            spec,
                            index: 0,
                        });
                    }
                }
            }
            "var_declaration" | "const_declaration" => {
                let (spec_kind, kind) = if decl.kind() == "var_declaration" {
                    ("var_spec", DeclKind::Var)
                } else {
                    ("const_spec", DeclKind::Const)
                };
                for spec in specs(decl, &[spec_kind]) {
                    for (index, name) in field_children(spec, "name").into_iter().enumerate() {
                        out.push(Declaration {
                            kind,
                            file: idx,
                            name,
                            spec,
                            index,
                        });
                    }
                }
            }
            _ => {}
        }
    }
    out
}

fn method_declarations(file: &ParsedFile, idx: usize) -> Vec<MethodDecl<'_>> {
    named_children(file.root_node())
        .into_iter()
        .filter(|n| n.kind() == "method_declaration")
        .filter_map(|decl| {
            decl.child_by_field_name("name").map(|name| MethodDecl {
                file: idx,
                decl,
                name,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::parser::Parser;

    fn parse_all(files: &[(&str, &str)]) -> Vec<Arc<ParsedFile>> {
        let mut parser = Parser::new().unwrap();
        files
            .iter()
            .map(|(path, source)| Arc::new(parser.parse_source(path, source.as_bytes().to_vec()).unwrap()))
            .collect()
    }

    #[test]
    fn test_merges_files() {
        let files = parse_all(&[
            ("p/a.go", "package p\n\nvar X int\n\nfunc init() {}\n"),
            ("p/b.go", "package p\n\ntype T struct{}\n\nfunc (t T) M() {}\n\nconst (\n\tA, B = 1, 2\n)\n"),
        ]);
        let scope = PackageScope::build(&files);
        assert_eq!(scope.name, "p");

        let x = scope.get("X").unwrap();
        assert_eq!(x.kind, DeclKind::Var);
        assert_eq!(x.file, 0);

        let b = scope.get("B").unwrap();
        assert_eq!(b.kind, DeclKind::Const);
        assert_eq!(b.index, 1);
        assert_eq!(scope.decl_loc(b).file, "p/b.go");

        assert!(scope.get("init").is_none());
        assert!(scope.get("M").is_none());
        assert_eq!(scope.methods_of("T").len(), 1);
    }

    #[test]
    fn test_first_declaration_wins() {
        let files = parse_all(&[
            ("p/a.go", "package p\n\nvar X int\n"),
            ("p/b.go", "package p\n\nvar X string\n"),
        ]);
        let scope = PackageScope::build(&files);
        assert_eq!(scope.get("X").unwrap().file, 0);
    }
}
