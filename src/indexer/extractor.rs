use std::collections::BTreeMap;

use tree_sitter::Node;

use super::parser::ParsedFile;
use super::syntax::{field_children, has_token, is_exported, named_children, receiver_type_name, specs};
use crate::model::{Def, DefKind};
use crate::span::Span;

/// Definitions of one file plus the name spans they consume.
#[derive(Debug, Default)]
pub struct Extraction {
    pub defs: Vec<Def>,
    /// Declared-name occurrences that must not also get a reference.
    pub consumed: Vec<Span>,
}

pub struct DefExtractor<'a> {
    parsed: &'a ParsedFile,
    meta: BTreeMap<String, String>,
    out: Extraction,
}

impl<'a> DefExtractor<'a> {
    pub fn new(parsed: &'a ParsedFile, import_path: Option<&str>) -> Self {
        let mut meta = BTreeMap::new();
        if !parsed.package.is_empty() {
            meta.insert("package".to_string(), parsed.package.clone());
        }
        if let Some(path) = import_path {
            meta.insert("import_path".to_string(), path.to_string());
        }
        Self {
            parsed,
            meta,
            out: Extraction::default(),
        }
    }

    /// Walks top-level declarations only.
    pub fn extract(mut self) -> Extraction {
        let root = self.parsed.root_node();
        for decl in named_children(root) {
            if decl.has_error() {
                continue;
            }
            match decl.kind() {
                "package_clause" => {
                    for name in named_children(decl) {
                        if name.kind() == "package_identifier" {
                            self.out.consumed.push(self.parsed.span(&name));
                        }
                    }
                }
                "function_declaration" => self.function(decl),
                "method_declaration" => self.method(decl),
                "type_declaration" => self.types(decl),
                "var_declaration" => self.values(decl, "var_spec", DefKind::Var),
                "const_declaration" => self.values(decl, "const_spec", DefKind::Const),
                _ => {}
            }
        }
        self.out
    }

    fn function(&mut self, decl: Node) {
        let Some(name) = decl.child_by_field_name("name") else {
            return;
        };
        let stop = decl.child_by_field_name("body").map(|b| b.start_byte());
        let title = render(self.parsed, decl, stop);
        let id = self.parsed.node_text(&name).to_string();
        self.push(id, title, DefKind::Func, decl, name, BTreeMap::new(), true);
    }

    fn method(&mut self, decl: Node) {
        let Some(name) = decl.child_by_field_name("name") else {
            return;
        };
        let Some((receiver, pointer)) = receiver_type_name(decl, self.parsed.source_bytes()) else {
            return;
        };
        let stop = decl.child_by_field_name("body").map(|b| b.start_byte());
        let title = render(self.parsed, decl, stop);
        let id = format!("{}.{}", receiver, self.parsed.node_text(&name));
        let meta = BTreeMap::from([
            ("receiver".to_string(), receiver.to_string()),
            ("pointer_receiver".to_string(), pointer.to_string()),
        ]);
        self.push(id, title, DefKind::Method, decl, name, meta, true);
    }

    fn types(&mut self, decl: Node) {
        let type_specs = specs(decl, &["type_spec", "type_alias"]);
        let single = type_specs.len() == 1;
        for spec in type_specs {
            let Some(name) = spec.child_by_field_name("name") else {
                continue;
            };
            let Some(ty) = spec.child_by_field_name("type") else {
                continue;
            };
            let type_name = self.parsed.node_text(&name).to_string();
            let span_node = if single { decl } else { spec };

            let title = match ty.kind() {
                "struct_type" | "interface_type" if spec.kind() == "type_spec" => {
                    let keyword = if ty.kind() == "struct_type" { "struct" } else { "interface" };
                    format!("type {} {}", render(self.parsed, spec, Some(ty.start_byte())), keyword)
                }
                _ => format!("type {}", render(self.parsed, spec, None)),
            };
            self.push(type_name.clone(), title, DefKind::Type, span_node, name, BTreeMap::new(), true);

            if spec.kind() == "type_spec" {
                match ty.kind() {
                    "struct_type" => self.fields(&type_name, ty),
                    "interface_type" => self.interface_methods(&type_name, ty),
                    _ => {}
                }
            }
        }
    }

    fn fields(&mut self, owner: &str, struct_type: Node) {
        for list in named_children(struct_type) {
            if list.kind() != "field_declaration_list" {
                continue;
            }
            for field in named_children(list) {
                if field.kind() != "field_declaration" || field.has_error() {
                    continue;
                }
                let Some(ty) = field.child_by_field_name("type") else {
                    continue;
                };
                let type_text = render(self.parsed, ty, None);
                let names = field_children(field, "name");

                if names.is_empty() {
                    let Some(base) = embedded_name(ty) else {
                        continue;
                    };
                    let field_name = self.parsed.node_text(&base).to_string();
                    let pointer = if has_token(field, "*") { "*" } else { "" };
                    let meta = BTreeMap::from([
                        ("embedded".to_string(), "true".to_string()),
                        ("type".to_string(), format!("{}{}", pointer, type_text)),
                    ]);
                    let title = format!("{}.{}{}", owner, pointer, type_text);
                    let id = format!("{}.{}", owner, field_name);
                    self.push(id, title, DefKind::Field, field, base, meta, false);
                    continue;
                }

                for name in names {
                    let field_name = self.parsed.node_text(&name);
                    let id = format!("{}.{}", owner, field_name);
                    let title = format!("{} {}", id, type_text);
                    let meta = BTreeMap::from([("type".to_string(), type_text.clone())]);
                    self.push(id, title, DefKind::Field, field, name, meta, true);
                }
            }
        }
    }

    fn interface_methods(&mut self, owner: &str, iface: Node) {
        for elem in named_children(iface) {
            if !matches!(elem.kind(), "method_elem" | "method_spec") || elem.has_error() {
                continue;
            }
            let Some(name) = elem.child_by_field_name("name") else {
                continue;
            };
            let signature = render(self.parsed, elem, None);
            let id = format!("{}.{}", owner, self.parsed.node_text(&name));
            let title = format!("{}.{}", owner, signature);
            let after_name = render_from(self.parsed, elem, name.end_byte());
            let meta = BTreeMap::from([("type".to_string(), format!("func{}", after_name))]);
            self.push(id, title, DefKind::Method, elem, name, meta, true);
        }
    }

    fn values(&mut self, decl: Node, spec_kind: &str, kind: DefKind) {
        let value_specs = specs(decl, &[spec_kind]);
        let single = value_specs.len() == 1;
        let keyword = if kind == DefKind::Var { "var" } else { "const" };
        for spec in value_specs {
            let ty = spec
                .child_by_field_name("type")
                .map(|t| render(self.parsed, t, None));
            let span_node = if single { decl } else { spec };
            for name in field_children(spec, "name") {
                let text = self.parsed.node_text(&name);
                if text == "_" {
                    continue;
                }
                let title = match &ty {
                    Some(ty) => format!("{} {} {}", keyword, text, ty),
                    None => format!("{} {}", keyword, text),
                };
                self.push(text.to_string(), title, kind, span_node, name, BTreeMap::new(), true);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        id: String,
        title: String,
        kind: DefKind,
        span_node: Node,
        name: Node,
        extra: BTreeMap<String, String>,
        consumes: bool,
    ) {
        let name_text = self.parsed.node_text(&name);
        if name_text == "_" || name_text.is_empty() {
            return;
        }
        let name_span = self.parsed.span(&name);
        if consumes {
            self.out.consumed.push(name_span);
        }
        let mut meta = self.meta.clone();
        meta.extend(extra);
        self.out.defs.push(Def {
            exported: is_exported(name_text),
            id,
            title,
            kind,
            path: self.parsed.path.clone(),
            span: self.parsed.span(&span_node),
            name_span,
            meta,
        });
    }
}

/// Identifier naming an embedded field: `T`, `*T`, `pkg.T`, `T[int]`.
pub fn embedded_name(ty: Node<'_>) -> Option<Node<'_>> {
    match ty.kind() {
        "type_identifier" => Some(ty),
        "pointer_type" | "parenthesized_type" => embedded_name(ty.named_child(0)?),
        "qualified_type" => ty.child_by_field_name("name"),
        "generic_type" => embedded_name(ty.child_by_field_name("type")?),
        _ => None,
    }
}

pub fn extract_defs(parsed: &ParsedFile, import_path: Option<&str>) -> Vec<Def> {
    DefExtractor::new(parsed, import_path).extract().defs
}

pub fn consumed_name_spans(parsed: &ParsedFile) -> Vec<Span> {
    DefExtractor::new(parsed, None).extract().consumed
}

/// Source text of `node` up to `stop`, comments removed and whitespace
/// collapsed to single spaces.
pub fn render(parsed: &ParsedFile, node: Node, stop: Option<usize>) -> String {
    let stop = stop.unwrap_or(node.end_byte());
    let mut out = String::new();
    let mut prev_end: Option<usize> = None;
    collect_leaves(parsed, node, node.start_byte(), stop, &mut out, &mut prev_end);
    out.trim().to_string()
}

fn render_from(parsed: &ParsedFile, node: Node, start: usize) -> String {
    let mut out = String::new();
    let mut prev_end: Option<usize> = None;
    collect_leaves(parsed, node, start, node.end_byte(), &mut out, &mut prev_end);
    out.trim().to_string()
}

fn collect_leaves(
    parsed: &ParsedFile,
    node: Node,
    start: usize,
    stop: usize,
    out: &mut String,
    prev_end: &mut Option<usize>,
) {
    if node.start_byte() >= stop || node.end_byte() <= start || node.kind() == "comment" {
        return;
    }
    let atomic = matches!(
        node.kind(),
        "interpreted_string_literal" | "raw_string_literal" | "rune_literal"
    );
    if node.child_count() == 0 || atomic {
        if let Some(end) = *prev_end {
            if node.start_byte() > end {
                out.push(' ');
            }
        }
        out.push_str(parsed.node_text(&node));
        *prev_end = Some(node.end_byte());
        return;
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    for child in children {
        collect_leaves(parsed, child, start, stop, out, prev_end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::parser::Parser;

    fn parse(source: &str) -> ParsedFile {
        Parser::new()
            .unwrap()
            .parse_source("p/a.go", source.as_bytes().to_vec())
            .unwrap()
    }

    fn find<'a>(defs: &'a [Def], id: &str) -> &'a Def {
        defs.iter()
            .find(|d| d.id == id)
            .unwrap_or_else(|| panic!("no def {}", id))
    }

    #[test]
    fn test_function_def() {
        let source = "package p\n\n// F does things.\nfunc F(a int, b string) (int, error) {\n\treturn 0, nil\n}\n";
        let parsed = parse(source);
        let defs = extract_defs(&parsed, Some("ex/p"));
        assert_eq!(defs.len(), 1);
        let f = &defs[0];
        assert_eq!(f.id, "F");
        assert_eq!(f.kind, DefKind::Func);
        assert_eq!(f.title, "func F(a int, b string) (int, error)");
        assert!(f.exported);
        assert_eq!(f.span.start_byte, source.find("func").unwrap());
        assert_eq!(f.span.end_byte(), source.len() - 1);
        assert_eq!(f.name_span.byte_len, 1);
        assert_eq!(f.meta.get("package").map(String::as_str), Some("p"));
        assert_eq!(f.meta.get("import_path").map(String::as_str), Some("ex/p"));
    }

    #[test]
    fn test_method_def() {
        let parsed = parse("package p\n\nfunc (t *T) run(x int) {}\n");
        let defs = extract_defs(&parsed, None);
        let m = find(&defs, "T.run");
        assert_eq!(m.kind, DefKind::Method);
        assert_eq!(m.title, "func (t *T) run(x int)");
        assert!(!m.exported);
        assert_eq!(m.meta.get("receiver").map(String::as_str), Some("T"));
        assert_eq!(m.meta.get("pointer_receiver").map(String::as_str), Some("true"));
    }

    #[test]
    fn test_struct_fields_and_embedding() {
        let source = "package p\n\ntype T struct {\n\tI\n\tName, Alias string // c\n\t*pkg.Base\n}\n";
        let parsed = parse(source);
        let extraction = DefExtractor::new(&parsed, None).extract();
        let defs = &extraction.defs;

        let t = find(defs, "T");
        assert_eq!(t.title, "type T struct");
        assert_eq!(t.span.start_byte, source.find("type").unwrap());

        let embedded = find(defs, "T.I");
        assert_eq!(embedded.kind, DefKind::Field);
        assert_eq!(embedded.meta.get("embedded").map(String::as_str), Some("true"));
        assert_eq!(find(defs, "T.Name").title, "T.Name string");
        assert_eq!(find(defs, "T.Base").meta.get("type").map(String::as_str), Some("*pkg.Base"));

        // T, Name, Alias + package clause; embedded names are not consumed.
        assert_eq!(extraction.consumed.len(), 4);
        assert!(!extraction.consumed.contains(&embedded.name_span));
    }

    #[test]
    fn test_interface_methods() {
        let parsed = parse("package p\n\ntype I interface {\n\tM(x int) error\n}\n");
        let defs = extract_defs(&parsed, None);
        let m = find(&defs, "I.M");
        assert_eq!(m.kind, DefKind::Method);
        assert_eq!(m.title, "I.M(x int) error");
        assert_eq!(m.meta.get("type").map(String::as_str), Some("func(x int) error"));
        assert_eq!(find(&defs, "I").title, "type I interface");
    }

    #[test]
    fn test_grouped_specs_use_spec_span() {
        let source = "package p\n\nvar (\n\tA int\n\tB, _ = 1, 2\n)\n\nconst C = 3\n";
        let parsed = parse(source);
        let defs = extract_defs(&parsed, None);
        assert_eq!(defs.len(), 3);
        let a = find(&defs, "A");
        assert_eq!(a.title, "var A int");
        assert_eq!(a.span.start_byte, source.find("A int").unwrap());
        let c = find(&defs, "C");
        assert_eq!(c.kind, DefKind::Const);
        assert_eq!(c.span.start_byte, source.find("const").unwrap());
    }

    #[test]
    fn test_type_alias_and_generic() {
        let parsed = parse("package p\n\ntype (\n\tA = B\n\tList[T any] []T\n)\n");
        let defs = extract_defs(&parsed, None);
        assert_eq!(find(&defs, "A").title, "type A = B");
        assert_eq!(find(&defs, "List").title, "type List[T any] []T");
    }

    #[test]
    fn test_no_local_defs() {
        let parsed = parse("package p\n\nfunc f() {\n\tvar x int\n\ttype L struct{}\n\t_ = x\n}\n");
        let defs = extract_defs(&parsed, None);
        assert_eq!(defs.len(), 1);
    }
}
