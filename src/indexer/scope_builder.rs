//! Scope Builder for lexical name binding within one file
//!
//! Walks a parsed Go file once, tracking block scopes, and classifies every
//! identifier-like leaf: a use of a local binding, a declaration site, a
//! free name for package-level lookup, or a member that needs type
//! information.

use std::collections::{HashMap, HashSet};

use tree_sitter::Node;

use super::parser::ParsedFile;
use super::syntax::{expressions, field_children, has_token, is_name_leaf, named_children, specs, statements};
use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Param,
    Receiver,
    TypeParam,
    Var,
    Const,
    Type,
    Label,
    TypeSwitch,
}

/// Where a binding's type comes from.
#[derive(Debug, Clone, Copy)]
pub enum BindingSource<'t> {
    None,
    /// Explicit type node; variadic parameters are slices of it.
    Declared { ty: Node<'t>, variadic: bool },
    /// `index`-th of `count` names assigned from `values`.
    Value { values: Node<'t>, index: usize, count: usize },
    /// Key (`0`) or value (`1`) of a range clause.
    Range { expr: Node<'t>, index: usize },
    /// Type switch alias inside one case clause.
    TypeSwitch { value: Node<'t>, case_type: Option<Node<'t>> },
    Const { spec: Node<'t>, index: usize },
    TypeSpec(Node<'t>),
}

#[derive(Debug, Clone)]
pub struct Binding<'t> {
    pub name: String,
    pub node: Node<'t>,
    pub kind: BindingKind,
    pub source: BindingSource<'t>,
}

/// Classification of one identifier occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Reference to a local binding, or a free name when `None`.
    Use(Option<usize>),
    /// Declaration site; `id` names the enclosing type member when known.
    Decl { binding: Option<usize>, id: Option<String> },
    /// Local name of an import spec.
    Import(String),
    /// Field of a selector expression.
    Member,
    /// Type name of a qualified type `pkg.T`.
    Qualified,
    /// Key of a composite literal element; the binding is the lexical
    /// fallback when the literal turns out not to be a struct.
    Key(Option<usize>),
}

#[derive(Debug, Clone)]
pub struct Occurrence<'t> {
    pub node: Node<'t>,
    pub role: Role,
}

/// Bindings and classified occurrences of one file, in source order.
#[derive(Debug, Default)]
pub struct FileBindings<'t> {
    pub bindings: Vec<Binding<'t>>,
    pub occurrences: Vec<Occurrence<'t>>,
    by_start: HashMap<usize, usize>,
}

impl<'t> FileBindings<'t> {
    pub fn role_of(&self, node: &Node) -> Option<&Role> {
        self.by_start
            .get(&node.start_byte())
            .and_then(|&i| self.occurrences.get(i))
            .filter(|occ| occ.node.id() == node.id())
            .map(|occ| &occ.role)
    }

    /// Index of the local binding an identifier refers to, if any.
    pub fn binding_index(&self, node: &Node) -> Option<usize> {
        match self.role_of(node)? {
            Role::Use(Some(b)) | Role::Key(Some(b)) | Role::Decl { binding: Some(b), .. } => Some(*b),
            _ => None,
        }
    }

    pub fn binding_of(&self, node: &Node) -> Option<&Binding<'t>> {
        self.binding_index(node).and_then(|b| self.bindings.get(b))
    }
}

/// Builder for the lexical scopes of one file
pub struct ScopeBuilder<'t> {
    file: &'t ParsedFile,
    consumed: HashSet<usize>,
    scopes: Vec<HashMap<String, usize>>,
    labels: Vec<HashMap<String, usize>>,
    owner: Option<String>,
    out: FileBindings<'t>,
}

impl<'t> ScopeBuilder<'t> {
    /// Creates a builder; `consumed` declaration names are skipped.
    pub fn new(file: &'t ParsedFile, consumed: &[Span]) -> Self {
        Self {
            file,
            consumed: consumed.iter().map(|s| s.start_byte).collect(),
            scopes: vec![HashMap::new()],
            labels: Vec::new(),
            owner: None,
            out: FileBindings::default(),
        }
    }

    /// Builds bindings for the whole file
    pub fn build(mut self) -> FileBindings<'t> {
        let root = self.file.root_node();
        self.walk(root);

        let mut out = self.out;
        out.occurrences.sort_by_key(|occ| occ.node.start_byte());
        out.by_start = out
            .occurrences
            .iter()
            .enumerate()
            .map(|(i, occ)| (occ.node.start_byte(), i))
            .collect();
        out
    }

    fn text(&self, node: Node) -> &'t str {
        let file: &'t ParsedFile = self.file;
        file.node_text(&node)
    }

    fn at_top_level(&self) -> bool {
        self.scopes.len() == 1
    }

    fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn lookup(&self, name: &str) -> Option<usize> {
        self.scopes.iter().rev().find_map(|s| s.get(name).copied())
    }

    fn record(&mut self, node: Node<'t>, role: Role) {
        self.out.occurrences.push(Occurrence { node, role });
    }

    fn is_skipped(&self, node: Node) -> bool {
        self.consumed.contains(&node.start_byte()) || self.text(node) == "_"
    }

    fn new_binding(&mut self, node: Node<'t>, kind: BindingKind, source: BindingSource<'t>) -> usize {
        self.out.bindings.push(Binding {
            name: self.text(node).to_string(),
            node,
            kind,
            source,
        });
        self.out.bindings.len() - 1
    }

    /// Declares a local name in the innermost scope and records its site.
    fn declare(&mut self, node: Node<'t>, kind: BindingKind, source: BindingSource<'t>) {
        if self.is_skipped(node) {
            return;
        }
        let idx = self.new_binding(node, kind, source);
        let name = self.text(node).to_string();
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, idx);
        }
        self.record(
            node,
            Role::Decl {
                binding: Some(idx),
                id: None,
            },
        );
    }

    fn walk(&mut self, node: Node<'t>) {
        match node.kind() {
            "comment" | "package_clause" => {}
            "import_declaration" => self.imports(node),
            "function_declaration" | "method_declaration" | "func_literal" => self.function(node),
            "function_type" => {
                self.push();
                self.signature(node);
                self.pop();
            }
            "type_declaration" => self.type_decl(node),
            "var_declaration" => self.value_decl(node, "var_spec"),
            "const_declaration" => self.value_decl(node, "const_spec"),
            "block" => {
                self.push();
                for stmt in statements(node) {
                    self.walk(stmt);
                }
                self.pop();
            }
            "if_statement" | "for_statement" | "expression_switch_statement" => {
                self.push();
                self.walk_children(node);
                self.pop();
            }
            "expression_case" | "default_case" | "type_case" => self.case_clause(node),
            "communication_case" => self.communication_case(node),
            "type_switch_statement" => self.type_switch(node),
            "short_var_declaration" => self.short_var(node),
            "range_clause" => self.range_clause(node),
            "labeled_statement" => {
                for child in named_children(node) {
                    if child.kind() == "label_name" {
                        let binding = self.labels.last().and_then(|m| m.get(self.text(child)).copied());
                        self.record(child, Role::Decl { binding, id: None });
                    } else {
                        self.walk(child);
                    }
                }
            }
            "selector_expression" => {
                if let Some(operand) = node.child_by_field_name("operand") {
                    self.walk(operand);
                }
                if let Some(field) = node.child_by_field_name("field") {
                    self.record(field, Role::Member);
                }
            }
            "qualified_type" => {
                if let Some(package) = node.child_by_field_name("package") {
                    self.leaf(package);
                }
                if let Some(name) = node.child_by_field_name("name") {
                    self.record(name, Role::Qualified);
                }
            }
            "composite_literal" => self.composite_literal(node),
            "literal_value" => self.literal_value(node, true),
            "field_declaration" => self.field_declaration(node),
            "method_elem" | "method_spec" => self.method_elem(node),
            _ if is_name_leaf(&node) => self.leaf(node),
            _ => self.walk_children(node),
        }
    }

    fn walk_children(&mut self, node: Node<'t>) {
        for child in named_children(node) {
            self.walk(child);
        }
    }

    fn leaf(&mut self, node: Node<'t>) {
        if self.is_skipped(node) {
            return;
        }
        let role = match node.kind() {
            "field_identifier" => Role::Member,
            "label_name" => Role::Use(self.labels.last().and_then(|m| m.get(self.text(node)).copied())),
            _ => Role::Use(self.lookup(self.text(node))),
        };
        self.record(node, role);
    }

    fn imports(&mut self, node: Node<'t>) {
        for spec in specs(node, &["import_spec"]) {
            let Some(name) = spec.child_by_field_name("name") else {
                continue;
            };
            if name.kind() != "package_identifier" || self.is_skipped(name) {
                continue;
            }
            let path = super::syntax::import_path(spec, self.file.source_bytes()).unwrap_or_default();
            self.record(name, Role::Import(path));
        }
    }

    fn function(&mut self, node: Node<'t>) {
        self.push();
        if let Some(receiver) = node.child_by_field_name("receiver") {
            self.receiver_type_params(receiver);
            self.params(receiver, BindingKind::Receiver);
        }
        if let Some(name) = node.child_by_field_name("name") {
            self.leaf(name);
        }
        self.type_params(node);
        self.signature(node);

        if let Some(body) = node.child_by_field_name("body") {
            let mut labels = HashMap::new();
            self.collect_labels(body, &mut labels);
            self.labels.push(labels);
            for stmt in statements(body) {
                self.walk(stmt);
            }
            self.labels.pop();
        }
        self.pop();
    }

    fn signature(&mut self, node: Node<'t>) {
        if let Some(params) = node.child_by_field_name("parameters") {
            self.params(params, BindingKind::Param);
        }
        if let Some(result) = node.child_by_field_name("result") {
            if result.kind() == "parameter_list" {
                self.params(result, BindingKind::Param);
            } else {
                self.walk(result);
            }
        }
    }

    fn params(&mut self, list: Node<'t>, kind: BindingKind) {
        let decls: Vec<Node<'t>> = named_children(list)
            .into_iter()
            .filter(|n| matches!(n.kind(), "parameter_declaration" | "variadic_parameter_declaration"))
            .collect();
        for decl in &decls {
            if let Some(ty) = decl.child_by_field_name("type") {
                self.walk(ty);
            }
        }
        for decl in decls {
            let Some(ty) = decl.child_by_field_name("type") else {
                continue;
            };
            let variadic = decl.kind() == "variadic_parameter_declaration";
            for name in field_children(decl, "name") {
                self.declare(name, kind, BindingSource::Declared { ty, variadic });
            }
        }
    }

    /// Declares the type arguments of a generic receiver (`l *List[T]`)
    /// in the method scope; the receiver type walk then skips them.
    fn receiver_type_params(&mut self, receiver: Node<'t>) {
        for decl in named_children(receiver) {
            let Some(mut ty) = decl.child_by_field_name("type") else {
                continue;
            };
            while matches!(ty.kind(), "pointer_type" | "parenthesized_type") {
                match ty.named_child(0) {
                    Some(inner) => ty = inner,
                    None => break,
                }
            }
            if ty.kind() != "generic_type" {
                continue;
            }
            let Some(args) = ty.child_by_field_name("type_arguments") else {
                continue;
            };
            for arg in named_children(args) {
                let name = match arg.kind() {
                    "type_elem" => match named_children(arg).as_slice() {
                        [single] => *single,
                        _ => continue,
                    },
                    _ => arg,
                };
                if !matches!(name.kind(), "type_identifier" | "identifier") || self.is_skipped(name) {
                    continue;
                }
                self.declare(name, BindingKind::TypeParam, BindingSource::None);
                self.consumed.insert(name.start_byte());
            }
        }
    }

    fn type_params(&mut self, node: Node<'t>) {
        let Some(list) = node.child_by_field_name("type_parameters") else {
            return;
        };
        let decls: Vec<Node<'t>> = named_children(list)
            .into_iter()
            .filter(|n| n.kind() == "type_parameter_declaration")
            .collect();
        for decl in &decls {
            let constraint = decl.child_by_field_name("type");
            for name in field_children(*decl, "name") {
                let source = match constraint {
                    Some(ty) => BindingSource::Declared { ty, variadic: false },
                    None => BindingSource::None,
                };
                self.declare(name, BindingKind::TypeParam, source);
            }
        }
        for decl in decls {
            if let Some(constraint) = decl.child_by_field_name("type") {
                self.walk(constraint);
            }
        }
    }

    fn collect_labels(&mut self, node: Node<'t>, labels: &mut HashMap<String, usize>) {
        for child in named_children(node) {
            match child.kind() {
                "func_literal" => {}
                "labeled_statement" => {
                    if let Some(label) = named_children(child).into_iter().find(|n| n.kind() == "label_name") {
                        let idx = self.new_binding(label, BindingKind::Label, BindingSource::None);
                        labels.insert(self.text(label).to_string(), idx);
                    }
                    self.collect_labels(child, labels);
                }
                _ => self.collect_labels(child, labels),
            }
        }
    }

    fn type_decl(&mut self, node: Node<'t>) {
        for spec in specs(node, &["type_spec", "type_alias"]) {
            let Some(name) = spec.child_by_field_name("name") else {
                continue;
            };
            if self.at_top_level() {
                self.leaf(name);
            } else {
                self.declare(name, BindingKind::Type, BindingSource::TypeSpec(spec));
            }

            let previous = self.owner.replace(self.text(name).to_string());
            self.push();
            self.type_params(spec);
            if let Some(ty) = spec.child_by_field_name("type") {
                self.walk(ty);
            }
            self.pop();
            self.owner = previous;
        }
    }

    fn value_decl(&mut self, node: Node<'t>, spec_kind: &str) {
        let top = self.at_top_level();
        for spec in specs(node, &[spec_kind]) {
            let ty = spec.child_by_field_name("type");
            let value = spec.child_by_field_name("value");
            if let Some(ty) = ty {
                self.walk(ty);
            }
            if let Some(value) = value {
                self.walk(value);
            }

            let names = field_children(spec, "name");
            let count = names.len();
            for (index, name) in names.into_iter().enumerate() {
                if top {
                    self.leaf(name);
                    continue;
                }
                if spec_kind == "const_spec" {
                    self.declare(name, BindingKind::Const, BindingSource::Const { spec, index });
                } else {
                    let source = match (ty, value) {
                        (Some(ty), _) => BindingSource::Declared { ty, variadic: false },
                        (None, Some(values)) => BindingSource::Value { values, index, count },
                        (None, None) => BindingSource::None,
                    };
                    self.declare(name, BindingKind::Var, source);
                }
            }
        }
    }

    fn short_var(&mut self, node: Node<'t>) {
        let right = node.child_by_field_name("right");
        if let Some(right) = right {
            self.walk(right);
        }
        let Some(left) = node.child_by_field_name("left") else {
            return;
        };
        let names = expressions(left);
        let count = names.len();
        for (index, name) in names.into_iter().enumerate() {
            if name.kind() != "identifier" {
                self.walk(name);
                continue;
            }
            if self.is_skipped(name) {
                continue;
            }
            let existing = self.scopes.last().and_then(|s| s.get(self.text(name)).copied());
            match (existing, right) {
                (Some(binding), _) => self.record(name, Role::Use(Some(binding))),
                (None, Some(values)) => {
                    self.declare(name, BindingKind::Var, BindingSource::Value { values, index, count })
                }
                (None, None) => self.declare(name, BindingKind::Var, BindingSource::None),
            }
        }
    }

    fn range_clause(&mut self, node: Node<'t>) {
        let right = node.child_by_field_name("right");
        if let Some(right) = right {
            self.walk(right);
        }
        let Some(left) = node.child_by_field_name("left") else {
            return;
        };
        if !has_token(node, ":=") {
            self.walk(left);
            return;
        }
        for (index, name) in expressions(left).into_iter().enumerate() {
            let source = match right {
                Some(expr) => BindingSource::Range { expr, index },
                None => BindingSource::None,
            };
            self.declare(name, BindingKind::Var, source);
        }
    }

    fn case_clause(&mut self, node: Node<'t>) {
        let guards: Vec<Node<'t>> = field_children(node, "value")
            .into_iter()
            .chain(field_children(node, "type"))
            .collect();
        for guard in &guards {
            self.walk(*guard);
        }
        self.push();
        for child in named_children(node) {
            if guards.iter().any(|g| g.id() == child.id()) {
                continue;
            }
            self.walk(child);
        }
        self.pop();
    }

    fn communication_case(&mut self, node: Node<'t>) {
        self.push();
        let communication = node.child_by_field_name("communication");
        if let Some(comm) = communication {
            if comm.kind() == "receive_statement" && has_token(comm, ":=") {
                let right = comm.child_by_field_name("right");
                if let Some(right) = right {
                    self.walk(right);
                }
                if let Some(left) = comm.child_by_field_name("left") {
                    let names = expressions(left);
                    let count = names.len();
                    for (index, name) in names.into_iter().enumerate() {
                        let source = match right {
                            Some(values) => BindingSource::Value { values, index, count },
                            None => BindingSource::None,
                        };
                        self.declare(name, BindingKind::Var, source);
                    }
                }
            } else {
                self.walk(comm);
            }
        }
        for child in named_children(node) {
            if communication.is_some_and(|c| c.id() == child.id()) {
                continue;
            }
            self.walk(child);
        }
        self.pop();
    }

    fn type_switch(&mut self, node: Node<'t>) {
        self.push();
        let initializer = node.child_by_field_name("initializer");
        let alias = node
            .child_by_field_name("alias")
            .and_then(|list| expressions(list).into_iter().next());
        let value = node.child_by_field_name("value");

        if let Some(init) = initializer {
            self.walk(init);
        }
        if let Some(value) = value {
            self.walk(value);
        }
        if let (Some(alias), Some(value)) = (alias, value) {
            self.declare(alias, BindingKind::TypeSwitch, BindingSource::TypeSwitch { value, case_type: None });
        }

        for clause in named_children(node) {
            if !matches!(clause.kind(), "type_case" | "default_case") {
                continue;
            }
            let types = field_children(clause, "type");
            for ty in &types {
                self.walk(*ty);
            }
            self.push();
            if let (Some(alias), Some(value)) = (alias, value) {
                if !self.is_skipped(alias) {
                    let case_type = if types.len() == 1 { Some(types[0]) } else { None };
                    let idx = self.new_binding(
                        alias,
                        BindingKind::TypeSwitch,
                        BindingSource::TypeSwitch { value, case_type },
                    );
                    let name = self.text(alias).to_string();
                    if let Some(scope) = self.scopes.last_mut() {
                        scope.insert(name, idx);
                    }
                }
            }
            for child in named_children(clause) {
                if types.iter().any(|t| t.id() == child.id()) {
                    continue;
                }
                self.walk(child);
            }
            self.pop();
        }
        self.pop();
    }

    fn composite_literal(&mut self, node: Node<'t>) {
        let ty = node.child_by_field_name("type");
        if let Some(ty) = ty {
            self.walk(ty);
        }
        let keys_are_fields = !ty.is_some_and(|t| {
            matches!(
                t.kind(),
                "map_type" | "slice_type" | "array_type" | "implicit_length_array_type"
            )
        });
        if let Some(body) = node.child_by_field_name("body") {
            self.literal_value(body, keys_are_fields);
        }
    }

    fn literal_value(&mut self, node: Node<'t>, keys_are_fields: bool) {
        for child in named_children(node) {
            match child.kind() {
                "keyed_element" => {
                    let parts = named_children(child);
                    let key = child.child_by_field_name("key").or_else(|| parts.first().copied());
                    let value = child.child_by_field_name("value").or_else(|| parts.get(1).copied());
                    if let Some(key) = key {
                        let inner = unwrap_element(key);
                        if keys_are_fields && matches!(inner.kind(), "identifier" | "field_identifier") {
                            if !self.is_skipped(inner) {
                                let fallback = self.lookup(self.text(inner));
                                self.record(inner, Role::Key(fallback));
                            }
                        } else {
                            self.element(inner);
                        }
                    }
                    if let Some(value) = value {
                        self.element(unwrap_element(value));
                    }
                }
                "literal_element" => self.element(unwrap_element(child)),
                _ => self.walk(child),
            }
        }
    }

    fn element(&mut self, node: Node<'t>) {
        if node.kind() == "literal_value" {
            self.literal_value(node, true);
        } else {
            self.walk(node);
        }
    }

    fn field_declaration(&mut self, node: Node<'t>) {
        for name in field_children(node, "name") {
            if self.is_skipped(name) {
                continue;
            }
            let id = self
                .owner
                .as_ref()
                .map(|owner| format!("{}.{}", owner, self.text(name)));
            self.record(name, Role::Decl { binding: None, id });
        }
        if let Some(ty) = node.child_by_field_name("type") {
            self.walk(ty);
        }
    }

    fn method_elem(&mut self, node: Node<'t>) {
        if let Some(name) = node.child_by_field_name("name") {
            if !self.is_skipped(name) {
                let id = self
                    .owner
                    .as_ref()
                    .map(|owner| format!("{}.{}", owner, self.text(name)));
                self.record(name, Role::Decl { binding: None, id });
            }
        }
        self.push();
        self.signature(node);
        self.pop();
    }
}

fn unwrap_element(node: Node<'_>) -> Node<'_> {
    if node.kind() == "literal_element" {
        node.named_child(0).unwrap_or(node)
    } else {
        node
    }
}

/// Builds the bindings of a file.
pub fn bind_file<'t>(file: &'t ParsedFile, consumed: &[Span]) -> FileBindings<'t> {
    ScopeBuilder::new(file, consumed).build()
}
