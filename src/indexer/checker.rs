//! Declaration-level type checker for one Go package.
//!
//! Only what reference resolution needs is modelled: the types of
//! package-level objects, method sets, struct fields and the static type
//! of expressions. Function bodies are never checked as a whole; local
//! bindings are typed on demand when a selector needs its operand's type.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tree_sitter::Node;

use super::extractor::embedded_name;
use super::import_resolver::{ImportEntry, Importer, Package};
use super::package::{DeclKind, Declaration, PackageScope};
use super::parser::ParsedFile;
use super::scope_builder::{BindingKind, BindingSource, FileBindings};
use super::syntax::{expressions, field_children, import_name_guess, import_path, named_children, specs, strip_parens};
use super::types::{
    defining_member, lookup_field_or_method, Interface, Loc, Lookup, Member, NamedRef, Object, ObjectKind, PkgId,
    Signature, Type, TypeSource,
};
use super::universe::{universe, BuiltinKind};
use crate::error::ImportError;

/// Bound on nested lowering and expression typing.
const MAX_DEPTH: usize = 64;

/// Where names in a node are looked up: the file it belongs to and,
/// for the file under resolution, its local bindings.
#[derive(Clone, Copy)]
pub struct Env<'e, 'a> {
    pub file: usize,
    pub bindings: Option<&'e FileBindings<'a>>,
}

impl<'e, 'a> Env<'e, 'a> {
    pub fn package(file: usize) -> Self {
        Self { file, bindings: None }
    }

    pub fn local(file: usize, bindings: &'e FileBindings<'a>) -> Self {
        Self {
            file,
            bindings: Some(bindings),
        }
    }
}

/// What an expression denotes.
#[derive(Debug, Clone)]
pub enum Operand {
    Value(Type),
    TypeExpr(Type),
    Package(ImportEntry),
    Builtin(String),
    Unknown,
}

impl Operand {
    pub fn value_type(&self) -> Type {
        match self {
            Operand::Value(ty) => ty.clone(),
            _ => Type::Unknown,
        }
    }
}

#[derive(Default)]
struct FileImports {
    named: HashMap<String, ImportEntry>,
    dot: Vec<ImportEntry>,
}

/// Outcome of checking an imported package's declarations.
pub struct Checked {
    pub name: String,
    pub objects: BTreeMap<String, Object>,
    pub soft_errors: Vec<String>,
    pub cycle: Option<ImportError>,
}

pub struct Checker<'a> {
    importer: &'a Importer<'a>,
    id: PkgId,
    scope: PackageScope<'a>,
    imports: Vec<FileImports>,
    soft_errors: Vec<String>,
    cycle: Option<ImportError>,
    objects: RefCell<HashMap<String, Option<Object>>>,
    resolving: RefCell<HashSet<String>>,
    locals: RefCell<HashMap<(usize, usize), Type>>,
    depth: Cell<usize>,
}

impl<'a> Checker<'a> {
    /// Loads every import of `files` through `importer`. Import failures
    /// are kept per import so lookups through them can report the cause.
    pub fn new(importer: &'a Importer<'a>, id: PkgId, path: &str, dir: &str, files: &'a [Arc<ParsedFile>]) -> Self {
        let scope = PackageScope::build(files);
        let mut imports = Vec::with_capacity(files.len());
        let mut soft_errors = Vec::new();
        let mut cycle = None;

        for file in files {
            let mut table = FileImports::default();
            let decls = named_children(file.root_node())
                .into_iter()
                .filter(|n| n.kind() == "import_declaration");
            for decl in decls {
                for spec in specs(decl, &["import_spec"]) {
                    let Some(import) = import_path(spec, file.source_bytes()) else {
                        continue;
                    };
                    if import == "C" {
                        continue;
                    }

                    let package = importer.import_from(&import, dir);
                    if let Err(err) = &package {
                        tracing::debug!("{}: import {} failed: {}", path, import, err);
                        if err.is_cycle() && cycle.is_none() {
                            cycle = Some(err.clone());
                        }
                        soft_errors.push(file.message_at(spec.start_byte(), &err.to_string()));
                    }

                    let alias = spec.child_by_field_name("name");
                    let name = match alias.map(|n| (n.kind(), file.node_text(&n))) {
                        Some(("blank_identifier", _)) => continue,
                        Some(("dot", _)) => {
                            table.dot.push(ImportEntry {
                                path: import.clone(),
                                name: String::new(),
                                package,
                            });
                            continue;
                        }
                        Some((_, alias)) => alias.to_string(),
                        None => match &package {
                            Ok(pkg) => pkg.name.clone(),
                            Err(_) => import_name_guess(&import)
                                .map(str::to_string)
                                .unwrap_or_else(|| import.rsplit('/').next().unwrap_or(&import).to_string()),
                        },
                    };
                    table.named.insert(
                        name.clone(),
                        ImportEntry {
                            path: import,
                            name,
                            package,
                        },
                    );
                }
            }
            imports.push(table);
        }

        Self {
            importer,
            id,
            scope,
            imports,
            soft_errors,
            cycle,
            objects: RefCell::new(HashMap::new()),
            resolving: RefCell::new(HashSet::new()),
            locals: RefCell::new(HashMap::new()),
            depth: Cell::new(0),
        }
    }

    /// Import messages collected while loading dependencies.
    pub fn soft_errors(&self) -> &[String] {
        &self.soft_errors
    }

    /// Types every package-level declaration.
    pub fn finish(self) -> Checked {
        let names: Vec<String> = self.scope.names().cloned().collect();
        let mut objects = BTreeMap::new();
        for name in names {
            if let Some(object) = self.object(&name) {
                objects.insert(name, object);
            }
        }
        Checked {
            name: self.scope.name.clone(),
            objects,
            soft_errors: self.soft_errors,
            cycle: self.cycle,
        }
    }

    pub fn file_import(&self, file: usize, name: &str) -> Option<&ImportEntry> {
        self.imports.get(file)?.named.get(name)
    }

    /// Object brought into scope by a dot import.
    pub fn dot_object(&self, file: usize, name: &str) -> Option<(Arc<Package>, Object)> {
        self.imports.get(file)?.dot.iter().find_map(|entry| {
            let pkg = entry.package.as_ref().ok()?;
            let object = pkg.objects.get(name)?.clone();
            Some((Arc::clone(pkg), object))
        })
    }

    /// Field or method `name` of `ty`, walked to its declaring member.
    pub fn select(&self, ty: &Type, name: &str) -> Option<Member> {
        if ty.is_unknown() {
            return None;
        }
        match lookup_field_or_method(self, ty, name) {
            Lookup::Found(selection) => defining_member(self, ty, &selection),
            Lookup::Ambiguous => {
                tracing::debug!("ambiguous selector {} on {:?}", name, ty.name());
                None
            }
            Lookup::NotFound => None,
        }
    }

    fn guarded<T>(&self, fallback: T, f: impl FnOnce() -> T) -> T {
        let depth = self.depth.get();
        if depth >= MAX_DEPTH {
            return fallback;
        }
        self.depth.set(depth + 1);
        let out = f();
        self.depth.set(depth);
        out
    }

    fn text(&self, file: usize, node: &Node) -> &'a str {
        let files: &'a [Arc<ParsedFile>] = self.scope.files();
        files.get(file).map(|f| f.node_text(node)).unwrap_or("")
    }

    fn loc(&self, file: usize, node: &Node) -> Loc {
        self.scope.loc(file, node)
    }

    // =====================================================
    // Package-level objects
    // =====================================================

    pub fn object(&self, name: &str) -> Option<Object> {
        if let Some(cached) = self.objects.borrow().get(name) {
            return cached.clone();
        }
        let decl = *self.scope.get(name)?;
        if !self.resolving.borrow_mut().insert(name.to_string()) {
            return None;
        }
        let object = self.declare(&decl, name);
        self.resolving.borrow_mut().remove(name);
        self.objects
            .borrow_mut()
            .insert(name.to_string(), Some(object.clone()));
        Some(object)
    }

    fn declare(&self, decl: &Declaration<'a>, name: &str) -> Object {
        let env = Env::package(decl.file);
        let kind = match decl.kind {
            DeclKind::Func => ObjectKind::Func(self.signature(decl.spec, env)),
            DeclKind::Type => {
                let alias = decl.spec.kind() == "type_alias";
                let rhs = decl
                    .spec
                    .child_by_field_name("type")
                    .map(|ty| self.lower(ty, env, Some(name)))
                    .unwrap_or(Type::Unknown);
                let methods = if alias { Vec::new() } else { self.declared_methods(name) };
                ObjectKind::TypeName { rhs, alias, methods }
            }
            DeclKind::Var => ObjectKind::Var(self.var_type(decl.spec, decl.index, env)),
            DeclKind::Const => ObjectKind::Const(self.const_type(decl.spec, decl.index, env)),
        };
        Object {
            name: name.to_string(),
            loc: Some(self.scope.decl_loc(decl)),
            kind,
        }
    }

    fn declared_methods(&self, type_name: &str) -> Vec<Member> {
        self.scope
            .methods_of(type_name)
            .iter()
            .map(|method| Member {
                name: self.text(method.file, &method.name).to_string(),
                ty: Type::Func(self.signature(method.decl, Env::package(method.file))),
                loc: Some(self.loc(method.file, &method.name)),
                owner: Some(type_name.to_string()),
                embedded: false,
            })
            .collect()
    }

    fn var_type(&self, spec: Node<'a>, index: usize, env: Env<'_, 'a>) -> Type {
        if let Some(ty) = spec.child_by_field_name("type") {
            return self.lower(ty, env, None);
        }
        let count = field_children(spec, "name").len();
        match spec.child_by_field_name("value") {
            Some(values) => self.assigned_type(values, index, count, env),
            None => Type::Unknown,
        }
    }

    /// Implicitly repeated constant specs reuse the last explicit one.
    fn const_type(&self, spec: Node<'a>, index: usize, env: Env<'_, 'a>) -> Type {
        let mut current = Some(spec);
        while let Some(spec) = current {
            if let Some(ty) = spec.child_by_field_name("type") {
                return self.lower(ty, env, None);
            }
            if let Some(values) = spec.child_by_field_name("value") {
                return expressions(values)
                    .get(index)
                    .map(|expr| self.type_of(*expr, env).value_type())
                    .unwrap_or(Type::Unknown);
            }
            current = spec.prev_named_sibling().filter(|n| n.kind() == "const_spec");
        }
        Type::Unknown
    }

    /// Type of the `index`-th of `count` names assigned from `values`.
    fn assigned_type(&self, values: Node<'a>, index: usize, count: usize, env: Env<'_, 'a>) -> Type {
        let exprs = expressions(values);
        if exprs.len() == count {
            return exprs
                .get(index)
                .map(|expr| self.type_of(*expr, env).value_type())
                .unwrap_or(Type::Unknown);
        }
        let Some(first) = exprs.first() else {
            return Type::Unknown;
        };
        match self.type_of(*first, env).value_type() {
            Type::Tuple(types) => types.get(index).cloned().unwrap_or(Type::Unknown),
            ty if index == 0 => ty,
            // comma-ok forms
            _ => Type::basic("bool"),
        }
    }

    // =====================================================
    // Type expressions
    // =====================================================

    /// Lowers a type node. `owner` names the declared type that struct
    /// fields and interface methods belong to.
    pub fn lower(&self, node: Node<'a>, env: Env<'_, 'a>, owner: Option<&str>) -> Type {
        self.guarded(Type::Unknown, || self.lower_inner(node, env, owner))
    }

    fn lower_inner(&self, node: Node<'a>, env: Env<'_, 'a>, owner: Option<&str>) -> Type {
        let child = |field: &str| node.child_by_field_name(field);
        let lower_field = |field: &str| match child(field) {
            Some(inner) => self.lower(inner, env, owner),
            None => Type::Unknown,
        };

        match node.kind() {
            "type_identifier" | "identifier" => self.lower_name(node, env),
            "qualified_type" => match (child("package"), child("name")) {
                (Some(package), Some(name)) => self.qualified_type(env.file, package, name),
                _ => Type::Unknown,
            },
            "pointer_type" => match node.named_child(0) {
                Some(inner) => Type::Pointer(Box::new(self.lower(inner, env, owner))),
                None => Type::Unknown,
            },
            "parenthesized_type" => match node.named_child(0) {
                Some(inner) => self.lower(inner, env, owner),
                None => Type::Unknown,
            },
            "slice_type" => Type::Slice(Box::new(lower_field("element"))),
            "array_type" | "implicit_length_array_type" => Type::Array(Box::new(lower_field("element"))),
            "map_type" => Type::Map(Box::new(lower_field("key")), Box::new(lower_field("value"))),
            "channel_type" => Type::Chan(Box::new(lower_field("value"))),
            "function_type" => Type::Func(self.signature(node, env)),
            "struct_type" => Type::Struct(self.struct_fields(node, env, owner)),
            "interface_type" => Type::Interface(self.interface(node, env, owner)),
            "generic_type" => lower_field("type"),
            _ => Type::Unknown,
        }
    }

    fn lower_name(&self, node: Node<'a>, env: Env<'_, 'a>) -> Type {
        if let Some(fb) = env.bindings {
            if let Some(binding) = fb.binding_of(&node) {
                return match (binding.kind, binding.source) {
                    (BindingKind::Type, BindingSource::TypeSpec(spec)) => spec
                        .child_by_field_name("type")
                        .map(|ty| self.lower(ty, env, Some(&binding.name)))
                        .unwrap_or(Type::Unknown),
                    (BindingKind::TypeParam, BindingSource::Declared { ty, .. }) => self.lower(ty, env, None),
                    _ => Type::Unknown,
                };
            }
        }
        let name = self.text(env.file, &node);
        self.named_type(env.file, name)
    }

    fn named_type(&self, file: usize, name: &str) -> Type {
        if let Some(decl) = self.scope.get(name) {
            if decl.kind != DeclKind::Type {
                return Type::Unknown;
            }
            if decl.spec.kind() == "type_alias" {
                return match self.object(name).map(|o| o.kind) {
                    Some(ObjectKind::TypeName { rhs, .. }) => rhs,
                    _ => Type::Unknown,
                };
            }
            return Type::Named(NamedRef {
                pkg: Some(self.id),
                name: name.to_string(),
            });
        }
        if let Some((pkg, object)) = self.dot_object(file, name) {
            return foreign_type(&pkg, &object).unwrap_or(Type::Unknown);
        }
        universe().type_named(name).unwrap_or(Type::Unknown)
    }

    fn qualified_type(&self, file: usize, package: Node<'a>, name: Node<'a>) -> Type {
        let qualifier = self.text(file, &package);
        let name = self.text(file, &name);
        let Some(Ok(pkg)) = self.file_import(file, qualifier).map(|e| e.package.as_ref()) else {
            return Type::Unknown;
        };
        pkg.objects
            .get(name)
            .and_then(|object| foreign_type(pkg, object))
            .unwrap_or(Type::Unknown)
    }

    fn signature(&self, node: Node<'a>, env: Env<'_, 'a>) -> Signature {
        let mut sig = Signature::default();
        if let Some(params) = node.child_by_field_name("parameters") {
            sig.variadic = self.param_types(params, env, &mut sig.params);
        }
        if let Some(result) = node.child_by_field_name("result") {
            if result.kind() == "parameter_list" {
                self.param_types(result, env, &mut sig.results);
            } else {
                sig.results.push(self.lower(result, env, None));
            }
        }
        sig
    }

    /// Appends one type per declared name, returns whether the list ends variadic.
    fn param_types(&self, list: Node<'a>, env: Env<'_, 'a>, out: &mut Vec<Type>) -> bool {
        let mut variadic = false;
        for decl in named_children(list) {
            let is_variadic = decl.kind() == "variadic_parameter_declaration";
            if decl.kind() != "parameter_declaration" && !is_variadic {
                continue;
            }
            let Some(ty) = decl.child_by_field_name("type") else {
                continue;
            };
            let mut lowered = self.lower(ty, env, None);
            if is_variadic {
                lowered = Type::Slice(Box::new(lowered));
                variadic = true;
            }
            let count = field_children(decl, "name").len().max(1);
            out.extend(std::iter::repeat(lowered).take(count));
        }
        variadic
    }

    fn struct_fields(&self, node: Node<'a>, env: Env<'_, 'a>, owner: Option<&str>) -> Vec<Member> {
        let mut fields = Vec::new();
        let Some(list) = named_children(node)
            .into_iter()
            .find(|n| n.kind() == "field_declaration_list")
        else {
            return fields;
        };

        for decl in named_children(list) {
            if decl.kind() != "field_declaration" {
                continue;
            }
            let Some(ty_node) = decl.child_by_field_name("type") else {
                continue;
            };
            let ty = self.lower(ty_node, env, owner);
            let names = field_children(decl, "name");
            if names.is_empty() {
                // `*T` embeds are parsed with the star outside the type field
                let pointer = decl.children(&mut decl.walk()).any(|c| !c.is_named() && c.kind() == "*");
                let Some(name) = embedded_name(ty_node) else {
                    continue;
                };
                fields.push(Member {
                    name: self.text(env.file, &name).to_string(),
                    ty: if pointer { Type::Pointer(Box::new(ty)) } else { ty },
                    loc: Some(self.loc(env.file, &name)),
                    owner: owner.map(str::to_string),
                    embedded: true,
                });
                continue;
            }
            for name in names {
                fields.push(Member {
                    name: self.text(env.file, &name).to_string(),
                    ty: ty.clone(),
                    loc: Some(self.loc(env.file, &name)),
                    owner: owner.map(str::to_string),
                    embedded: false,
                });
            }
        }
        fields
    }

    fn interface(&self, node: Node<'a>, env: Env<'_, 'a>, owner: Option<&str>) -> Interface {
        let mut iface = Interface::default();
        for elem in named_children(node) {
            match elem.kind() {
                "method_elem" | "method_spec" => {
                    let Some(name) = elem.child_by_field_name("name") else {
                        continue;
                    };
                    iface.methods.push(Member {
                        name: self.text(env.file, &name).to_string(),
                        ty: Type::Func(self.signature(elem, env)),
                        loc: Some(self.loc(env.file, &name)),
                        owner: owner.map(str::to_string),
                        embedded: false,
                    });
                }
                "type_elem" | "constraint_elem" => {
                    let terms = named_children(elem);
                    if let [single] = terms.as_slice() {
                        iface.embeds.push(self.lower(*single, env, None));
                    }
                }
                _ => {}
            }
        }
        iface
    }

    // =====================================================
    // Expressions
    // =====================================================

    pub fn type_of(&self, node: Node<'a>, env: Env<'_, 'a>) -> Operand {
        self.guarded(Operand::Unknown, || self.type_of_inner(node, env))
    }

    fn type_of_inner(&self, node: Node<'a>, env: Env<'_, 'a>) -> Operand {
        let node = strip_parens(node);
        let field = |name: &str| node.child_by_field_name(name);

        match node.kind() {
            "identifier" | "type_identifier" | "true" | "false" | "nil" | "iota" => self.name_operand(node, env),
            "int_literal" => Operand::Value(Type::basic("int")),
            "float_literal" => Operand::Value(Type::basic("float64")),
            "imaginary_literal" => Operand::Value(Type::basic("complex128")),
            "rune_literal" => Operand::Value(Type::basic("int32")),
            "interpreted_string_literal" | "raw_string_literal" => Operand::Value(Type::basic("string")),
            "selector_expression" => match (field("operand"), field("field")) {
                (Some(operand), Some(name)) => {
                    let name = self.text(env.file, &name);
                    self.member_operand(self.type_of(operand, env), name)
                }
                _ => Operand::Unknown,
            },
            "call_expression" => self.call_operand(node, env),
            "type_conversion_expression" | "type_assertion_expression" => match field("type") {
                Some(ty) => Operand::Value(self.lower(ty, env, None)),
                None => Operand::Unknown,
            },
            "composite_literal" => match field("type") {
                Some(ty) => Operand::Value(self.lower(ty, env, None)),
                None => Operand::Unknown,
            },
            "func_literal" => Operand::Value(Type::Func(self.signature(node, env))),
            "unary_expression" => self.unary_operand(node, env),
            "binary_expression" => {
                let operator = field("operator").map(|op| self.text(env.file, &op)).unwrap_or("");
                if matches!(operator, "==" | "!=" | "<" | "<=" | ">" | ">=" | "&&" | "||") {
                    return Operand::Value(Type::basic("bool"));
                }
                let left = field("left").map(|l| self.type_of(l, env).value_type());
                match left {
                    Some(ty) if !ty.is_unknown() => Operand::Value(ty),
                    _ => field("right")
                        .map(|r| self.type_of(r, env))
                        .unwrap_or(Operand::Unknown),
                }
            }
            "index_expression" => {
                let Some(operand) = field("operand") else {
                    return Operand::Unknown;
                };
                match self.type_of(operand, env) {
                    Operand::TypeExpr(ty) => Operand::TypeExpr(ty),
                    Operand::Value(ty) => Operand::Value(self.element_type(&ty).unwrap_or(ty)),
                    _ => Operand::Unknown,
                }
            }
            "slice_expression" => {
                let ty = field("operand")
                    .map(|o| self.type_of(o, env).value_type())
                    .unwrap_or(Type::Unknown);
                let resliced = match self.underlying(ty.deref()) {
                    Type::Array(elem) => Type::Slice(elem),
                    _ => ty,
                };
                Operand::Value(resliced)
            }
            "parenthesized_type" | "pointer_type" | "slice_type" | "array_type" | "implicit_length_array_type"
            | "map_type" | "channel_type" | "function_type" | "struct_type" | "interface_type" | "qualified_type"
            | "generic_type" => Operand::TypeExpr(self.lower(node, env, None)),
            _ => Operand::Unknown,
        }
    }

    /// Element of an indexed value; `None` when indexing yields the same type.
    fn element_type(&self, ty: &Type) -> Option<Type> {
        let base = match self.underlying(ty) {
            Type::Pointer(inner) => self.underlying(&inner),
            other => other,
        };
        match base {
            Type::Slice(elem) | Type::Array(elem) => Some(*elem),
            Type::Map(_, value) => Some(*value),
            Type::Basic(name) if name == "string" => Some(Type::basic("uint8")),
            Type::Func(_) => None,
            _ => Some(Type::Unknown),
        }
    }

    /// Operand for an identifier, checking local bindings first.
    pub fn name_operand(&self, node: Node<'a>, env: Env<'_, 'a>) -> Operand {
        if let Some(fb) = env.bindings {
            if let Some(index) = fb.binding_index(&node) {
                return self.binding_operand(index, fb, env);
            }
        }
        self.free_name_operand(env.file, self.text(env.file, &node))
    }

    /// Operand of a name visible at package or file scope.
    pub fn free_name_operand(&self, file: usize, name: &str) -> Operand {
        if self.scope.get(name).is_some() {
            return match self.object(name) {
                Some(object) => object_operand(self.id, &object),
                None => Operand::Unknown,
            };
        }
        if let Some(entry) = self.file_import(file, name) {
            return Operand::Package(entry.clone());
        }
        if let Some((pkg, object)) = self.dot_object(file, name) {
            return object_operand(pkg.id, &object);
        }
        let universe = universe();
        match universe.lookup(name) {
            Some(BuiltinKind::Type) => universe
                .type_named(name)
                .map(Operand::TypeExpr)
                .unwrap_or(Operand::Unknown),
            Some(BuiltinKind::Func) => Operand::Builtin(name.to_string()),
            Some(BuiltinKind::Const) => Operand::Value(universe.const_type(name)),
            Some(BuiltinKind::Nil) | None => Operand::Unknown,
        }
    }

    fn binding_operand(&self, index: usize, fb: &FileBindings<'a>, env: Env<'_, 'a>) -> Operand {
        let Some(binding) = fb.bindings.get(index) else {
            return Operand::Unknown;
        };
        match binding.kind {
            BindingKind::Label => Operand::Unknown,
            BindingKind::Type | BindingKind::TypeParam => Operand::TypeExpr(self.binding_type(index, fb, env)),
            _ => Operand::Value(self.binding_type(index, fb, env)),
        }
    }

    fn binding_type(&self, index: usize, fb: &FileBindings<'a>, env: Env<'_, 'a>) -> Type {
        if let Some(ty) = self.locals.borrow().get(&(env.file, index)) {
            return ty.clone();
        }
        let Some(binding) = fb.bindings.get(index) else {
            return Type::Unknown;
        };

        let ty = match binding.source {
            BindingSource::None => Type::Unknown,
            BindingSource::Declared { ty, variadic } => {
                let lowered = self.lower(ty, env, None);
                if variadic {
                    Type::Slice(Box::new(lowered))
                } else {
                    lowered
                }
            }
            BindingSource::Value { values, index, count } => self.assigned_type(values, index, count, env),
            BindingSource::Range { expr, index } => self.range_type(expr, index, env),
            BindingSource::TypeSwitch { value, case_type } => match case_type {
                Some(ty) if ty.kind() != "nil" => self.lower(ty, env, None),
                _ => self.type_of(value, env).value_type(),
            },
            BindingSource::Const { spec, index } => self.const_type(spec, index, env),
            BindingSource::TypeSpec(spec) => spec
                .child_by_field_name("type")
                .map(|ty| self.lower(ty, env, Some(&binding.name)))
                .unwrap_or(Type::Unknown),
        };

        self.locals.borrow_mut().insert((env.file, index), ty.clone());
        ty
    }

    fn range_type(&self, expr: Node<'a>, index: usize, env: Env<'_, 'a>) -> Type {
        let ty = self.type_of(expr, env).value_type();
        let base = match self.underlying(&ty) {
            Type::Pointer(inner) => self.underlying(&inner),
            other => other,
        };
        match base {
            Type::Slice(elem) | Type::Array(elem) => {
                if index == 0 {
                    Type::basic("int")
                } else {
                    *elem
                }
            }
            Type::Basic(name) if name == "string" => {
                if index == 0 {
                    Type::basic("int")
                } else {
                    Type::basic("int32")
                }
            }
            Type::Basic(name) => Type::Basic(name),
            Type::Map(key, value) => {
                if index == 0 {
                    *key
                } else {
                    *value
                }
            }
            Type::Chan(elem) => *elem,
            _ => Type::Unknown,
        }
    }

    fn member_operand(&self, operand: Operand, name: &str) -> Operand {
        match operand {
            Operand::Package(entry) => match &entry.package {
                Ok(pkg) => pkg
                    .objects
                    .get(name)
                    .map(|object| object_operand(pkg.id, object))
                    .unwrap_or(Operand::Unknown),
                Err(_) => Operand::Unknown,
            },
            Operand::Value(ty) | Operand::TypeExpr(ty) => match self.select(&ty, name) {
                Some(member) => Operand::Value(member.ty),
                None => Operand::Unknown,
            },
            _ => Operand::Unknown,
        }
    }

    fn call_operand(&self, node: Node<'a>, env: Env<'_, 'a>) -> Operand {
        let Some(function) = node.child_by_field_name("function") else {
            return Operand::Unknown;
        };
        let args: Vec<Node<'a>> = node
            .child_by_field_name("arguments")
            .map(named_children)
            .unwrap_or_default()
            .into_iter()
            .filter(|n| n.kind() != "comment")
            .collect();

        match self.type_of(function, env) {
            Operand::TypeExpr(ty) => Operand::Value(ty),
            Operand::Builtin(name) => self.builtin_call(&name, &args, env),
            Operand::Value(ty) => match self.underlying(&ty) {
                Type::Func(mut sig) => match sig.results.len() {
                    0 => Operand::Unknown,
                    1 => Operand::Value(sig.results.remove(0)),
                    _ => Operand::Value(Type::Tuple(sig.results)),
                },
                _ => Operand::Unknown,
            },
            _ => Operand::Unknown,
        }
    }

    fn builtin_call(&self, name: &str, args: &[Node<'a>], env: Env<'_, 'a>) -> Operand {
        let arg_type = |i: usize| match args.get(i).map(|a| self.type_of(*a, env)) {
            Some(Operand::TypeExpr(ty)) | Some(Operand::Value(ty)) => ty,
            _ => Type::Unknown,
        };
        let ty = match name {
            "new" => Type::Pointer(Box::new(arg_type(0))),
            "make" | "append" | "min" | "max" => arg_type(0),
            "len" | "cap" | "copy" => Type::basic("int"),
            "complex" => Type::basic("complex128"),
            "real" | "imag" => Type::basic("float64"),
            "recover" => Type::Interface(Interface::default()),
            _ => Type::Unknown,
        };
        Operand::Value(ty)
    }

    fn unary_operand(&self, node: Node<'a>, env: Env<'_, 'a>) -> Operand {
        let operator = node
            .child_by_field_name("operator")
            .map(|op| self.text(env.file, &op))
            .unwrap_or("");
        let Some(operand) = node.child_by_field_name("operand") else {
            return Operand::Unknown;
        };
        let inner = self.type_of(operand, env);
        match (operator, inner) {
            ("*", Operand::TypeExpr(ty)) => Operand::TypeExpr(Type::Pointer(Box::new(ty))),
            ("&", Operand::Value(ty)) => Operand::Value(Type::Pointer(Box::new(ty))),
            ("*", Operand::Value(ty)) => match ty {
                Type::Pointer(inner) => Operand::Value(*inner),
                other => match self.underlying(&other) {
                    Type::Pointer(inner) => Operand::Value(*inner),
                    _ => Operand::Unknown,
                },
            },
            ("<-", Operand::Value(ty)) => match self.underlying(&ty) {
                Type::Chan(elem) => Operand::Value(*elem),
                _ => Operand::Unknown,
            },
            ("!", _) => Operand::Value(Type::basic("bool")),
            (_, Operand::Value(ty)) => Operand::Value(ty),
            _ => Operand::Unknown,
        }
    }

    /// Type of the composite literal a `literal_value` belongs to,
    /// following elided element types of enclosing literals.
    pub fn literal_type(&self, literal: Node<'a>, env: Env<'_, 'a>) -> Type {
        self.guarded(Type::Unknown, || self.literal_type_inner(literal, env))
    }

    fn literal_type_inner(&self, literal: Node<'a>, env: Env<'_, 'a>) -> Type {
        let Some(parent) = literal.parent() else {
            return Type::Unknown;
        };
        match parent.kind() {
            "composite_literal" => parent
                .child_by_field_name("type")
                .map(|ty| self.lower(ty, env, None))
                .unwrap_or(Type::Unknown),
            "literal_element" | "keyed_element" => {
                let (holder, element) = if parent.kind() == "literal_element" {
                    match parent.parent() {
                        Some(holder) => (holder, parent),
                        None => return Type::Unknown,
                    }
                } else {
                    (parent, literal)
                };
                let (outer, is_key) = if holder.kind() == "keyed_element" {
                    let key = holder
                        .child_by_field_name("key")
                        .or_else(|| holder.named_child(0));
                    (holder.parent(), key.is_some_and(|k| k.id() == element.id()))
                } else {
                    (Some(holder), false)
                };
                let Some(outer) = outer.filter(|o| o.kind() == "literal_value") else {
                    return Type::Unknown;
                };
                let outer_type = self.literal_type(outer, env);
                let elem = match self.underlying(&outer_type) {
                    Type::Slice(elem) | Type::Array(elem) => *elem,
                    Type::Map(key, value) => {
                        if is_key {
                            *key
                        } else {
                            *value
                        }
                    }
                    _ => Type::Unknown,
                };
                match elem {
                    Type::Pointer(inner) => *inner,
                    other => other,
                }
            }
            _ => Type::Unknown,
        }
    }

    /// Resolves named types until a non-named type is reached.
    fn named_rhs(&self, named: &NamedRef) -> Type {
        match named.pkg {
            None => universe().underlying(&named.name),
            Some(id) if id == self.id => match self.object(&named.name).map(|o| o.kind) {
                Some(ObjectKind::TypeName { rhs, .. }) => rhs,
                _ => Type::Unknown,
            },
            Some(_) => self.importer.named_rhs(named),
        }
    }
}

impl TypeSource for Checker<'_> {
    fn underlying(&self, ty: &Type) -> Type {
        let mut current = ty.clone();
        for _ in 0..MAX_DEPTH {
            let Type::Named(named) = &current else {
                return current;
            };
            current = self.named_rhs(named);
        }
        Type::Unknown
    }

    fn methods(&self, named: &NamedRef) -> Vec<Member> {
        match named.pkg {
            None => Vec::new(),
            Some(id) if id == self.id => match self.object(&named.name).map(|o| o.kind) {
                Some(ObjectKind::TypeName { methods, .. }) => methods,
                _ => Vec::new(),
            },
            Some(_) => self.importer.methods(named),
        }
    }
}

fn object_operand(pkg: PkgId, object: &Object) -> Operand {
    match &object.kind {
        ObjectKind::TypeName { rhs, alias: true, .. } => Operand::TypeExpr(rhs.clone()),
        ObjectKind::TypeName { .. } => Operand::TypeExpr(Type::Named(NamedRef {
            pkg: Some(pkg),
            name: object.name.clone(),
        })),
        ObjectKind::Func(sig) => Operand::Value(Type::Func(sig.clone())),
        ObjectKind::Var(ty) | ObjectKind::Const(ty) => Operand::Value(ty.clone()),
    }
}

/// Type denoted by a type object of another package.
fn foreign_type(pkg: &Package, object: &Object) -> Option<Type> {
    match &object.kind {
        ObjectKind::TypeName { rhs, alias: true, .. } => Some(rhs.clone()),
        ObjectKind::TypeName { .. } => Some(Type::Named(NamedRef {
            pkg: Some(pkg.id),
            name: object.name.clone(),
        })),
        _ => None,
    }
}
