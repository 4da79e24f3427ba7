use crate::span::Span;

/// Index of a package in one importer's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PkgId(pub usize);

/// A declaration position in some file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loc {
    pub file: String,
    pub span: Span,
}

/// Reference to a declared type. `pkg == None` is the universe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedRef {
    pub pkg: Option<PkgId>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Unknown,
    Basic(String),
    Named(NamedRef),
    Pointer(Box<Type>),
    Slice(Box<Type>),
    Array(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Chan(Box<Type>),
    Func(Signature),
    Struct(Vec<Member>),
    Interface(Interface),
    Tuple(Vec<Type>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Signature {
    pub params: Vec<Type>,
    pub results: Vec<Type>,
    pub variadic: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Interface {
    pub methods: Vec<Member>,
    pub embeds: Vec<Type>,
}

/// A struct field, interface method or declared method.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub ty: Type,
    pub loc: Option<Loc>,
    /// Name of the declared type the member belongs to.
    pub owner: Option<String>,
    pub embedded: bool,
}

impl Member {
    pub fn id(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}.{}", owner, self.name),
            None => self.name.clone(),
        }
    }
}

impl Type {
    pub fn basic(name: &str) -> Self {
        Type::Basic(name.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    /// Strips one level of pointer indirection.
    pub fn deref(&self) -> &Type {
        match self {
            Type::Pointer(inner) => inner,
            other => other,
        }
    }

    /// Display name for constraint hints.
    pub fn name(&self) -> Option<&str> {
        match self.deref() {
            Type::Named(named) => Some(&named.name),
            Type::Basic(name) => Some(name),
            _ => None,
        }
    }
}

// =====================================================
// Package-level objects
// =====================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    TypeName {
        rhs: Type,
        alias: bool,
        methods: Vec<Member>,
    },
    Func(Signature),
    Var(Type),
    Const(Type),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub name: String,
    /// `None` for objects of builtin pseudo packages.
    pub loc: Option<Loc>,
    pub kind: ObjectKind,
}

impl Object {
    pub fn value_type(&self) -> Option<&Type> {
        match &self.kind {
            ObjectKind::Var(ty) | ObjectKind::Const(ty) => Some(ty),
            _ => None,
        }
    }
}

// =====================================================
// Selections
// =====================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    Field,
    Method,
}

/// Result of a field or method lookup: each path entry indexes the
/// member list of the type reached at that embedding depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub kind: SelectionKind,
    pub path: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(Selection),
    Ambiguous,
    NotFound,
}

/// Resolves named types for lookups. Implemented by the checker.
pub trait TypeSource {
    fn underlying(&self, ty: &Type) -> Type;
    fn methods(&self, named: &NamedRef) -> Vec<Member>;
}

const MAX_EMBEDDING_DEPTH: usize = 8;

/// Breadth-first field/method search through embedded fields.
pub fn lookup_field_or_method(source: &dyn TypeSource, ty: &Type, name: &str) -> Lookup {
    struct Entry {
        ty: Type,
        path: Vec<usize>,
    }

    let mut current = vec![Entry {
        ty: ty.deref().clone(),
        path: Vec::new(),
    }];
    let mut seen: Vec<NamedRef> = Vec::new();

    for _ in 0..MAX_EMBEDDING_DEPTH {
        let mut next = Vec::new();
        let mut found: Option<Selection> = None;
        let mut matches = 0;

        for entry in current {
            let mut ty = entry.ty;
            if let Type::Named(named) = &ty {
                if seen.contains(named) {
                    continue;
                }
                seen.push(named.clone());
                for (i, method) in source.methods(named).iter().enumerate() {
                    if method.name == name {
                        matches += 1;
                        found = Some(Selection {
                            kind: SelectionKind::Method,
                            path: extend(&entry.path, i),
                        });
                    }
                }
                ty = source.underlying(&ty);
            }

            match ty {
                Type::Struct(fields) => {
                    for (i, field) in fields.iter().enumerate() {
                        if field.name == name {
                            matches += 1;
                            found = Some(Selection {
                                kind: SelectionKind::Field,
                                path: extend(&entry.path, i),
                            });
                        }
                        if field.embedded {
                            next.push(Entry {
                                ty: field.ty.deref().clone(),
                                path: extend(&entry.path, i),
                            });
                        }
                    }
                }
                Type::Interface(iface) => {
                    for (i, method) in iface.methods.iter().enumerate() {
                        if method.name == name {
                            matches += 1;
                            found = Some(Selection {
                                kind: SelectionKind::Method,
                                path: extend(&entry.path, i),
                            });
                        }
                    }
                    for (j, embed) in iface.embeds.iter().enumerate() {
                        next.push(Entry {
                            ty: embed.clone(),
                            path: extend(&entry.path, j),
                        });
                    }
                }
                _ => {}
            }
        }

        match (matches, found) {
            (1, Some(selection)) => return Lookup::Found(selection),
            (0, _) => {}
            _ => return Lookup::Ambiguous,
        }
        if next.is_empty() {
            break;
        }
        current = next;
    }
    Lookup::NotFound
}

/// Walks a selection path from `ty` to the member that declares it.
pub fn defining_member(source: &dyn TypeSource, ty: &Type, selection: &Selection) -> Option<Member> {
    let mut ty = ty.deref().clone();
    let last = selection.path.len().checked_sub(1)?;

    for (step, &index) in selection.path.iter().enumerate() {
        let is_last = step == last;
        if let Type::Named(named) = &ty {
            let underlying = source.underlying(&ty);
            if is_last
                && selection.kind == SelectionKind::Method
                && !matches!(underlying, Type::Interface(_))
            {
                return source.methods(named).get(index).cloned();
            }
            ty = underlying;
        }

        match ty {
            Type::Struct(fields) => {
                let field = fields.get(index)?;
                if is_last {
                    return Some(field.clone());
                }
                ty = field.ty.deref().clone();
            }
            Type::Interface(iface) => {
                if is_last {
                    return iface.methods.get(index).cloned();
                }
                ty = iface.embeds.get(index)?.clone();
            }
            _ => return None,
        }
    }
    None
}

fn extend(path: &[usize], index: usize) -> Vec<usize> {
    let mut path = path.to_vec();
    path.push(index);
    path
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[derive(Default)]
    struct Table {
        types: HashMap<String, (Type, Vec<Member>)>,
    }

    impl Table {
        fn define(&mut self, name: &str, rhs: Type, methods: Vec<Member>) {
            self.types.insert(name.to_string(), (rhs, methods));
        }
    }

    impl TypeSource for Table {
        fn underlying(&self, ty: &Type) -> Type {
            match ty {
                Type::Named(named) => self
                    .types
                    .get(&named.name)
                    .map(|(rhs, _)| rhs.clone())
                    .unwrap_or(Type::Unknown),
                other => other.clone(),
            }
        }

        fn methods(&self, named: &NamedRef) -> Vec<Member> {
            self.types
                .get(&named.name)
                .map(|(_, methods)| methods.clone())
                .unwrap_or_default()
        }
    }

    fn named(name: &str) -> Type {
        Type::Named(NamedRef {
            pkg: Some(PkgId(0)),
            name: name.to_string(),
        })
    }

    fn member(owner: &str, name: &str, ty: Type, embedded: bool) -> Member {
        Member {
            name: name.to_string(),
            ty,
            loc: None,
            owner: Some(owner.to_string()),
            embedded,
        }
    }

    fn func() -> Type {
        Type::Func(Signature::default())
    }

    #[test]
    fn test_method_through_embedded_interface() {
        let mut table = Table::default();
        table.define(
            "I",
            Type::Interface(Interface {
                methods: vec![member("I", "M", func(), false)],
                embeds: vec![],
            }),
            vec![],
        );
        table.define("T", Type::Struct(vec![member("T", "I", named("I"), true)]), vec![]);

        let Lookup::Found(selection) = lookup_field_or_method(&table, &named("T"), "M") else {
            panic!("M not found");
        };
        assert_eq!(selection.kind, SelectionKind::Method);
        assert_eq!(selection.path, vec![0, 0]);

        let defining = defining_member(&table, &named("T"), &selection).unwrap();
        assert_eq!(defining.id(), "I.M");
    }

    #[test]
    fn test_declared_method_before_promoted_field() {
        let mut table = Table::default();
        table.define("Inner", Type::Struct(vec![member("Inner", "X", Type::basic("int"), false)]), vec![]);
        table.define(
            "Outer",
            Type::Struct(vec![member("Outer", "Inner", named("Inner"), true)]),
            vec![member("Outer", "Run", func(), false)],
        );

        let Lookup::Found(run) = lookup_field_or_method(&table, &Type::Pointer(Box::new(named("Outer"))), "Run") else {
            panic!("Run not found");
        };
        assert_eq!(defining_member(&table, &named("Outer"), &run).unwrap().id(), "Outer.Run");

        let Lookup::Found(x) = lookup_field_or_method(&table, &named("Outer"), "X") else {
            panic!("X not found");
        };
        assert_eq!(x.kind, SelectionKind::Field);
        assert_eq!(defining_member(&table, &named("Outer"), &x).unwrap().id(), "Inner.X");
    }

    #[test]
    fn test_ambiguous_at_same_depth() {
        let mut table = Table::default();
        table.define("A", Type::Struct(vec![member("A", "N", Type::basic("int"), false)]), vec![]);
        table.define("B", Type::Struct(vec![member("B", "N", Type::basic("int"), false)]), vec![]);
        table.define(
            "C",
            Type::Struct(vec![member("C", "A", named("A"), true), member("C", "B", named("B"), true)]),
            vec![],
        );
        assert_eq!(lookup_field_or_method(&table, &named("C"), "N"), Lookup::Ambiguous);
    }

    #[test]
    fn test_shallower_field_shadows_deeper() {
        let mut table = Table::default();
        table.define("A", Type::Struct(vec![member("A", "N", Type::basic("int"), false)]), vec![]);
        table.define(
            "C",
            Type::Struct(vec![member("C", "A", named("A"), true), member("C", "N", Type::basic("string"), false)]),
            vec![],
        );
        let Lookup::Found(selection) = lookup_field_or_method(&table, &named("C"), "N") else {
            panic!("N not found");
        };
        assert_eq!(selection.path, vec![1]);
    }

    #[test]
    fn test_recursive_embedding_terminates() {
        let mut table = Table::default();
        table.define(
            "L",
            Type::Struct(vec![member("L", "L", Type::Pointer(Box::new(named("L"))), true)]),
            vec![],
        );
        assert_eq!(lookup_field_or_method(&table, &named("L"), "Missing"), Lookup::NotFound);
    }

    #[test]
    fn test_interface_embedding_interface() {
        let mut table = Table::default();
        table.define(
            "Reader",
            Type::Interface(Interface {
                methods: vec![member("Reader", "Read", func(), false)],
                embeds: vec![],
            }),
            vec![],
        );
        table.define(
            "ReadCloser",
            Type::Interface(Interface {
                methods: vec![member("ReadCloser", "Close", func(), false)],
                embeds: vec![named("Reader")],
            }),
            vec![],
        );
        let Lookup::Found(selection) = lookup_field_or_method(&table, &named("ReadCloser"), "Read") else {
            panic!("Read not found");
        };
        let defining = defining_member(&table, &named("ReadCloser"), &selection).unwrap();
        assert_eq!(defining.id(), "Reader.Read");
    }
}
