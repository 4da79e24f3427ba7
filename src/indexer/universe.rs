//! Predeclared Go identifiers.
//!
//! The table is built on first use and never mutated afterwards.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::types::{Interface, Member, NamedRef, Signature, Type};

pub const BUILTIN_TYPES: &[&str] = &[
    "any", "bool", "byte", "comparable", "complex64", "complex128", "error", "float32", "float64",
    "int", "int8", "int16", "int32", "int64", "rune", "string", "uint", "uint8", "uint16", "uint32",
    "uint64", "uintptr",
];

pub const BUILTIN_FUNCS: &[&str] = &[
    "append", "cap", "clear", "close", "complex", "copy", "delete", "imag", "len", "make", "max",
    "min", "new", "panic", "print", "println", "real", "recover",
];

pub const BUILTIN_CONSTS: &[&str] = &["true", "false", "iota", "nil"];

pub const UNSAFE_FUNCS: &[&str] = &[
    "Alignof", "Offsetof", "Sizeof", "Add", "Slice", "SliceData", "String", "StringData",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    Type,
    Func,
    Const,
    Nil,
}

#[derive(Debug)]
pub struct Universe {
    entries: HashMap<&'static str, BuiltinKind>,
    error_iface: Type,
}

impl Universe {
    fn build() -> Self {
        let mut entries = HashMap::new();
        for name in BUILTIN_TYPES {
            entries.insert(*name, BuiltinKind::Type);
        }
        for name in BUILTIN_FUNCS {
            entries.insert(*name, BuiltinKind::Func);
        }
        for name in BUILTIN_CONSTS {
            entries.insert(*name, BuiltinKind::Const);
        }
        entries.insert("nil", BuiltinKind::Nil);

        let error_iface = Type::Interface(Interface {
            methods: vec![Member {
                name: "Error".to_string(),
                ty: Type::Func(Signature {
                    params: Vec::new(),
                    results: vec![Type::basic("string")],
                    variadic: false,
                }),
                loc: None,
                owner: Some("error".to_string()),
                embedded: false,
            }],
            embeds: Vec::new(),
        });

        Self {
            entries,
            error_iface,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<BuiltinKind> {
        self.entries.get(name).copied()
    }

    /// Type denoted by a builtin type name.
    pub fn type_named(&self, name: &str) -> Option<Type> {
        match self.lookup(name)? {
            BuiltinKind::Type => Some(match name {
                "error" => Type::Named(NamedRef {
                    pkg: None,
                    name: "error".to_string(),
                }),
                "any" | "comparable" => Type::Interface(Interface::default()),
                "byte" => Type::basic("uint8"),
                "rune" => Type::basic("int32"),
                other => Type::basic(other),
            }),
            _ => None,
        }
    }

    /// Underlying type of a universe named type.
    pub fn underlying(&self, name: &str) -> Type {
        match name {
            "error" => self.error_iface.clone(),
            _ => Type::Unknown,
        }
    }

    /// Type of a predeclared constant when used as a value.
    pub fn const_type(&self, name: &str) -> Type {
        match name {
            "true" | "false" => Type::basic("bool"),
            "iota" => Type::basic("int"),
            _ => Type::Unknown,
        }
    }
}

static UNIVERSE: RwLock<Option<Arc<Universe>>> = RwLock::new(None);

/// Shared universe table, built on first call.
pub fn universe() -> Arc<Universe> {
    if let Ok(guard) = UNIVERSE.read() {
        if let Some(universe) = guard.as_ref() {
            return Arc::clone(universe);
        }
    }
    let mut guard = UNIVERSE.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    Arc::clone(guard.get_or_insert_with(|| Arc::new(Universe::build())))
}

#[cfg(test)]
pub(crate) fn reset_universe() {
    let mut guard = UNIVERSE.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = None;
}

pub fn is_builtin_type(name: &str) -> bool {
    BUILTIN_TYPES.contains(&name)
}

pub fn is_builtin_func(name: &str) -> bool {
    BUILTIN_FUNCS.contains(&name)
}

pub fn is_builtin_const(name: &str) -> bool {
    BUILTIN_CONSTS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_kinds() {
        let u = universe();
        assert_eq!(u.lookup("int"), Some(BuiltinKind::Type));
        assert_eq!(u.lookup("len"), Some(BuiltinKind::Func));
        assert_eq!(u.lookup("iota"), Some(BuiltinKind::Const));
        assert_eq!(u.lookup("nil"), Some(BuiltinKind::Nil));
        assert_eq!(u.lookup("fmt"), None);
    }

    #[test]
    fn test_error_has_error_method() {
        let u = universe();
        let Type::Interface(iface) = u.underlying("error") else {
            panic!("error is not an interface");
        };
        assert_eq!(iface.methods[0].id(), "error.Error");
    }

    #[test]
    fn test_reset_rebuilds_table() {
        let first = universe();
        reset_universe();
        let second = universe();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.lookup("string"), Some(BuiltinKind::Type));
    }

    #[test]
    fn test_byte_is_uint8() {
        assert_eq!(universe().type_named("byte"), Some(Type::basic("uint8")));
    }
}
