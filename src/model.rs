use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::span::Span;

// =====================================================
// Definitions
// =====================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefKind {
    Func,
    Method,
    Type,
    Var,
    Const,
    Field,
    /// Reserved for analyzers that report package clauses.
    Package,
}

impl DefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefKind::Func => "func",
            DefKind::Method => "method",
            DefKind::Type => "type",
            DefKind::Var => "var",
            DefKind::Const => "const",
            DefKind::Field => "field",
            DefKind::Package => "package",
        }
    }
}

/// A located, classified top-level declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Def {
    /// Scope-local name: `F`, `T`, `T.M`, `T.F`.
    pub id: String,
    /// Compact signature without doc comments or body.
    pub title: String,
    pub kind: DefKind,
    pub path: String,
    pub span: Span,
    pub name_span: Span,
    pub exported: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

// =====================================================
// References
// =====================================================

/// Resolution outcome of one identifier occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    /// Declaration location, optionally with the scope-local symbol id.
    Exact {
        file: String,
        span: Span,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// A package reference by import path.
    Package { path: String },
    /// A predeclared symbol of the language.
    Builtin { id: String },
    /// Search hint for a downstream full-text lookup.
    Fuzzy {
        id: String,
        constraints: BTreeMap<String, String>,
    },
}

impl Target {
    pub fn exact(file: impl Into<String>, span: Span, id: Option<String>) -> Self {
        Target::Exact {
            file: file.into(),
            span,
            id,
        }
    }

    pub fn fuzzy(id: impl Into<String>, constraints: BTreeMap<String, String>) -> Self {
        Target::Fuzzy {
            id: id.into(),
            constraints,
        }
    }

    pub fn is_fuzzy(&self) -> bool {
        matches!(self, Target::Fuzzy { .. })
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Target::Exact { .. })
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Target::Exact { id, .. } => id.as_deref(),
            Target::Package { path } => Some(path),
            Target::Builtin { id } | Target::Fuzzy { id, .. } => Some(id),
        }
    }

    /// Search constraints; builtins report `package = builtin`.
    pub fn constraints(&self) -> BTreeMap<String, String> {
        match self {
            Target::Fuzzy { constraints, .. } => constraints.clone(),
            Target::Builtin { .. } => {
                BTreeMap::from([("package".to_string(), "builtin".to_string())])
            }
            _ => BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    pub span: Span,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
}

// =====================================================
// Tokens
// =====================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokType {
    Name,
    NameBuiltin,
    NameConstant,
    NameExportedMarker,
    CommentSingle,
    CommentMulti,
    NumberInteger,
    NumberFloat,
    NumberHex,
    NumberOctal,
    NumberImaginary,
    String,
    StringChar,
    Operator,
    Keyword,
    LiteralOther,
}

impl TokType {
    /// Tokens that should carry a reference.
    pub fn is_name_like(&self) -> bool {
        matches!(
            self,
            TokType::Name | TokType::NameBuiltin | TokType::NameConstant | TokType::NameExportedMarker
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tok {
    pub start_byte: usize,
    pub byte_len: usize,
    #[serde(rename = "type")]
    pub kind: TokType,
}

// =====================================================
// Operation envelopes
// =====================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefsOp {
    #[serde(with = "source_map")]
    pub sources: BTreeMap<String, Vec<u8>>,
    pub origins: Vec<String>,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub file: String,
    /// Byte selection inside the file; only `start_byte` and `byte_len` are read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl Origin {
    pub fn file(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            span: None,
        }
    }

    pub fn selection(file: impl Into<String>, start_byte: usize, byte_len: usize) -> Self {
        Self {
            file: file.into(),
            span: Some(Span::bytes(start_byte, byte_len)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefsOp {
    #[serde(with = "source_map")]
    pub sources: BTreeMap<String, Vec<u8>>,
    pub origins: Vec<Origin>,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToksOp {
    #[serde(with = "source_bytes")]
    pub source: Vec<u8>,
}

// =====================================================
// Result envelopes
// =====================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefsResult {
    pub defs: Vec<Def>,
    pub messages: Vec<String>,
    pub complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRefs {
    pub refs: Vec<Ref>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefsResult {
    pub files: BTreeMap<String, FileRefs>,
    pub messages: Vec<String>,
    pub complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToksResult {
    pub toks: Vec<Tok>,
    pub messages: Vec<String>,
    pub complete: bool,
}

/// Diagnostics collected while building a result, deduplicated in insertion order.
#[derive(Debug, Default)]
pub struct Messages {
    items: Vec<String>,
}

impl Messages {
    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !self.items.contains(&message) {
            self.items.push(message);
        }
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = String>) {
        for message in other {
            self.push(message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.items
    }
}

// Sources travel as base64 strings in JSON.
mod source_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

mod source_map {
    use std::collections::BTreeMap;

    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        sources: &BTreeMap<String, Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(sources.len()))?;
        for (path, bytes) in sources {
            map.serialize_entry(path, &STANDARD.encode(bytes))?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Vec<u8>>, D::Error> {
        let encoded = BTreeMap::<String, String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(path, text)| {
                STANDARD
                    .decode(text)
                    .map(|bytes| (path, bytes))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}
