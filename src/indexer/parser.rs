use std::path::Path;

use crate::error::{Result, XrefError};
use crate::span::{LineIndex, Span};

pub struct Parser {
    inner: tree_sitter::Parser,
}

impl Parser {
    pub fn new() -> Result<Self> {
        let mut inner = tree_sitter::Parser::new();
        inner
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .map_err(|e| XrefError::Parse(e.to_string()))?;
        Ok(Self { inner })
    }

    pub fn parse_file(&mut self, path: &Path) -> Result<ParsedFile> {
        let source = std::fs::read(path)?;
        self.parse_source(&path.display().to_string(), source)
    }

    pub fn parse_source(&mut self, path: &str, source: Vec<u8>) -> Result<ParsedFile> {
        let tree = self
            .inner
            .parse(&source, None)
            .ok_or_else(|| XrefError::Parse(format!("{}: failed to parse source", path)))?;

        let lines = LineIndex::new(&source);
        let package = package_name(&tree, &source);

        Ok(ParsedFile {
            path: path.to_string(),
            tree,
            source,
            lines,
            package,
        })
    }
}

/// One parsed Go file.
pub struct ParsedFile {
    pub path: String,
    pub tree: tree_sitter::Tree,
    pub source: Vec<u8>,
    pub lines: LineIndex,
    /// Name from the package clause, empty when missing.
    pub package: String,
}

impl std::fmt::Debug for ParsedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedFile")
            .field("path", &self.path)
            .field("package", &self.package)
            .finish()
    }
}

impl ParsedFile {
    pub fn root_node(&self) -> tree_sitter::Node<'_> {
        self.tree.root_node()
    }

    pub fn source_bytes(&self) -> &[u8] {
        &self.source
    }

    pub fn node_text(&self, node: &tree_sitter::Node) -> &str {
        node.utf8_text(&self.source).unwrap_or("")
    }

    pub fn span(&self, node: &tree_sitter::Node) -> Span {
        self.lines.node_span(node)
    }

    pub fn has_syntax_error(&self) -> bool {
        self.root_node().has_error()
    }

    pub fn is_test_file(&self) -> bool {
        self.path.ends_with("_test.go")
    }

    /// Position of the first syntax error, formatted for a message.
    pub fn syntax_error_message(&self) -> Option<String> {
        let node = first_error(self.root_node())?;
        let (line, col) = self.lines.position(node.start_byte());
        let detail = if node.is_missing() {
            format!("missing {}", node.kind())
        } else {
            let text = self.node_text(&node);
            let preview: String = text.chars().take(24).collect();
            format!("unexpected {:?}", preview)
        };
        Some(format!("{}:{}:{}: syntax error: {}", self.path, line, col, detail))
    }

    pub fn message_at(&self, offset: usize, text: &str) -> String {
        let (line, col) = self.lines.position(offset);
        format!("{}:{}:{}: {}", self.path, line, col, text)
    }
}

fn first_error(node: tree_sitter::Node<'_>) -> Option<tree_sitter::Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

fn package_name(tree: &tree_sitter::Tree, source: &[u8]) -> String {
    let root = tree.root_node();
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        if child.kind() == "package_clause" {
            let mut inner = child.walk();
            for name in child.named_children(&mut inner) {
                if name.kind() == "package_identifier" {
                    return name.utf8_text(source).unwrap_or("").to_string();
                }
            }
        }
    }
    String::new()
}
