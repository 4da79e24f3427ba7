//! Small helpers over the Go syntax tree.

use tree_sitter::Node;

/// Leaf kinds that name something and get a reference.
pub fn is_name_leaf(node: &Node) -> bool {
    node.is_named()
        && matches!(
            node.kind(),
            "identifier"
                | "type_identifier"
                | "field_identifier"
                | "package_identifier"
                | "label_name"
                | "true"
                | "false"
                | "nil"
                | "iota"
        )
}

pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

pub fn children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

pub fn field_children<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

pub fn has_token(node: Node<'_>, token: &str) -> bool {
    children(node)
        .iter()
        .any(|child| !child.is_named() && child.kind() == token)
}

pub fn text<'a>(node: Node<'_>, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

/// Statements of a block, a case clause or a statement list.
pub fn statements(node: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    for child in named_children(node) {
        if child.kind() == "statement_list" {
            out.extend(named_children(child));
        } else {
            out.push(child);
        }
    }
    out
}

/// Specs of a declaration, flattening `( ... )` spec lists.
pub fn specs<'t>(decl: Node<'t>, kinds: &[&str]) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    for child in named_children(decl) {
        if kinds.contains(&child.kind()) {
            out.push(child);
        } else if child.kind().ends_with("_spec_list") {
            out.extend(
                named_children(child)
                    .into_iter()
                    .filter(|n| kinds.contains(&n.kind())),
            );
        }
    }
    out
}

/// Expressions of an expression list (or the node itself).
pub fn expressions(node: Node<'_>) -> Vec<Node<'_>> {
    if node.kind() == "expression_list" {
        named_children(node)
            .into_iter()
            .filter(|n| n.kind() != "comment")
            .collect()
    } else {
        vec![node]
    }
}

pub fn strip_parens(mut node: Node<'_>) -> Node<'_> {
    while matches!(node.kind(), "parenthesized_expression" | "parenthesized_type") {
        match node.named_child(0) {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

/// Receiver base type name of a method declaration.
pub fn receiver_type_name<'a>(method: Node<'_>, source: &'a [u8]) -> Option<(&'a str, bool)> {
    let receiver = method.child_by_field_name("receiver")?;
    let param = named_children(receiver)
        .into_iter()
        .find(|n| n.kind() == "parameter_declaration")?;
    let mut ty = param.child_by_field_name("type")?;
    let mut pointer = false;
    loop {
        match ty.kind() {
            "pointer_type" => {
                pointer = true;
                ty = ty.named_child(0)?;
            }
            "parenthesized_type" => ty = ty.named_child(0)?,
            "generic_type" => ty = ty.child_by_field_name("type")?,
            "type_identifier" => return Some((text(ty, source), pointer)),
            _ => return None,
        }
    }
}

/// Import path literal without quotes.
pub fn import_path(spec: Node<'_>, source: &[u8]) -> Option<String> {
    let path = spec.child_by_field_name("path")?;
    let raw = text(path, source);
    let trimmed = raw.trim_matches(|c| c == '"' || c == '`');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Package name implied by the last element of an import path, when it
/// is a valid identifier. Versioned paths (`/v2`) use the previous element.
pub fn import_name_guess(path: &str) -> Option<&str> {
    let mut parts = path.rsplit('/');
    let mut last = parts.next()?;
    if is_major_version(last) {
        last = parts.next()?;
    }
    if is_identifier(last) {
        Some(last)
    } else {
        None
    }
}

fn is_major_version(part: &str) -> bool {
    part.len() > 1
        && part.starts_with('v')
        && part[1..].chars().all(|c| c.is_ascii_digit())
}

pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}
