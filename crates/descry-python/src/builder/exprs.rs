//! Expression-level helpers for the AST builder.
//!
//! These functions read small facts out of tree-sitter nodes: dotted
//! names, cooked string literals, literal-ness of an initializer and the
//! type such a literal implies. Anything the engine cannot understand
//! yields `None`; the builder degrades to recording source text.

use tree_sitter::Node;

/// Source text of a node.
pub fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    source.get(node.byte_range()).unwrap_or("")
}

/// 1-based line of a node's start.
pub fn line_of(node: Node<'_>) -> u32 {
    node.start_position().row as u32 + 1
}

/// Flatten `a.b.c` shapes (identifier, attribute, dotted_name) into a
/// dotted string. Returns `None` for anything else, calls included.
pub fn dotted_name(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "identifier" | "dotted_name" => Some(node_text(node, source).to_string()),
        "attribute" => {
            let object = dotted_name(node.child_by_field_name("object")?, source)?;
            let attr = node.child_by_field_name("attribute")?;
            Some(format!("{object}.{}", node_text(attr, source)))
        }
        "parenthesized_expression" => dotted_name(node.named_child(0)?, source),
        _ => None,
    }
}

/// Strip one subscript layer: `Generic[T]` -> `Generic`.
pub fn strip_subscript(node: Node<'_>) -> Node<'_> {
    if node.kind() == "subscript" {
        if let Some(value) = node.child_by_field_name("value") {
            return value;
        }
    }
    node
}

/// The text inside a subscript: `Final[str]` -> `str`.
pub fn subscript_argument<'a>(node: Node<'_>, source: &'a str) -> Option<&'a str> {
    if node.kind() != "subscript" {
        return None;
    }
    node.child_by_field_name("subscript")
        .map(|sub| node_text(sub, source))
}

// ============================================================================
// String literals
// ============================================================================

/// Cooked value of a string literal or a concatenation of them.
///
/// Handles prefixes (`r`, `b`, `u`, `f`, any case) and single, double and
/// triple quotes. Escape sequences are processed unless the string is raw.
/// f-strings are returned with their interpolation braces as written.
pub fn string_literal_value(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "string" => Some(cook_string(node_text(node, source))),
        "concatenated_string" => {
            let mut out = String::new();
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                if child.kind() == "string" {
                    out.push_str(&cook_string(node_text(child, source)));
                }
            }
            Some(out)
        }
        _ => None,
    }
}

fn cook_string(raw: &str) -> String {
    let mut rest = raw;
    let mut is_raw = false;
    while let Some(first) = rest.chars().next() {
        match first {
            'r' | 'R' => {
                is_raw = true;
                rest = &rest[1..];
            }
            'b' | 'B' | 'u' | 'U' | 'f' | 'F' => rest = &rest[1..],
            _ => break,
        }
    }
    let body = ["\"\"\"", "'''", "\"", "'"]
        .iter()
        .find_map(|quote| {
            rest.strip_prefix(quote)
                .and_then(|s| s.strip_suffix(quote))
        })
        .unwrap_or(rest);
    if is_raw {
        body.to_string()
    } else {
        unescape(body)
    }
}

/// Process the common backslash escapes; unknown escapes are kept as
/// written, matching how the renderer receives raw docstrings.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('0') => out.push('\0'),
            Some('\n') => {}
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

// ============================================================================
// Literal inference
// ============================================================================

/// Whether an initializer is a literal: a scalar literal, or a display of
/// literals. Anything computed (calls, comprehensions, operators other
/// than a sign) is not.
pub fn is_literal_expr(node: Node<'_>, source: &str) -> bool {
    match node.kind() {
        "integer" | "float" | "string" | "concatenated_string" | "true" | "false" | "none"
        | "ellipsis" => true,
        "unary_operator" => node
            .child_by_field_name("argument")
            .map(|arg| matches!(arg.kind(), "integer" | "float"))
            .unwrap_or(false),
        "tuple" | "list" | "set" => {
            let mut cursor = node.walk();
            let result = node
                .named_children(&mut cursor)
                .all(|c| is_literal_expr(c, source));
            result
        }
        "dictionary" => {
            let mut cursor = node.walk();
            let result = node.named_children(&mut cursor).all(|pair| {
                if pair.kind() != "pair" {
                    return false;
                }
                let key_ok = pair
                    .child_by_field_name("key")
                    .map(|k| is_literal_expr(k, source))
                    .unwrap_or(false);
                let value_ok = pair
                    .child_by_field_name("value")
                    .map(|v| is_literal_expr(v, source))
                    .unwrap_or(false);
                key_ok && value_ok
            });
            result
        }
        _ => false,
    }
}

/// The type a literal initializer implies, for unannotated assignments.
pub fn infer_literal_type(node: Node<'_>, source: &str) -> Option<String> {
    let type_name = match node.kind() {
        "integer" => "int",
        "float" => "float",
        "string" => {
            let text = node_text(node, source);
            if text.starts_with('b') || text.starts_with('B') {
                "bytes"
            } else {
                "str"
            }
        }
        "concatenated_string" => "str",
        "true" | "false" => "bool",
        "tuple" => "tuple",
        "list" => "list",
        "set" => "set",
        "dictionary" => "dict",
        "unary_operator" => {
            let arg = node.child_by_field_name("argument")?;
            return infer_literal_type(arg, source);
        }
        _ => return None,
    };
    Some(type_name.to_string())
}

// ============================================================================
// Guards
// ============================================================================

/// Recognize the guard forms of the conditional-branch policy: `<name>`,
/// `not <name>` and `<module>.<name>`. Returns the simple name and whether
/// the condition is negated. Anything more complex is `None` and both
/// branches are taken.
pub fn recognize_guard(node: Node<'_>, source: &str) -> Option<(String, bool)> {
    match node.kind() {
        "identifier" => Some((node_text(node, source).to_string(), false)),
        "attribute" => {
            let attr = node.child_by_field_name("attribute")?;
            // Only when the object is itself a plain dotted shape.
            dotted_name(node, source)?;
            Some((node_text(attr, source).to_string(), false))
        }
        "not_operator" => {
            let (name, negated) = recognize_guard(node.child_by_field_name("argument")?, source)?;
            Some((name, !negated))
        }
        "parenthesized_expression" => recognize_guard(node.named_child(0)?, source),
        _ => None,
    }
}

/// Recognize `__name__ == "__main__"` (either operand order).
pub fn is_main_guard(node: Node<'_>, source: &str) -> bool {
    if node.kind() != "comparison_operator" {
        return false;
    }
    let mut cursor = node.walk();
    let operands: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
    if operands.len() != 2 {
        return false;
    }
    let texts: Vec<&str> = operands.iter().map(|n| node_text(*n, source)).collect();
    let is_name = |t: &str| t == "__name__";
    let is_main = |t: &str| t.trim_matches(['\'', '"']) == "__main__";
    node_text(node, source).contains("==")
        && ((is_name(texts[0]) && is_main(texts[1])) || (is_name(texts[1]) && is_main(texts[0])))
}
