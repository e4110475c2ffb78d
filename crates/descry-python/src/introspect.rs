//! Introspection of compiled binary modules.
//!
//! A binary module cannot be parsed, so it is imported in an isolated
//! child interpreter which enumerates the module surface and reports it
//! back as JSON on stdout. Signatures come from the runtime introspection
//! facility when available; otherwise the conventional first
//! documentation line `name(arg, arg=default) -- description` is parsed
//! to recover one. Any failure leaves the placeholder module in the
//! System and surfaces as a warning in the caller.

use std::path::Path;
use std::process::Command;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use descry_core::{
    ClassData, DocId, Docstring, EntityKind, FunctionData, Parameter, ParamKind, System,
};

/// The worker program executed with `python -I -c`.
const WORKER_SCRIPT: &str = include_str!("introspect_worker.py");

// ============================================================================
// Error Types
// ============================================================================

/// Errors from the introspection subprocess.
#[derive(Debug, Error)]
pub enum IntrospectError {
    #[error("failed to spawn interpreter: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("introspection of {module} failed: {stderr}")]
    Failed { module: String, stderr: String },

    #[error("invalid introspection output: {0}")]
    Protocol(#[from] serde_json::Error),
}

/// Result type for introspection operations.
pub type IntrospectResult<T> = Result<T, IntrospectError>;

// ============================================================================
// Worker protocol
// ============================================================================

#[derive(Debug, Deserialize)]
struct WorkerModule {
    docstring: Option<String>,
    members: Vec<WorkerMember>,
}

#[derive(Debug, Deserialize)]
struct WorkerMember {
    name: String,
    kind: String,
    signature: Option<String>,
    docstring: Option<String>,
    #[serde(default)]
    members: Option<Vec<WorkerMember>>,
}

// ============================================================================
// Entry point
// ============================================================================

/// Introspect the binary module at `path` into the (already created)
/// placeholder entity. On error the placeholder is left as-is.
pub fn introspect_binary(
    system: &mut System,
    python: &Path,
    module_id: DocId,
    path: &Path,
) -> IntrospectResult<()> {
    let module_name = system.get(module_id).name.clone();
    let output = Command::new(python)
        .arg("-I")
        .arg("-c")
        .arg(WORKER_SCRIPT)
        .arg(path)
        .arg(&module_name)
        .output()?;
    if !output.status.success() {
        return Err(IntrospectError::Failed {
            module: module_name,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    let module: WorkerModule = serde_json::from_slice(&output.stdout)?;
    populate(system, module_id, module);
    Ok(())
}

fn populate(system: &mut System, module_id: DocId, module: WorkerModule) {
    if let Some(text) = module.docstring {
        system.get_mut(module_id).docstring = Some(Docstring::new(text, 1));
    }
    for member in module.members {
        add_member(system, module_id, member, false);
    }
}

fn add_member(system: &mut System, parent: DocId, member: WorkerMember, in_class: bool) {
    let id = match member.kind.as_str() {
        "function" => {
            let signature = member
                .signature
                .as_deref()
                .and_then(parse_text_signature)
                .or_else(|| {
                    member
                        .docstring
                        .as_deref()
                        .and_then(|doc| doc_first_line_signature(&member.name, doc))
                })
                .unwrap_or_default();
            let data = FunctionData {
                signature,
                ..FunctionData::default()
            };
            let kind = if in_class {
                EntityKind::Method(data)
            } else {
                EntityKind::Function(data)
            };
            system.add(Some(parent), &member.name, kind)
        }
        "class" => {
            let id = system.add(Some(parent), &member.name, EntityKind::Class(ClassData::default()));
            if let Some(children) = member.members {
                for child in children {
                    add_member(system, id, child, true);
                }
            }
            id
        }
        _ => system.add(
            Some(parent),
            &member.name,
            EntityKind::Variable(descry_core::AttributeData::default()),
        ),
    };
    let doc = system.get_mut(id);
    doc.is_introspected = true;
    if let Some(text) = member.docstring {
        doc.docstring = Some(Docstring::new(text, 1));
    }
}

// ============================================================================
// Textual signature parsing
// ============================================================================

/// Parse a runtime signature string like
/// `(a, b=1, *args, c: int = 2, **kw)` into parameter records.
pub fn parse_text_signature(text: &str) -> Option<Vec<Parameter>> {
    let inner = text.trim().strip_prefix('(')?.strip_suffix(')')?;
    let mut params: Vec<Parameter> = Vec::new();
    let mut keyword_only = false;
    for token in split_top_level(inner) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if token == "*" {
            keyword_only = true;
            continue;
        }
        if token == "/" {
            for p in params.iter_mut() {
                if p.kind == ParamKind::PositionalOrKeyword {
                    p.kind = ParamKind::PositionalOnly;
                }
            }
            continue;
        }
        let (body, kind) = if let Some(rest) = token.strip_prefix("**") {
            (rest, ParamKind::VariadicKeyword)
        } else if let Some(rest) = token.strip_prefix('*') {
            keyword_only = true;
            (rest, ParamKind::VariadicPositional)
        } else if keyword_only {
            (token, ParamKind::KeywordOnly)
        } else {
            (token, ParamKind::PositionalOrKeyword)
        };
        let (head, default) = match split_once_top_level(body, '=') {
            Some((head, default)) => (head.trim(), Some(default.trim().to_string())),
            None => (body, None),
        };
        let (name, annotation) = match split_once_top_level(head, ':') {
            Some((name, annotation)) => (name.trim(), Some(annotation.trim().to_string())),
            None => (head.trim(), None),
        };
        if name.is_empty() || params.iter().any(|p| p.name == name) {
            continue;
        }
        let mut parameter = Parameter::new(name, kind);
        parameter.default = default;
        parameter.annotation = annotation;
        params.push(parameter);
    }
    Some(params)
}

/// Recover a signature from the conventional first documentation line:
/// `name(arg, arg=default) -- description`.
pub fn doc_first_line_signature(name: &str, docstring: &str) -> Option<Vec<Parameter>> {
    let first_line = docstring.lines().next()?.trim();
    let pattern = format!(
        r"^{}\s*\((?P<args>[^)]*)\)\s*(?:--.*)?$",
        regex::escape(name)
    );
    let re = Regex::new(&pattern).ok()?;
    let captures = re.captures(first_line)?;
    parse_text_signature(&format!("({})", &captures["args"]))
}

/// Split on commas that are not nested in brackets or quotes.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut in_string: Option<char> = None;
    for (i, c) in s.char_indices() {
        match in_string {
            Some(quote) => {
                if c == quote {
                    in_string = None;
                }
            }
            None => match c {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                '\'' | '"' => in_string = Some(c),
                ',' if depth == 0 => {
                    out.push(&s[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    out.push(&s[start..]);
    out
}

fn split_once_top_level(s: &str, sep: char) -> Option<(&str, &str)> {
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    for (i, c) in s.char_indices() {
        match in_string {
            Some(quote) => {
                if c == quote {
                    in_string = None;
                }
            }
            None => match c {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                '\'' | '"' => in_string = Some(c),
                _ if c == sep && depth == 0 => {
                    return Some((&s[..i], &s[i + c.len_utf8()..]));
                }
                _ => {}
            },
        }
    }
    None
}
