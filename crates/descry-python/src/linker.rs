//! The docstring-linker bridge.
//!
//! Markup parsers hand cross-reference text to [`DocstringLinker::lookup`]
//! and get back a URL fragment plus a CSS class (`internal`,
//! `intersphinx` or `unresolved`). The linker delegates to the resolver
//! and keeps a per-system cache so identical references across many
//! docstrings resolve once. This cache is the only state that keeps
//! mutating after post-processing.

use std::cell::RefCell;
use std::collections::HashMap;

use descry_core::{DocId, EntityKind, Resolution, System, Warning};

use crate::resolve::resolve;

// ============================================================================
// Links
// ============================================================================

/// CSS class of a rendered cross-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkClass {
    Internal,
    Intersphinx,
    Unresolved,
}

impl LinkClass {
    pub fn css_class(&self) -> &'static str {
        match self {
            LinkClass::Internal => "internal",
            LinkClass::Intersphinx => "intersphinx",
            LinkClass::Unresolved => "unresolved",
        }
    }
}

/// A resolved cross-reference. `url` is empty for unresolved links; the
/// renderer styles those via the class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub class: LinkClass,
}

// ============================================================================
// URL scheme
// ============================================================================

/// Relative URL of an entity's documentation. Modules, packages and
/// classes get their own page; everything else is a fragment on the
/// nearest page ancestor.
pub fn url_for(system: &System, id: DocId) -> String {
    let doc = system.get(id);
    if has_page(&doc.kind) {
        return format!("{}.html", doc.qname);
    }
    let mut ancestor = doc.parent;
    while let Some(aid) = ancestor {
        if has_page(&system.get(aid).kind) {
            return format!("{}.html#{}", system.get(aid).qname, doc.name);
        }
        ancestor = system.get(aid).parent;
    }
    format!("index.html#{}", doc.qname)
}

fn has_page(kind: &EntityKind) -> bool {
    kind.is_module_like() || kind.is_class_like()
}

// ============================================================================
// Linker
// ============================================================================

/// The lookup surface handed to markup parsers.
pub struct DocstringLinker<'a> {
    system: &'a System,
    cache: RefCell<HashMap<(DocId, String), Link>>,
}

impl<'a> DocstringLinker<'a> {
    pub fn new(system: &'a System) -> Self {
        DocstringLinker {
            system,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Resolve a dotted name or role string in the context of an entity.
    /// Unresolved references warn once, tagged with the context's
    /// docstring location.
    pub fn lookup(&self, ctx: DocId, text: &str) -> Link {
        let key = (ctx, text.to_string());
        if let Some(link) = self.cache.borrow().get(&key) {
            return link.clone();
        }
        let link = self.lookup_uncached(ctx, text);
        self.cache.borrow_mut().insert(key, link.clone());
        link
    }

    fn lookup_uncached(&self, ctx: DocId, text: &str) -> Link {
        let target = normalize_target(text);
        match resolve(self.system, ctx, &target) {
            Resolution::Internal(id) => Link {
                url: url_for(self.system, id),
                class: LinkClass::Internal,
            },
            Resolution::External { url, .. } => Link {
                url,
                class: LinkClass::Intersphinx,
            },
            Resolution::Unresolved(reason) => {
                let doc = self.system.get(ctx);
                let location = doc
                    .docstring
                    .as_ref()
                    .zip(doc.location.as_ref())
                    .map(|(docstring, loc)| {
                        descry_core::SourceLocation::new(loc.path.clone(), docstring.line)
                    })
                    .or_else(|| doc.location.clone());
                self.system.report(
                    Warning::new("resolve", format!("cannot resolve link '{text}': {reason}"))
                        .at_opt(location),
                );
                Link {
                    url: String::new(),
                    class: LinkClass::Unresolved,
                }
            }
        }
    }
}

/// Strip role-string wrapping: `` `target` ``, `:py:class:`target``,
/// and `title <target>` forms.
fn normalize_target(text: &str) -> String {
    let mut t = text.trim();
    // Leading :role: prefix.
    if t.starts_with(':') {
        if let Some(end) = t[1..].rfind(':') {
            t = &t[end + 2..];
        }
    }
    let t = t.trim_matches('`').trim();
    // `title <target>` keeps the target.
    if let Some(open) = t.rfind('<') {
        if let Some(close) = t.rfind('>') {
            if close > open {
                return t[open + 1..close].trim().to_string();
            }
        }
    }
    t.to_string()
}
