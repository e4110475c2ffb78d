//! Dotted-name resolution in the context of an entity.
//!
//! Resolution anchors the first segment by walking scopes outward from the
//! context (method, class, module, package chain), follows import and
//! alias bindings with a bounded indirection depth, then walks the
//! remaining segments through children and, for classes, the MRO. What
//! falls out of the model entirely is tried against the external
//! inventory, longest prefix first; the rest is `Unresolved`.
//!
//! Results are memoized per `(context, name)` in the System; the cache
//! lives until teardown (re-export relocation clears it once, in the
//! middle of post-processing).
//!
//! `Unresolved` is not fatal. The resolver stays silent; callers attach
//! the referencing source location and warn.

use descry_core::{qname, BaseRef, DocId, Resolution, System};

/// How many alias/import indirections to follow before giving up. Matches
/// the original implementation's recursion guard.
const MAX_INDIRECTIONS: usize = 3;

/// Where a partially-resolved walk currently points.
#[derive(Debug, Clone)]
enum Cursor {
    /// An entity of this System.
    Doc(DocId),
    /// A dotted name that left the model; candidate for inventory lookup.
    Ext(String),
}

// ============================================================================
// Entry points
// ============================================================================

/// Resolve `name` in the context of `ctx`, memoized.
pub fn resolve(system: &System, ctx: DocId, name: &str) -> Resolution {
    if let Some(cached) = system.cached_resolution(ctx, name) {
        return cached;
    }
    let resolution = resolve_uncached(system, ctx, name);
    system.cache_resolution(ctx, name.to_string(), resolution.clone());
    resolution
}

fn resolve_uncached(system: &System, ctx: DocId, name: &str) -> Resolution {
    let mut segments = name.split('.');
    let Some(first) = segments.next().filter(|s| !s.is_empty()) else {
        return Resolution::Unresolved(format!("malformed name '{name}'"));
    };

    let Some(mut cursor) = anchor(system, ctx, first) else {
        return Resolution::Unresolved(format!(
            "'{first}' not found in the scope of '{}'",
            system.get(ctx).qname
        ));
    };

    for segment in segments {
        if segment.is_empty() {
            return Resolution::Unresolved(format!("malformed name '{name}'"));
        }
        cursor = match cursor {
            Cursor::Doc(id) => advance(system, id, segment),
            Cursor::Ext(prefix) => Cursor::Ext(format!("{prefix}.{segment}")),
        };
    }

    match cursor {
        Cursor::Doc(id) => Resolution::Internal(id),
        Cursor::Ext(external) => match lookup_external(system, &external) {
            Some(resolution) => resolution,
            None => Resolution::Unresolved(format!("'{external}' matches nothing known")),
        },
    }
}

// ============================================================================
// Anchoring
// ============================================================================

/// Find what the first segment denotes, walking scopes outward. Bare
/// names do not see inherited members; `self`/`cls` anchor to the
/// enclosing class, where the subsequent walk consults the MRO.
fn anchor(system: &System, ctx: DocId, first: &str) -> Option<Cursor> {
    if first == "self" || first == "cls" {
        if let Some(class_id) = enclosing_class(system, ctx) {
            return Some(Cursor::Doc(class_id));
        }
    }

    let mut scope = Some(nearest_scope(system, ctx));
    while let Some(scope_id) = scope {
        if let Some(child) = system.child_named(scope_id, first) {
            return Some(Cursor::Doc(child));
        }
        if let Some(target) = binding_of(system, scope_id, first) {
            return Some(chase(system, &target, 0));
        }
        scope = system.get(scope_id).parent;
    }

    // Absolute references work from anywhere: roots are globally visible.
    if let Some(id) = system.lookup(first) {
        return Some(Cursor::Doc(id));
    }
    // Leave unknown bare names to the external inventory.
    if system.external_lookup(first).is_some() {
        return Some(Cursor::Ext(first.to_string()));
    }
    None
}

/// The innermost scope that can contain names: the context itself when it
/// is a module or class, its nearest such ancestor otherwise.
fn nearest_scope(system: &System, ctx: DocId) -> DocId {
    let mut current = ctx;
    loop {
        let doc = system.get(current);
        if doc.kind.is_module_like() || doc.kind.is_class_like() {
            return current;
        }
        match doc.parent {
            Some(parent) => current = parent,
            None => return current,
        }
    }
}

fn enclosing_class(system: &System, ctx: DocId) -> Option<DocId> {
    let mut current = Some(ctx);
    while let Some(id) = current {
        let doc = system.get(id);
        if doc.kind.is_class_like() {
            return Some(id);
        }
        current = doc.parent;
    }
    None
}

fn binding_of(system: &System, scope: DocId, name: &str) -> Option<String> {
    let doc = system.get(scope);
    doc.kind
        .as_module()
        .and_then(|d| d.bindings.get(name))
        .or_else(|| doc.kind.as_class().and_then(|d| d.bindings.get(name)))
        .cloned()
}

/// Follow a binding's dotted target into the model, through further
/// bindings if needed, with a bounded depth.
fn chase(system: &System, target: &str, depth: usize) -> Cursor {
    if depth > MAX_INDIRECTIONS {
        return Cursor::Ext(target.to_string());
    }
    if let Some(id) = system.lookup(target) {
        return Cursor::Doc(id);
    }
    // `pkg.mod.name` where `pkg.mod` exists: the tail may be a binding in
    // the parent (an import of an import).
    if let Some((head, last)) = target.rsplit_once('.') {
        if let Some(parent_id) = system.lookup(head) {
            if let Some(next) = binding_of(system, parent_id, last) {
                return chase(system, &next, depth + 1);
            }
        }
    }
    Cursor::Ext(target.to_string())
}

// ============================================================================
// Segment walk
// ============================================================================

fn advance(system: &System, id: DocId, segment: &str) -> Cursor {
    if let Some(child) = system.child_named(id, segment) {
        return Cursor::Doc(child);
    }
    if system.get(id).kind.is_class_like() {
        if let Some(found) = find_in_mro(system, id, segment) {
            return found;
        }
    }
    if let Some(target) = binding_of(system, id, segment) {
        return chase(system, &target, 0);
    }
    Cursor::Ext(qname::join(&system.get(id).qname, segment))
}

/// Look a member up along a class's MRO (excluding the class itself,
/// already checked). Falls back to a depth-first base walk when the MRO
/// has not been computed yet.
fn find_in_mro(system: &System, class_id: DocId, name: &str) -> Option<Cursor> {
    let data = system.get(class_id).kind.as_class()?;
    let entries: Vec<BaseRef> = if data.mro.is_empty() {
        crate::mro::fallback_linearization(class_id, system)
    } else {
        data.mro.clone()
    };
    for entry in entries.into_iter().skip(1) {
        match entry {
            BaseRef::Internal(ancestor) => {
                if let Some(child) = system.child_named(ancestor, name) {
                    return Some(Cursor::Doc(child));
                }
            }
            BaseRef::External(_) => {}
        }
    }
    None
}

// ============================================================================
// External fallback
// ============================================================================

/// Try the inventory with the full name, then progressively shorter
/// prefixes (longest wins).
fn lookup_external(system: &System, name: &str) -> Option<Resolution> {
    let segments: Vec<&str> = name.split('.').collect();
    for end in (1..=segments.len()).rev() {
        let candidate = segments[..end].join(".");
        if let Some(hit) = system.external_lookup(&candidate) {
            return Some(Resolution::External {
                inventory: hit.inventory,
                qname: hit.name,
                url: hit.url,
            });
        }
    }
    None
}
