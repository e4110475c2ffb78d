//! Method resolution order via C3 linearization.
//!
//! The linearization runs over `resolved_bases`, so a base that never
//! resolved participates as an opaque [`BaseRef::External`] leaf: it
//! contributes itself and nothing else, and C3 proceeds on what is known.
//! Every MRO starts with the class itself and ends with the implicit root
//! object type.
//!
//! On failure (inconsistent ordering or an inheritance cycle) the caller
//! falls back to [`fallback_linearization`], a depth-first left-to-right
//! walk with de-duplication, and flags the class.

use std::collections::HashSet;

use thiserror::Error;

use descry_core::{BaseRef, DocId, System};

/// The implicit root of every linearization.
const ROOT_TYPE: &str = "object";

// ============================================================================
// Error Types
// ============================================================================

/// Errors from MRO computation.
#[derive(Debug, Error)]
pub enum MroError {
    /// No valid C3 linearization exists.
    #[error("inconsistent hierarchy for class '{class_name}': cannot compute MRO")]
    InconsistentHierarchy { class_name: String },

    /// The inheritance graph contains a cycle.
    #[error("inheritance cycle through class '{class_name}'")]
    Cycle { class_name: String },
}

/// Result type for MRO operations.
pub type MroResult<T> = Result<T, MroError>;

// ============================================================================
// C3
// ============================================================================

/// Compute the C3 linearization of a class over its resolved bases.
pub fn compute_mro(class_id: DocId, system: &System) -> MroResult<Vec<BaseRef>> {
    let mut visiting = HashSet::new();
    let mut mro = linearize(class_id, system, &mut visiting)?;
    let root = BaseRef::External(ROOT_TYPE.to_string());
    if !mro.contains(&root) {
        mro.push(root);
    }
    Ok(mro)
}

fn linearize(
    class_id: DocId,
    system: &System,
    visiting: &mut HashSet<DocId>,
) -> MroResult<Vec<BaseRef>> {
    if !visiting.insert(class_id) {
        return Err(MroError::Cycle {
            class_name: system.get(class_id).qname.clone(),
        });
    }
    let bases = resolved_bases(system, class_id);
    let mut result = vec![BaseRef::Internal(class_id)];
    if !bases.is_empty() {
        let mut seqs: Vec<Vec<BaseRef>> = Vec::with_capacity(bases.len() + 1);
        for base in &bases {
            match base {
                BaseRef::Internal(base_id) => {
                    seqs.push(linearize(*base_id, system, visiting)?)
                }
                BaseRef::External(name) => seqs.push(vec![BaseRef::External(name.clone())]),
            }
        }
        seqs.push(bases);
        match merge(seqs) {
            Some(merged) => result.extend(merged),
            None => {
                return Err(MroError::InconsistentHierarchy {
                    class_name: system.get(class_id).qname.clone(),
                })
            }
        }
    }
    visiting.remove(&class_id);
    Ok(result)
}

/// C3 merge: repeatedly take a head that appears in no tail.
fn merge(mut seqs: Vec<Vec<BaseRef>>) -> Option<Vec<BaseRef>> {
    let mut result = Vec::new();
    loop {
        seqs.retain(|seq| !seq.is_empty());
        if seqs.is_empty() {
            return Some(result);
        }
        let mut candidate = None;
        for seq in &seqs {
            let head = &seq[0];
            let in_tail = seqs.iter().any(|s| s.len() > 1 && s[1..].contains(head));
            if !in_tail {
                candidate = Some(head.clone());
                break;
            }
        }
        let candidate = candidate?;
        result.push(candidate.clone());
        for seq in seqs.iter_mut() {
            if seq.first() == Some(&candidate) {
                seq.remove(0);
            }
        }
    }
}

// ============================================================================
// Fallback
// ============================================================================

/// Depth-first left-to-right linearization with de-duplication. Used when
/// C3 fails; cycle-safe by construction.
pub fn fallback_linearization(class_id: DocId, system: &System) -> Vec<BaseRef> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    dfs(BaseRef::Internal(class_id), system, &mut out, &mut seen);
    let root = BaseRef::External(ROOT_TYPE.to_string());
    if !out.contains(&root) {
        out.push(root);
    }
    out
}

fn dfs(entry: BaseRef, system: &System, out: &mut Vec<BaseRef>, seen: &mut HashSet<BaseRef>) {
    if !seen.insert(entry.clone()) {
        return;
    }
    out.push(entry.clone());
    if let BaseRef::Internal(id) = entry {
        for base in resolved_bases(system, id) {
            dfs(base, system, out, seen);
        }
    }
}

fn resolved_bases(system: &System, class_id: DocId) -> Vec<BaseRef> {
    system
        .get(class_id)
        .kind
        .as_class()
        .map(|data| data.resolved_bases.clone())
        .unwrap_or_default()
}
