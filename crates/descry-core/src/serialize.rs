//! Lossless JSON serialization of a post-processed System.
//!
//! The serialized shape mirrors the object model: every entity with its
//! kind-tagged payload, the roots in processing order and the re-export
//! alias table. Re-hydration rebuilds the qname index and yields a frozen
//! System; caches start cold and the extension slot travels as opaque
//! JSON, each extension being responsible for its own slot contents.
//!
//! Entities serialize in creation order, so two builds over the same
//! inputs produce byte-identical output.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::docformat::DocFormat;
use crate::model::{DocId, Documentable};
use crate::report::{Reporter, TracingReporter};
use crate::system::System;

/// Version tag of the serialized shape.
const MODEL_VERSION: u32 = 1;

// ============================================================================
// Error Types
// ============================================================================

/// Errors from System (de)serialization.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported model version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("dangling id {id} in serialized model")]
    DanglingId { id: u32 },
}

/// Result type for serialization operations.
pub type SerializeResult<T> = Result<T, SerializeError>;

// ============================================================================
// Wire shape
// ============================================================================

#[derive(Serialize, Deserialize)]
struct SystemModel {
    version: u32,
    default_docformat: DocFormat,
    roots: Vec<DocId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    aliases: BTreeMap<String, DocId>,
    entities: Vec<Documentable>,
}

// ============================================================================
// Entry points
// ============================================================================

/// Serialize a System to a JSON string.
pub fn to_json(system: &System) -> SerializeResult<String> {
    let model = SystemModel {
        version: MODEL_VERSION,
        default_docformat: system.default_docformat(),
        roots: system.roots().to_vec(),
        aliases: system.alias_map().clone(),
        entities: system.entities().to_vec(),
    };
    Ok(serde_json::to_string_pretty(&model)?)
}

/// Re-hydrate a System serialized by [`to_json`], with the default
/// reporter.
pub fn from_json(json: &str) -> SerializeResult<System> {
    from_json_with_reporter(json, Rc::new(TracingReporter))
}

/// Re-hydrate a System with a caller-supplied reporter.
pub fn from_json_with_reporter(
    json: &str,
    reporter: Rc<dyn Reporter>,
) -> SerializeResult<System> {
    let model: SystemModel = serde_json::from_str(json)?;
    if model.version != MODEL_VERSION {
        return Err(SerializeError::UnsupportedVersion {
            found: model.version,
            expected: MODEL_VERSION,
        });
    }
    let len = model.entities.len() as u32;
    let check = |id: DocId| -> SerializeResult<()> {
        if id.0 >= len {
            Err(SerializeError::DanglingId { id: id.0 })
        } else {
            Ok(())
        }
    };
    for (index, doc) in model.entities.iter().enumerate() {
        if doc.id.0 != index as u32 {
            return Err(SerializeError::DanglingId { id: doc.id.0 });
        }
        if let Some(parent) = doc.parent {
            check(parent)?;
        }
        for &child in &doc.children {
            check(child)?;
        }
    }
    for &root in &model.roots {
        check(root)?;
    }
    for &id in model.aliases.values() {
        check(id)?;
    }
    Ok(System::from_parts(
        model.entities,
        model.roots,
        model.aliases,
        model.default_docformat,
        reporter,
    ))
}

/// Structural equality of two Systems' observable models, entity by
/// entity. Used by round-trip tests and idempotence checks.
pub fn models_equal(a: &System, b: &System) -> bool {
    a.roots() == b.roots()
        && a.alias_map() == b.alias_map()
        && a.entities().len() == b.entities().len()
        && a.entities().iter().zip(b.entities().iter()).all(|(x, y)| x == y)
}
