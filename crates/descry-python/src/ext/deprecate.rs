//! Deprecation notices.
//!
//! Recognizes `@deprecated(...)` decorators (any dotted path whose last
//! segment is `deprecated`) on classes, functions and methods, and records
//! the raw decorator arguments in the entity's `deprecated` extra-info
//! slot for the renderer to surface.

use std::rc::Rc;

use descry_core::{DocId, System};

use crate::extensions::{ExtensionRegistry, PostProcessor};

/// Extra-info slot written by this extension.
pub const SLOT: &str = "deprecated";

/// Register the extension on a registry.
pub fn register(registry: &mut ExtensionRegistry) {
    registry.register_post_processor(Rc::new(DetectDeprecations));
}

struct DetectDeprecations;

impl PostProcessor for DetectDeprecations {
    fn name(&self) -> &'static str {
        "detect-deprecations"
    }

    fn priority(&self) -> i32 {
        500
    }

    fn run(&self, system: &mut System) {
        let mut found: Vec<(DocId, Option<String>)> = Vec::new();
        for doc in system.iter() {
            if doc.extra_info.contains_key(SLOT) {
                continue; // idempotent re-run
            }
            let decorators = doc
                .kind
                .as_class()
                .map(|c| c.decorators.as_slice())
                .or_else(|| doc.kind.as_function().map(|f| f.decorators.as_slice()))
                // Properties carry their getter's decorators on the
                // attribute payload.
                .or_else(|| doc.kind.as_attribute().map(|a| a.decorators.as_slice()))
                .unwrap_or(&[]);
            if let Some(decorator) = decorators.iter().find(|d| d.last_segment_is("deprecated")) {
                found.push((doc.id, decorator.args.clone()));
            }
        }
        for (id, args) in found {
            let value = match args {
                Some(args) => serde_json::json!({ "args": args }),
                None => serde_json::json!({}),
            };
            system.set_extra(id, SLOT, value);
        }
    }
}
