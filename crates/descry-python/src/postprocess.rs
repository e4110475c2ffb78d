//! Post-processing: the global passes that run once every module is built.
//!
//! Each pass is a [`PostProcessor`] sharing one priority space with
//! extension-registered passes. Built-in priorities, highest first:
//!
//! | pass | priority |
//! |------|----------|
//! | base resolution | 1000 |
//! | exception detection | 950 |
//! | MRO + subclass lists | 900 |
//! | re-export relocation | 850 |
//! | constructor detection | 800 |
//! | privacy assignment | 700 |
//!
//! Every pass is idempotent: re-running the pipeline over an already
//! post-processed System leaves the registry unchanged.

use std::collections::HashMap;
use std::rc::Rc;

use descry_core::{
    qname, BaseRef, DocId, EntityKind, Resolution, System, Warning,
};

use crate::extensions::{ExtensionRegistry, PostProcessor};
use crate::mro::{compute_mro, fallback_linearization};
use crate::resolve::resolve;

/// Register the built-in passes on a registry.
pub fn register_builtin_passes(registry: &mut ExtensionRegistry) {
    registry.register_post_processor(Rc::new(ResolveBases));
    registry.register_post_processor(Rc::new(DetectExceptions));
    registry.register_post_processor(Rc::new(ComputeMro));
    registry.register_post_processor(Rc::new(RelocateReexports));
    registry.register_post_processor(Rc::new(DetectConstructors));
    registry.register_post_processor(Rc::new(AssignPrivacy));
}

fn class_ids(system: &System) -> Vec<DocId> {
    system
        .ids()
        .filter(|&id| system.get(id).kind.is_class_like())
        .collect()
}

// ============================================================================
// Base resolution
// ============================================================================

struct ResolveBases;

impl PostProcessor for ResolveBases {
    fn name(&self) -> &'static str {
        "resolve-bases"
    }

    fn priority(&self) -> i32 {
        1000
    }

    fn run(&self, system: &mut System) {
        let mut resolved: Vec<(DocId, Vec<BaseRef>)> = Vec::new();
        for class_id in class_ids(system) {
            let doc = system.get(class_id);
            let raw_bases = doc.kind.as_class().map(|c| c.raw_bases.clone()).unwrap_or_default();
            // Base expressions are evaluated in the enclosing scope.
            let scope = doc.parent.unwrap_or(class_id);
            let location = doc.location.clone();
            let mut bases = Vec::with_capacity(raw_bases.len());
            for raw in &raw_bases {
                // `Generic[T]` resolves as `Generic`.
                let name = raw.split('[').next().unwrap_or(raw).trim();
                match resolve(system, scope, name) {
                    Resolution::Internal(target) if target == class_id => {
                        // A class cannot be its own base; keep the name as
                        // an opaque external to avoid a self-loop.
                        bases.push(BaseRef::External(name.to_string()));
                    }
                    Resolution::Internal(target) => bases.push(BaseRef::Internal(target)),
                    Resolution::External { qname, .. } => bases.push(BaseRef::External(qname)),
                    Resolution::Unresolved(reason) => {
                        system.report(
                            Warning::new(
                                "resolve",
                                format!(
                                    "base class '{name}' of '{}' not resolved: {reason}",
                                    system.get(class_id).qname
                                ),
                            )
                            .at_opt(location.clone()),
                        );
                        bases.push(BaseRef::External(name.to_string()));
                    }
                }
            }
            resolved.push((class_id, bases));
        }
        for (class_id, bases) in resolved {
            if let Some(data) = system.get_mut(class_id).kind.as_class_mut() {
                data.resolved_bases = bases;
            }
        }
    }
}

// ============================================================================
// Exception detection
// ============================================================================

/// Names that make an ancestry exceptional.
fn is_exception_name(name: &str) -> bool {
    let last = qname::last_segment(name);
    matches!(last, "BaseException" | "Exception" | "Warning" | "KeyboardInterrupt" | "SystemExit")
        || last.ends_with("Error")
        || last.ends_with("Exception")
        || last.ends_with("Warning")
}

struct DetectExceptions;

impl DetectExceptions {
    fn ancestry_is_exceptional(&self, system: &System, class_id: DocId) -> bool {
        // The fallback linearization is cycle-safe and covers external
        // names, which is all this check needs.
        fallback_linearization(class_id, system)
            .into_iter()
            .skip(1)
            .any(|entry| match entry {
                BaseRef::Internal(id) => is_exception_name(&system.get(id).name),
                BaseRef::External(name) => is_exception_name(&name),
            })
    }
}

impl PostProcessor for DetectExceptions {
    fn name(&self) -> &'static str {
        "detect-exceptions"
    }

    fn priority(&self) -> i32 {
        950
    }

    fn run(&self, system: &mut System) {
        let promotions: Vec<DocId> = class_ids(system)
            .into_iter()
            .filter(|&id| {
                matches!(system.get(id).kind, EntityKind::Class(_))
                    && self.ancestry_is_exceptional(system, id)
            })
            .collect();
        for class_id in promotions {
            let doc = system.get_mut(class_id);
            if let EntityKind::Class(data) = &doc.kind {
                let promoted = EntityKind::Exception(data.clone());
                doc.kind = promoted;
            }
        }
    }
}

// ============================================================================
// MRO and subclass lists
// ============================================================================

struct ComputeMro;

impl PostProcessor for ComputeMro {
    fn name(&self) -> &'static str {
        "compute-mro"
    }

    fn priority(&self) -> i32 {
        900
    }

    fn run(&self, system: &mut System) {
        let classes = class_ids(system);
        for &class_id in &classes {
            let (mro, failed) = match compute_mro(class_id, system) {
                Ok(mro) => (mro, false),
                Err(error) => {
                    system.report(
                        Warning::new("mro", error.to_string())
                            .at_opt(system.get(class_id).location.clone()),
                    );
                    (fallback_linearization(class_id, system), true)
                }
            };
            if let Some(data) = system.get_mut(class_id).kind.as_class_mut() {
                data.mro = mro;
                data.mro_failed = failed;
            }
        }

        // Reverse index: every class appends itself to each ancestor.
        for &class_id in &classes {
            if let Some(data) = system.get_mut(class_id).kind.as_class_mut() {
                data.subclasses.clear();
            }
        }
        for &class_id in &classes {
            let ancestors: Vec<DocId> = system
                .get(class_id)
                .kind
                .as_class()
                .map(|data| {
                    data.mro
                        .iter()
                        .skip(1)
                        .filter_map(BaseRef::as_internal)
                        .collect()
                })
                .unwrap_or_default();
            for ancestor in ancestors {
                if let Some(data) = system.get_mut(ancestor).kind.as_class_mut() {
                    if !data.subclasses.contains(&class_id) {
                        data.subclasses.push(class_id);
                    }
                }
            }
        }
    }
}

// ============================================================================
// Re-export relocation
// ============================================================================

struct RelocateReexports;

impl PostProcessor for RelocateReexports {
    fn name(&self) -> &'static str {
        "relocate-reexports"
    }

    fn priority(&self) -> i32 {
        850
    }

    fn run(&self, system: &mut System) {
        // Discover candidate sites in processing order.
        struct Site {
            module: DocId,
            name: String,
        }
        let mut sites_by_target: HashMap<DocId, Vec<Site>> = HashMap::new();
        let mut target_order: Vec<DocId> = Vec::new();

        let module_ids: Vec<DocId> = system
            .ids()
            .filter(|&id| system.get(id).kind.is_module_like())
            .collect();
        for module_id in module_ids {
            let Some(exports) = system
                .get(module_id)
                .kind
                .as_module()
                .and_then(|d| d.all_exports.clone())
            else {
                continue;
            };
            for name in exports {
                if system.child_named(module_id, &name).is_some() {
                    continue; // defined right here; nothing to relocate
                }
                let target = match resolve(system, module_id, &name) {
                    Resolution::Internal(target) => target,
                    Resolution::External { .. } => continue,
                    Resolution::Unresolved(_) => {
                        system.report(Warning::new(
                            "reexport",
                            format!(
                                "'{name}' in the public names of '{}' is neither defined nor imported",
                                system.get(module_id).qname
                            ),
                        ));
                        continue;
                    }
                };
                // Modules are referenced, not relocated; only concrete
                // members move.
                if system.get(target).kind.is_module_like() {
                    continue;
                }
                if system.get(target).parent == Some(module_id) {
                    continue;
                }
                mark_reexport_import(system, module_id, &name);
                if !sites_by_target.contains_key(&target) {
                    target_order.push(target);
                }
                sites_by_target
                    .entry(target)
                    .or_default()
                    .push(Site { module: module_id, name });
            }
        }

        for target in target_order {
            let sites = &sites_by_target[&target];
            // Innermost site wins: fewest segments, then lexicographic.
            let mut ranked: Vec<(usize, String, &Site)> = sites
                .iter()
                .map(|site| {
                    let new_qname = qname::join(&system.get(site.module).qname, &site.name);
                    (qname::segment_count(&new_qname), new_qname, site)
                })
                .collect();
            ranked.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
            let (depth, new_qname, site) = {
                let (depth, new_qname, site) = &ranked[0];
                (*depth, new_qname.clone(), *site)
            };
            if ranked.len() > 1 && ranked[1].0 == depth {
                system.report(Warning::new(
                    "reexport",
                    format!(
                        "'{}' re-exported from equally-short paths '{}' and '{}'; the first wins",
                        system.get(target).name,
                        new_qname,
                        ranked[1].1
                    ),
                ));
            }
            if system.get(target).qname == new_qname {
                continue; // already relocated here (idempotent re-run)
            }
            if system.child_named(site.module, &site.name).is_some() {
                system.report(Warning::new(
                    "reexport",
                    format!("cannot relocate '{}': '{new_qname}' already exists",
                        system.get(target).qname),
                ));
                continue;
            }

            // Detach from the old parent, attach to the re-export site.
            let old_parent = system.get(target).parent;
            if let Some(old_parent) = old_parent {
                let children = &mut system.get_mut(old_parent).children;
                children.retain(|&c| c != target);
            }
            system.get_mut(target).parent = Some(site.module);
            let module = site.module;
            let name = site.name.clone();
            system.get_mut(module).children.push(target);
            system.get_mut(target).name = name;
            system.set_qname_recursive(target, new_qname);
        }

        // Relocation changes what dotted names mean; drop stale memos.
        system.clear_resolve_cache();
    }
}

/// Flag the import that brought `name` into `module_id` as a re-export.
fn mark_reexport_import(system: &mut System, module_id: DocId, name: &str) {
    if let Some(data) = system.get_mut(module_id).kind.as_module_mut() {
        for import in &mut data.imports {
            if let descry_core::ImportedNames::Named(pairs) = &import.names {
                if pairs.iter().any(|(_, local)| local == name) {
                    import.is_reexport = true;
                }
            }
        }
    }
}

// ============================================================================
// Constructor detection
// ============================================================================

struct DetectConstructors;

impl PostProcessor for DetectConstructors {
    fn name(&self) -> &'static str {
        "detect-constructors"
    }

    fn priority(&self) -> i32 {
        800
    }

    fn run(&self, system: &mut System) {
        for class_id in class_ids(system) {
            let class_name = system.get(class_id).name.clone();
            let mut constructors: Vec<DocId> = Vec::new();
            for &child in &system.get(class_id).children {
                let doc = system.get(child);
                match &doc.kind {
                    EntityKind::Method(_) if doc.name == "__init__" || doc.name == "__new__" => {
                        constructors.push(child)
                    }
                    EntityKind::ClassMethod(data) => {
                        // An alternative constructor returns the class
                        // itself (or `Self`).
                        let returns_self = data
                            .return_type
                            .as_deref()
                            .map(|r| {
                                let head = r.split('[').next().unwrap_or(r).trim();
                                let last = qname::last_segment(head.trim_matches(['"', '\'']));
                                last == class_name || last == "Self"
                            })
                            .unwrap_or(false);
                        if returns_self {
                            constructors.push(child);
                        }
                    }
                    _ => {}
                }
            }
            if let Some(data) = system.get_mut(class_id).kind.as_class_mut() {
                data.constructor_methods = constructors;
            }
        }
    }
}

// ============================================================================
// Privacy assignment
// ============================================================================

struct AssignPrivacy;

impl PostProcessor for AssignPrivacy {
    fn name(&self) -> &'static str {
        "assign-privacy"
    }

    fn priority(&self) -> i32 {
        700
    }

    fn run(&self, system: &mut System) {
        // Parents always have smaller ids than their children, relocation
        // included, so one id-ordered sweep sees parents first.
        for id in system.ids().collect::<Vec<_>>() {
            let privacy = system.compute_privacy(id);
            system.get_mut(id).privacy = privacy;
        }
    }
}
