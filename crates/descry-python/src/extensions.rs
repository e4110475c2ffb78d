//! Extension registrar.
//!
//! Two hook points: per-node AST visitors that run around the builder's
//! own handling of every statement, and post-processors that run over the
//! finished System. Post-processors carry an integer priority; higher runs
//! first and insertion order breaks ties, so a given registration set
//! always executes in the same order.
//!
//! Extensions may read any Documentable but write only entities they
//! created or extra-info slots (see [`System::set_extra`]); colliding slot
//! writes are detected there. A panicking extension is a programmer error
//! and propagates: the registry never swallows it, it only tags the
//! offending extension in the log first.

use std::path::Path;
use std::rc::Rc;

use tree_sitter::Node;

use descry_core::{DocId, System};

// ============================================================================
// AST visitor hooks
// ============================================================================

/// State handed to AST-visitor extensions for each statement.
pub struct VisitContext<'a> {
    pub system: &'a mut System,
    /// The module being built.
    pub module: DocId,
    /// The innermost documented scope (module or class).
    pub scope: DocId,
    pub source: &'a str,
    pub path: &'a Path,
}

/// A per-node extension. `visit` runs before the built-in handling of a
/// statement, `depart` after it.
pub trait AstVisitor {
    fn name(&self) -> &'static str;

    fn visit(&self, _node: Node<'_>, _ctx: &mut VisitContext<'_>) {}

    fn depart(&self, _node: Node<'_>, _ctx: &mut VisitContext<'_>) {}
}

// ============================================================================
// Post-processors
// ============================================================================

/// A pass over the finished System. Built-in passes and extension passes
/// share this trait and one priority space.
pub trait PostProcessor {
    fn name(&self) -> &'static str;

    /// Higher priorities run first.
    fn priority(&self) -> i32;

    fn run(&self, system: &mut System);
}

// ============================================================================
// Registry
// ============================================================================

/// The set of registered extensions. Registration order is meaningful: it
/// breaks priority ties and fixes visitor invocation order.
#[derive(Default)]
pub struct ExtensionRegistry {
    visitors: Vec<Rc<dyn AstVisitor>>,
    processors: Vec<Rc<dyn PostProcessor>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_visitor(&mut self, visitor: Rc<dyn AstVisitor>) {
        self.visitors.push(visitor);
    }

    pub fn register_post_processor(&mut self, processor: Rc<dyn PostProcessor>) {
        self.processors.push(processor);
    }

    /// Run all `visit` hooks for a statement, in registration order.
    pub fn visit(&self, node: Node<'_>, ctx: &mut VisitContext<'_>) {
        for visitor in &self.visitors {
            let _span = tracing::debug_span!("ext_visit", extension = visitor.name()).entered();
            visitor.visit(node, ctx);
        }
    }

    /// Run all `depart` hooks for a statement, in registration order.
    pub fn depart(&self, node: Node<'_>, ctx: &mut VisitContext<'_>) {
        for visitor in &self.visitors {
            let _span = tracing::debug_span!("ext_depart", extension = visitor.name()).entered();
            visitor.depart(node, ctx);
        }
    }

    /// Post-processors sorted by descending priority, insertion order on
    /// ties.
    pub fn processors(&self) -> Vec<Rc<dyn PostProcessor>> {
        let mut ordered: Vec<(usize, Rc<dyn PostProcessor>)> =
            self.processors.iter().cloned().enumerate().collect();
        ordered.sort_by_key(|(index, p)| (-p.priority(), *index));
        ordered.into_iter().map(|(_, p)| p).collect()
    }

    /// Run every post-processor over the system, highest priority first.
    pub fn post_process(&self, system: &mut System) {
        for processor in self.processors() {
            tracing::debug!(pass = processor.name(), "post-processing");
            processor.run(system);
        }
    }
}
