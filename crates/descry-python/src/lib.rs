//! Static analysis pipeline for Python packages.
//!
//! The pipeline is strictly staged: scan the input paths into ordered
//! translation units, build each module's AST exactly once into the
//! [`System`](descry_core::System), then run the global post-processing
//! pass (base resolution, MRO, re-export relocation, privacy, overload
//! grouping). After that the model is read-only and ready for a renderer;
//! the [`linker`] and [`inventory`] modules are the contracts it consumes.
//!
//! Everything is synchronous and single-threaded; determinism of the
//! output follows from the scanner's ordering rule and the registry's
//! insertion-order iteration.

pub mod analyzer;
pub mod builder;
pub mod ext;
pub mod extensions;
pub mod introspect;
pub mod inventory;
pub mod linker;
pub mod mro;
pub mod options;
pub mod postprocess;
pub mod resolve;
pub mod scan;

pub use analyzer::{Analyzer, AnalyzerError, AnalyzerResult};
pub use extensions::{AstVisitor, ExtensionRegistry, PostProcessor, VisitContext};
pub use linker::{DocstringLinker, Link, LinkClass};
pub use options::{BranchOverride, InventoryRef, Options};
