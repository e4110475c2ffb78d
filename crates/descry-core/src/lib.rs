//! Object model and registry for the descry documentation analyzer.
//!
//! This crate defines the language-independent half of the engine: the
//! [`Documentable`](model::Documentable) arena node with its kind-tagged
//! payload, the [`System`](system::System) registry that owns every entity,
//! privacy classification, qualified-name glob matching, docstring format
//! handling, the warning sink, and lossless JSON serialization of the whole
//! model.
//!
//! The analysis pipeline that populates a `System` lives in `descry-python`.

pub mod docformat;
pub mod model;
pub mod privacy;
pub mod qname;
pub mod report;
pub mod serialize;
pub mod system;

pub use docformat::DocFormat;
pub use model::{
    AttributeData, BaseRef, ClassData, Decorator, DocId, Docstring, Documentable, EntityKind,
    ExternalHit, FunctionData, Import, ImportedNames, ModuleData, Overload, Parameter, ParamKind,
    Resolution, SourceLocation, TypeAliasData, TypeVariableData,
};
pub use privacy::{Privacy, PrivacyRule, PrivacyRules};
pub use qname::QnameGlob;
pub use report::{CollectingReporter, Reporter, TracingReporter, Warning};
pub use system::{ExternalLookup, System};
