//! The documentable tree: arena nodes with a kind-tagged payload.
//!
//! Every named program entity is a [`Documentable`] living in the arena of a
//! [`System`](crate::system::System), addressed by a stable [`DocId`].
//! Parent and child links are ids, never references, so re-export
//! relocation is a pure registry operation and reference cycles in the
//! documented program (a class naming a type alias that names the class)
//! cannot produce ownership cycles here.
//!
//! The shared header (name, parent, qname, location, docstring, privacy)
//! lives on `Documentable` itself; everything kind-specific sits behind the
//! [`EntityKind`] tag and is accessed by exhaustive match or through the
//! `*_data` helpers.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::privacy::Privacy;

// ============================================================================
// Identity
// ============================================================================

/// Stable arena index of a Documentable. Ids are assigned monotonically in
/// creation order and never reused while the System lives.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DocId(pub u32);

impl DocId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Source locations and docstrings
// ============================================================================

/// A position in a source file. Lines are 1-based, columns 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub path: PathBuf,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl SourceLocation {
    pub fn new(path: PathBuf, line: u32) -> Self {
        SourceLocation {
            path,
            line,
            column: None,
        }
    }

    pub fn with_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path.display(), self.line)?;
        if let Some(col) = self.column {
            write!(f, ":{col}")?;
        }
        Ok(())
    }
}

/// A raw docstring with the line it starts on. Markup parsing is the
/// renderer's job; the engine only attaches and transports the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Docstring {
    pub text: String,
    pub line: u32,
}

impl Docstring {
    pub fn new(text: impl Into<String>, line: u32) -> Self {
        Docstring {
            text: text.into(),
            line,
        }
    }
}

// ============================================================================
// Imports
// ============================================================================

/// Names bound by one import statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportedNames {
    /// `from source import *`
    Wildcard,
    /// `(original_name, local_alias)` pairs, in source order. A plain
    /// `import a.b` is recorded as a single pair binding the top-level
    /// name (or the alias) to the module.
    Named(Vec<(String, String)>),
}

/// One import statement as recorded by the AST builder, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    /// Absolute dotted source module. Relative imports are expanded against
    /// the importing module before recording.
    pub source: String,
    pub names: ImportedNames,
    /// True when the statement signals re-export intent: either the
    /// redundant-alias form (`from m import x as x`) or, after
    /// post-processing, membership of the bound name in the module's
    /// public-name list.
    pub is_reexport: bool,
    pub line: u32,
}

// ============================================================================
// Decorators, parameters, signatures
// ============================================================================

/// A decorator as written: dotted callee plus the raw argument list, if any.
/// Decorators are recorded, not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decorator {
    /// Dotted name of the decorator expression (`functools.wraps`).
    pub name: String,
    /// Source text of the argument list, without the parentheses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
    pub line: u32,
}

impl Decorator {
    /// True when the dotted name's last segment equals `segment`
    /// (case-insensitive).
    pub fn last_segment_is(&self, segment: &str) -> bool {
        crate::qname::last_segment(&self.name).eq_ignore_ascii_case(segment)
    }
}

/// Parameter passing convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    PositionalOnly,
    PositionalOrKeyword,
    VariadicPositional,
    KeywordOnly,
    VariadicKeyword,
}

/// One formal parameter. `default` and `annotation` hold source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Parameter {
            name: name.into(),
            kind,
            default: None,
            annotation: None,
        }
    }
}

/// The signature of one `@overload` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overload {
    pub signature: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    pub line: u32,
}

// ============================================================================
// Kind payloads
// ============================================================================

/// A resolved base-class reference: either an entity in this System or an
/// external dotted name we could not resolve internally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseRef {
    Internal(DocId),
    External(String),
}

impl BaseRef {
    pub fn as_internal(&self) -> Option<DocId> {
        match self {
            BaseRef::Internal(id) => Some(*id),
            BaseRef::External(_) => None,
        }
    }
}

/// Payload shared by `Package` and `Module`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleData {
    /// The ordered public-name list, when the module assigns one. `Some`
    /// with an empty vector means "export nothing", which is distinct from
    /// `None` ("not set").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_exports: Option<Vec<String>>,
    /// Raw `__docformat__` declaration, language code stripped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_docformat: Option<String>,
    /// Import records in source order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<Import>,
    /// Local name -> absolute dotted target, covering imports, aliases and
    /// expanded wildcard imports. Used by the resolver.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bindings: BTreeMap<String, String>,
    /// Set when the module's source failed to parse and this entity is a
    /// placeholder.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub parse_error: bool,
}

/// Payload for `Class` and `Exception`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassData {
    /// Base-class expressions as written, subscripts and all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_bases: Vec<String>,
    /// Bases after name resolution, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolved_bases: Vec<BaseRef>,
    /// C3 linearization. Starts with the class itself, ends with the
    /// implicit root object type. Empty until post-processing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mro: Vec<BaseRef>,
    /// Set when C3 failed and `mro` holds the depth-first fallback.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub mro_failed: bool,
    /// Reverse index over `mro`, populated in post-processing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subclasses: Vec<DocId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorators: Vec<Decorator>,
    /// Methods considered constructors of this class.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constructor_methods: Vec<DocId>,
    /// Name bindings introduced by imports in the class body.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bindings: BTreeMap<String, String>,
}

/// Payload for functions, methods, class/static methods and properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionData {
    pub signature: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorators: Vec<Decorator>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_async: bool,
    /// This declaration carries the overload decorator.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_overload: bool,
    /// Sibling overload declarations collapsed into this entity. When
    /// non-empty, `signature` belongs to the (single) implementation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overloads: Vec<Overload>,
}

/// Payload for attribute kinds (`Property`, `Variable`,
/// `InstanceVariable`, `ClassVariable`, `Constant`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeData {
    /// Declared or literal-inferred type, as source text. For a property
    /// this is the getter's return annotation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<String>,
    /// Source form of the initializer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_source: Option<String>,
    /// Decorators carried over from the declaration. Populated for
    /// properties, whose getter's decorator list survives the
    /// reclassification.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorators: Vec<Decorator>,
}

/// Payload for explicit type aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeAliasData {
    pub value_source: String,
}

/// Payload for `TypeVar` declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeVariableData {
    /// Positional constraint expressions plus any `bound=` argument, as
    /// source text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
}

// ============================================================================
// EntityKind
// ============================================================================

/// The closed variant set of entity kinds. The tag doubles as the kind
/// discriminator of the serialized object model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum EntityKind {
    Package(ModuleData),
    Module(ModuleData),
    Class(ClassData),
    /// A class whose ancestry reaches an exception type.
    Exception(ClassData),
    Function(FunctionData),
    Method(FunctionData),
    ClassMethod(FunctionData),
    StaticMethod(FunctionData),
    /// A function reclassified by a property decorator. The Function kind
    /// is discarded; what remains is an attribute of the class.
    Property(AttributeData),
    Variable(AttributeData),
    InstanceVariable(AttributeData),
    ClassVariable(AttributeData),
    Constant(AttributeData),
    TypeAlias(TypeAliasData),
    TypeVariable(TypeVariableData),
}

impl EntityKind {
    /// Stable lowercase name of the kind, used in diagnostics and the
    /// dumped inventory.
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Package(_) => "package",
            EntityKind::Module(_) => "module",
            EntityKind::Class(_) => "class",
            EntityKind::Exception(_) => "exception",
            EntityKind::Function(_) => "function",
            EntityKind::Method(_) => "method",
            EntityKind::ClassMethod(_) => "classmethod",
            EntityKind::StaticMethod(_) => "staticmethod",
            EntityKind::Property(_) => "property",
            EntityKind::Variable(_) => "variable",
            EntityKind::InstanceVariable(_) => "instancevariable",
            EntityKind::ClassVariable(_) => "classvariable",
            EntityKind::Constant(_) => "constant",
            EntityKind::TypeAlias(_) => "typealias",
            EntityKind::TypeVariable(_) => "typevariable",
        }
    }

    pub fn is_module_like(&self) -> bool {
        matches!(self, EntityKind::Package(_) | EntityKind::Module(_))
    }

    pub fn is_class_like(&self) -> bool {
        matches!(self, EntityKind::Class(_) | EntityKind::Exception(_))
    }

    pub fn is_function_like(&self) -> bool {
        matches!(
            self,
            EntityKind::Function(_)
                | EntityKind::Method(_)
                | EntityKind::ClassMethod(_)
                | EntityKind::StaticMethod(_)
        )
    }

    pub fn is_attribute(&self) -> bool {
        matches!(
            self,
            EntityKind::Property(_)
                | EntityKind::Variable(_)
                | EntityKind::InstanceVariable(_)
                | EntityKind::ClassVariable(_)
                | EntityKind::Constant(_)
        )
    }

    pub fn as_module(&self) -> Option<&ModuleData> {
        match self {
            EntityKind::Package(d) | EntityKind::Module(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_module_mut(&mut self) -> Option<&mut ModuleData> {
        match self {
            EntityKind::Package(d) | EntityKind::Module(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassData> {
        match self {
            EntityKind::Class(d) | EntityKind::Exception(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_class_mut(&mut self) -> Option<&mut ClassData> {
        match self {
            EntityKind::Class(d) | EntityKind::Exception(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionData> {
        match self {
            EntityKind::Function(d)
            | EntityKind::Method(d)
            | EntityKind::ClassMethod(d)
            | EntityKind::StaticMethod(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_function_mut(&mut self) -> Option<&mut FunctionData> {
        match self {
            EntityKind::Function(d)
            | EntityKind::Method(d)
            | EntityKind::ClassMethod(d)
            | EntityKind::StaticMethod(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_attribute(&self) -> Option<&AttributeData> {
        match self {
            EntityKind::Property(d)
            | EntityKind::Variable(d)
            | EntityKind::InstanceVariable(d)
            | EntityKind::ClassVariable(d)
            | EntityKind::Constant(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_attribute_mut(&mut self) -> Option<&mut AttributeData> {
        match self {
            EntityKind::Property(d)
            | EntityKind::Variable(d)
            | EntityKind::InstanceVariable(d)
            | EntityKind::ClassVariable(d)
            | EntityKind::Constant(d) => Some(d),
            _ => None,
        }
    }
}

// ============================================================================
// Documentable
// ============================================================================

/// An addressable, named program entity: the arena node of the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Documentable {
    pub id: DocId,
    /// Last qname segment.
    pub name: String,
    /// Owning entity; `None` for roots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<DocId>,
    /// Dotted path from the root; the primary key.
    pub qname: String,
    pub kind: EntityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<Docstring>,
    /// Assigned during post-processing; `Public` before that.
    #[serde(default = "Privacy::public")]
    pub privacy: Privacy,
    /// True when the entity came from introspecting a compiled module
    /// rather than parsing source.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_introspected: bool,
    /// Direct children in creation order. The owner is exclusive: an id
    /// appears in at most one `children` list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DocId>,
    /// Open slot for extensions. Each extension owns its own key; the
    /// registry warns when a key is overwritten.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_info: BTreeMap<String, serde_json::Value>,
}

impl Documentable {
    pub fn new(id: DocId, name: String, parent: Option<DocId>, qname: String, kind: EntityKind) -> Self {
        Documentable {
            id,
            name,
            parent,
            qname,
            kind,
            location: None,
            docstring: None,
            privacy: Privacy::Public,
            is_introspected: false,
            children: Vec::new(),
            extra_info: BTreeMap::new(),
        }
    }

    /// The line this entity was defined on, when known.
    pub fn line(&self) -> Option<u32> {
        self.location.as_ref().map(|l| l.line)
    }
}

// ============================================================================
// Resolution results
// ============================================================================

/// Hit from an external inventory lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalHit {
    pub inventory: String,
    pub name: String,
    pub url: String,
}

/// Outcome of resolving a dotted name in the context of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The name refers to an entity in this System.
    Internal(DocId),
    /// The name was found in a loaded external inventory.
    External {
        inventory: String,
        qname: String,
        url: String,
    },
    /// Nothing matched; the reason is suitable for a warning message.
    Unresolved(String),
}

impl Resolution {
    pub fn as_internal(&self) -> Option<DocId> {
        match self {
            Resolution::Internal(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, Resolution::Unresolved(_))
    }
}
