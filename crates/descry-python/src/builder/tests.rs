//! Builder tests: single-module fixtures driven straight through
//! [`build_module`].

use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use descry_core::{
    CollectingReporter, DocId, EntityKind, ImportedNames, ModuleData, ParamKind, Privacy, System,
};

use crate::extensions::ExtensionRegistry;
use crate::options::{BranchOverride, Options};

use super::{build_module, new_parser};

fn build_with_options(source: &str, options: &Options) -> (System, DocId, Rc<CollectingReporter>) {
    let reporter = CollectingReporter::new();
    let mut system = System::with_reporter(reporter.clone());
    let module = system.add(None, "m", EntityKind::Module(ModuleData::default()));
    let extensions = ExtensionRegistry::new();
    let mut parser = new_parser().expect("grammar loads");
    build_module(
        &mut system,
        options,
        &extensions,
        &mut parser,
        module,
        Path::new("m.py"),
        source,
    );
    (system, module, reporter)
}

fn build(source: &str) -> (System, DocId, Rc<CollectingReporter>) {
    build_with_options(source, &Options::default())
}

fn child(system: &System, parent: DocId, name: &str) -> DocId {
    system
        .child_named(parent, name)
        .unwrap_or_else(|| panic!("no child named '{name}'"))
}

// ============================================================================
// Docstrings
// ============================================================================

#[test]
fn module_docstring_is_the_leading_string() {
    let (system, module, _) = build("\"\"\"The m module.\"\"\"\n\nx = 1\n");
    let doc = system.get(module);
    assert_eq!(doc.docstring.as_ref().unwrap().text, "The m module.");
    assert_eq!(doc.docstring.as_ref().unwrap().line, 1);
}

#[test]
fn class_and_method_docstrings_attach() {
    let source = r#"
class Greeter:
    """Says hello."""

    def greet(self, name):
        """Greet someone."""
        return name
"#;
    let (system, module, _) = build(source);
    let cls = child(&system, module, "Greeter");
    assert_eq!(
        system.get(cls).docstring.as_ref().unwrap().text,
        "Says hello."
    );
    let method = child(&system, cls, "greet");
    assert!(matches!(system.get(method).kind, EntityKind::Method(_)));
    assert_eq!(
        system.get(method).docstring.as_ref().unwrap().text,
        "Greet someone."
    );
}

#[test]
fn inline_attribute_docstring_attaches_to_the_assignment() {
    let source = "SQUARES = [n ** 2 for n in range(10)]\n\"\"\"Squares.\"\"\"\n";
    let (system, module, _) = build(source);
    let attr = child(&system, module, "SQUARES");
    let doc = system.get(attr);
    // Computed value: a Variable, not a Constant, and no inferred type.
    assert!(matches!(doc.kind, EntityKind::Variable(_)));
    assert_eq!(doc.docstring.as_ref().unwrap().text, "Squares.");
    assert_eq!(doc.kind.as_attribute().unwrap().declared_type, None);
}

#[test]
fn unrelated_string_statement_documents_nothing() {
    let source = "x = 1\nprint(x)\n\"\"\"Not a docstring.\"\"\"\n";
    let (system, module, _) = build(source);
    let attr = child(&system, module, "x");
    assert!(system.get(attr).docstring.is_none());
}

// ============================================================================
// Constants
// ============================================================================

#[test]
fn final_annotation_makes_a_constant() {
    let source = "X: Final = 3.14\n\"\"\"Pi approximation.\"\"\"\n";
    let (system, module, _) = build(source);
    let attr = child(&system, module, "X");
    let doc = system.get(attr);
    assert!(matches!(doc.kind, EntityKind::Constant(_)));
    let data = doc.kind.as_attribute().unwrap();
    assert_eq!(data.value_source.as_deref(), Some("3.14"));
    assert_eq!(data.declared_type.as_deref(), Some("float"));
    assert_eq!(doc.docstring.as_ref().unwrap().text, "Pi approximation.");
}

#[test]
fn final_subscript_unwraps_the_inner_type() {
    let (system, module, _) = build("LIMIT: Final[int] = 10\n");
    let data = system
        .get(child(&system, module, "LIMIT"))
        .kind
        .as_attribute()
        .unwrap()
        .clone();
    assert_eq!(data.declared_type.as_deref(), Some("int"));
    assert!(matches!(
        system.get(child(&system, module, "LIMIT")).kind,
        EntityKind::Constant(_)
    ));
}

#[test]
fn all_caps_literal_single_assignment_is_a_constant() {
    let (system, module, _) = build("MAX_RETRIES = 5\n");
    let doc = system.get(child(&system, module, "MAX_RETRIES"));
    assert!(matches!(doc.kind, EntityKind::Constant(_)));
    assert_eq!(
        doc.kind.as_attribute().unwrap().declared_type.as_deref(),
        Some("int")
    );
}

#[test]
fn reassigned_all_caps_name_stays_a_variable() {
    let (system, module, _) = build("MODE = \"a\"\nMODE = \"b\"\n");
    let doc = system.get(child(&system, module, "MODE"));
    assert!(matches!(doc.kind, EntityKind::Variable(_)));
}

#[test]
fn conditional_all_caps_assignment_stays_a_variable() {
    let source = "if os.name == \"nt\":\n    SEP = \"\\\\\"\n";
    let (system, module, _) = build(source);
    let doc = system.get(child(&system, module, "SEP"));
    assert!(matches!(doc.kind, EntityKind::Variable(_)));
}

// ============================================================================
// Signatures
// ============================================================================

#[test]
fn parameter_kinds_cover_the_full_grammar() {
    let source = "def f(a, b: int, c=1, d: str = \"x\", *args, e, **kw):\n    pass\n";
    let (system, module, _) = build(source);
    let func = child(&system, module, "f");
    let data = system.get(func).kind.as_function().unwrap();
    let kinds: Vec<(&str, ParamKind)> = data
        .signature
        .iter()
        .map(|p| (p.name.as_str(), p.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("a", ParamKind::PositionalOrKeyword),
            ("b", ParamKind::PositionalOrKeyword),
            ("c", ParamKind::PositionalOrKeyword),
            ("d", ParamKind::PositionalOrKeyword),
            ("args", ParamKind::VariadicPositional),
            ("e", ParamKind::KeywordOnly),
            ("kw", ParamKind::VariadicKeyword),
        ]
    );
    assert_eq!(data.signature[2].default.as_deref(), Some("1"));
    assert_eq!(data.signature[1].annotation.as_deref(), Some("int"));
    assert_eq!(data.signature[3].default.as_deref(), Some("\"x\""));
}

#[test]
fn positional_only_marker_reclassifies_earlier_parameters() {
    let source = "def f(a, b, /, c):\n    pass\n";
    let (system, module, _) = build(source);
    let data = system
        .get(child(&system, module, "f"))
        .kind
        .as_function()
        .unwrap()
        .clone();
    assert_eq!(data.signature[0].kind, ParamKind::PositionalOnly);
    assert_eq!(data.signature[1].kind, ParamKind::PositionalOnly);
    assert_eq!(data.signature[2].kind, ParamKind::PositionalOrKeyword);
}

#[test]
fn bare_star_starts_keyword_only_parameters() {
    let source = "def f(a, *, b):\n    pass\n";
    let (system, module, _) = build(source);
    let data = system
        .get(child(&system, module, "f"))
        .kind
        .as_function()
        .unwrap()
        .clone();
    assert_eq!(data.signature[1].name, "b");
    assert_eq!(data.signature[1].kind, ParamKind::KeywordOnly);
}

#[test]
fn duplicate_parameter_is_dropped_with_a_warning() {
    let (system, module, reporter) = build("def f(a, a):\n    pass\n");
    let data = system
        .get(child(&system, module, "f"))
        .kind
        .as_function()
        .unwrap()
        .clone();
    assert_eq!(data.signature.len(), 1);
    assert!(reporter.contains("duplicate parameter"));
}

#[test]
fn async_and_return_type_are_recorded() {
    let source = "async def fetch(url) -> bytes:\n    pass\n";
    let (system, module, _) = build(source);
    let data = system
        .get(child(&system, module, "fetch"))
        .kind
        .as_function()
        .unwrap()
        .clone();
    assert!(data.is_async);
    assert_eq!(data.return_type.as_deref(), Some("bytes"));
}

// ============================================================================
// Decorators and method kinds
// ============================================================================

#[test]
fn decorators_record_name_and_argument_source() {
    let source = "@deprecated(\"use g\", since=\"1.2\")\ndef f():\n    pass\n";
    let (system, module, _) = build(source);
    let data = system
        .get(child(&system, module, "f"))
        .kind
        .as_function()
        .unwrap()
        .clone();
    assert_eq!(data.decorators.len(), 1);
    assert_eq!(data.decorators[0].name, "deprecated");
    assert_eq!(
        data.decorators[0].args.as_deref(),
        Some("\"use g\", since=\"1.2\"")
    );
}

#[test]
fn property_decorator_reclassifies_and_setter_merges() {
    let source = r#"
class C:
    @property
    def value(self) -> int:
        """The value."""
        return self._value

    @value.setter
    def value(self, new):
        self._value = new

    @functools.cached_property
    def heavy(self):
        return 1
"#;
    let (system, module, reporter) = build(source);
    let cls = child(&system, module, "C");
    let value = child(&system, cls, "value");
    // The Function kind is discarded: what is left is an attribute whose
    // declared type is the getter's return annotation.
    let doc = system.get(value);
    match &doc.kind {
        EntityKind::Property(data) => {
            assert_eq!(data.declared_type.as_deref(), Some("int"));
            assert_eq!(data.value_source, None);
            assert_eq!(data.decorators.len(), 1);
            assert_eq!(data.decorators[0].name, "property");
        }
        other => panic!("unexpected kind {other:?}"),
    }
    assert!(doc.kind.is_attribute());
    assert!(!doc.kind.is_function_like());
    assert!(doc.kind.as_function().is_none());
    assert!(matches!(
        system.get(child(&system, cls, "heavy")).kind,
        EntityKind::Property(_)
    ));
    // The setter refined the property instead of shadowing it.
    assert!(!reporter.contains("duplicate definition of 'value'"));
    assert_eq!(doc.docstring.as_ref().unwrap().text, "The value.");
}

#[test]
fn deprecated_property_keeps_decorators_through_reclassification() {
    let source = r#"
class C:
    @deprecated("use width")
    @property
    def size(self) -> int:
        return 1

    @size.setter
    def size(self, new):
        pass
"#;
    let (mut system, module, reporter) = build(source);
    let cls = child(&system, module, "C");
    let size = child(&system, cls, "size");
    match &system.get(size).kind {
        EntityKind::Property(data) => {
            let names: Vec<&str> = data.decorators.iter().map(|d| d.name.as_str()).collect();
            assert_eq!(names, vec!["deprecated", "property"]);
        }
        other => panic!("unexpected kind {other:?}"),
    }
    assert!(!reporter.contains("duplicate definition of 'size'"));

    // The deprecation extension still sees the decorator after the
    // reclassification.
    let mut registry = ExtensionRegistry::new();
    crate::ext::deprecate::register(&mut registry);
    registry.post_process(&mut system);
    assert_eq!(
        system.get(size).extra_info[crate::ext::deprecate::SLOT],
        serde_json::json!({ "args": "\"use width\"" })
    );
}

#[test]
fn classmethod_and_staticmethod_kinds() {
    let source = r#"
class C:
    @classmethod
    def make(cls):
        pass

    @staticmethod
    def helper():
        pass
"#;
    let (system, module, _) = build(source);
    let cls = child(&system, module, "C");
    assert!(matches!(
        system.get(child(&system, cls, "make")).kind,
        EntityKind::ClassMethod(_)
    ));
    assert!(matches!(
        system.get(child(&system, cls, "helper")).kind,
        EntityKind::StaticMethod(_)
    ));
}

#[test]
fn overload_declarations_collapse_into_one_entity() {
    let source = r#"
from typing import overload

@overload
def parse(data: bytes) -> str: ...
@overload
def parse(data: str) -> str: ...
def parse(data):
    return str(data)
"#;
    let (system, module, _) = build(source);
    let func = child(&system, module, "parse");
    let data = system.get(func).kind.as_function().unwrap();
    assert_eq!(data.overloads.len(), 2);
    assert!(!data.is_overload);
    // The implementation's signature is canonical: no annotation.
    assert_eq!(data.signature.len(), 1);
    assert_eq!(data.signature[0].annotation, None);
    assert_eq!(data.overloads[0].signature[0].annotation.as_deref(), Some("bytes"));
    // One child only.
    let parses = system
        .get(module)
        .children
        .iter()
        .filter(|&&c| system.get(c).name == "parse")
        .count();
    assert_eq!(parses, 1);
}

// ============================================================================
// __all__ and __docformat__
// ============================================================================

#[test]
fn all_exports_parse_from_list_and_tuple() {
    let (system, module, _) = build("__all__ = [\"a\", \"b\"]\n");
    assert_eq!(
        system.get(module).kind.as_module().unwrap().all_exports,
        Some(vec!["a".to_string(), "b".to_string()])
    );

    let (system2, module2, _) = build("__all__ = (\"x\",)\n");
    assert_eq!(
        system2.get(module2).kind.as_module().unwrap().all_exports,
        Some(vec!["x".to_string()])
    );
}

#[test]
fn empty_all_means_export_nothing() {
    let (system, module, _) = build("__all__ = []\n");
    assert_eq!(
        system.get(module).kind.as_module().unwrap().all_exports,
        Some(Vec::new())
    );
}

#[test]
fn malformed_all_warns_and_stays_unset() {
    let (system, module, reporter) = build("__all__ = get_names()\n");
    assert_eq!(system.get(module).kind.as_module().unwrap().all_exports, None);
    assert!(reporter.contains("__all__"));
}

#[test]
fn non_string_all_element_warns_and_is_skipped() {
    let (system, module, reporter) = build("__all__ = [\"a\", 2, \"b\"]\n");
    assert_eq!(
        system.get(module).kind.as_module().unwrap().all_exports,
        Some(vec!["a".to_string(), "b".to_string()])
    );
    assert!(reporter.contains("element 1"));
}

#[test]
fn reassigned_all_warns_and_later_wins() {
    let (system, module, reporter) = build("__all__ = [\"a\"]\n__all__ = [\"b\"]\n");
    assert_eq!(
        system.get(module).kind.as_module().unwrap().all_exports,
        Some(vec!["b".to_string()])
    );
    assert!(reporter.contains("overrides previous assignment"));
}

#[test]
fn augmented_all_assignment_is_ignored_with_a_warning() {
    let (system, module, reporter) = build("__all__ = [\"a\"]\n__all__ += [\"b\"]\n");
    assert_eq!(
        system.get(module).kind.as_module().unwrap().all_exports,
        Some(vec!["a".to_string()])
    );
    assert!(reporter.contains("augmented assignment"));
}

#[test]
fn docformat_declaration_with_language_code() {
    let (system, module, _) = build("__docformat__ = \"reStructuredText en\"\n");
    assert_eq!(
        system
            .get(module)
            .kind
            .as_module()
            .unwrap()
            .declared_docformat
            .as_deref(),
        Some("restructuredtext")
    );
}

#[test]
fn unknown_docformat_warns_and_stays_unset() {
    let (system, module, reporter) = build("__docformat__ = \"markdown\"\n");
    assert_eq!(
        system.get(module).kind.as_module().unwrap().declared_docformat,
        None
    );
    assert!(reporter.contains("unknown docformat"));
}

#[test]
fn non_string_docformat_warns() {
    let (_, _, reporter) = build("__docformat__ = 42\n");
    assert!(reporter.contains("not a string"));
}

// ============================================================================
// Imports and bindings
// ============================================================================

#[test]
fn plain_and_aliased_imports_bind_names() {
    let source = "import os.path\nimport json as j\n";
    let (system, module, _) = build(source);
    let data = system.get(module).kind.as_module().unwrap();
    assert_eq!(data.imports.len(), 2);
    assert_eq!(data.bindings.get("os").map(String::as_str), Some("os"));
    assert_eq!(data.bindings.get("j").map(String::as_str), Some("json"));
}

#[test]
fn from_import_records_pairs_and_reexport_intent() {
    let source = "from collections import OrderedDict as OD\nfrom api import Thing as Thing\n";
    let (system, module, _) = build(source);
    let data = system.get(module).kind.as_module().unwrap();
    assert_eq!(
        data.bindings.get("OD").map(String::as_str),
        Some("collections.OrderedDict")
    );
    assert!(!data.imports[0].is_reexport);
    // Redundant alias signals re-export intent.
    assert!(data.imports[1].is_reexport);
    match &data.imports[1].names {
        ImportedNames::Named(pairs) => {
            assert_eq!(pairs, &[("Thing".to_string(), "Thing".to_string())])
        }
        ImportedNames::Wildcard => panic!("not a wildcard"),
    }
}

#[test]
fn relative_import_expands_against_the_package() {
    let reporter = CollectingReporter::new();
    let mut system = System::with_reporter(reporter.clone());
    let pkg = system.add(None, "pkg", EntityKind::Package(ModuleData::default()));
    let module = system.add(Some(pkg), "mod", EntityKind::Module(ModuleData::default()));
    let extensions = ExtensionRegistry::new();
    let mut parser = new_parser().unwrap();
    build_module(
        &mut system,
        &Options::default(),
        &extensions,
        &mut parser,
        module,
        Path::new("pkg/mod.py"),
        "from .sibling import helper\n",
    );
    let data = system.get(module).kind.as_module().unwrap();
    assert_eq!(
        data.bindings.get("helper").map(String::as_str),
        Some("pkg.sibling.helper")
    );
    assert_eq!(data.imports[0].source, "pkg.sibling");
}

#[test]
fn relative_import_past_the_root_warns() {
    let (_, _, reporter) = build("from ...above import x\n");
    assert!(reporter.contains("past the package root"));
}

#[test]
fn wildcard_import_honors_the_source_all_list() {
    let reporter = CollectingReporter::new();
    let mut system = System::with_reporter(reporter.clone());
    let source_mod = system.add(None, "src", EntityKind::Module(ModuleData::default()));
    let user_mod = system.add(None, "user", EntityKind::Module(ModuleData::default()));
    let extensions = ExtensionRegistry::new();
    let mut parser = new_parser().unwrap();
    build_module(
        &mut system,
        &Options::default(),
        &extensions,
        &mut parser,
        source_mod,
        Path::new("src.py"),
        "__all__ = [\"a\"]\na = 1\nb = 2\n_c = 3\n",
    );
    build_module(
        &mut system,
        &Options::default(),
        &extensions,
        &mut parser,
        user_mod,
        Path::new("user.py"),
        "from src import *\n",
    );
    let data = system.get(user_mod).kind.as_module().unwrap();
    assert_eq!(data.bindings.get("a").map(String::as_str), Some("src.a"));
    assert!(!data.bindings.contains_key("b"));
    assert!(!data.bindings.contains_key("_c"));
    assert!(matches!(data.imports[0].names, ImportedNames::Wildcard));
}

#[test]
fn wildcard_import_without_all_takes_public_names() {
    let reporter = CollectingReporter::new();
    let mut system = System::with_reporter(reporter.clone());
    let source_mod = system.add(None, "src", EntityKind::Module(ModuleData::default()));
    let user_mod = system.add(None, "user", EntityKind::Module(ModuleData::default()));
    let extensions = ExtensionRegistry::new();
    let mut parser = new_parser().unwrap();
    build_module(
        &mut system,
        &Options::default(),
        &extensions,
        &mut parser,
        source_mod,
        Path::new("src.py"),
        "a = 1\n_hidden = 2\n",
    );
    build_module(
        &mut system,
        &Options::default(),
        &extensions,
        &mut parser,
        user_mod,
        Path::new("user.py"),
        "from src import *\n",
    );
    let data = system.get(user_mod).kind.as_module().unwrap();
    assert!(data.bindings.contains_key("a"));
    assert!(!data.bindings.contains_key("_hidden"));
}

#[test]
fn alias_assignment_records_a_binding_not_an_attribute() {
    let source = "class Processor:\n    pass\n\nP = Processor\n";
    let (system, module, _) = build(source);
    assert!(system.child_named(module, "P").is_none());
    let data = system.get(module).kind.as_module().unwrap();
    assert_eq!(
        data.bindings.get("P").map(String::as_str),
        Some("m.Processor")
    );
}

// ============================================================================
// Conditional branches
// ============================================================================

#[test]
fn type_checking_override_skips_the_guarded_branch() {
    let mut options = Options::default();
    options.branch_overrides.push(BranchOverride {
        qname_pattern: "m".to_string(),
        guards: BTreeMap::from([("TYPE_CHECKING".to_string(), false)]),
    });
    let source = "from typing import TYPE_CHECKING\nif TYPE_CHECKING:\n    from circ import T\n";
    let (system, module, _) = build_with_options(source, &options);
    let data = system.get(module).kind.as_module().unwrap();
    assert!(!data.bindings.contains_key("T"));
    assert_eq!(data.imports.len(), 1); // only the typing import
}

#[test]
fn unconfigured_guard_takes_both_branches() {
    let source = "if TYPE_CHECKING:\n    a = 1\nelse:\n    b = 2\n";
    let (system, module, _) = build(source);
    assert!(system.child_named(module, "a").is_some());
    assert!(system.child_named(module, "b").is_some());
}

#[test]
fn negated_guard_override_inverts_the_branch() {
    let mut options = Options::default();
    options.branch_overrides.push(BranchOverride {
        qname_pattern: "m".to_string(),
        guards: BTreeMap::from([("COMPAT".to_string(), false)]),
    });
    let source = "if not COMPAT:\n    new = 1\nelse:\n    old = 2\n";
    let (system, module, _) = build_with_options(source, &options);
    assert!(system.child_named(module, "new").is_some());
    assert!(system.child_named(module, "old").is_none());
}

#[test]
fn false_elif_guard_skips_its_branch_too() {
    let mut options = Options::default();
    options.branch_overrides.push(BranchOverride {
        qname_pattern: "m".to_string(),
        guards: BTreeMap::from([
            ("TYPE_CHECKING".to_string(), false),
            ("OTHER_FLAG".to_string(), false),
        ]),
    });
    let source = "if TYPE_CHECKING:\n    from circ import T\nelif OTHER_FLAG:\n    from other import U\nelse:\n    fallback = 1\n";
    let (system, module, _) = build_with_options(source, &options);
    let data = system.get(module).kind.as_module().unwrap();
    assert!(!data.bindings.contains_key("T"));
    assert!(!data.bindings.contains_key("U"));
    assert!(system.child_named(module, "fallback").is_some());
}

#[test]
fn true_elif_guard_takes_its_branch_and_ends_the_chain() {
    let mut options = Options::default();
    options.branch_overrides.push(BranchOverride {
        qname_pattern: "m".to_string(),
        guards: BTreeMap::from([("A".to_string(), false), ("B".to_string(), true)]),
    });
    let source = "if A:\n    x = 1\nelif B:\n    y = 2\nelse:\n    z = 3\n";
    let (system, module, _) = build_with_options(source, &options);
    assert!(system.child_named(module, "x").is_none());
    assert!(system.child_named(module, "y").is_some());
    assert!(system.child_named(module, "z").is_none());
}

#[test]
fn dunder_main_block_is_skipped() {
    let source = "if __name__ == \"__main__\":\n    cli_entry = 1\n";
    let (system, module, _) = build(source);
    assert!(system.child_named(module, "cli_entry").is_none());
}

// ============================================================================
// Type aliases, type variables, type comments
// ============================================================================

#[test]
fn type_var_with_constraints_and_bound() {
    let source = "T = TypeVar(\"T\")\nU = TypeVar(\"U\", int, str)\nV = TypeVar(\"V\", bound=Base)\n";
    let (system, module, _) = build(source);
    let t = system.get(child(&system, module, "T"));
    assert!(matches!(t.kind, EntityKind::TypeVariable(_)));
    match &system.get(child(&system, module, "U")).kind {
        EntityKind::TypeVariable(data) => {
            assert_eq!(data.constraints, vec!["int".to_string(), "str".to_string()])
        }
        other => panic!("unexpected kind {other:?}"),
    }
    match &system.get(child(&system, module, "V")).kind {
        EntityKind::TypeVariable(data) => assert_eq!(data.constraints, vec!["Base".to_string()]),
        other => panic!("unexpected kind {other:?}"),
    }
}

#[test]
fn annotated_type_alias_is_recognized() {
    let source = "Handler: TypeAlias = Callable[[int], None]\n";
    let (system, module, _) = build(source);
    match &system.get(child(&system, module, "Handler")).kind {
        EntityKind::TypeAlias(data) => {
            assert_eq!(data.value_source, "Callable[[int], None]")
        }
        other => panic!("unexpected kind {other:?}"),
    }
}

#[test]
fn type_statement_makes_a_type_alias() {
    let source = "type Vector = list[float]\n";
    let (system, module, _) = build(source);
    match &system.get(child(&system, module, "Vector")).kind {
        EntityKind::TypeAlias(data) => assert_eq!(data.value_source, "list[float]"),
        other => panic!("unexpected kind {other:?}"),
    }
}

#[test]
fn trailing_type_comment_supplies_the_annotation() {
    let source = "paths = []  # type: list[str]\n";
    let (system, module, _) = build(source);
    let data = system
        .get(child(&system, module, "paths"))
        .kind
        .as_attribute()
        .unwrap()
        .clone();
    assert_eq!(data.declared_type.as_deref(), Some("list[str]"));
}

// ============================================================================
// Attributes and scopes
// ============================================================================

#[test]
fn annotated_declaration_without_value() {
    let source = "class C:\n    count: int\n";
    let (system, module, _) = build(source);
    let cls = child(&system, module, "C");
    let attr = system.get(child(&system, cls, "count"));
    assert!(matches!(attr.kind, EntityKind::ClassVariable(_)));
    let data = attr.kind.as_attribute().unwrap();
    assert_eq!(data.declared_type.as_deref(), Some("int"));
    assert_eq!(data.value_source, None);
}

#[test]
fn constructor_assignments_become_instance_variables() {
    let source = r#"
class C:
    shared = 0

    def __init__(self, size):
        self.size = size
        """Number of slots."""
        self.shared = 1
"#;
    let (system, module, _) = build(source);
    let cls = child(&system, module, "C");
    let size = system.get(child(&system, cls, "size"));
    assert!(matches!(size.kind, EntityKind::InstanceVariable(_)));
    assert_eq!(size.docstring.as_ref().unwrap().text, "Number of slots.");
    // Instance assignment promotes the class variable.
    assert!(matches!(
        system.get(child(&system, cls, "shared")).kind,
        EntityKind::InstanceVariable(_)
    ));
}

#[test]
fn non_constructor_method_bodies_are_not_scanned() {
    let source = r#"
class C:
    def configure(self):
        self.late = 1
"#;
    let (system, module, _) = build(source);
    let cls = child(&system, module, "C");
    assert!(system.child_named(cls, "late").is_none());
}

#[test]
fn nested_functions_are_not_documented() {
    let source = "def outer():\n    def inner():\n        pass\n";
    let (system, module, _) = build(source);
    assert!(system.child_named(module, "inner").is_none());
    let outer = child(&system, module, "outer");
    assert!(system.get(outer).children.is_empty());
}

#[test]
fn nested_classes_are_documented() {
    let source = "class Outer:\n    class Inner:\n        pass\n";
    let (system, module, _) = build(source);
    let outer = child(&system, module, "Outer");
    let inner = child(&system, outer, "Inner");
    assert_eq!(system.get(inner).qname, "m.Outer.Inner");
}

#[test]
fn bound_callable_reassignment_keeps_the_function() {
    let source = "def func(value):\n    pass\n\nfunc = partial(func, value=2)\n";
    let (system, module, _) = build(source);
    let func = system.get(child(&system, module, "func"));
    assert!(matches!(func.kind, EntityKind::Function(_)));
}

#[test]
fn class_bases_are_recorded_raw() {
    let source = "class D(Base, Generic[T], metaclass=Meta):\n    pass\n";
    let (system, module, _) = build(source);
    let data = system
        .get(child(&system, module, "D"))
        .kind
        .as_class()
        .unwrap()
        .clone();
    assert_eq!(data.raw_bases, vec!["Base".to_string(), "Generic[T]".to_string()]);
}

// ============================================================================
// Robustness
// ============================================================================

#[test]
fn malformed_source_yields_a_placeholder_not_a_crash() {
    let source = "def broken(:\n  ][ what\nclass ok:\n    pass\n";
    let (system, module, reporter) = build(source);
    assert!(system.get(module).kind.as_module().unwrap().parse_error);
    assert!(reporter.contains("syntax errors"));
}

#[test]
fn privacy_defaults_follow_names_after_postprocessing() {
    // Scenario: class A(Base) with __init__, _helper, __eq__.
    let source = r#"
class A(Base):
    def __init__(self):
        pass

    def _helper(self):
        pass

    def __eq__(self, other):
        pass
"#;
    let (system, module, _) = build(source);
    let cls = child(&system, module, "A");
    assert_eq!(system.compute_privacy(cls), Privacy::Public);
    assert_eq!(
        system.compute_privacy(child(&system, cls, "__init__")),
        Privacy::Public
    );
    assert_eq!(
        system.compute_privacy(child(&system, cls, "_helper")),
        Privacy::Private
    );
    assert_eq!(
        system.compute_privacy(child(&system, cls, "__eq__")),
        Privacy::Public
    );
}
