//! The AST builder: one pass over a module's syntax tree.
//!
//! Each source module is parsed once with tree-sitter and walked top-down.
//! The walk populates the module's Documentables (classes, functions,
//! attributes), import records and name bindings, `__all__` and
//! `__docformat__` declarations, decorators, annotations, inline attribute
//! docstrings and type comments. Registered AST-visitor extensions run
//! around the built-in handling of every statement.
//!
//! The builder is tolerant by construction: tree-sitter yields a tree for
//! arbitrary input, unparseable corners produce warnings and placeholder
//! state, and nothing here aborts the pipeline.

pub mod exprs;

#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use tree_sitter::{Node, Parser};

use descry_core::{
    AttributeData, ClassData, Decorator, DocId, Docstring, EntityKind, FunctionData, Import,
    ImportedNames, Overload, Parameter, ParamKind, QnameGlob, SourceLocation, System,
    TypeAliasData, TypeVariableData, Warning,
};

use crate::extensions::{ExtensionRegistry, VisitContext};
use crate::options::Options;
use exprs::{
    dotted_name, infer_literal_type, is_literal_expr, is_main_guard, line_of, node_text,
    recognize_guard, string_literal_value, strip_subscript, subscript_argument,
};

/// Create a parser configured for the source language.
pub fn new_parser() -> Result<Parser, tree_sitter::LanguageError> {
    let mut parser = Parser::new();
    parser.set_language(&tree_sitter_python::LANGUAGE.into())?;
    Ok(parser)
}

/// The lexical scope a statement is visited in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Module,
    Class,
    /// Body of a recognized constructor; assignments to `self.<name>`
    /// become instance variables of the given class.
    Constructor(DocId),
}

// ============================================================================
// Entry point
// ============================================================================

/// Parse `source` and populate the (already created) module entity.
pub fn build_module(
    system: &mut System,
    options: &Options,
    extensions: &ExtensionRegistry,
    parser: &mut Parser,
    module_id: DocId,
    path: &Path,
    source: &str,
) {
    let tree = match parser.parse(source, None) {
        Some(tree) => tree,
        None => {
            system.report(Warning::new(
                "ast",
                format!("failed to parse {}", path.display()),
            ));
            if let Some(data) = system.get_mut(module_id).kind.as_module_mut() {
                data.parse_error = true;
            }
            return;
        }
    };
    let root = tree.root_node();
    if root.has_error() {
        system.report(
            Warning::new("ast", "syntax errors; documentation may be incomplete")
                .at(SourceLocation::new(path.to_path_buf(), 1)),
        );
        if let Some(data) = system.get_mut(module_id).kind.as_module_mut() {
            data.parse_error = true;
        }
    }

    let module_qname = system.get(module_id).qname.clone();
    let mut guards: BTreeMap<String, bool> = BTreeMap::new();
    for over in &options.branch_overrides {
        let matches = QnameGlob::new(&over.qname_pattern)
            .map(|glob| glob.matches(&module_qname))
            .unwrap_or(false);
        if matches {
            guards.extend(over.guards.iter().map(|(k, v)| (k.clone(), *v)));
        }
    }

    let mut builder = ModuleBuilder {
        system,
        extensions,
        module_id,
        path,
        source,
        guards,
        control_depth: 0,
        last_attr: None,
        attrs_created: Vec::new(),
        assign_counts: HashMap::new(),
        conditional: HashSet::new(),
        literal_attrs: HashSet::new(),
        final_attrs: HashSet::new(),
        all_line: None,
        docformat_line: None,
    };
    if let Some(docstring) = builder.suite_docstring(root) {
        builder.system.get_mut(module_id).docstring = Some(docstring);
    }
    builder.visit_suite(root, module_id, ScopeKind::Module);
    builder.finalize_constants();
}

// ============================================================================
// ModuleBuilder
// ============================================================================

struct ModuleBuilder<'a> {
    system: &'a mut System,
    extensions: &'a ExtensionRegistry,
    module_id: DocId,
    path: &'a Path,
    source: &'a str,
    guards: BTreeMap<String, bool>,
    control_depth: u32,
    /// The attribute the previous statement assigned, for inline docstring
    /// attachment.
    last_attr: Option<DocId>,
    attrs_created: Vec<DocId>,
    assign_counts: HashMap<(DocId, String), u32>,
    conditional: HashSet<(DocId, String)>,
    /// Attributes whose latest initializer is a literal.
    literal_attrs: HashSet<DocId>,
    /// Attributes annotated `Final`.
    final_attrs: HashSet<DocId>,
    all_line: Option<u32>,
    docformat_line: Option<u32>,
}

impl<'a> ModuleBuilder<'a> {
    fn loc(&self, node: Node<'_>) -> SourceLocation {
        SourceLocation::new(self.path.to_path_buf(), line_of(node))
            .with_column(node.start_position().column as u32)
    }

    fn warn(&self, section: &str, message: String, node: Node<'_>) {
        self.system
            .report(Warning::new(section, message).at(self.loc(node)));
    }

    fn text(&self, node: Node<'_>) -> &'a str {
        node_text(node, self.source)
    }

    // ------------------------------------------------------------------
    // Statement dispatch
    // ------------------------------------------------------------------

    fn visit_suite(&mut self, suite: Node<'_>, scope: DocId, kind: ScopeKind) {
        let mut cursor = suite.walk();
        // Comments are named nodes in this grammar; they must not disturb
        // statement adjacency (docstring attachment relies on it).
        let statements: Vec<Node<'_>> = suite
            .named_children(&mut cursor)
            .filter(|n| n.kind() != "comment")
            .collect();
        for statement in statements {
            self.visit_statement(statement, scope, kind);
        }
    }

    fn visit_statement(&mut self, statement: Node<'_>, scope: DocId, kind: ScopeKind) {
        self.extensions.visit(
            statement,
            &mut VisitContext {
                system: &mut *self.system,
                module: self.module_id,
                scope,
                source: self.source,
                path: self.path,
            },
        );
        let previous_attr = self.last_attr.take();
        match statement.kind() {
            "import_statement" | "import_from_statement" | "future_import_statement" => {
                self.handle_import(statement, scope, kind)
            }
            "class_definition" => self.handle_class(statement, Vec::new(), scope, kind),
            "function_definition" => self.handle_function(statement, Vec::new(), scope, kind),
            "decorated_definition" => self.handle_decorated(statement, scope, kind),
            "expression_statement" => {
                if let Some(inner) = statement.named_child(0) {
                    match inner.kind() {
                        "assignment" => self.handle_assignment(inner, scope, kind),
                        "augmented_assignment" => self.handle_augmented(inner, scope, kind),
                        "string" | "concatenated_string" => {
                            self.handle_bare_string(inner, previous_attr)
                        }
                        _ => {}
                    }
                }
            }
            "if_statement" => self.handle_if(statement, scope, kind),
            "try_statement" | "for_statement" | "while_statement" | "with_statement"
            | "match_statement" => self.visit_nested_blocks(statement, scope, kind),
            "type_alias_statement" => self.handle_type_statement(statement, scope, kind),
            _ => {}
        }
        self.extensions.depart(
            statement,
            &mut VisitContext {
                system: &mut *self.system,
                module: self.module_id,
                scope,
                source: self.source,
                path: self.path,
            },
        );
    }

    /// Descend into every block of a control-flow statement. Definitions
    /// inside count as conditional for constant detection.
    fn visit_nested_blocks(&mut self, statement: Node<'_>, scope: DocId, kind: ScopeKind) {
        self.control_depth += 1;
        let mut cursor = statement.walk();
        let blocks: Vec<Node<'_>> = statement
            .children(&mut cursor)
            .filter(|c| c.kind() == "block")
            .collect();
        for block in blocks {
            self.visit_suite(block, scope, kind);
        }
        // else/except/finally clauses carry their own blocks.
        let mut cursor = statement.walk();
        let clauses: Vec<Node<'_>> = statement
            .children(&mut cursor)
            .filter(|c| {
                matches!(
                    c.kind(),
                    "else_clause" | "except_clause" | "except_group_clause" | "finally_clause"
                        | "case_clause"
                )
            })
            .collect();
        for clause in clauses {
            let mut inner = clause.walk();
            let blocks: Vec<Node<'_>> = clause
                .children(&mut inner)
                .filter(|c| c.kind() == "block")
                .collect();
            for block in blocks {
                self.visit_suite(block, scope, kind);
            }
        }
        self.control_depth -= 1;
    }

    // ------------------------------------------------------------------
    // Conditional branches
    // ------------------------------------------------------------------

    fn handle_if(&mut self, statement: Node<'_>, scope: DocId, kind: ScopeKind) {
        let Some(condition) = statement.child_by_field_name("condition") else {
            return;
        };
        // Whatever hides behind the entry-point guard cannot be imported,
        // so it is not part of the API.
        if is_main_guard(condition, self.source) {
            return;
        }
        let configured = recognize_guard(condition, self.source)
            .and_then(|(name, negated)| self.guards.get(&name).map(|&v| v != negated));

        self.control_depth += 1;
        match configured {
            Some(true) => {
                if let Some(consequence) = statement.child_by_field_name("consequence") {
                    self.visit_suite(consequence, scope, kind);
                }
            }
            Some(false) => self.visit_if_alternatives(statement, scope, kind),
            None => {
                if let Some(consequence) = statement.child_by_field_name("consequence") {
                    self.visit_suite(consequence, scope, kind);
                }
                self.visit_if_alternatives(statement, scope, kind);
            }
        }
        self.control_depth -= 1;
    }

    fn visit_if_alternatives(&mut self, statement: Node<'_>, scope: DocId, kind: ScopeKind) {
        let mut cursor = statement.walk();
        let alternatives: Vec<Node<'_>> = statement
            .children_by_field_name("alternative", &mut cursor)
            .collect();
        for alternative in alternatives {
            match alternative.kind() {
                "elif_clause" => {
                    // An elif is a nested if: its own condition goes
                    // through the same guard policy as the top-level one.
                    let configured = alternative
                        .child_by_field_name("condition")
                        .and_then(|c| recognize_guard(c, self.source))
                        .and_then(|(name, negated)| {
                            self.guards.get(&name).map(|&v| v != negated)
                        });
                    match configured {
                        Some(true) => {
                            if let Some(consequence) =
                                alternative.child_by_field_name("consequence")
                            {
                                self.visit_suite(consequence, scope, kind);
                            }
                            // A branch known taken ends the chain.
                            return;
                        }
                        Some(false) => {}
                        None => {
                            if let Some(consequence) =
                                alternative.child_by_field_name("consequence")
                            {
                                self.visit_suite(consequence, scope, kind);
                            }
                        }
                    }
                }
                "else_clause" => {
                    if let Some(body) = alternative.child_by_field_name("body") {
                        self.visit_suite(body, scope, kind);
                    }
                }
                _ => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Docstrings
    // ------------------------------------------------------------------

    /// Docstring of a module or definition body: a leading string
    /// expression statement.
    fn suite_docstring(&self, suite: Node<'_>) -> Option<Docstring> {
        let mut cursor = suite.walk();
        let first = suite
            .named_children(&mut cursor)
            .find(|n| n.kind() != "comment")?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let inner = first.named_child(0)?;
        let text = string_literal_value(inner, self.source)?;
        Some(Docstring::new(text, line_of(inner)))
    }

    /// A bare string immediately after an assignment documents the
    /// just-assigned attribute.
    fn handle_bare_string(&mut self, string: Node<'_>, previous_attr: Option<DocId>) {
        let Some(attr) = previous_attr else { return };
        if self.system.get(attr).docstring.is_some() {
            return;
        }
        if let Some(text) = string_literal_value(string, self.source) {
            self.system.get_mut(attr).docstring = Some(Docstring::new(text, line_of(string)));
        }
    }

    // ------------------------------------------------------------------
    // Imports
    // ------------------------------------------------------------------

    fn handle_import(&mut self, statement: Node<'_>, scope: DocId, kind: ScopeKind) {
        if matches!(kind, ScopeKind::Constructor(_)) {
            return;
        }
        match statement.kind() {
            "import_statement" => self.handle_plain_import(statement, scope),
            "import_from_statement" | "future_import_statement" => {
                self.handle_from_import(statement, scope)
            }
            _ => {}
        }
    }

    fn handle_plain_import(&mut self, statement: Node<'_>, scope: DocId) {
        let line = line_of(statement);
        let mut cursor = statement.walk();
        let items: Vec<Node<'_>> = statement.named_children(&mut cursor).collect();
        for item in items {
            let (source_module, local) = match item.kind() {
                "dotted_name" => {
                    let full = self.text(item).to_string();
                    let top = full.split('.').next().unwrap_or(&full).to_string();
                    (full, top)
                }
                "aliased_import" => {
                    let Some(name) = item.child_by_field_name("name") else {
                        continue;
                    };
                    let Some(alias) = item.child_by_field_name("alias") else {
                        continue;
                    };
                    (
                        self.text(name).to_string(),
                        self.text(alias).to_string(),
                    )
                }
                _ => continue,
            };
            // `import a.b` binds `a`; `import a.b as c` binds `c` to `a.b`.
            let target = if local == source_module.split('.').next().unwrap_or("") {
                local.clone()
            } else {
                source_module.clone()
            };
            self.insert_binding(scope, local.clone(), target);
            self.record_import(
                scope,
                Import {
                    source: source_module.clone(),
                    names: ImportedNames::Named(vec![(source_module, local)]),
                    is_reexport: false,
                    line,
                },
            );
        }
    }

    fn handle_from_import(&mut self, statement: Node<'_>, scope: DocId) {
        let line = line_of(statement);
        let Some(module_name) = statement.child_by_field_name("module_name") else {
            return;
        };
        let Some(base) = self.expand_import_base(module_name) else {
            self.warn(
                "ast",
                "cannot resolve relative import past the package root".to_string(),
                statement,
            );
            return;
        };

        let mut cursor = statement.walk();
        let children: Vec<Node<'_>> = statement.named_children(&mut cursor).collect();
        let mut pairs: Vec<(String, String)> = Vec::new();
        let mut any_reexport = false;
        for child in children {
            // The module_name field shows up in this iteration too.
            if child.id() == module_name.id() {
                continue;
            }
            match child.kind() {
                "wildcard_import" => {
                    self.expand_wildcard(scope, &base, statement);
                    self.record_import(
                        scope,
                        Import {
                            source: base.clone(),
                            names: ImportedNames::Wildcard,
                            is_reexport: false,
                            line,
                        },
                    );
                    return;
                }
                "dotted_name" => {
                    let name = self.text(child).to_string();
                    pairs.push((name.clone(), name));
                }
                "aliased_import" => {
                    let (Some(name), Some(alias)) = (
                        child.child_by_field_name("name"),
                        child.child_by_field_name("alias"),
                    ) else {
                        continue;
                    };
                    let name = self.text(name).to_string();
                    let alias = self.text(alias).to_string();
                    // The redundant-alias form signals re-export intent.
                    any_reexport |= name == alias;
                    pairs.push((name, alias));
                }
                _ => {}
            }
        }
        if pairs.is_empty() {
            return;
        }
        for (original, local) in &pairs {
            let target = if base.is_empty() {
                original.clone()
            } else {
                format!("{base}.{original}")
            };
            self.insert_binding(scope, local.clone(), target);
        }
        self.record_import(
            scope,
            Import {
                source: base,
                names: ImportedNames::Named(pairs),
                is_reexport: any_reexport,
                line,
            },
        );
    }

    /// Absolute dotted base of a `from` import; expands leading dots
    /// against the current module. Returns `None` when the relative prefix
    /// climbs past the root.
    fn expand_import_base(&self, module_name: Node<'_>) -> Option<String> {
        match module_name.kind() {
            "dotted_name" => Some(self.text(module_name).to_string()),
            "relative_import" => {
                let text = self.text(module_name);
                let dots = text.chars().take_while(|&c| c == '.').count();
                let suffix = text.trim_start_matches('.');
                let module = self.system.get(self.module_id);
                let is_package = matches!(module.kind, EntityKind::Package(_));
                // One dot means the containing package: the module's own
                // qname for initializers, its parent otherwise.
                let mut anchor: Vec<&str> = module.qname.split('.').collect();
                if !is_package {
                    anchor.pop();
                }
                for _ in 1..dots {
                    anchor.pop()?;
                    if anchor.is_empty() {
                        return None;
                    }
                }
                if anchor.is_empty() {
                    return None;
                }
                let mut base = anchor.join(".");
                if !suffix.is_empty() {
                    base.push('.');
                    base.push_str(suffix);
                }
                Some(base)
            }
            _ => None,
        }
    }

    /// Expand `from base import *` into bindings, honoring the source
    /// module's public-name list when it has one. Only names known at this
    /// moment are imported; later additions are not tracked.
    fn expand_wildcard(&mut self, scope: DocId, base: &str, statement: Node<'_>) {
        let Some(source_id) = self.system.lookup(base) else {
            self.warn(
                "ast",
                format!("cannot expand wildcard import from unprocessed module '{base}'"),
                statement,
            );
            return;
        };
        let exposed: Vec<String> = match self
            .system
            .get(source_id)
            .kind
            .as_module()
            .and_then(|d| d.all_exports.clone())
        {
            Some(exports) => exports,
            None => self
                .system
                .get(source_id)
                .children
                .iter()
                .map(|&c| self.system.get(c).name.clone())
                .filter(|n| !n.starts_with('_'))
                .collect(),
        };
        for name in exposed {
            let target = format!("{base}.{name}");
            self.insert_binding(scope, name, target);
        }
    }

    fn insert_binding(&mut self, scope: DocId, local: String, target: String) {
        let doc = self.system.get_mut(scope);
        if let Some(data) = doc.kind.as_module_mut() {
            data.bindings.insert(local, target);
        } else if let Some(data) = doc.kind.as_class_mut() {
            data.bindings.insert(local, target);
        }
    }

    fn record_import(&mut self, scope: DocId, import: Import) {
        // Import records live on the module even for class-body imports;
        // the class keeps only the binding.
        let _ = scope;
        if let Some(data) = self.system.get_mut(self.module_id).kind.as_module_mut() {
            data.imports.push(import);
        }
    }

    // ------------------------------------------------------------------
    // Classes
    // ------------------------------------------------------------------

    fn handle_decorated(&mut self, statement: Node<'_>, scope: DocId, kind: ScopeKind) {
        let mut decorators = Vec::new();
        let mut cursor = statement.walk();
        let children: Vec<Node<'_>> = statement.children(&mut cursor).collect();
        for child in children {
            if child.kind() == "decorator" {
                if let Some(decorator) = self.extract_decorator(child) {
                    decorators.push(decorator);
                }
            }
        }
        if let Some(definition) = statement.child_by_field_name("definition") {
            match definition.kind() {
                "class_definition" => self.handle_class(definition, decorators, scope, kind),
                "function_definition" => self.handle_function(definition, decorators, scope, kind),
                _ => {}
            }
        }
    }

    fn extract_decorator(&self, node: Node<'_>) -> Option<Decorator> {
        let expr = node.named_child(0)?;
        let line = line_of(node);
        if expr.kind() == "call" {
            let callee = expr.child_by_field_name("function")?;
            let name = dotted_name(callee, self.source)
                .unwrap_or_else(|| self.text(callee).to_string());
            let args = expr.child_by_field_name("arguments").map(|a| {
                self.text(a)
                    .trim_start_matches('(')
                    .trim_end_matches(')')
                    .to_string()
            });
            return Some(Decorator { name, args, line });
        }
        let name = dotted_name(expr, self.source).unwrap_or_else(|| self.text(expr).to_string());
        Some(Decorator {
            name,
            args: None,
            line,
        })
    }

    fn handle_class(
        &mut self,
        node: Node<'_>,
        decorators: Vec<Decorator>,
        scope: DocId,
        kind: ScopeKind,
    ) {
        if matches!(kind, ScopeKind::Constructor(_)) {
            return;
        }
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();

        let mut raw_bases = Vec::new();
        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            for base in superclasses.named_children(&mut cursor) {
                match base.kind() {
                    "keyword_argument" | "list_splat" | "dictionary_splat" => {}
                    _ => raw_bases.push(self.text(base).to_string()),
                }
            }
        }

        let class_id = self.system.add(
            Some(scope),
            &name,
            EntityKind::Class(ClassData {
                raw_bases,
                decorators,
                ..ClassData::default()
            }),
        );
        self.system.get_mut(class_id).location = Some(self.loc(node));
        if let Some(body) = node.child_by_field_name("body") {
            if let Some(docstring) = self.suite_docstring(body) {
                self.system.get_mut(class_id).docstring = Some(docstring);
            }
            self.visit_suite(body, class_id, ScopeKind::Class);
        }
    }

    // ------------------------------------------------------------------
    // Functions and methods
    // ------------------------------------------------------------------

    fn handle_function(
        &mut self,
        node: Node<'_>,
        decorators: Vec<Decorator>,
        scope: DocId,
        kind: ScopeKind,
    ) {
        if matches!(kind, ScopeKind::Constructor(_)) {
            return;
        }
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let is_async = node
            .child(0)
            .map(|c| c.kind() == "async")
            .unwrap_or(false);

        // Property accessor declarations (`@x.setter`) refine an existing
        // property; they never introduce a new entity.
        if decorators
            .iter()
            .any(|d| d.name.ends_with(".setter") || d.name.ends_with(".deleter"))
        {
            return;
        }

        let is_overload = decorators.iter().any(|d| d.last_segment_is("overload"));
        let is_property = decorators.iter().any(|d| {
            descry_core::qname::last_segment(&d.name)
                .to_ascii_lowercase()
                .ends_with("property")
        });
        let is_classmethod = decorators.iter().any(|d| d.last_segment_is("classmethod"));
        let is_staticmethod = decorators.iter().any(|d| d.last_segment_is("staticmethod"));

        let return_type = node
            .child_by_field_name("return_type")
            .map(|r| self.text(r).to_string());
        let line = line_of(node);

        // A property getter reclassifies into an attribute of the class:
        // the Function kind is discarded, the return annotation becomes
        // the declared type, and the decorator list survives.
        if kind == ScopeKind::Class && is_property {
            let attr_id = self.system.add(
                Some(scope),
                &name,
                EntityKind::Property(AttributeData {
                    declared_type: return_type,
                    value_source: None,
                    decorators,
                }),
            );
            self.system.get_mut(attr_id).location = Some(self.loc(node));
            if let Some(body) = node.child_by_field_name("body") {
                if let Some(docstring) = self.suite_docstring(body) {
                    self.system.get_mut(attr_id).docstring = Some(docstring);
                }
            }
            return;
        }

        let signature = node
            .child_by_field_name("parameters")
            .map(|p| self.extract_parameters(p, node))
            .unwrap_or_default();

        // Overload folding: later declarations of the same name merge into
        // the first entity rather than shadowing it.
        if let Some(existing) = self.system.child_named(scope, &name) {
            let is_grouped = self
                .system
                .get(existing)
                .kind
                .as_function()
                .map(|f| f.is_overload || !f.overloads.is_empty())
                .unwrap_or(false);
            if is_grouped {
                let data = self
                    .system
                    .get_mut(existing)
                    .kind
                    .as_function_mut()
                    .expect("grouped entity is function-like");
                if is_overload {
                    data.overloads.push(Overload {
                        signature,
                        return_type,
                        line,
                    });
                } else {
                    // The single implementation: its signature becomes
                    // canonical, the overloads drive documentation.
                    data.signature = signature;
                    data.return_type = return_type;
                    data.is_async = is_async;
                    data.is_overload = false;
                    data.decorators = decorators;
                }
                return;
            }
            self.warn(
                "ast",
                format!("duplicate definition of '{name}'"),
                node,
            );
        }

        let mut data = FunctionData {
            signature,
            return_type,
            decorators,
            is_async,
            is_overload,
            overloads: Vec::new(),
        };
        if is_overload {
            data.overloads.push(Overload {
                signature: data.signature.clone(),
                return_type: data.return_type.clone(),
                line,
            });
        }

        let entity_kind = match kind {
            ScopeKind::Class if is_classmethod => EntityKind::ClassMethod(data),
            ScopeKind::Class if is_staticmethod => EntityKind::StaticMethod(data),
            ScopeKind::Class => EntityKind::Method(data),
            _ => EntityKind::Function(data),
        };
        let func_id = self.system.add(Some(scope), &name, entity_kind);
        self.system.get_mut(func_id).location = Some(self.loc(node));

        let body = node.child_by_field_name("body");
        if let Some(body) = body {
            if let Some(docstring) = self.suite_docstring(body) {
                self.system.get_mut(func_id).docstring = Some(docstring);
            }
            // Only constructor bodies are scanned further, for
            // `self.<name>` assignments.
            if kind == ScopeKind::Class && name == "__init__" {
                self.visit_suite(body, scope, ScopeKind::Constructor(scope));
            }
        }
    }

    fn extract_parameters(&mut self, params: Node<'_>, owner: Node<'_>) -> Vec<Parameter> {
        let mut out: Vec<Parameter> = Vec::new();
        let mut keyword_only = false;
        let mut cursor = params.walk();
        let children: Vec<Node<'_>> = params.children(&mut cursor).collect();
        for child in children {
            let positional_kind = if keyword_only {
                ParamKind::KeywordOnly
            } else {
                ParamKind::PositionalOrKeyword
            };
            let parameter = match child.kind() {
                "identifier" => Some(Parameter::new(self.text(child), positional_kind)),
                "default_parameter" => {
                    let name = child.child_by_field_name("name");
                    let value = child.child_by_field_name("value");
                    name.map(|n| {
                        let mut p = Parameter::new(self.text(n), positional_kind);
                        p.default = value.map(|v| self.text(v).to_string());
                        p
                    })
                }
                "typed_parameter" => {
                    let annotation = child
                        .child_by_field_name("type")
                        .map(|t| self.text(t).to_string());
                    child.named_child(0).and_then(|pattern| match pattern.kind() {
                        "identifier" => {
                            let mut p = Parameter::new(self.text(pattern), positional_kind);
                            p.annotation = annotation;
                            Some(p)
                        }
                        "list_splat_pattern" => {
                            keyword_only = true;
                            pattern.named_child(0).map(|id| {
                                let mut p = Parameter::new(
                                    self.text(id),
                                    ParamKind::VariadicPositional,
                                );
                                p.annotation = annotation;
                                p
                            })
                        }
                        "dictionary_splat_pattern" => pattern.named_child(0).map(|id| {
                            let mut p =
                                Parameter::new(self.text(id), ParamKind::VariadicKeyword);
                            p.annotation = annotation;
                            p
                        }),
                        _ => None,
                    })
                }
                "typed_default_parameter" => {
                    let name = child.child_by_field_name("name");
                    name.map(|n| {
                        let mut p = Parameter::new(self.text(n), positional_kind);
                        p.annotation = child
                            .child_by_field_name("type")
                            .map(|t| self.text(t).to_string());
                        p.default = child
                            .child_by_field_name("value")
                            .map(|v| self.text(v).to_string());
                        p
                    })
                }
                "list_splat_pattern" => {
                    keyword_only = true;
                    child
                        .named_child(0)
                        .map(|id| Parameter::new(self.text(id), ParamKind::VariadicPositional))
                }
                "dictionary_splat_pattern" => child
                    .named_child(0)
                    .map(|id| Parameter::new(self.text(id), ParamKind::VariadicKeyword)),
                "keyword_separator" | "*" => {
                    keyword_only = true;
                    None
                }
                "positional_separator" | "/" => {
                    for p in out.iter_mut() {
                        if p.kind == ParamKind::PositionalOrKeyword {
                            p.kind = ParamKind::PositionalOnly;
                        }
                    }
                    None
                }
                _ => None,
            };
            if let Some(parameter) = parameter {
                if out.iter().any(|p| p.name == parameter.name) {
                    self.warn(
                        "ast",
                        format!("duplicate parameter '{}' dropped", parameter.name),
                        owner,
                    );
                } else {
                    out.push(parameter);
                }
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Assignments
    // ------------------------------------------------------------------

    fn handle_assignment(&mut self, node: Node<'_>, scope: DocId, kind: ScopeKind) {
        let annotation = node.child_by_field_name("type");
        // Chained assignment: `a = b = value` nests on the right.
        let mut targets: Vec<Node<'_>> = Vec::new();
        if let Some(left) = node.child_by_field_name("left") {
            targets.push(left);
        }
        let mut value = node.child_by_field_name("right");
        while let Some(v) = value {
            if v.kind() == "assignment" {
                if let Some(left) = v.child_by_field_name("left") {
                    targets.push(left);
                }
                value = v.child_by_field_name("right");
            } else {
                break;
            }
        }
        for target in targets {
            self.handle_target(target, annotation, value, node, scope, kind);
        }
    }

    fn handle_target(
        &mut self,
        target: Node<'_>,
        annotation: Option<Node<'_>>,
        value: Option<Node<'_>>,
        assignment: Node<'_>,
        scope: DocId,
        kind: ScopeKind,
    ) {
        match target.kind() {
            "identifier" => {
                let name = self.text(target).to_string();
                match kind {
                    ScopeKind::Module if name == "__all__" => {
                        self.parse_all(value, assignment);
                    }
                    ScopeKind::Module if name == "__docformat__" => {
                        self.parse_docformat(value, assignment);
                    }
                    ScopeKind::Module | ScopeKind::Class => {
                        self.handle_named_target(name, annotation, value, assignment, scope, kind)
                    }
                    ScopeKind::Constructor(_) => {
                        // Plain locals in a constructor body are not API.
                    }
                }
            }
            "attribute" => {
                if let ScopeKind::Constructor(class_id) = kind {
                    let object = target.child_by_field_name("object");
                    let is_self = object
                        .map(|o| self.text(o) == "self")
                        .unwrap_or(false);
                    if is_self {
                        if let Some(attr) = target.child_by_field_name("attribute") {
                            let name = self.text(attr).to_string();
                            self.upsert_attribute(
                                name,
                                annotation,
                                value,
                                assignment,
                                class_id,
                                AttributeRole::Instance,
                            );
                        }
                    }
                }
            }
            // Tuple unpacking carries no single initializer per name;
            // these targets are not documented.
            "pattern_list" | "tuple_pattern" | "list_pattern" => {}
            _ => {}
        }
    }

    fn handle_named_target(
        &mut self,
        name: String,
        annotation: Option<Node<'_>>,
        value: Option<Node<'_>>,
        assignment: Node<'_>,
        scope: DocId,
        kind: ScopeKind,
    ) {
        // Explicit type aliases.
        let annotation_head = annotation
            .map(strip_subscript)
            .and_then(|a| dotted_name(a, self.source));
        if let (Some(head), Some(v)) = (&annotation_head, value) {
            if descry_core::qname::last_segment(head) == "TypeAlias" {
                let alias_id = self.system.add(
                    Some(scope),
                    &name,
                    EntityKind::TypeAlias(TypeAliasData {
                        value_source: self.text(v).to_string(),
                    }),
                );
                self.system.get_mut(alias_id).location = Some(self.loc(assignment));
                self.last_attr = Some(alias_id);
                return;
            }
        }

        // Type variables: `T = TypeVar("T", ...)`.
        if let Some(v) = value {
            if let Some(constraints) = self.type_var_constraints(v) {
                let tv_id = self.system.add(
                    Some(scope),
                    &name,
                    EntityKind::TypeVariable(TypeVariableData { constraints }),
                );
                self.system.get_mut(tv_id).location = Some(self.loc(assignment));
                self.last_attr = Some(tv_id);
                return;
            }
        }

        // Alias bindings: `L = some.dotted.name` where L is otherwise
        // unused records an indirection instead of an attribute.
        if annotation.is_none() {
            if let Some(v) = value {
                if self.system.child_named(scope, &name).is_none()
                    && self.try_alias(scope, &name, v)
                {
                    return;
                }
            }
        }

        let role = match kind {
            ScopeKind::Class => AttributeRole::Class,
            _ => AttributeRole::Module,
        };
        self.upsert_attribute(name, annotation, value, assignment, scope, role);
    }

    /// Record `target = dotted.name` as an alias binding when the dotted
    /// name denotes something nameable. Returns false when this is a plain
    /// value assignment.
    fn try_alias(&mut self, scope: DocId, target: &str, value: Node<'_>) -> bool {
        let Some(dotted) = dotted_name(value, self.source) else {
            return false;
        };
        let mut parts = dotted.splitn(2, '.');
        let first = parts.next().unwrap_or(&dotted);
        let rest = parts.next();
        let scope_doc = self.system.get(scope);
        let binding_target = scope_doc
            .kind
            .as_module()
            .and_then(|d| d.bindings.get(first))
            .or_else(|| scope_doc.kind.as_class().and_then(|d| d.bindings.get(first)))
            .cloned();
        let resolved = if let Some(bound) = binding_target {
            match rest {
                Some(rest) => format!("{bound}.{rest}"),
                None => bound,
            }
        } else if self.system.child_named(scope, first).is_some() {
            format!("{}.{}", scope_doc.qname, dotted)
        } else {
            // Nothing nameable on the right; treat as a value assignment.
            return false;
        };
        self.insert_binding(scope, target.to_string(), resolved);
        true
    }

    fn type_var_constraints(&self, value: Node<'_>) -> Option<Vec<String>> {
        if value.kind() != "call" {
            return None;
        }
        let callee = value.child_by_field_name("function")?;
        let callee_name = dotted_name(callee, self.source)?;
        if descry_core::qname::last_segment(&callee_name) != "TypeVar" {
            return None;
        }
        let mut constraints = Vec::new();
        if let Some(arguments) = value.child_by_field_name("arguments") {
            let mut cursor = arguments.walk();
            for (index, arg) in arguments.named_children(&mut cursor).enumerate() {
                match arg.kind() {
                    "string" if index == 0 => {} // the variable's own name
                    "keyword_argument" => {
                        let name = arg.child_by_field_name("name");
                        let is_bound = name
                            .map(|n| self.text(n) == "bound")
                            .unwrap_or(false);
                        if is_bound {
                            if let Some(v) = arg.child_by_field_name("value") {
                                constraints.push(self.text(v).to_string());
                            }
                        }
                    }
                    "comment" => {}
                    _ => constraints.push(self.text(arg).to_string()),
                }
            }
        }
        Some(constraints)
    }

    fn upsert_attribute(
        &mut self,
        name: String,
        annotation: Option<Node<'_>>,
        value: Option<Node<'_>>,
        assignment: Node<'_>,
        scope: DocId,
        role: AttributeRole,
    ) {
        let counter_scope = scope;
        *self
            .assign_counts
            .entry((counter_scope, name.clone()))
            .or_insert(0) += 1;
        if self.control_depth > 0 {
            self.conditional.insert((counter_scope, name.clone()));
        }

        let attr_id = match self.system.child_named(scope, &name) {
            Some(existing) => {
                if !self.system.get(existing).kind.is_attribute() {
                    // The name already denotes a function or class; a later
                    // value assignment (e.g. a partial application) does not
                    // retype it.
                    return;
                }
                existing
            }
            None => {
                let initial_kind = match role {
                    AttributeRole::Module => EntityKind::Variable(AttributeData::default()),
                    AttributeRole::Class => EntityKind::ClassVariable(AttributeData::default()),
                    AttributeRole::Instance => {
                        EntityKind::InstanceVariable(AttributeData::default())
                    }
                };
                let id = self.system.add(Some(scope), &name, initial_kind);
                self.attrs_created.push(id);
                id
            }
        };

        // An instance assignment to a known class variable promotes it.
        if role == AttributeRole::Instance {
            let doc = self.system.get_mut(attr_id);
            if let EntityKind::ClassVariable(data) = &doc.kind {
                let promoted = EntityKind::InstanceVariable(data.clone());
                doc.kind = promoted;
            }
        }

        // Final[...] marks a constant and unwraps to the inner type.
        let annotation_head = annotation
            .map(strip_subscript)
            .and_then(|a| dotted_name(a, self.source));
        let is_final = annotation_head
            .as_deref()
            .map(|h| descry_core::qname::last_segment(h) == "Final")
            .unwrap_or(false);
        if is_final {
            self.final_attrs.insert(attr_id);
        }

        let declared_type = match annotation {
            Some(a) if is_final => subscript_argument(a, self.source)
                .map(str::to_string)
                .or_else(|| value.and_then(|v| infer_literal_type(v, self.source))),
            Some(a) => Some(self.text(a).to_string()),
            None => self
                .type_comment(assignment)
                .or_else(|| value.and_then(|v| infer_literal_type(v, self.source))),
        };

        let value_is_literal = value
            .map(|v| is_literal_expr(v, self.source))
            .unwrap_or(false);
        if value.is_some() {
            if value_is_literal {
                self.literal_attrs.insert(attr_id);
            } else {
                self.literal_attrs.remove(&attr_id);
            }
        }

        let location = self.loc(assignment);
        let doc = self.system.get_mut(attr_id);
        if doc.location.is_none() {
            doc.location = Some(location);
        }
        if let Some(data) = doc.kind.as_attribute_mut() {
            if declared_type.is_some() {
                data.declared_type = declared_type;
            }
            if let Some(v) = value {
                data.value_source = Some(node_text(v, self.source).to_string());
            }
        }
        self.last_attr = Some(attr_id);
    }

    /// Trailing `# type: T` comment on an assignment line.
    fn type_comment(&self, node: Node<'_>) -> Option<String> {
        let rest = self.source.get(node.end_byte()..)?;
        let line = rest.lines().next()?;
        let comment = line.split_once('#')?.1.trim();
        let declared = comment.strip_prefix("type:")?.trim();
        if declared.is_empty() || declared == "ignore" {
            None
        } else {
            Some(declared.to_string())
        }
    }

    // ------------------------------------------------------------------
    // Module metadata: __all__ and __docformat__
    // ------------------------------------------------------------------

    fn parse_all(&mut self, value: Option<Node<'_>>, assignment: Node<'_>) {
        let Some(value) = value else {
            self.warn(
                "all",
                "cannot parse value assigned to \"__all__\"".to_string(),
                assignment,
            );
            return;
        };
        if !matches!(value.kind(), "list" | "tuple") {
            self.warn(
                "all",
                "cannot parse value assigned to \"__all__\": not a list or tuple".to_string(),
                assignment,
            );
            return;
        }
        let mut names = Vec::new();
        let mut cursor = value.walk();
        for (index, element) in value.named_children(&mut cursor).enumerate() {
            match string_literal_value(element, self.source) {
                Some(name) => names.push(name),
                None => self.warn(
                    "all",
                    format!("cannot parse element {index} of \"__all__\""),
                    element,
                ),
            }
        }
        if self.all_line.is_some() {
            self.warn(
                "all",
                "assignment to \"__all__\" overrides previous assignment".to_string(),
                assignment,
            );
        }
        self.all_line = Some(line_of(assignment));
        if let Some(data) = self.system.get_mut(self.module_id).kind.as_module_mut() {
            data.all_exports = Some(names);
        }
    }

    fn parse_docformat(&mut self, value: Option<Node<'_>>, assignment: Node<'_>) {
        let text = value.and_then(|v| string_literal_value(v, self.source));
        let Some(text) = text else {
            self.warn(
                "docformat",
                "cannot parse value assigned to \"__docformat__\": not a string".to_string(),
                assignment,
            );
            return;
        };
        let Ok(format) = text.parse::<descry_core::DocFormat>() else {
            self.warn(
                "docformat",
                format!("unknown docformat \"{}\"", text.trim()),
                assignment,
            );
            return;
        };
        if self.docformat_line.is_some() {
            self.warn(
                "docformat",
                "assignment to \"__docformat__\" overrides previous assignment".to_string(),
                assignment,
            );
        }
        self.docformat_line = Some(line_of(assignment));
        if let Some(data) = self.system.get_mut(self.module_id).kind.as_module_mut() {
            data.declared_docformat = Some(format.as_str().to_string());
        }
    }

    fn handle_augmented(&mut self, node: Node<'_>, _scope: DocId, kind: ScopeKind) {
        if kind != ScopeKind::Module {
            return;
        }
        let target = node
            .child_by_field_name("left")
            .map(|l| self.text(l).to_string());
        if target.as_deref() == Some("__all__") {
            self.warn(
                "all",
                "augmented assignment to \"__all__\" is ignored".to_string(),
                node,
            );
        }
    }

    // ------------------------------------------------------------------
    // Type statements (3.12 syntax)
    // ------------------------------------------------------------------

    fn handle_type_statement(&mut self, node: Node<'_>, scope: DocId, kind: ScopeKind) {
        if matches!(kind, ScopeKind::Constructor(_)) {
            return;
        }
        let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) else {
            return;
        };
        let name = self.text(strip_subscript(left)).to_string();
        let alias_id = self.system.add(
            Some(scope),
            &name,
            EntityKind::TypeAlias(TypeAliasData {
                value_source: self.text(right).to_string(),
            }),
        );
        self.system.get_mut(alias_id).location = Some(self.loc(node));
        self.last_attr = Some(alias_id);
    }

    // ------------------------------------------------------------------
    // Constant classification
    // ------------------------------------------------------------------

    /// Runs once per module, after the walk: an attribute becomes a
    /// Constant when it is annotated Final, or when its name is all-upper,
    /// it is assigned exactly once, outside any control-flow block, and
    /// the initializer is a literal (computed values stay Variables).
    fn finalize_constants(&mut self) {
        let attrs = std::mem::take(&mut self.attrs_created);
        for attr_id in attrs {
            let doc = self.system.get(attr_id);
            let name = doc.name.clone();
            let Some(parent) = doc.parent else { continue };
            let is_final = self.final_attrs.contains(&attr_id);
            let promote = is_final
                || (is_all_caps(&name)
                    && self
                        .assign_counts
                        .get(&(parent, name.clone()))
                        .copied()
                        .unwrap_or(0)
                        == 1
                    && !self.conditional.contains(&(parent, name.clone()))
                    && self.literal_attrs.contains(&attr_id));
            if !promote {
                continue;
            }
            let doc = self.system.get_mut(attr_id);
            let promoted = match &doc.kind {
                EntityKind::Variable(data) | EntityKind::ClassVariable(data) => {
                    Some(EntityKind::Constant(data.clone()))
                }
                EntityKind::InstanceVariable(data) if is_final => {
                    Some(EntityKind::Constant(data.clone()))
                }
                _ => None,
            };
            if let Some(kind) = promoted {
                doc.kind = kind;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttributeRole {
    Module,
    Class,
    Instance,
}

/// All-upper-with-underscores test for constant names.
fn is_all_caps(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase())
        && !name.chars().any(|c| c.is_lowercase())
}
