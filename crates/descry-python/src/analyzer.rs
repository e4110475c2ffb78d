//! The pipeline driver: scan, build, post-process.
//!
//! An [`Analyzer`] owns the System, the options and the extension
//! registry, and runs the stages in their fixed order. Modules are
//! processed sequentially in scanner order; each module's build sees the
//! finished state of everything processed before it, and unresolved
//! forward references settle during post-processing.

use std::fs;
use std::path::Path;
use std::rc::Rc;

use thiserror::Error;
use tree_sitter::Parser;

use descry_core::{
    DocId, EntityKind, ModuleData, PrivacyRules, Reporter, SourceLocation, System,
    TracingReporter, Warning,
};

use crate::builder;
use crate::ext;
use crate::extensions::ExtensionRegistry;
use crate::introspect;
use crate::inventory::{InventorySet, SphinxInventory};
use crate::options::Options;
use crate::postprocess;
use crate::scan::{self, Unit, UnitKind};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that prevent an Analyzer from being constructed. Everything
/// after construction is a warning, never an abort.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("failed to load the source grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    #[error(transparent)]
    PrivacyPattern(#[from] descry_core::qname::QnameError),
}

/// Result type for analyzer construction.
pub type AnalyzerResult<T> = Result<T, AnalyzerError>;

// ============================================================================
// Analyzer
// ============================================================================

/// Drives the full pipeline over the configured input paths.
pub struct Analyzer {
    pub system: System,
    pub options: Options,
    pub extensions: ExtensionRegistry,
    parser: Parser,
}

impl Analyzer {
    pub fn new(options: Options) -> AnalyzerResult<Self> {
        Self::with_reporter(options, Rc::new(TracingReporter))
    }

    pub fn with_reporter(options: Options, reporter: Rc<dyn Reporter>) -> AnalyzerResult<Self> {
        let mut system = System::with_reporter(reporter);
        system.set_default_docformat(options.default_docformat);
        system.set_privacy_rules(PrivacyRules::compile(&options.privacy)?);
        load_inventories(&mut system, &options);

        let mut extensions = ExtensionRegistry::new();
        postprocess::register_builtin_passes(&mut extensions);
        ext::deprecate::register(&mut extensions);

        let parser = builder::new_parser()?;
        Ok(Analyzer {
            system,
            options,
            extensions,
            parser,
        })
    }

    /// Run the whole pipeline. Afterwards the System is frozen and ready
    /// for the renderer.
    pub fn run(&mut self) {
        self.build();
        self.post_process();
    }

    /// Scan the input paths and build every module, in scanner order.
    pub fn build(&mut self) {
        let reporter = self.system.reporter();
        let paths = self.options.paths.clone();
        for path in paths {
            match scan::scan_path(&path, &self.options.base_dir, &*reporter) {
                Ok(unit) => {
                    tracing::debug!(root = %unit.name, units = unit.count(), "building");
                    self.process_unit(&unit, None);
                }
                Err(error) => self
                    .system
                    .report(Warning::new("scan", error.to_string())),
            }
        }
    }

    /// Run the registered post-processors and freeze the model.
    pub fn post_process(&mut self) {
        self.extensions.post_process(&mut self.system);
        self.system.freeze();
    }

    fn process_unit(&mut self, unit: &Unit, parent: Option<DocId>) {
        match &unit.kind {
            UnitKind::Package { initializer } => {
                let id = self
                    .system
                    .add(parent, &unit.name, EntityKind::Package(ModuleData::default()));
                let location_path = initializer.clone().unwrap_or_else(|| unit.path.clone());
                self.system.get_mut(id).location =
                    Some(SourceLocation::new(location_path, 1));
                // Children first: the initializer may re-export their
                // contents.
                for child in &unit.children {
                    self.process_unit(child, Some(id));
                }
                if let Some(init) = initializer {
                    self.build_source(id, init);
                }
            }
            UnitKind::SourceModule => {
                let id = self
                    .system
                    .add(parent, &unit.name, EntityKind::Module(ModuleData::default()));
                self.system.get_mut(id).location =
                    Some(SourceLocation::new(unit.path.clone(), 1));
                self.build_source(id, &unit.path);
            }
            UnitKind::BinaryModule => {
                let id = self
                    .system
                    .add(parent, &unit.name, EntityKind::Module(ModuleData::default()));
                let doc = self.system.get_mut(id);
                doc.is_introspected = true;
                doc.location = Some(SourceLocation::new(unit.path.clone(), 1));
                if !self.options.introspect_binaries {
                    return;
                }
                let python = self.options.python_executable.clone();
                if let Err(error) =
                    introspect::introspect_binary(&mut self.system, &python, id, &unit.path)
                {
                    // The empty placeholder module stays in the registry.
                    self.system
                        .report(Warning::new("introspect", error.to_string()));
                }
            }
        }
    }

    fn build_source(&mut self, module_id: DocId, path: &Path) {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(error) => {
                self.system.report(Warning::new(
                    "scan",
                    format!("cannot read {}: {error}", path.display()),
                ));
                if let Some(data) = self.system.get_mut(module_id).kind.as_module_mut() {
                    data.parse_error = true;
                }
                return;
            }
        };
        builder::build_module(
            &mut self.system,
            &self.options,
            &self.extensions,
            &mut self.parser,
            module_id,
            path,
            &source,
        );
    }
}

// ============================================================================
// Inventory loading
// ============================================================================

/// Load the configured external inventories. Remote references are the
/// driver's job to fetch; here they only warn. Failures never abort.
fn load_inventories(system: &mut System, options: &Options) {
    let mut set = InventorySet::new();
    for reference in &options.inventories {
        if reference.location.contains("://") {
            system.report(Warning::new(
                "inventory",
                format!(
                    "remote inventory '{}' must be fetched by the driver and passed as a file",
                    reference.location
                ),
            ));
            continue;
        }
        let bytes = match fs::read(&reference.location) {
            Ok(bytes) => bytes,
            Err(error) => {
                system.report(Warning::new(
                    "inventory",
                    format!("cannot read inventory '{}': {error}", reference.location),
                ));
                continue;
            }
        };
        let base_url = reference.base_url.clone().unwrap_or_default();
        let mut bad_lines = Vec::new();
        match SphinxInventory::parse(
            &reference.effective_name(),
            &base_url,
            &bytes,
            |line| bad_lines.push(line.to_string()),
        ) {
            Ok(inventory) => {
                tracing::debug!(
                    name = inventory.name(),
                    entries = inventory.len(),
                    "inventory loaded"
                );
                set.add(inventory);
            }
            Err(error) => system.report(Warning::new(
                "inventory",
                format!("failed to load '{}': {error}", reference.location),
            )),
        }
        for line in bad_lines {
            system.report(Warning::new(
                "inventory",
                format!("failed to parse line \"{line}\" of '{}'", reference.location),
            ));
        }
    }
    if !set.is_empty() {
        system.set_inventory(Rc::new(set));
    }
}
