//! Engine inputs.
//!
//! The driver (CLI, config files) is out of scope; it hands the engine a
//! fully-formed [`Options`] value. The only parsing done here is the
//! compact `[name:]location[:base_url]` form of inventory references,
//! which is part of the engine's documented input surface.

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use descry_core::{DocFormat, Privacy};

// ============================================================================
// Error Types
// ============================================================================

/// Errors from option parsing.
#[derive(Debug, Error)]
pub enum OptionsError {
    /// An inventory reference had no usable location part.
    #[error("invalid inventory reference '{reference}'")]
    InvalidInventoryRef { reference: String },
}

/// Result type for option parsing.
pub type OptionsResult<T> = Result<T, OptionsError>;

// ============================================================================
// Inventory references
// ============================================================================

/// Reference to an external object inventory: `[name:]url[:base_url]` or
/// the local-file form `[name:]path:base_url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRef {
    /// Inventory name; defaults to the last host/path segment when absent.
    pub name: Option<String>,
    /// URL of, or filesystem path to, the `objects.inv` payload.
    pub location: String,
    /// Base URL prepended to relative links. Defaults to the location's
    /// parent for URL forms.
    pub base_url: Option<String>,
}

impl InventoryRef {
    /// Parse the compact reference form. Colons inside `scheme://` URLs do
    /// not split.
    pub fn parse(reference: &str) -> OptionsResult<Self> {
        // Split on ':' but glue "//..." continuations back onto the
        // preceding scheme token.
        let mut parts: Vec<String> = Vec::new();
        for piece in reference.split(':') {
            if piece.starts_with("//") {
                match parts.last_mut() {
                    Some(last) => {
                        last.push(':');
                        last.push_str(piece);
                    }
                    None => parts.push(piece.to_string()),
                }
            } else {
                parts.push(piece.to_string());
            }
        }
        let is_name = |s: &str| {
            !s.is_empty()
                && !s.contains('/')
                && !s.contains('.')
                && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        };
        let parsed = match parts.len() {
            1 => InventoryRef {
                name: None,
                location: parts[0].clone(),
                base_url: None,
            },
            2 => {
                if is_name(&parts[0]) {
                    InventoryRef {
                        name: Some(parts[0].clone()),
                        location: parts[1].clone(),
                        base_url: None,
                    }
                } else {
                    InventoryRef {
                        name: None,
                        location: parts[0].clone(),
                        base_url: Some(parts[1].clone()),
                    }
                }
            }
            3 => InventoryRef {
                name: Some(parts[0].clone()),
                location: parts[1].clone(),
                base_url: Some(parts[2].clone()),
            },
            _ => {
                return Err(OptionsError::InvalidInventoryRef {
                    reference: reference.to_string(),
                })
            }
        };
        if parsed.location.is_empty() {
            return Err(OptionsError::InvalidInventoryRef {
                reference: reference.to_string(),
            });
        }
        Ok(parsed)
    }

    /// Effective inventory name.
    pub fn effective_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.location
            .trim_end_matches('/')
            .rsplit('/')
            .find(|s| !s.is_empty() && *s != "objects.inv")
            .unwrap_or("inventory")
            .to_string()
    }
}

// ============================================================================
// Conditional-branch overrides
// ============================================================================

/// Per-module override of which side of a recognized guard is taken.
///
/// `qname_pattern` selects modules; `guards` maps a simple guard name
/// (e.g. `TYPE_CHECKING`) to the truth value assumed for it.
#[derive(Debug, Clone)]
pub struct BranchOverride {
    pub qname_pattern: String,
    pub guards: BTreeMap<String, bool>,
}

// ============================================================================
// Options
// ============================================================================

/// Everything the driver hands the engine.
#[derive(Debug, Clone)]
pub struct Options {
    /// Ordered paths to process: package directories, module files or
    /// compiled binary modules.
    pub paths: Vec<PathBuf>,
    /// Sources outside this directory are accepted with a warning and get
    /// no view-source links.
    pub base_dir: PathBuf,
    pub default_docformat: DocFormat,
    /// Ordered privacy override rules.
    pub privacy: Vec<(Privacy, String)>,
    pub branch_overrides: Vec<BranchOverride>,
    pub inventories: Vec<InventoryRef>,
    /// Introspect binary modules in a child process. Disabled in tests.
    pub introspect_binaries: bool,
    pub python_executable: PathBuf,
    /// Project name/version stamped into the emitted inventory.
    pub project_name: String,
    pub project_version: String,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            paths: Vec::new(),
            base_dir: PathBuf::from("."),
            default_docformat: DocFormat::Epytext,
            privacy: Vec::new(),
            branch_overrides: Vec::new(),
            inventories: Vec::new(),
            introspect_binaries: true,
            python_executable: PathBuf::from("python3"),
            project_name: "API Documentation".to_string(),
            project_version: "".to_string(),
        }
    }
}

impl Options {
    pub fn for_paths(paths: Vec<PathBuf>) -> Self {
        let base_dir = paths
            .first()
            .and_then(|p| p.parent().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));
        Options {
            paths,
            base_dir,
            ..Options::default()
        }
    }
}
