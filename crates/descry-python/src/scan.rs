//! Source-text scanner: input paths to ordered translation units.
//!
//! The processing order is fixed here and everything downstream depends on
//! it for determinism: within a directory, entries in lexicographic name
//! order; submodules before their package's initializer, so the
//! initializer can re-export names its children define; binary modules are
//! leaves. Unreadable paths and paths outside the project base directory
//! warn and never abort the scan.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use descry_core::{Reporter, Warning};

/// Directory names never descended into.
const EXCLUDED_DIRS: &[&str] = &[
    "__pycache__",
    ".git",
    ".hg",
    ".tox",
    ".venv",
    "venv",
    "node_modules",
];

/// File extensions of compiled binary modules.
const BINARY_EXTENSIONS: &[&str] = &["so", "pyd"];

// ============================================================================
// Error Types
// ============================================================================

/// Errors that abort scanning a single input path (never the whole scan).
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("path does not exist: {path}")]
    Missing { path: PathBuf },

    #[error("not a Python package or module: {path}")]
    NotAModule { path: PathBuf },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result type for scan operations.
pub type ScanResult<T> = Result<T, ScanError>;

// ============================================================================
// Units
// ============================================================================

/// What a translation unit is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitKind {
    /// A package directory. `initializer` is its `__init__.py`, parsed
    /// after every child.
    Package { initializer: Option<PathBuf> },
    /// A plain source module.
    SourceModule,
    /// A compiled module; introspected, never parsed.
    BinaryModule,
}

/// One translation unit plus its children, already in processing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub name: String,
    pub path: PathBuf,
    pub kind: UnitKind,
    pub children: Vec<Unit>,
}

impl Unit {
    pub fn is_package(&self) -> bool {
        matches!(self.kind, UnitKind::Package { .. })
    }

    /// Count of units in this subtree, the package itself included.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Unit::count).sum::<usize>()
    }
}

// ============================================================================
// Scanning
// ============================================================================

/// Scan one input path into a unit tree.
///
/// Directories must contain an initializer module to count as packages;
/// anything else is rejected with [`ScanError::NotAModule`].
pub fn scan_path(path: &Path, base_dir: &Path, reporter: &dyn Reporter) -> ScanResult<Unit> {
    if !path.exists() {
        return Err(ScanError::Missing {
            path: path.to_path_buf(),
        });
    }
    if !path.starts_with(base_dir) {
        reporter.report(Warning::new(
            "scan",
            format!(
                "'{}' lies outside the project base directory '{}'",
                path.display(),
                base_dir.display()
            ),
        ));
    }
    if path.is_dir() {
        if !path.join("__init__.py").is_file() {
            return Err(ScanError::NotAModule {
                path: path.to_path_buf(),
            });
        }
        return Ok(scan_package(path, reporter));
    }
    match classify_file(path) {
        Some((name, UnitKind::SourceModule)) => Ok(Unit {
            name,
            path: path.to_path_buf(),
            kind: UnitKind::SourceModule,
            children: Vec::new(),
        }),
        Some((name, UnitKind::BinaryModule)) => Ok(Unit {
            name,
            path: path.to_path_buf(),
            kind: UnitKind::BinaryModule,
            children: Vec::new(),
        }),
        _ => Err(ScanError::NotAModule {
            path: path.to_path_buf(),
        }),
    }
}

/// Scan a package directory. Children are collected with a pruned walk and
/// assembled per directory in lexicographic order.
fn scan_package(root: &Path, reporter: &dyn Reporter) -> Unit {
    // path of directory -> entries found directly inside it
    let mut dirs: BTreeMap<PathBuf, DirEntries> = BTreeMap::new();
    dirs.insert(root.to_path_buf(), DirEntries::default());

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && e.file_name()
                    .to_str()
                    .map(|n| EXCLUDED_DIRS.contains(&n) || n.starts_with('.'))
                    .unwrap_or(false))
        });
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                reporter.report(Warning::new("scan", format!("unreadable entry: {err}")));
                continue;
            }
        };
        let path = entry.path();
        if path == root {
            continue;
        }
        let Some(parent) = path.parent().map(Path::to_path_buf) else {
            continue;
        };
        if entry.file_type().is_dir() {
            if path.join("__init__.py").is_file() {
                dirs.entry(parent)
                    .or_default()
                    .packages
                    .push(path.to_path_buf());
                dirs.entry(path.to_path_buf()).or_default();
            } else {
                reporter.report(Warning::new(
                    "scan",
                    format!("directory without initializer skipped: {}", path.display()),
                ));
            }
        } else if let Some((name, kind)) = classify_file(path) {
            let slot = dirs.entry(parent).or_default();
            match kind {
                UnitKind::SourceModule if name == "__init__" => {
                    slot.initializer = Some(path.to_path_buf());
                }
                UnitKind::SourceModule => {
                    slot.sources.push((name, path.to_path_buf()));
                }
                UnitKind::BinaryModule => {
                    slot.binaries.push((name, path.to_path_buf()));
                }
                UnitKind::Package { .. } => unreachable!("classify_file never yields packages"),
            }
        }
    }

    assemble(root, &dirs, reporter)
}

#[derive(Debug, Default)]
struct DirEntries {
    initializer: Option<PathBuf>,
    sources: Vec<(String, PathBuf)>,
    binaries: Vec<(String, PathBuf)>,
    packages: Vec<PathBuf>,
}

/// Build the unit for one directory: children first (packages and modules
/// interleaved in name order), initializer recorded for last-parsing.
fn assemble(dir: &Path, dirs: &BTreeMap<PathBuf, DirEntries>, reporter: &dyn Reporter) -> Unit {
    let entries = match dirs.get(dir) {
        Some(entries) => entries,
        None => {
            return Unit {
                name: dir_name(dir),
                path: dir.to_path_buf(),
                kind: UnitKind::Package { initializer: None },
                children: Vec::new(),
            }
        }
    };

    // Candidates in precedence order: a package directory beats a binary
    // module of the same name, which beats a source module.
    let mut candidates: Vec<Unit> = Vec::new();
    for sub in &entries.packages {
        candidates.push(assemble(sub, dirs, reporter));
    }
    for (name, path) in &entries.binaries {
        candidates.push(Unit {
            name: name.clone(),
            path: path.clone(),
            kind: UnitKind::BinaryModule,
            children: Vec::new(),
        });
    }
    for (name, path) in &entries.sources {
        candidates.push(Unit {
            name: name.clone(),
            path: path.clone(),
            kind: UnitKind::SourceModule,
            children: Vec::new(),
        });
    }
    let mut children: Vec<Unit> = Vec::new();
    for unit in candidates {
        if children.iter().any(|c| c.name == unit.name) {
            reporter.report(Warning::new(
                "scan",
                format!("'{}' shadowed by a sibling of the same name", unit.path.display()),
            ));
        } else {
            children.push(unit);
        }
    }
    children.sort_by(|a, b| a.name.cmp(&b.name));

    Unit {
        name: dir_name(dir),
        path: dir.to_path_buf(),
        kind: UnitKind::Package {
            initializer: entries.initializer.clone(),
        },
        children,
    }
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "package".to_string())
}

/// Recognize a module file and derive its module name. Binary modules may
/// carry platform tags (`m.cpython-312-x86_64.so`); the module name is the
/// stem up to the first dot.
fn classify_file(path: &Path) -> Option<(String, UnitKind)> {
    let file_name = path.file_name()?.to_str()?;
    let extension = path.extension()?.to_str()?;
    if extension == "py" {
        let name = file_name.strip_suffix(".py")?.to_string();
        return Some((name, UnitKind::SourceModule));
    }
    if BINARY_EXTENSIONS.contains(&extension) {
        let name = file_name.split('.').next()?.to_string();
        if name.is_empty() {
            return None;
        }
        return Some((name, UnitKind::BinaryModule));
    }
    None
}
