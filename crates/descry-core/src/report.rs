//! The warning sink.
//!
//! Every non-fatal condition in the pipeline (unresolvable name, malformed
//! `__all__`, MRO failure, duplicate re-export, ...) surfaces as a
//! [`Warning`] pushed into a [`Reporter`] owned by the System. The pipeline
//! itself never aborts on them.
//!
//! The default reporter forwards to `tracing`; tests install a
//! [`CollectingReporter`] and assert on the collected records.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::model::SourceLocation;

// ============================================================================
// Warning
// ============================================================================

/// A single non-fatal diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Short machine-readable category: `ast`, `resolve`, `mro`,
    /// `reexport`, `all`, `docformat`, `scan`, `introspect`, `inventory`,
    /// `extension`.
    pub section: String,
    /// Human-readable message.
    pub message: String,
    /// Source location of the offending code, when known.
    pub location: Option<SourceLocation>,
}

impl Warning {
    pub fn new(section: &str, message: impl Into<String>) -> Self {
        Warning {
            section: section.to_string(),
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn at_opt(mut self, location: Option<SourceLocation>) -> Self {
        self.location = location;
        self
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}: {} ({})", self.section, self.message, loc),
            None => write!(f, "{}: {}", self.section, self.message),
        }
    }
}

// ============================================================================
// Reporter
// ============================================================================

/// Sink for pipeline warnings. Implementations must be cheap to call; the
/// builder reports in the middle of AST traversal.
pub trait Reporter {
    fn report(&self, warning: Warning);
}

/// Forwards warnings to `tracing::warn!`.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, warning: Warning) {
        tracing::warn!(section = %warning.section, "{}", warning);
    }
}

/// Collects warnings in memory. Intended for tests and for drivers that
/// implement `warnings-as-errors`.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    warnings: RefCell<Vec<Warning>>,
}

impl CollectingReporter {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Number of warnings collected so far.
    pub fn len(&self) -> usize {
        self.warnings.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.borrow().is_empty()
    }

    /// Snapshot of all collected warnings.
    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings.borrow().clone()
    }

    /// Messages of warnings in the given section.
    pub fn messages_in(&self, section: &str) -> Vec<String> {
        self.warnings
            .borrow()
            .iter()
            .filter(|w| w.section == section)
            .map(|w| w.message.clone())
            .collect()
    }

    /// True when some collected warning message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.warnings
            .borrow()
            .iter()
            .any(|w| w.message.contains(needle))
    }
}

impl Reporter for CollectingReporter {
    fn report(&self, warning: Warning) {
        self.warnings.borrow_mut().push(warning);
    }
}
