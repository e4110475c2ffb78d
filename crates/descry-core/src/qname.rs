//! Fully-qualified dotted names and glob matching over them.
//!
//! A qname is the dotted path from a root package to an entity
//! (`pkg.mod.Class.method`) and serves as the primary key of the registry.
//! Colons are forbidden inside a segment so qnames can safely appear in
//! role strings like `` `pkg.mod.Class` ``.
//!
//! Glob matching treats `.` as the segment separator: `*` matches within a
//! single segment, `**` crosses segments. This is implemented by mapping
//! segments onto path components and delegating to `globset`.

use globset::{GlobBuilder, GlobMatcher};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors from compiling a qname glob pattern.
#[derive(Debug, Error)]
pub enum QnameError {
    /// The glob pattern could not be compiled.
    #[error("invalid qname pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Result type for qname operations.
pub type QnameResult<T> = Result<T, QnameError>;

// ============================================================================
// Dotted-name helpers
// ============================================================================

/// Join a parent qname and a child name. An empty parent yields the name.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

/// The last dotted segment of a name.
pub fn last_segment(qname: &str) -> &str {
    qname.rsplit('.').next().unwrap_or(qname)
}

/// The dotted prefix before the last segment, or `None` for a bare name.
pub fn parent_qname(qname: &str) -> Option<&str> {
    qname.rsplit_once('.').map(|(head, _)| head)
}

/// Split a dotted name into its segments.
pub fn segments(qname: &str) -> impl Iterator<Item = &str> {
    qname.split('.')
}

/// Number of dotted segments.
pub fn segment_count(qname: &str) -> usize {
    qname.split('.').count()
}

/// Whether `s` is usable as a single qname segment: non-empty, no dot,
/// no colon.
pub fn is_valid_segment(s: &str) -> bool {
    !s.is_empty() && !s.contains('.') && !s.contains(':')
}

// ============================================================================
// Qname globs
// ============================================================================

/// A compiled glob over dotted names.
///
/// `pkg.*` matches direct children of `pkg`; `pkg.**` matches all
/// descendants; `pkg._*` matches underscore-prefixed direct children.
/// A pattern without any metacharacter is an exact match and takes
/// precedence over globs in privacy rule application.
#[derive(Debug, Clone)]
pub struct QnameGlob {
    pattern: String,
    matcher: Option<GlobMatcher>,
}

impl QnameGlob {
    /// Compile a pattern. Patterns without `*`, `?` or `[` are stored as
    /// exact strings and never touch the glob engine.
    pub fn new(pattern: &str) -> QnameResult<Self> {
        if Self::pattern_is_exact(pattern) {
            return Ok(Self {
                pattern: pattern.to_string(),
                matcher: None,
            });
        }
        let as_path = pattern.replace('.', "/");
        let glob = GlobBuilder::new(&as_path)
            .literal_separator(true)
            .build()
            .map_err(|e| QnameError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            pattern: pattern.to_string(),
            matcher: Some(glob.compile_matcher()),
        })
    }

    fn pattern_is_exact(pattern: &str) -> bool {
        !pattern.contains(['*', '?', '['])
    }

    /// The source pattern as written.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// True when this pattern is an exact qname, not a glob.
    pub fn is_exact(&self) -> bool {
        self.matcher.is_none()
    }

    /// Match a dotted name against the pattern.
    pub fn matches(&self, qname: &str) -> bool {
        match &self.matcher {
            None => self.pattern == qname,
            Some(m) => m.is_match(qname.replace('.', "/")),
        }
    }
}
