//! Privacy classification.
//!
//! Defaults: a single-underscore name is PRIVATE, dunder names are PUBLIC,
//! everything else is PUBLIC. User rules `(qname-glob, privacy)` are applied
//! in order after defaults with last-match-wins semantics, except that an
//! exact-qname rule always beats a glob. A HIDDEN module, package or class
//! transitively hides its descendants; that check lives in
//! [`System::compute_privacy`](crate::system::System::compute_privacy)
//! because it needs the parent chain.

use serde::{Deserialize, Serialize};

use crate::qname::{QnameGlob, QnameResult};

// ============================================================================
// Privacy levels
// ============================================================================

/// Visibility class of an entity. Governs indexing and linking, not
/// semantic access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Privacy {
    Public,
    Private,
    Hidden,
}

impl Privacy {
    /// serde default helper.
    pub fn public() -> Privacy {
        Privacy::Public
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Privacy::Public => "PUBLIC",
            Privacy::Private => "PRIVATE",
            Privacy::Hidden => "HIDDEN",
        }
    }
}

/// Default classification from the name alone.
pub fn default_privacy(name: &str) -> Privacy {
    if name.starts_with('_') && !(name.starts_with("__") && name.ends_with("__")) {
        Privacy::Private
    } else {
        Privacy::Public
    }
}

// ============================================================================
// Override rules
// ============================================================================

/// One user-configured override.
#[derive(Debug, Clone)]
pub struct PrivacyRule {
    pub privacy: Privacy,
    pub glob: QnameGlob,
}

/// The ordered override rule list.
#[derive(Debug, Clone, Default)]
pub struct PrivacyRules {
    rules: Vec<PrivacyRule>,
}

impl PrivacyRules {
    /// Compile `(privacy, pattern)` pairs, preserving order.
    pub fn compile(pairs: &[(Privacy, String)]) -> QnameResult<Self> {
        let mut rules = Vec::with_capacity(pairs.len());
        for (privacy, pattern) in pairs {
            rules.push(PrivacyRule {
                privacy: *privacy,
                glob: QnameGlob::new(pattern)?,
            });
        }
        Ok(PrivacyRules { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Classify `qname`, starting from the name-based default. Exact rules
    /// are consulted before globs; within each pass the last matching rule
    /// wins, which the reversed scan encodes.
    pub fn classify(&self, qname: &str, name: &str) -> Privacy {
        let mut privacy = default_privacy(name);
        let mut exact_hit = false;
        for rule in self.rules.iter().rev() {
            if rule.glob.is_exact() && rule.glob.matches(qname) {
                privacy = rule.privacy;
                exact_hit = true;
                break;
            }
        }
        if !exact_hit {
            for rule in self.rules.iter().rev() {
                if !rule.glob.is_exact() && rule.glob.matches(qname) {
                    privacy = rule.privacy;
                    break;
                }
            }
        }
        privacy
    }
}
