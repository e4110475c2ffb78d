//! Docstring format identifiers.
//!
//! The format of a docstring is declared per module via `__docformat__`,
//! inherited from the nearest enclosing package otherwise, and falls back
//! to the system default. A plaintext system default overrides explicit
//! declarations; that mode is used for error-focused builds where markup
//! parsing would only add noise.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a docformat string is not recognized.
#[derive(Debug, Error)]
#[error("unknown docformat '{0}'")]
pub struct UnknownDocFormat(pub String);

/// The closed set of supported docstring dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocFormat {
    Epytext,
    Restructuredtext,
    Google,
    Numpy,
    Plaintext,
}

impl DocFormat {
    /// The canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocFormat::Epytext => "epytext",
            DocFormat::Restructuredtext => "restructuredtext",
            DocFormat::Google => "google",
            DocFormat::Numpy => "numpy",
            DocFormat::Plaintext => "plaintext",
        }
    }
}

impl fmt::Display for DocFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocFormat {
    type Err = UnknownDocFormat;

    /// Case-insensitive; a trailing language code (`"restructuredtext en"`)
    /// is accepted and dropped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let first = s.split_whitespace().next().unwrap_or("");
        match first.to_ascii_lowercase().as_str() {
            "epytext" => Ok(DocFormat::Epytext),
            "restructuredtext" => Ok(DocFormat::Restructuredtext),
            "google" => Ok(DocFormat::Google),
            "numpy" => Ok(DocFormat::Numpy),
            "plaintext" => Ok(DocFormat::Plaintext),
            _ => Err(UnknownDocFormat(s.to_string())),
        }
    }
}
