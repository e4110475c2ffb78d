//! Bundled extensions.
//!
//! These use only the public registrar surface, so they double as a
//! reference for third-party extensions.

pub mod deprecate;
