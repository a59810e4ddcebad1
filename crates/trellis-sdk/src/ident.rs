//! Canonical module identifiers.

use std::fmt;
use std::sync::Arc;

/// Canonical key for a module, produced by host resolution.
///
/// Two import requests that resolve to the same identifier share one load
/// record, so this type is the deduplication key for the entire engine.
/// Identifiers are opaque to the loader; only the host gives them meaning.
/// Cloning is cheap (shared string storage).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(Arc<str>);

impl ModuleId {
    /// Create an identifier from its canonical string form.
    pub fn new(id: impl AsRef<str>) -> Self {
        ModuleId(Arc::from(id.as_ref()))
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(s: &str) -> Self {
        ModuleId::new(s)
    }
}

impl From<String> for ModuleId {
    fn from(s: String) -> Self {
        ModuleId(Arc::from(s))
    }
}

impl AsRef<str> for ModuleId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
