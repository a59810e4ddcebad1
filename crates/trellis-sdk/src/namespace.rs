//! Module namespaces: identity-stable export surfaces.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::value::Value;

/// The mutable export surface of one module.
///
/// A namespace is created once per load record and shared as
/// `Arc<Namespace>`. It is never replaced, only mutated in place, so every
/// holder of the `Arc` observes later changes; that is what makes bindings
/// "live". `insert` and `merge` report whether any stored value actually
/// changed, and the engine uses that signal to decide when dependents must
/// be notified.
#[derive(Debug, Default)]
pub struct Namespace {
    entries: RwLock<FxHashMap<String, Value>>,
    marker: RwLock<Option<Value>>,
}

impl Namespace {
    /// Create an empty namespace.
    pub fn new() -> Self {
        Namespace::default()
    }

    /// Current value of one binding.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.entries.read().get(name).cloned()
    }

    /// True when the binding exists.
    pub fn has(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when no bindings exist.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Binding names, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// All bindings, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        let mut entries: Vec<(String, Value)> = self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }

    /// Store one binding. Returns true when the stored value changed
    /// (new binding, or different value than before).
    pub fn insert(&self, name: &str, value: Value) -> bool {
        let mut entries = self.entries.write();
        if entries.get(name) == Some(&value) {
            return false;
        }
        entries.insert(name.to_string(), value);
        true
    }

    /// Store a batch of bindings under one lock acquisition. Returns true
    /// when any stored value changed.
    pub fn merge(&self, batch: impl IntoIterator<Item = (String, Value)>) -> bool {
        let mut entries = self.entries.write();
        let mut changed = false;
        for (name, value) in batch {
            if entries.get(&name) != Some(&value) {
                entries.insert(name, value);
                changed = true;
            }
        }
        changed
    }

    /// Attach or replace the namespace marker.
    ///
    /// The marker rides alongside the bindings (it tags the namespace shape
    /// for consumers) and never counts toward change detection.
    pub fn set_marker(&self, value: Value) {
        *self.marker.write() = Some(value);
    }

    /// The namespace marker, if one was attached.
    pub fn marker(&self) -> Option<Value> {
        self.marker.read().clone()
    }
}
