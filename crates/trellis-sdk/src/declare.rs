//! The declaration contract between hosts, module bodies, and the engine.

use std::sync::Arc;

use crate::completion::Completion;
use crate::error::{HostError, LoadError};
use crate::ident::ModuleId;
use crate::namespace::Namespace;
use crate::value::Value;

/// Future returned by import operations; resolves to the module's namespace.
pub type ImportFuture = Completion<Arc<Namespace>, LoadError>;

/// Waitable returned by a module body that must cooperatively wait.
///
/// The engine treats settlement of this handle as completion of the body:
/// resolution completes the module, rejection records a terminal execution
/// failure.
pub type SuspensionHandle = Completion<(), HostError>;

/// Callback a dependent registers to observe a dependency's namespace.
///
/// Invoked with the dependency's (identity-stable) namespace on every
/// binding change, and possibly once at link time when the dependency has
/// already exported something.
pub type SetterFn = Arc<dyn Fn(&Arc<Namespace>) + Send + Sync>;

/// A module body. Runs at most once, with no loader capabilities beyond
/// whatever the declare step captured.
pub type ExecuteFn = Box<dyn FnOnce() -> Result<Execution, HostError> + Send>;

/// The declare step: receives this module's export capability and context,
/// wires up captured state, and produces the setters and body.
pub type DeclareFn = Box<
    dyn FnOnce(Arc<dyn ExportSink>, Arc<dyn ModuleContext>) -> Result<DeclaredModule, HostError>
        + Send,
>;

/// How a module body finished.
#[derive(Debug)]
pub enum Execution {
    /// The body ran to completion synchronously.
    Complete,
    /// The body must wait; settlement of the handle completes or fails it.
    Suspended(SuspensionHandle),
}

/// What the host's instantiate step yields for one module.
pub struct ModuleDeclaration {
    /// Dependency specifiers, resolved against this module during linking.
    pub dependencies: Vec<String>,
    /// Binding-and-body constructor, invoked once during instantiation.
    pub declare: DeclareFn,
}

impl ModuleDeclaration {
    /// Build a declaration from a dependency list and a declare closure.
    pub fn new<F>(dependencies: Vec<String>, declare: F) -> Self
    where
        F: FnOnce(Arc<dyn ExportSink>, Arc<dyn ModuleContext>) -> Result<DeclaredModule, HostError>
            + Send
            + 'static,
    {
        ModuleDeclaration {
            dependencies,
            declare: Box::new(declare),
        }
    }
}

/// What a declare step returns: per-dependency setters plus the body.
#[derive(Default)]
pub struct DeclaredModule {
    /// `setters[i]` pairs positionally with the declaration's
    /// `dependencies[i]`; a `None` slot means this module does not observe
    /// that dependency's bindings.
    pub setters: Vec<Option<SetterFn>>,
    /// The module body. A missing body behaves as an immediate no-op.
    pub execute: Option<ExecuteFn>,
}

impl DeclaredModule {
    /// A declaration with no setters and a no-op body.
    pub fn new() -> Self {
        DeclaredModule::default()
    }

    /// Attach the positional setter list.
    pub fn with_setters(mut self, setters: Vec<Option<SetterFn>>) -> Self {
        self.setters = setters;
        self
    }

    /// Attach the module body.
    pub fn with_execute<F>(mut self, execute: F) -> Self
    where
        F: FnOnce() -> Result<Execution, HostError> + Send + 'static,
    {
        self.execute = Some(Box::new(execute));
        self
    }
}

/// Wrap a closure as a shareable [`SetterFn`].
pub fn setter<F>(f: F) -> SetterFn
where
    F: Fn(&Arc<Namespace>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A batch of bindings for the bulk export form.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExportBatch {
    /// Name and value pairs to store.
    pub entries: Vec<(String, Value)>,
    /// Optional marker propagated to the namespace's marker slot. Never
    /// counts toward change detection.
    pub marker: Option<Value>,
}

impl ExportBatch {
    /// An empty batch.
    pub fn new() -> Self {
        ExportBatch::default()
    }

    /// Add one binding.
    pub fn entry(mut self, name: impl Into<String>, value: Value) -> Self {
        self.entries.push((name.into(), value));
        self
    }

    /// Attach the marker value.
    pub fn with_marker(mut self, marker: Value) -> Self {
        self.marker = Some(marker);
        self
    }
}

impl From<Vec<(String, Value)>> for ExportBatch {
    fn from(entries: Vec<(String, Value)>) -> Self {
        ExportBatch {
            entries,
            marker: None,
        }
    }
}

/// Export capability handed to a module's declare step.
///
/// Cloneable and retainable: a body that keeps its `Arc<dyn ExportSink>`
/// can keep exporting after it has finished running, and dependents observe
/// every later change through their setters.
pub trait ExportSink: Send + Sync {
    /// Store one binding. Returns the value that was set, so an export call
    /// can be used as an expression by the module body.
    fn export(&self, name: &str, value: Value) -> Value;

    /// Store a batch of bindings and propagate the batch marker if present.
    fn export_batch(&self, batch: ExportBatch);
}

/// Per-module capability surface the engine hands to a declare step.
///
/// This is everything a running module body may touch on the loader: its
/// own identity, specifier resolution relative to itself, and dynamic
/// import with itself as the referrer.
pub trait ModuleContext: Send + Sync {
    /// This module's canonical identifier.
    fn id(&self) -> &ModuleId;

    /// Resolve a specifier relative to this module.
    fn resolve(&self, specifier: &str) -> Result<ModuleId, HostError>;

    /// Dynamically import relative to this module.
    fn import(&self, specifier: &str) -> ImportFuture;
}
