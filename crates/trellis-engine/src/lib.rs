//! Trellis Module Engine
//!
//! Dynamic module loading and linking: given a module identifier, the
//! engine resolves the full dependency graph, instantiates each module's
//! declaration, wires live bindings between modules (including circular
//! ones), and executes every module exactly once in dependency order,
//! yielding one stable [`Namespace`] per module.
//!
//! - **Loader**: the registry of load records and the cooperative pump
//!   (`loader` module)
//! - **Phases**: instantiate, link, and execute advance per module, each
//!   waiting on dependencies one phase ahead, which is what keeps
//!   dependency cycles from deadlocking
//! - **Host boundary**: identifier resolution and module instantiation come
//!   from a [`ModuleHost`] supplied by the embedder
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trellis_engine::Loader;
//!
//! let loader = Loader::new(Arc::new(MyHost::new()));
//! let pending = loader.import("app/main", None);
//! loader.run_until_idle();
//!
//! let namespace = pending.get().unwrap()?;
//! println!("exports: {:?}", namespace.keys());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod loader;

pub use loader::{LoadState, Loader};

// Re-export SDK types (canonical definitions live in trellis-sdk)
pub use trellis_sdk::{
    setter, Completion, DeclareFn, DeclaredModule, ExecuteFn, Execution, ExportBatch, ExportSink,
    HostError, ImportFuture, InstantiateResult, LoadError, LoadResult, ModuleContext,
    ModuleDeclaration, ModuleHost, ModuleId, Namespace, NativeFn, SetterFn, SuspensionHandle,
    Value,
};
