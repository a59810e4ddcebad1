//! Trellis SDK - Shared types and traits for module hosts and bodies
//!
//! This crate provides the minimal types and traits needed to feed modules
//! to a Trellis loader without depending on the full trellis-engine:
//!
//! - [`ModuleHost`] is implemented by the embedder and supplies specifier
//!   resolution and module instantiation.
//! - [`ModuleDeclaration`] / [`DeclaredModule`] describe one module: its
//!   dependency specifiers, its per-dependency setters, and its body.
//! - [`ExportSink`] and [`ModuleContext`] are the capabilities the engine
//!   hands to a module's declare step.
//! - [`Namespace`] is the identity-stable export surface dependents observe,
//!   holding [`Value`] bindings.
//! - [`Completion`] is the single-assignment future used for every waitable
//!   in the pipeline.
//!
//! # Example
//!
//! ```ignore
//! use trellis_sdk::{DeclaredModule, Execution, ModuleDeclaration, Value};
//!
//! let decl = ModuleDeclaration::new(Vec::new(), |exports, _ctx| {
//!     Ok(DeclaredModule::new().with_execute(move || {
//!         exports.export("answer", Value::Int(42));
//!         Ok(Execution::Complete)
//!     }))
//! });
//! ```

#![warn(missing_docs)]

mod completion;
mod declare;
mod error;
mod host;
mod ident;
mod namespace;
mod value;

pub use completion::Completion;
pub use declare::{
    setter, DeclareFn, DeclaredModule, ExecuteFn, Execution, ExportBatch, ExportSink, ImportFuture,
    ModuleContext, ModuleDeclaration, SetterFn, SuspensionHandle,
};
pub use error::{HostError, LoadError, LoadResult};
pub use host::{InstantiateResult, ModuleHost};
pub use ident::ModuleId;
pub use namespace::Namespace;
pub use value::{NativeFn, Value};
