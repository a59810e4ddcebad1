//! The capability surface the engine consumes from its embedder.

use crate::completion::Completion;
use crate::declare::ModuleDeclaration;
use crate::error::HostError;
use crate::ident::ModuleId;

/// Outcome of asking the host to instantiate one module.
pub enum InstantiateResult {
    /// The host produced the declaration synchronously.
    Declared(ModuleDeclaration),
    /// The declaration will arrive later through
    /// `Loader::register`; the handle settles when it is available (or
    /// rejects if the fetch failed).
    Deferred(Completion<(), HostError>),
    /// The host could not produce a declaration for this identifier.
    Error(HostError),
}

/// Resolution and instantiation, supplied by the embedder.
///
/// The engine guarantees `instantiate` is called at most once per module
/// identifier for the lifetime of a loader, including across repeated
/// imports of a module that failed.
pub trait ModuleHost: Send + Sync {
    /// Canonicalize a specifier, optionally relative to a referrer.
    ///
    /// Must be deterministic: the engine keys its registry on the returned
    /// identifier, so two resolutions of equivalent input must agree.
    fn resolve(&self, specifier: &str, referrer: Option<&ModuleId>)
        -> Result<ModuleId, HostError>;

    /// Produce the declaration for a resolved identifier.
    fn instantiate(&self, id: &ModuleId, referrer: Option<&ModuleId>) -> InstantiateResult;
}
