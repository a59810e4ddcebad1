//! Error types shared across the loader boundary.

use crate::ident::ModuleId;

/// Result type for loader operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Failure raised by host collaborators or module bodies.
///
/// These cross the boundary in both directions: hosts return them from
/// `resolve`/`instantiate`, and module bodies return them from `declare`,
/// `execute`, and exported function values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// The host has no module for the requested identifier.
    #[error("unknown module '{0}'")]
    UnknownModule(String),

    /// A specifier could not be mapped to a canonical identifier.
    #[error("bad specifier '{0}'")]
    BadSpecifier(String),

    /// A non-function value was called.
    #[error("value is not callable")]
    NotCallable,

    /// Free-form failure raised by host code or a module body.
    #[error("{0}")]
    Failed(String),
}

impl From<String> for HostError {
    fn from(s: String) -> Self {
        HostError::Failed(s)
    }
}

impl From<&str> for HostError {
    fn from(s: &str) -> Self {
        HostError::Failed(s.to_string())
    }
}

/// Terminal failure recorded on a load record.
///
/// Load errors are memoized: once a record fails, every current and future
/// attempt against it observes the same value, and a failure propagates
/// unchanged through every dependent it unwinds. Cloneable and comparable
/// so waiters can each receive the memoized value and tests can assert on
/// it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// A specifier could not be resolved to a canonical identifier.
    #[error("failed to resolve '{specifier}': {source}")]
    Resolve {
        /// The specifier as requested.
        specifier: String,
        /// The module the specifier was resolved against, if any.
        referrer: Option<ModuleId>,
        /// The host's resolution failure.
        source: HostError,
    },

    /// The host could not produce a declaration for the module.
    #[error("instantiation of '{id}' failed: {source}")]
    Instantiate {
        /// The failing module.
        id: ModuleId,
        /// The host or declare failure.
        source: HostError,
    },

    /// Deferred instantiation settled without a declaration being registered.
    #[error("module '{id}' was never registered")]
    NotRegistered {
        /// The module that was never registered.
        id: ModuleId,
    },

    /// The module body failed, either synchronously or via a rejected
    /// suspension handle.
    #[error("execution of '{id}' failed: {source}")]
    Execution {
        /// The failing module.
        id: ModuleId,
        /// The body's failure.
        source: HostError,
    },

    /// A module context outlived its loader.
    #[error("loader is gone")]
    LoaderGone,
}
