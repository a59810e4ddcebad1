//! Single-assignment deferred results with synchronous observer delivery.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::LoadError;

type Callback<T, E> = Box<dyn FnOnce(&Result<T, E>) + Send>;

enum State<T, E> {
    Pending(Vec<Callback<T, E>>),
    Settled(Result<T, E>),
}

/// A single-assignment future: pending until settled exactly once with a
/// `Result`, after which the result is replayed to every observer.
///
/// Observers registered before settlement run synchronously on the settling
/// thread, in registration order, after the internal lock has been
/// released. Observers registered after settlement run immediately on the
/// registering thread. The first settlement wins; later `resolve`/`reject`
/// calls are ignored.
///
/// Handles are cheap to clone and all refer to the same cell.
pub struct Completion<T, E = LoadError> {
    state: Arc<Mutex<State<T, E>>>,
}

impl<T, E> Completion<T, E> {
    /// Create a pending completion.
    pub fn new() -> Self {
        Completion {
            state: Arc::new(Mutex::new(State::Pending(Vec::new()))),
        }
    }

    /// True once settled, in either direction.
    pub fn is_settled(&self) -> bool {
        matches!(&*self.state.lock(), State::Settled(_))
    }

    /// True while not yet settled.
    pub fn is_pending(&self) -> bool {
        !self.is_settled()
    }
}

impl<T: Clone, E: Clone> Completion<T, E> {
    /// Create an already-resolved completion.
    pub fn resolved(value: T) -> Self {
        Completion {
            state: Arc::new(Mutex::new(State::Settled(Ok(value)))),
        }
    }

    /// Create an already-rejected completion.
    pub fn rejected(error: E) -> Self {
        Completion {
            state: Arc::new(Mutex::new(State::Settled(Err(error)))),
        }
    }

    /// Settle successfully. No-op if already settled.
    pub fn resolve(&self, value: T) {
        self.settle(Ok(value));
    }

    /// Settle with a failure. No-op if already settled.
    pub fn reject(&self, error: E) {
        self.settle(Err(error));
    }

    /// The settled result, if any.
    pub fn get(&self) -> Option<Result<T, E>> {
        match &*self.state.lock() {
            State::Settled(result) => Some(result.clone()),
            State::Pending(_) => None,
        }
    }

    /// Observe settlement. Runs immediately when already settled, otherwise
    /// once at settlement time.
    pub fn on_settled<F>(&self, callback: F)
    where
        F: FnOnce(&Result<T, E>) + Send + 'static,
    {
        let replay = {
            let mut state = self.state.lock();
            match &mut *state {
                State::Pending(callbacks) => {
                    callbacks.push(Box::new(callback));
                    return;
                }
                State::Settled(result) => result.clone(),
            }
        };
        callback(&replay);
    }

    fn settle(&self, result: Result<T, E>) {
        let callbacks = {
            let mut state = self.state.lock();
            match &mut *state {
                State::Settled(_) => return,
                State::Pending(callbacks) => {
                    let callbacks = mem::take(callbacks);
                    *state = State::Settled(result.clone());
                    callbacks
                }
            }
        };
        for callback in callbacks {
            callback(&result);
        }
    }
}

impl<E: Clone + Send + 'static> Completion<(), E> {
    /// Join a set of completions: resolves once every input has resolved,
    /// rejects with the first rejection. An empty set resolves immediately.
    pub fn all(futures: impl IntoIterator<Item = Completion<(), E>>) -> Completion<(), E> {
        let futures: Vec<_> = futures.into_iter().collect();
        if futures.is_empty() {
            return Completion::resolved(());
        }
        let joined = Completion::new();
        let remaining = Arc::new(AtomicUsize::new(futures.len()));
        for future in futures {
            let joined = joined.clone();
            let remaining = Arc::clone(&remaining);
            future.on_settled(move |result| match result {
                Ok(()) => {
                    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                        joined.resolve(());
                    }
                }
                Err(err) => joined.reject(err.clone()),
            });
        }
        joined
    }
}

impl<T, E> Clone for Completion<T, E> {
    fn clone(&self) -> Self {
        Completion {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T, E> Default for Completion<T, E> {
    fn default() -> Self {
        Completion::new()
    }
}

impl<T, E> fmt::Debug for Completion<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.lock() {
            State::Pending(_) => "pending",
            State::Settled(Ok(_)) => "resolved",
            State::Settled(Err(_)) => "rejected",
        };
        f.debug_tuple("Completion").field(&state).finish()
    }
}
