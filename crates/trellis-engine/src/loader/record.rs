//! Per-module load state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use trellis_sdk::{Completion, ExecuteFn, ImportFuture, LoadError, ModuleId, Namespace, SetterFn};

/// Settlement of one pipeline phase for one record.
pub(crate) type PhaseFuture = Completion<(), LoadError>;

/// Where a module currently is in the pipeline.
///
/// Transitions are monotonic. `Failed` is terminal: once entered, a record
/// never reports any other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Waiting for the host to produce a declaration, or running declare.
    Instantiating,
    /// Resolving dependencies and registering setters.
    Linking,
    /// Fully linked; body has not been consumed yet.
    Linked,
    /// Body taken; running or suspended.
    Executing,
    /// Body finished; the namespace is final modulo live re-exports.
    Executed,
    /// A terminal error is recorded.
    Failed,
}

/// One module's progress through instantiate, link, and execute.
///
/// A record is created once per identifier and shared behind `Arc`; every
/// field mutates in place. Interior locks are held only long enough to move
/// data in or out, never across host or module callbacks.
pub(crate) struct LoadRecord {
    id: ModuleId,
    namespace: Arc<Namespace>,
    state: Mutex<LoadState>,
    dependency_specifiers: Mutex<Vec<String>>,
    dependency_loads: Mutex<Vec<Arc<LoadRecord>>>,
    staged_setters: Mutex<Vec<Option<SetterFn>>>,
    importer_setters: Mutex<Vec<SetterFn>>,
    execute: Mutex<Option<ExecuteFn>>,
    hoisted_exports: AtomicBool,
    error: OnceCell<LoadError>,
    instantiated: PhaseFuture,
    linked: PhaseFuture,
    inflight: Mutex<Option<PhaseFuture>>,
    completion: Mutex<Option<ImportFuture>>,
}

impl LoadRecord {
    pub(crate) fn new(id: ModuleId) -> Arc<LoadRecord> {
        Arc::new(LoadRecord {
            id,
            namespace: Arc::new(Namespace::new()),
            state: Mutex::new(LoadState::Instantiating),
            dependency_specifiers: Mutex::new(Vec::new()),
            dependency_loads: Mutex::new(Vec::new()),
            staged_setters: Mutex::new(Vec::new()),
            importer_setters: Mutex::new(Vec::new()),
            execute: Mutex::new(None),
            hoisted_exports: AtomicBool::new(false),
            error: OnceCell::new(),
            instantiated: PhaseFuture::new(),
            linked: PhaseFuture::new(),
            inflight: Mutex::new(None),
            completion: Mutex::new(None),
        })
    }

    pub(crate) fn id(&self) -> &ModuleId {
        &self.id
    }

    /// The identity-stable export surface. The `Arc` handed out here is the
    /// same one for the record's whole life.
    pub(crate) fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    pub(crate) fn state(&self) -> LoadState {
        *self.state.lock()
    }

    /// Advance the state machine. `Failed` is sticky.
    pub(crate) fn set_state(&self, next: LoadState) {
        let mut state = self.state.lock();
        if *state == LoadState::Failed {
            return;
        }
        *state = next;
    }

    // ------------------------------------------------------------------
    // Dependency bookkeeping
    // ------------------------------------------------------------------

    pub(crate) fn set_dependency_specifiers(&self, specifiers: Vec<String>) {
        *self.dependency_specifiers.lock() = specifiers;
    }

    pub(crate) fn dependency_specifiers(&self) -> Vec<String> {
        self.dependency_specifiers.lock().clone()
    }

    pub(crate) fn set_dependency_loads(&self, loads: Vec<Arc<LoadRecord>>) {
        *self.dependency_loads.lock() = loads;
    }

    pub(crate) fn dependency_loads(&self) -> Vec<Arc<LoadRecord>> {
        self.dependency_loads.lock().clone()
    }

    /// Park the declared setters until linking pairs them with resolved
    /// dependency records.
    pub(crate) fn stage_setters(&self, setters: Vec<Option<SetterFn>>) {
        *self.staged_setters.lock() = setters;
    }

    pub(crate) fn take_staged_setters(&self) -> Vec<Option<SetterFn>> {
        std::mem::take(&mut *self.staged_setters.lock())
    }

    // ------------------------------------------------------------------
    // Live-binding observers
    // ------------------------------------------------------------------

    pub(crate) fn add_importer_setter(&self, setter: SetterFn) {
        self.importer_setters.lock().push(setter);
    }

    /// Invoke every registered importer setter with this record's namespace.
    ///
    /// Setters run outside the observer lock, so a setter that re-exports
    /// (and so re-enters notification) cannot deadlock.
    pub(crate) fn notify_importers(&self) {
        let setters: Vec<SetterFn> = self.importer_setters.lock().clone();
        for setter in setters {
            setter(&self.namespace);
        }
    }

    pub(crate) fn mark_hoisted(&self) {
        self.hoisted_exports.store(true, Ordering::SeqCst);
    }

    /// True once at least one binding has actually been exported.
    pub(crate) fn hoisted_exports(&self) -> bool {
        self.hoisted_exports.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Body and error slots
    // ------------------------------------------------------------------

    pub(crate) fn set_execute(&self, execute: ExecuteFn) {
        *self.execute.lock() = Some(execute);
    }

    /// Consume the body. At most one caller ever sees `Some`.
    pub(crate) fn take_execute(&self) -> Option<ExecuteFn> {
        self.execute.lock().take()
    }

    pub(crate) fn error(&self) -> Option<&LoadError> {
        self.error.get()
    }

    /// Record a terminal failure: first error wins, the body is dropped so
    /// it can never run, and the state sticks at `Failed`.
    pub(crate) fn fail(&self, error: &LoadError) {
        let _ = self.error.set(error.clone());
        *self.execute.lock() = None;
        self.set_state(LoadState::Failed);
        self.clear_inflight();
    }

    /// Mark the body as finished cleanly.
    pub(crate) fn finish(&self) {
        self.set_state(LoadState::Executed);
        self.clear_inflight();
    }

    // ------------------------------------------------------------------
    // Phase futures
    // ------------------------------------------------------------------

    pub(crate) fn instantiated(&self) -> &PhaseFuture {
        &self.instantiated
    }

    pub(crate) fn linked(&self) -> &PhaseFuture {
        &self.linked
    }

    pub(crate) fn inflight(&self) -> Option<PhaseFuture> {
        self.inflight.lock().clone()
    }

    pub(crate) fn store_inflight(&self, future: PhaseFuture) {
        *self.inflight.lock() = Some(future);
    }

    pub(crate) fn clear_inflight(&self) {
        *self.inflight.lock() = None;
    }

    /// The memoized top-level import future for this record, created on
    /// first use. Returns the future and whether this call created it.
    pub(crate) fn completion_or_insert(&self) -> (ImportFuture, bool) {
        let mut slot = self.completion.lock();
        match &*slot {
            Some(existing) => (existing.clone(), false),
            None => {
                let future = ImportFuture::new();
                *slot = Some(future.clone());
                (future, true)
            }
        }
    }
}
