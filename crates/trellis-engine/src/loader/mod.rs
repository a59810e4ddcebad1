//! The loader: registry wiring, the public import surface, and the
//! cooperative pump.

mod execute;
mod instantiate;
mod jobs;
mod link;
mod record;
mod registry;

pub use record::LoadState;

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use trellis_sdk::{ImportFuture, LoadError, ModuleDeclaration, ModuleHost, ModuleId, Namespace};

use jobs::JobQueue;
use record::LoadRecord;
use registry::Registry;

/// The module loading and linking engine.
///
/// A loader owns its registry of load records and a queue of pending host
/// work; nothing is process-global, so independent loaders coexist freely.
/// Handles are cheap to clone and share one engine.
///
/// Driving model: [`import`](Loader::import) wires futures and queues work,
/// [`run_until_idle`](Loader::run_until_idle) pumps queued host calls until
/// nothing is left. With a synchronous host one pump settles the whole
/// graph; a host that answers
/// [`Deferred`](trellis_sdk::InstantiateResult::Deferred) settles its
/// handles between pumps.
#[derive(Clone)]
pub struct Loader {
    inner: Arc<LoaderInner>,
}

pub(crate) struct LoaderInner {
    pub(crate) host: Arc<dyn ModuleHost>,
    pub(crate) registry: Registry,
    pub(crate) jobs: JobQueue,
    staged: Mutex<FxHashMap<ModuleId, ModuleDeclaration>>,
}

impl Loader {
    /// Create a loader over a host. The registry starts empty and lives
    /// exactly as long as the loader.
    pub fn new(host: Arc<dyn ModuleHost>) -> Loader {
        Loader {
            inner: Arc::new(LoaderInner {
                host,
                registry: Registry::new(),
                jobs: JobQueue::new(),
                staged: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    /// Import a module, optionally relative to a referrer.
    ///
    /// Returns the module's memoized completion future: importing the same
    /// resolved identifier again returns the same future, settled or not.
    pub fn import(&self, specifier: &str, referrer: Option<&ModuleId>) -> ImportFuture {
        self.inner.import_inner(specifier, referrer)
    }

    /// Hand the loader a declaration the host answered `Deferred` for.
    ///
    /// Must happen before the deferred handle is resolved; settlement is
    /// when the loader looks for the declaration.
    pub fn register(&self, id: ModuleId, declaration: ModuleDeclaration) {
        self.inner.staged.lock().insert(id, declaration);
    }

    /// Drain the work queue, running queued host instantiations and
    /// everything that settles behind them. Jobs queued while draining run
    /// in the same call.
    pub fn run_until_idle(&self) {
        while let Some(job) = self.inner.jobs.pop() {
            job();
        }
    }

    /// True when no queued work remains.
    pub fn is_idle(&self) -> bool {
        self.inner.jobs.is_empty()
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// True if `id` has a load record, in any state.
    pub fn has(&self, id: &ModuleId) -> bool {
        self.inner.registry.contains(id)
    }

    /// Where `id` currently is in the pipeline, if it is known at all.
    pub fn state(&self, id: &ModuleId) -> Option<LoadState> {
        self.inner.registry.get(id).map(|record| record.state())
    }

    /// The namespace of a fully executed module.
    ///
    /// `None` until the module's body has finished; in-progress namespaces
    /// reach modules through their setters instead.
    pub fn namespace(&self, id: &ModuleId) -> Option<Arc<Namespace>> {
        let record = self.inner.registry.get(id)?;
        if record.state() == LoadState::Executed {
            Some(Arc::clone(record.namespace()))
        } else {
            None
        }
    }

    /// Number of known records.
    pub fn len(&self) -> usize {
        self.inner.registry.len()
    }

    /// True when nothing has been imported yet.
    pub fn is_empty(&self) -> bool {
        self.inner.registry.is_empty()
    }

    /// All known identifiers, sorted.
    pub fn ids(&self) -> Vec<ModuleId> {
        self.inner.registry.ids()
    }
}

impl LoaderInner {
    /// Shared path behind [`Loader::import`] and a body's dynamic import.
    pub(crate) fn import_inner(
        self: &Arc<Self>,
        specifier: &str,
        referrer: Option<&ModuleId>,
    ) -> ImportFuture {
        let id = match self.host.resolve(specifier, referrer) {
            Ok(id) => id,
            Err(source) => {
                return ImportFuture::rejected(LoadError::Resolve {
                    specifier: specifier.to_string(),
                    referrer: referrer.cloned(),
                    source,
                });
            }
        };
        let record = self.get_or_create(&id, referrer);
        execute::top_level_load(&record, referrer.cloned())
    }

    /// Get the record for `id`, creating it and kicking off instantiation
    /// if this is the first reference. Idempotent per identifier.
    pub(crate) fn get_or_create(
        self: &Arc<Self>,
        id: &ModuleId,
        referrer: Option<&ModuleId>,
    ) -> Arc<LoadRecord> {
        let (record, created) = self.registry.get_or_insert(id);
        if created {
            self.wire(&record, referrer.cloned());
        }
        record
    }

    pub(crate) fn take_staged(&self, id: &ModuleId) -> Option<ModuleDeclaration> {
        self.staged.lock().remove(id)
    }

    /// First-reference setup for a fresh record: chain instantiation into
    /// linking (and instantiation failure into the link future), then queue
    /// the host's instantiate call.
    fn wire(self: &Arc<Self>, record: &Arc<LoadRecord>, referrer: Option<ModuleId>) {
        let weak = Arc::downgrade(self);
        let load = Arc::clone(record);
        record.instantiated().on_settled(move |result| match result {
            Ok(()) => {
                if let Some(inner) = weak.upgrade() {
                    link::start_link(&inner, &load);
                }
            }
            Err(err) => link::fail_link(&load, err.clone()),
        });

        let weak = Arc::downgrade(self);
        let load = Arc::clone(record);
        self.jobs.push(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                instantiate::start_instantiate(&inner, &load, referrer);
            }
        }));
    }
}
