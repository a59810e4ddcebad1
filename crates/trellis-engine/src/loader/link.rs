//! Linking phase: resolve dependencies, register setters, and seed
//! live-binding propagation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use trellis_sdk::LoadError;

use crate::loader::record::{LoadRecord, LoadState};
use crate::loader::LoaderInner;

/// Link `record` once its own instantiation has settled.
///
/// Each declared dependency is resolved, created on demand, and awaited
/// through its instantiate future only. Waiting one phase ahead, never on a
/// dependency's own linking, is what keeps dependency cycles from
/// deadlocking here.
pub(crate) fn start_link(inner: &Arc<LoaderInner>, record: &Arc<LoadRecord>) {
    record.set_state(LoadState::Linking);

    let specifiers = record.dependency_specifiers();
    let mut setters = record.take_staged_setters();
    // one slot per dependency, whether or not a setter was declared for it
    setters.resize_with(specifiers.len(), || None);

    if specifiers.is_empty() {
        record.set_state(LoadState::Linked);
        record.linked().resolve(());
        return;
    }

    let total = specifiers.len();
    let slots: Arc<Mutex<Vec<Option<Arc<LoadRecord>>>>> = Arc::new(Mutex::new(vec![None; total]));
    let remaining = Arc::new(AtomicUsize::new(total));

    for (index, (specifier, setter)) in specifiers.into_iter().zip(setters).enumerate() {
        let dep_id = match inner.host.resolve(&specifier, Some(record.id())) {
            Ok(dep_id) => dep_id,
            Err(source) => {
                fail_link(
                    record,
                    LoadError::Resolve {
                        specifier,
                        referrer: Some(record.id().clone()),
                        source,
                    },
                );
                return;
            }
        };

        let dep = inner.get_or_create(&dep_id, Some(record.id()));
        let load = Arc::clone(record);
        let slots = Arc::clone(&slots);
        let remaining = Arc::clone(&remaining);
        let dep_instantiated = dep.instantiated().clone();
        dep_instantiated.on_settled(move |result| {
            if let Err(err) = result {
                fail_link(&load, err.clone());
                return;
            }

            if let Some(setter) = setter {
                dep.add_importer_setter(Arc::clone(&setter));
                // Replay current bindings to a late joiner. A dependency
                // that has started but exported nothing gets no call here;
                // it reaches this setter through notification alone.
                if dep.hoisted_exports() || dep.state() == LoadState::Executed {
                    setter(dep.namespace());
                }
            }

            slots.lock()[index] = Some(dep);
            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                let loads: Vec<Arc<LoadRecord>> = std::mem::take(&mut *slots.lock())
                    .into_iter()
                    .flatten()
                    .collect();
                load.set_dependency_loads(loads);
                load.set_state(LoadState::Linked);
                load.linked().resolve(());
            }
        });
    }
}

/// Terminal link failure: memoize it on the record and reject its link
/// future. Also used when the record's own instantiation fails, so the
/// failure reaches waiters of either phase.
pub(crate) fn fail_link(record: &Arc<LoadRecord>, error: LoadError) {
    record.fail(&error);
    record.linked().reject(error);
}
