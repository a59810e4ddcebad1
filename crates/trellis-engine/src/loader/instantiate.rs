//! Instantiation phase: obtain a module's declaration and run its declare
//! step.

use std::sync::{Arc, Weak};

use trellis_sdk::{
    DeclaredModule, Execution, ExportBatch, ExportSink, HostError, ImportFuture, InstantiateResult,
    LoadError, ModuleContext, ModuleDeclaration, ModuleId, Value,
};

use crate::loader::record::LoadRecord;
use crate::loader::LoaderInner;

/// Ask the host for `record`'s declaration and apply it.
///
/// Runs once per record, from the job queue. A deferred host reply is
/// awaited through its completion handle; the declaration is then expected
/// in the loader's staged set.
pub(crate) fn start_instantiate(
    inner: &Arc<LoaderInner>,
    record: &Arc<LoadRecord>,
    referrer: Option<ModuleId>,
) {
    match inner.host.instantiate(record.id(), referrer.as_ref()) {
        InstantiateResult::Declared(declaration) => finish_instantiate(inner, record, declaration),
        InstantiateResult::Deferred(pending) => {
            let weak = Arc::downgrade(inner);
            let load = Arc::clone(record);
            pending.on_settled(move |result| {
                let inner = match weak.upgrade() {
                    Some(inner) => inner,
                    None => return,
                };
                match result {
                    Ok(()) => match inner.take_staged(load.id()) {
                        Some(declaration) => finish_instantiate(&inner, &load, declaration),
                        None => fail_instantiate(
                            &load,
                            LoadError::NotRegistered {
                                id: load.id().clone(),
                            },
                        ),
                    },
                    Err(err) => fail_instantiate(
                        &load,
                        LoadError::Instantiate {
                            id: load.id().clone(),
                            source: err.clone(),
                        },
                    ),
                }
            });
        }
        InstantiateResult::Error(source) => fail_instantiate(
            record,
            LoadError::Instantiate {
                id: record.id().clone(),
                source,
            },
        ),
    }
}

/// Run the declare step: hand the module its export callback and context,
/// store the declared setters and body, and settle the instantiate future.
fn finish_instantiate(
    inner: &Arc<LoaderInner>,
    record: &Arc<LoadRecord>,
    declaration: ModuleDeclaration,
) {
    let ModuleDeclaration {
        dependencies,
        declare,
    } = declaration;
    record.set_dependency_specifiers(dependencies);

    let exports: Arc<dyn ExportSink> = Arc::new(Exports {
        record: Arc::downgrade(record),
    });
    let context: Arc<dyn ModuleContext> = Arc::new(BodyContext {
        id: record.id().clone(),
        loader: Arc::downgrade(inner),
    });

    match declare(exports, context) {
        Ok(declared) => {
            let DeclaredModule { setters, execute } = declared;
            record.stage_setters(setters);
            let body = execute.unwrap_or_else(|| Box::new(|| Ok(Execution::Complete)));
            record.set_execute(body);
            record.instantiated().resolve(());
        }
        Err(source) => fail_instantiate(
            record,
            LoadError::Instantiate {
                id: record.id().clone(),
                source,
            },
        ),
    }
}

/// Terminal instantiation failure: memoize it and reject the phase future.
fn fail_instantiate(record: &Arc<LoadRecord>, error: LoadError) {
    record.fail(&error);
    record.instantiated().reject(error);
}

// ----------------------------------------------------------------------
// Capabilities handed to module bodies
// ----------------------------------------------------------------------

/// Export callback surface bound to one record.
///
/// Holds the record weakly so a body that retains its export handle past
/// the loader's life does not keep the whole graph alive.
struct Exports {
    record: Weak<LoadRecord>,
}

impl ExportSink for Exports {
    fn export(&self, name: &str, value: Value) -> Value {
        let record = match self.record.upgrade() {
            Some(record) => record,
            None => return value,
        };
        if record.namespace().insert(name, value.clone()) {
            record.mark_hoisted();
            record.notify_importers();
        }
        value
    }

    fn export_batch(&self, batch: ExportBatch) {
        let record = match self.record.upgrade() {
            Some(record) => record,
            None => return,
        };
        let ExportBatch { entries, marker } = batch;
        let changed = record.namespace().merge(entries);
        if let Some(marker) = marker {
            record.namespace().set_marker(marker);
        }
        if changed {
            record.mark_hoisted();
            record.notify_importers();
        }
    }
}

/// What a running module body may touch on the loader: its own identity,
/// relative resolution, and dynamic import with itself as the referrer.
struct BodyContext {
    id: ModuleId,
    loader: Weak<LoaderInner>,
}

impl ModuleContext for BodyContext {
    fn id(&self) -> &ModuleId {
        &self.id
    }

    fn resolve(&self, specifier: &str) -> Result<ModuleId, HostError> {
        match self.loader.upgrade() {
            Some(inner) => inner.host.resolve(specifier, Some(&self.id)),
            None => Err("loader was dropped".into()),
        }
    }

    fn import(&self, specifier: &str) -> ImportFuture {
        match self.loader.upgrade() {
            Some(inner) => inner.import_inner(specifier, Some(&self.id)),
            None => ImportFuture::rejected(LoadError::LoaderGone),
        }
    }
}
