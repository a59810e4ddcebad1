//! Execution engine: cycle-safe post-order traversal with cooperative
//! suspension and transitive failure propagation.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use trellis_sdk::{Completion, ExecuteFn, Execution, ImportFuture, LoadError, ModuleId};

use crate::loader::record::{LoadRecord, LoadState, PhaseFuture};

/// Drive `record` to completion for one top-level import and return its
/// memoized completion future.
///
/// The future is created once per record; every later import of the same
/// identifier gets the same settled or in-flight future back.
pub(crate) fn top_level_load(record: &Arc<LoadRecord>, referrer: Option<ModuleId>) -> ImportFuture {
    let (completion, created) = record.completion_or_insert();
    if !created {
        return completion;
    }

    let visited = Arc::new(Mutex::new(FxHashSet::default()));
    let ready = instantiate_all(record, &visited);

    let load = Arc::clone(record);
    let out = completion.clone();
    ready.on_settled(move |result| {
        if let Err(err) = result {
            out.reject(err.clone());
            return;
        }
        // Seeding the stack with the referrer keeps a module's dynamic
        // import of itself from trying to execute it a second time.
        let mut stack = Vec::new();
        if let Some(referrer) = referrer {
            stack.push(referrer);
        }
        match post_order_exec(&load, &mut stack) {
            Err(err) => out.reject(err),
            Ok(Some(pending)) => {
                let out = out.clone();
                pending.on_settled(move |result| match result {
                    Ok(()) => out.resolve(Arc::clone(load.namespace())),
                    Err(err) => out.reject(err.clone()),
                });
            }
            Ok(None) => out.resolve(Arc::clone(load.namespace())),
        }
    });

    completion
}

/// Wait until every record reachable from `record` has finished linking.
///
/// Depth-first over link futures with a shared visited set: each identifier
/// is awaited at most once, so dependency cycles terminate.
fn instantiate_all(
    record: &Arc<LoadRecord>,
    visited: &Arc<Mutex<FxHashSet<ModuleId>>>,
) -> PhaseFuture {
    if !visited.lock().insert(record.id().clone()) {
        return PhaseFuture::resolved(());
    }

    let done = PhaseFuture::new();
    let load = Arc::clone(record);
    let visited = Arc::clone(visited);
    let out = done.clone();
    record.linked().on_settled(move |result| {
        if let Err(err) = result {
            out.reject(err.clone());
            return;
        }
        let deps: Vec<PhaseFuture> = load
            .dependency_loads()
            .iter()
            .map(|dep| instantiate_all(dep, &visited))
            .collect();
        let out = out.clone();
        Completion::all(deps).on_settled(move |result| match result {
            Ok(()) => out.resolve(()),
            Err(err) => out.reject(err.clone()),
        });
    });

    done
}

/// Execute `record` after its dependencies, exactly once.
///
/// `stack` holds the identifiers currently executing on this call path; a
/// record already on it is skipped, because the frame further up that first
/// reached it will run it during unwinding.
///
/// Returns `Ok(None)` when the record has fully finished, `Ok(Some)` when
/// completion is pending behind suspended work, and `Err` with the record's
/// terminal error. Errors propagate to the caller and are memoized on every
/// record they pass through.
fn post_order_exec(
    record: &Arc<LoadRecord>,
    stack: &mut Vec<ModuleId>,
) -> Result<Option<PhaseFuture>, LoadError> {
    if stack.contains(record.id()) {
        return Ok(None);
    }

    // Claiming the body up front is the exactly-once guard: whoever gets
    // `Some` here owns this record's execution.
    let body = match record.take_execute() {
        Some(body) => body,
        None => {
            if let Some(error) = record.error() {
                return Err(error.clone());
            }
            return Ok(record.inflight());
        }
    };

    record.set_state(LoadState::Executing);

    let mut pending = Vec::new();
    stack.push(record.id().clone());
    for dep in record.dependency_loads() {
        match post_order_exec(&dep, stack) {
            Ok(Some(future)) => pending.push(future),
            Ok(None) => {}
            Err(err) => {
                stack.pop();
                record.fail(&err);
                return Err(err);
            }
        }
    }
    stack.pop();

    if pending.is_empty() {
        return run_body(record, body);
    }

    // Some dependency is still settling. The body is already claimed, so
    // park it behind a gate future that stands in as this record's
    // in-flight completion until the body can actually run.
    let gate = PhaseFuture::new();
    record.store_inflight(gate.clone());
    let load = Arc::clone(record);
    let out = gate.clone();
    Completion::all(pending).on_settled(move |result| {
        if let Err(err) = result {
            load.fail(err);
            out.reject(err.clone());
            return;
        }
        match run_body(&load, body) {
            Err(err) => out.reject(err),
            Ok(Some(suspended)) => {
                let out = out.clone();
                suspended.on_settled(move |result| match result {
                    Ok(()) => out.resolve(()),
                    Err(err) => out.reject(err.clone()),
                });
            }
            Ok(None) => out.resolve(()),
        }
    });

    Ok(Some(gate))
}

/// Invoke a claimed body and settle the record from its outcome.
fn run_body(record: &Arc<LoadRecord>, body: ExecuteFn) -> Result<Option<PhaseFuture>, LoadError> {
    match body() {
        Ok(Execution::Complete) => {
            record.finish();
            Ok(None)
        }
        Ok(Execution::Suspended(handle)) => {
            let done = PhaseFuture::new();
            record.store_inflight(done.clone());
            let load = Arc::clone(record);
            let out = done.clone();
            handle.on_settled(move |result| match result {
                Ok(()) => {
                    load.finish();
                    out.resolve(());
                }
                Err(err) => {
                    let error = LoadError::Execution {
                        id: load.id().clone(),
                        source: err.clone(),
                    };
                    load.fail(&error);
                    out.reject(error);
                }
            });
            Ok(Some(done))
        }
        Err(source) => {
            let error = LoadError::Execution {
                id: record.id().clone(),
                source,
            };
            record.fail(&error);
            Err(error)
        }
    }
}
