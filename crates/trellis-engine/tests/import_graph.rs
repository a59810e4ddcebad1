//! Integration tests for import identity and graph execution
//!
//! Covers registry deduplication, post-order execution across chains and
//! diamonds, and the namespace identity a dependent observes at link time.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use trellis_engine::{
    setter, DeclaredModule, Execution, ExportSink, HostError, InstantiateResult, LoadState, Loader,
    ModuleContext, ModuleDeclaration, ModuleHost, ModuleId, Namespace, Value,
};

/// Host over a fixed table of declarations.
///
/// Declarations are taken out on instantiate, so a repeated instantiate for
/// the same identifier would answer "unknown"; the call log makes any such
/// repeat visible to assertions.
struct TestHost {
    modules: Mutex<HashMap<String, ModuleDeclaration>>,
    calls: Mutex<Vec<String>>,
}

impl TestHost {
    fn new() -> Self {
        TestHost {
            modules: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn add(&self, id: &str, declaration: ModuleDeclaration) {
        self.modules.lock().insert(id.to_string(), declaration);
    }

    fn instantiate_calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl ModuleHost for TestHost {
    fn resolve(
        &self,
        specifier: &str,
        _referrer: Option<&ModuleId>,
    ) -> Result<ModuleId, HostError> {
        Ok(ModuleId::new(specifier))
    }

    fn instantiate(&self, id: &ModuleId, _referrer: Option<&ModuleId>) -> InstantiateResult {
        self.calls.lock().push(id.to_string());
        match self.modules.lock().remove(id.as_str()) {
            Some(declaration) => InstantiateResult::Declared(declaration),
            None => InstantiateResult::Error(HostError::UnknownModule(id.to_string())),
        }
    }
}

/// Declaration with the given dependency specifiers and declare step.
fn module<F>(dependencies: &[&str], declare: F) -> ModuleDeclaration
where
    F: FnOnce(Arc<dyn ExportSink>, Arc<dyn ModuleContext>) -> Result<DeclaredModule, HostError>
        + Send
        + 'static,
{
    ModuleDeclaration::new(
        dependencies.iter().map(|s| s.to_string()).collect(),
        declare,
    )
}

/// A module that logs its execution and exports nothing.
fn logging_module(id: &'static str, deps: &[&str], log: &Arc<Mutex<Vec<&'static str>>>) -> ModuleDeclaration {
    let log = Arc::clone(log);
    module(deps, move |_exports, _ctx| {
        Ok(DeclaredModule::new().with_execute(move || {
            log.lock().push(id);
            Ok(Execution::Complete)
        }))
    })
}

/// Import, pump, and unwrap the finished namespace.
fn load(loader: &Loader, specifier: &str) -> Arc<Namespace> {
    let pending = loader.import(specifier, None);
    loader.run_until_idle();
    pending
        .get()
        .expect("import did not settle")
        .expect("import failed")
}

#[test]
fn test_import_yields_the_module_namespace() {
    let host = Arc::new(TestHost::new());
    host.add(
        "a",
        module(&[], |exports, _ctx| {
            Ok(DeclaredModule::new().with_execute(move || {
                exports.export("v", Value::Int(1));
                Ok(Execution::Complete)
            }))
        }),
    );

    let loader = Loader::new(host.clone());
    let ns = load(&loader, "a");
    assert_eq!(ns.get("v"), Some(Value::Int(1)));
    assert_eq!(loader.state(&ModuleId::new("a")), Some(LoadState::Executed));
}

#[test]
fn test_same_identifier_shares_one_record_and_namespace() {
    let host = Arc::new(TestHost::new());
    host.add(
        "a",
        module(&[], |exports, _ctx| {
            Ok(DeclaredModule::new().with_execute(move || {
                exports.export("v", Value::Int(1));
                Ok(Execution::Complete)
            }))
        }),
    );

    let loader = Loader::new(host.clone());

    // Two imports in flight before any work has run.
    let first = loader.import("a", None);
    let second = loader.import("a", None);
    loader.run_until_idle();

    let ns1 = first.get().unwrap().unwrap();
    let ns2 = second.get().unwrap().unwrap();
    assert!(Arc::ptr_eq(&ns1, &ns2), "imports must share one namespace");

    // A third import after completion still returns the same namespace.
    let ns3 = load(&loader, "a");
    assert!(Arc::ptr_eq(&ns1, &ns3));

    assert_eq!(host.instantiate_calls(), vec!["a"]);
    assert_eq!(loader.len(), 1);
}

#[test]
fn test_execute_runs_exactly_once_per_module() {
    let host = Arc::new(TestHost::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    host.add("a", logging_module("a", &[], &log));
    host.add("b", logging_module("b", &["a"], &log));

    let loader = Loader::new(host.clone());
    load(&loader, "b");
    // Importing the dependency afterwards must not run anything again.
    load(&loader, "a");

    assert_eq!(*log.lock(), vec!["a", "b"]);
    assert_eq!(host.instantiate_calls(), vec!["b", "a"]);
}

#[test]
fn test_chain_executes_in_dependency_order() {
    let host = Arc::new(TestHost::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    host.add("a", logging_module("a", &[], &log));
    host.add("b", logging_module("b", &["a"], &log));
    host.add("c", logging_module("c", &["b"], &log));

    let loader = Loader::new(host.clone());
    load(&loader, "c");

    assert_eq!(*log.lock(), vec!["a", "b", "c"]);
}

#[test]
fn test_diamond_executes_each_module_once() {
    let host = Arc::new(TestHost::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    host.add("a", logging_module("a", &[], &log));
    host.add("b", logging_module("b", &["a"], &log));
    host.add("c", logging_module("c", &["a"], &log));
    host.add("d", logging_module("d", &["b", "c"], &log));

    let loader = Loader::new(host.clone());
    load(&loader, "d");

    let order = log.lock().clone();
    assert_eq!(order.len(), 4, "each module runs once, got {:?}", order);
    let pos = |id: &str| order.iter().position(|x| *x == id).unwrap();
    assert!(pos("a") < pos("b"));
    assert!(pos("a") < pos("c"));
    assert_eq!(pos("d"), 3, "the entry point runs last, got {:?}", order);
}

#[test]
fn test_dependent_builds_on_dependency_exports() {
    let host = Arc::new(TestHost::new());
    host.add(
        "a",
        module(&[], |exports, _ctx| {
            Ok(DeclaredModule::new().with_execute(move || {
                exports.export("v", Value::Int(1));
                Ok(Execution::Complete)
            }))
        }),
    );

    // "b" reads a.v through its setter-observed namespace.
    let seen_a: Arc<Mutex<Option<Arc<Namespace>>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&seen_a);
    host.add(
        "b",
        module(&["a"], move |exports, _ctx| {
            let linked = Arc::clone(&slot);
            let read = Arc::clone(&slot);
            Ok(DeclaredModule::new()
                .with_setters(vec![Some(setter(move |ns| {
                    *linked.lock() = Some(Arc::clone(ns));
                }))])
                .with_execute(move || {
                    let a_ns = read
                        .lock()
                        .clone()
                        .ok_or_else(|| HostError::Failed("a was never linked".into()))?;
                    let v = a_ns.get("v").and_then(|v| v.as_int()).unwrap_or(0);
                    exports.export("v", Value::Int(v + 1));
                    Ok(Execution::Complete)
                }))
        }),
    );

    let loader = Loader::new(host.clone());
    let ns_b = load(&loader, "b");
    assert_eq!(ns_b.get("v"), Some(Value::Int(2)));

    // Importing "a" afterwards yields the very namespace object "b"'s
    // setter observed during linking.
    let ns_a = load(&loader, "a");
    let observed = seen_a.lock().clone().unwrap();
    assert!(Arc::ptr_eq(&ns_a, &observed));
    assert_eq!(ns_a.get("v"), Some(Value::Int(1)));
}

#[test]
fn test_independent_loaders_do_not_share_state() {
    let make_host = || {
        let host = Arc::new(TestHost::new());
        host.add(
            "a",
            module(&[], |exports, _ctx| {
                Ok(DeclaredModule::new().with_execute(move || {
                    exports.export("v", Value::Int(1));
                    Ok(Execution::Complete)
                }))
            }),
        );
        host
    };
    let host1 = make_host();
    let host2 = make_host();
    let loader1 = Loader::new(host1.clone());
    let loader2 = Loader::new(host2.clone());

    let ns1 = load(&loader1, "a");
    let ns2 = load(&loader2, "a");

    // Same identifier, but each loader owns its own record and namespace.
    assert!(!Arc::ptr_eq(&ns1, &ns2));
    assert_eq!(host1.instantiate_calls(), vec!["a"]);
    assert_eq!(host2.instantiate_calls(), vec!["a"]);
    assert_eq!(loader1.len(), 1);
    assert_eq!(loader2.len(), 1);
}

#[test]
fn test_exported_functions_are_callable_across_modules() {
    let host = Arc::new(TestHost::new());
    host.add(
        "math",
        module(&[], |exports, _ctx| {
            Ok(DeclaredModule::new().with_execute(move || {
                exports.export(
                    "double",
                    Value::func(|args| {
                        let n = args
                            .first()
                            .and_then(Value::as_int)
                            .ok_or_else(|| HostError::from("expected an int"))?;
                        Ok(Value::Int(n * 2))
                    }),
                );
                Ok(Execution::Complete)
            }))
        }),
    );

    let seen: Arc<Mutex<Option<Arc<Namespace>>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&seen);
    host.add(
        "app",
        module(&["math"], move |exports, _ctx| {
            let linked = Arc::clone(&slot);
            let read = Arc::clone(&slot);
            Ok(DeclaredModule::new()
                .with_setters(vec![Some(setter(move |ns| {
                    *linked.lock() = Some(Arc::clone(ns));
                }))])
                .with_execute(move || {
                    let math = read
                        .lock()
                        .clone()
                        .ok_or_else(|| HostError::Failed("math was never linked".into()))?;
                    let double = math
                        .get("double")
                        .ok_or_else(|| HostError::Failed("double missing".into()))?;
                    let answer = double.call(&[Value::Int(21)])?;
                    exports.export("answer", answer);
                    Ok(Execution::Complete)
                }))
        }),
    );

    let loader = Loader::new(host.clone());
    let ns = load(&loader, "app");
    assert_eq!(ns.get("answer"), Some(Value::Int(42)));
}
