//! Integration tests for failure memoization and propagation
//!
//! A failed load is terminal: the record keeps its first error forever,
//! later imports observe the same value without the host being asked
//! again, and a failure unwinds through every dependent on the path that
//! reached it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use trellis_engine::{
    DeclaredModule, Execution, ExportSink, HostError, InstantiateResult, LoadError, LoadState,
    Loader, ModuleContext, ModuleDeclaration, ModuleHost, ModuleId, Namespace, Value,
};

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
        if specifier.starts_with("bad:") {
            return Err(HostError::BadSpecifier(specifier.to_string()));
        }
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

/// A module that records into `log` when it runs, or fails instead when
/// `error` carries a message.
fn body_module(
    id: &'static str,
    deps: &[&str],
    log: &Arc<Mutex<Vec<&'static str>>>,
    error: Option<&'static str>,
) -> ModuleDeclaration {
    let log = Arc::clone(log);
    module(deps, move |_exports, _ctx| {
        Ok(DeclaredModule::new().with_execute(move || match error {
            Some(message) => Err(HostError::Failed(message.to_string())),
            None => {
                log.lock().push(id);
                Ok(Execution::Complete)
            }
        }))
    })
}

fn load_err(loader: &Loader, specifier: &str) -> LoadError {
    let pending = loader.import(specifier, None);
    loader.run_until_idle();
    pending
        .get()
        .expect("import did not settle")
        .expect_err("import should have failed")
}

fn load(loader: &Loader, specifier: &str) -> Arc<Namespace> {
    let pending = loader.import(specifier, None);
    loader.run_until_idle();
    pending
        .get()
        .expect("import did not settle")
        .expect("import failed")
}

#[test]
fn test_execution_failure_propagates_to_the_importer() {
    let host = Arc::new(TestHost::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    host.add("a", body_module("a", &["b"], &log, None));
    host.add("b", body_module("b", &["c"], &log, None));
    host.add("c", body_module("c", &[], &log, Some("division by zero")));

    let loader = Loader::new(host.clone());
    let err = load_err(&loader, "a");

    assert_eq!(
        err,
        LoadError::Execution {
            id: ModuleId::new("c"),
            source: HostError::Failed("division by zero".to_string()),
        }
    );
    // The failure fails everything that was waiting on it.
    for id in ["a", "b", "c"] {
        assert_eq!(loader.state(&ModuleId::new(id)), Some(LoadState::Failed));
    }
    // Neither dependent got to run.
    assert!(log.lock().is_empty());
}

#[test]
fn test_failed_module_rejects_later_imports_without_reinstantiation() {
    let host = Arc::new(TestHost::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    host.add("a", body_module("a", &["b"], &log, None));
    host.add("b", body_module("b", &["c"], &log, None));
    host.add("c", body_module("c", &[], &log, Some("division by zero")));

    let loader = Loader::new(host.clone());
    let first = load_err(&loader, "a");

    // Importing the broken module, or its dependents, yields the memoized
    // error without another trip through the host.
    let again = load_err(&loader, "c");
    assert_eq!(again, first);
    assert_eq!(load_err(&loader, "a"), first);
    assert_eq!(host.instantiate_calls(), vec!["a", "b", "c"]);
}

#[test]
fn test_instantiate_error_memoizes() {
    let host = Arc::new(TestHost::new());
    let loader = Loader::new(host.clone());

    let err = load_err(&loader, "ghost");
    assert_eq!(
        err,
        LoadError::Instantiate {
            id: ModuleId::new("ghost"),
            source: HostError::UnknownModule("ghost".to_string()),
        }
    );

    assert_eq!(load_err(&loader, "ghost"), err);
    // Exactly one host call despite two imports.
    assert_eq!(host.instantiate_calls(), vec!["ghost"]);
}

#[test]
fn test_declare_failure_is_an_instantiation_failure() {
    let host = Arc::new(TestHost::new());
    host.add(
        "m",
        module(&[], |_exports, _ctx| {
            Err(HostError::Failed("declare blew up".to_string()))
        }),
    );

    let loader = Loader::new(host.clone());
    let err = load_err(&loader, "m");
    assert_eq!(
        err,
        LoadError::Instantiate {
            id: ModuleId::new("m"),
            source: HostError::Failed("declare blew up".to_string()),
        }
    );
    assert_eq!(loader.state(&ModuleId::new("m")), Some(LoadState::Failed));
}

#[test]
fn test_dependency_resolve_failure_fails_the_dependent() {
    let host = Arc::new(TestHost::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    host.add("m", body_module("m", &["bad:x"], &log, None));

    let loader = Loader::new(host.clone());
    let err = load_err(&loader, "m");
    assert_eq!(
        err,
        LoadError::Resolve {
            specifier: "bad:x".to_string(),
            referrer: Some(ModuleId::new("m")),
            source: HostError::BadSpecifier("bad:x".to_string()),
        }
    );
    assert_eq!(loader.state(&ModuleId::new("m")), Some(LoadState::Failed));
    assert!(log.lock().is_empty());
}

#[test]
fn test_unrelated_modules_survive_a_failure() {
    let host = Arc::new(TestHost::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    host.add("broken", body_module("broken", &[], &log, Some("boom")));
    host.add(
        "ok",
        module(&[], |exports, _ctx| {
            Ok(DeclaredModule::new().with_execute(move || {
                exports.export("fine", Value::Bool(true));
                Ok(Execution::Complete)
            }))
        }),
    );

    let loader = Loader::new(host.clone());
    load_err(&loader, "broken");

    let ns = load(&loader, "ok");
    assert_eq!(ns.get("fine"), Some(Value::Bool(true)));
    assert_eq!(loader.state(&ModuleId::new("ok")), Some(LoadState::Executed));
}
