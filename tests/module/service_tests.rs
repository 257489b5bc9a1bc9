//! Service handle tests

use super::test_utils::*;
use modulo_runtime::config::ModuleConfig;
use modulo_runtime::module::{
    Activator, Callable, ModuleError, ModuleState, UnitCatalog, UnitDescriptor,
};

fn greeting(fixture: &MemoryFixture, name: &str) {
    fixture.install("names", manifest(vec![template("name.Provider", name)]));
}

#[test]
fn test_handle_follows_dependency_reload() {
    let fixture = MemoryFixture::new();
    greeting(&fixture, "world");
    let greeter = fixture.install(
        "greeter",
        manifest(vec![wrapping("svc.Greeter", "Hello, {}!", "name.Provider")]),
    );
    let names = fixture.manager.module(fixture.path("names")).unwrap();

    let handle = fixture.manager.service::<dyn Callable>("svc.Greeter");
    assert_eq!(handle.call(|g| g.call()).unwrap().unwrap(), "Hello, world!");
    // Instantiation resolved the provider through the greeter's module
    assert!(greeter.depends_on(&names));

    fixture.put("names", manifest(vec![template("name.Provider", "there")]));
    names.update().unwrap();
    assert_eq!(greeter.state(), ModuleState::Invalidated);
    assert!(!handle.is_bound());

    match handle.get() {
        Err(ModuleError::Unavailable { symbol, .. }) => assert_eq!(symbol, "svc.Greeter"),
        other => panic!("expected Unavailable, got {:?}", other.map(|_| ())),
    }

    greeter.update().unwrap();
    assert_eq!(handle.call(|g| g.call()).unwrap().unwrap(), "Hello, there!");
    assert_eq!(handle.owner().unwrap().version(), 2);
}

#[test]
fn test_unknown_symbol_is_not_found() {
    let fixture = MemoryFixture::new();
    greeting(&fixture, "world");

    let handle = fixture.manager.service::<dyn Callable>("svc.Unknown");
    assert_eq!(
        handle.get().err(),
        Some(ModuleError::NotFound("svc.Unknown".to_string()))
    );
    assert!(!handle.is_bound());
}

#[test]
fn test_unloaded_owner_makes_service_unavailable() {
    let fixture = MemoryFixture::new();
    let module = fixture.install("greeter", manifest(vec![template("svc.Greeter", "hi")]));
    let handle = fixture.manager.service::<dyn Callable>("svc.Greeter");
    handle.get().unwrap();

    module.unload();
    assert!(!handle.is_bound());
    assert_eq!(
        handle.get().err(),
        Some(ModuleError::Unavailable {
            symbol: "svc.Greeter".to_string(),
            module: "greeter:1(UNLOADED)".to_string(),
        })
    );
}

#[test]
fn test_binding_survives_unrelated_changes() {
    let fixture = MemoryFixture::new();
    let module = fixture.install("greeter", manifest(vec![template("svc.Greeter", "hi")]));
    let other = fixture.install("other", manifest(vec![template("x.Other", "other")]));
    let handle = fixture.manager.service::<dyn Callable>("svc.Greeter");

    let first = handle.get().unwrap();
    other.update().unwrap();
    let second = handle.get().unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(handle.owner().unwrap().path(), module.path());
}

#[test]
fn test_wrong_capability_is_reported() {
    let fixture = MemoryFixture::new();
    fixture.install("greeter", manifest(vec![template("svc.Greeter", "hi")]));

    let handle = fixture.manager.service::<dyn Activator>("svc.Greeter");
    assert!(matches!(
        handle.get(),
        Err(ModuleError::CapabilityMismatch { unit, .. }) if unit == "svc.Greeter"
    ));
}

#[test]
fn test_clones_share_one_binding() {
    let fixture = MemoryFixture::new();
    fixture.install("greeter", manifest(vec![template("svc.Greeter", "hi")]));
    let handle = fixture.manager.service::<dyn Callable>("svc.Greeter");
    let clone = handle.clone();

    handle.get().unwrap();
    assert!(clone.is_bound());
    assert_eq!(clone.symbol(), "svc.Greeter");

    clone.invalidate();
    assert!(!handle.is_bound());
    assert_eq!(handle.call(|g| g.call()).unwrap().unwrap(), "hi");
}

#[test]
fn test_symbol_moving_to_another_module() {
    let fixture = MemoryFixture::new();
    let old = fixture.install("old", manifest(vec![template("svc.Mover", "old")]));
    let handle = fixture.manager.service::<dyn Callable>("svc.Mover");
    assert_eq!(handle.call(|g| g.call()).unwrap().unwrap(), "old");

    fixture.source.remove(fixture.path("old"));
    old.update().unwrap();
    let new = fixture.install("new", manifest(vec![template("svc.Mover", "new")]));

    assert_eq!(handle.call(|g| g.call()).unwrap().unwrap(), "new");
    assert_eq!(handle.owner().unwrap().path(), new.path());
}

#[test]
fn test_factory_failure_is_instantiation_failure() {
    let fixture = MemoryFixture::new();
    fixture.install(
        "greeter",
        manifest(vec![wrapping("svc.Greeter", "Hello, {}!", "name.Missing")]),
    );

    let handle = fixture.manager.service::<dyn Callable>("svc.Greeter");
    match handle.get() {
        Err(ModuleError::InstantiationFailure { unit, reason }) => {
            assert_eq!(unit, "svc.Greeter");
            assert!(reason.contains("name.Missing"));
        }
        other => panic!("expected InstantiationFailure, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_unknown_kind_cannot_be_instantiated() {
    let fixture = MemoryFixture::new();
    fixture.install(
        "odd",
        manifest(vec![UnitDescriptor::new("svc.Odd", "no_such_kind")]),
    );

    // Defining works; only instantiation needs a factory
    assert!(fixture.manager.resolve("svc.Odd").is_ok());
    let handle = fixture.manager.service::<dyn Callable>("svc.Odd");
    assert!(matches!(
        handle.get(),
        Err(ModuleError::InstantiationFailure { .. })
    ));
}

fn without_auto_activation() -> MemoryFixture {
    let config = ModuleConfig {
        auto_activate: false,
        ..ModuleConfig::default()
    };
    MemoryFixture::with(UnitCatalog::with_builtins(), config)
}

#[test]
fn test_loaded_version_serves_its_own_content() {
    let fixture = without_auto_activation();
    let module = fixture.install("greeter", manifest(vec![template("svc.Greeter", "v1 output")]));
    let handle = fixture.manager.service::<dyn Callable>("svc.Greeter");

    // Changed on disk, not reloaded yet
    fixture.put("greeter", manifest(vec![template("svc.Greeter", "v2 output")]));
    assert_eq!(module.version(), 1);
    assert_eq!(handle.call(|g| g.call()).unwrap().unwrap(), "v1 output");

    module.update().unwrap();
    assert_eq!(handle.call(|g| g.call()).unwrap().unwrap(), "v2 output");
}

#[test]
fn test_reloaded_then_unloaded_owner_is_unavailable() {
    let fixture = without_auto_activation();
    let module = fixture.install("greeter", manifest(vec![template("svc.Greeter", "hi")]));
    let handle = fixture.manager.service::<dyn Callable>("svc.Greeter");
    handle.get().unwrap();

    // The fresh table has not defined the symbol when the module goes away
    module.update().unwrap();
    module.unload();
    assert_eq!(
        handle.get().err(),
        Some(ModuleError::Unavailable {
            symbol: "svc.Greeter".to_string(),
            module: "greeter:2(UNLOADED)".to_string(),
        })
    );
    assert!(fixture.manager.find_owner("svc.Greeter").is_none());
    assert_eq!(
        fixture.manager.find_exporter("svc.Greeter").unwrap().path(),
        module.path()
    );
}
