//! Extension activation tests
//!
//! Activators are registered through `activator_for` markers and then see
//! every marked unit of modules as they come and go.

use std::sync::Arc;

use super::test_utils::*;
use modulo_runtime::config::ModuleConfig;
use modulo_runtime::module::{
    Activator, ArtifactManifest, Marker, MemoryArtifactSource, ModuleManager, Symbol, UnitCatalog,
    UnitDescriptor, ACTIVATOR_FOR,
};

fn counting_fixture() -> (MemoryFixture, Arc<ActivationCounters>) {
    let counters = Arc::new(ActivationCounters::default());
    let fixture = MemoryFixture::with(
        counting_catalog(Arc::clone(&counters)),
        ModuleConfig::default(),
    );
    (fixture, counters)
}

fn activator_unit(symbol: &str, kind: &str, target: &str) -> UnitDescriptor {
    UnitDescriptor::new(symbol, kind).with_marker(Marker::with_value(ACTIVATOR_FOR, target))
}

fn feature(symbol: &str) -> UnitDescriptor {
    template(symbol, symbol).with_marker(Marker::new("feature"))
}

fn plugin() -> ArtifactManifest {
    manifest(vec![
        feature("p.A"),
        feature("p.B"),
        template("p.C", "unmarked"),
        template("p.D", "rejected").with_marker(Marker::with_value("feature", "reject")),
    ])
}

#[test]
fn test_activator_registered_through_marker() {
    let (fixture, counters) = counting_fixture();
    let ext = fixture.install(
        "ext",
        manifest(vec![activator_unit("ext.Counter", "counting_activator", "feature")]),
    );

    assert!(fixture.manager.activators().contains("feature"));
    assert_eq!(counters.instances(), 1);
    let activated = fixture.manager.activated_units(&ext);
    assert_eq!(activated.len(), 1);
    assert_eq!(activated[0].name(), "ext.Counter");
}

#[test]
fn test_activation_and_deactivation_are_symmetric() {
    let (fixture, counters) = counting_fixture();
    fixture.install(
        "ext",
        manifest(vec![activator_unit("ext.Counter", "counting_activator", "feature")]),
    );
    let plugin = fixture.install("plugin", plugin());

    // Three marked units offered, two accepted
    assert_eq!(counters.activations(), 3);
    assert_eq!(counters.accepted(), 2);
    let names: Vec<String> = fixture
        .manager
        .activated_units(&plugin)
        .iter()
        .map(|u| u.name().to_string())
        .collect();
    assert_eq!(names, vec!["p.A".to_string(), "p.B".to_string()]);

    plugin.invalidate();
    assert_eq!(counters.deactivations(), 2);
    assert!(fixture.manager.activated_units(&plugin).is_empty());

    // Deactivation of an already released module does nothing
    plugin.unload();
    assert_eq!(counters.deactivations(), 2);

    plugin.update().unwrap();
    assert_eq!(counters.accepted(), 4);
    assert_eq!(fixture.manager.activated_units(&plugin).len(), 2);
}

#[test]
fn test_reload_reactivates_fresh_symbols() {
    let (fixture, _counters) = counting_fixture();
    fixture.install(
        "ext",
        manifest(vec![activator_unit("ext.Counter", "counting_activator", "feature")]),
    );
    let plugin = fixture.install("plugin", plugin());
    let before = fixture.manager.activated_units(&plugin);

    plugin.update().unwrap();
    let after = fixture.manager.activated_units(&plugin);
    assert_eq!(after.len(), before.len());
    assert!(after.iter().all(|unit| unit.version() == 2));
    assert!(!before[0].same_as(&after[0]));
}

#[test]
fn test_unloading_extension_unregisters_its_activator() {
    let (fixture, counters) = counting_fixture();
    let ext = fixture.install(
        "ext",
        manifest(vec![activator_unit("ext.Counter", "counting_activator", "feature")]),
    );

    ext.unload();
    assert!(!fixture.manager.activators().contains("feature"));
    assert!(fixture.manager.activated_units(&ext).is_empty());

    // Marked units arriving now find no activator
    fixture.install("plugin", plugin());
    assert_eq!(counters.activations(), 0);
}

#[test]
fn test_replaced_activator_is_not_removed_by_old_owner() {
    let (fixture, counters) = counting_fixture();
    let first = fixture.install(
        "first",
        manifest(vec![activator_unit("first.Counter", "counting_activator", "feature")]),
    );
    fixture.install(
        "second",
        manifest(vec![activator_unit("second.Counter", "counting_activator", "feature")]),
    );
    assert_eq!(counters.instances(), 2);

    first.unload();
    assert!(fixture.manager.activators().contains("feature"));
}

#[test]
fn test_failing_activator_units_are_isolated() {
    let (fixture, counters) = counting_fixture();
    let ext = fixture.install(
        "ext",
        manifest(vec![
            activator_unit("ext.Broken", "failing", "broken"),
            activator_unit("ext.Boom", "panicking", "boom"),
            activator_unit("ext.Missing", "no_such_kind", "missing"),
            activator_unit("ext.Counter", "counting_activator", "feature"),
        ]),
    );

    let activated = fixture.manager.activated_units(&ext);
    assert_eq!(activated.len(), 1);
    assert_eq!(activated[0].name(), "ext.Counter");
    assert_eq!(
        fixture.manager.activators().marker_types(),
        vec![ACTIVATOR_FOR.to_string(), "feature".to_string()]
    );

    fixture.install("plugin", plugin());
    assert_eq!(counters.accepted(), 2);
}

#[test]
fn test_activator_without_target_is_ignored() {
    let (fixture, counters) = counting_fixture();
    let ext = fixture.install(
        "ext",
        manifest(vec![UnitDescriptor::new("ext.Counter", "counting_activator")
            .with_marker(Marker::new(ACTIVATOR_FOR))]),
    );

    assert!(fixture.manager.activated_units(&ext).is_empty());
    assert_eq!(counters.instances(), 0);
}

struct Exploding;

impl Activator for Exploding {
    fn activate(&self, unit: &Symbol, _marker: &Marker) -> bool {
        if unit.name().ends_with("Bad") {
            panic!("cannot handle {}", unit.name());
        }
        true
    }

    fn deactivate(&self, _unit: &Symbol, _marker: &Marker) {}
}

#[test]
fn test_panicking_activator_skips_only_that_unit() {
    let fixture = MemoryFixture::new();
    fixture
        .manager
        .activators()
        .register("volatile", Arc::new(Exploding));

    let module = fixture.install(
        "mixed",
        manifest(vec![
            template("m.Bad", "bad").with_marker(Marker::new("volatile")),
            template("m.Good", "good").with_marker(Marker::new("volatile")),
        ]),
    );

    let names: Vec<String> = fixture
        .manager
        .activated_units(&module)
        .iter()
        .map(|u| u.name().to_string())
        .collect();
    assert_eq!(names, vec!["m.Good".to_string()]);
}

#[test]
fn test_auto_activation_can_be_disabled() {
    let counters = Arc::new(ActivationCounters::default());
    let config = ModuleConfig {
        auto_activate: false,
        ..ModuleConfig::default()
    };
    let fixture = MemoryFixture::with(counting_catalog(Arc::clone(&counters)), config);
    let ext = fixture.install(
        "ext",
        manifest(vec![activator_unit("ext.Counter", "counting_activator", "feature")]),
    );

    assert!(!fixture.manager.activators().contains("feature"));
    assert!(fixture.manager.activated_units(&ext).is_empty());
    assert_eq!(counters.instances(), 0);
}

#[test]
fn test_log_activator_builtin() {
    let source = Arc::new(MemoryArtifactSource::new());
    source.put(
        "/modules/log.mod.toml",
        manifest(vec![
            activator_unit("log.Audit", "log_activator", "audited").with_config("accept", "true"),
        ]),
    );
    source.put(
        "/modules/app.mod.toml",
        manifest(vec![template("app.Main", "main").with_marker(Marker::new("audited"))]),
    );
    let manager = ModuleManager::new(source, UnitCatalog::with_builtins());

    manager.load_module("/modules/log.mod.toml");
    let app = manager.load_module("/modules/app.mod.toml");
    assert_eq!(manager.activated_units(&app).len(), 1);
}
