//! Watcher tests
//!
//! Poll cycles over in-memory and on-disk artifacts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;

use super::test_utils::*;
use modulo_runtime::module::{Callable, ModuleState, ModuleWatcher};

fn watched(fixture: &MemoryFixture) -> ModuleWatcher {
    let mut watcher = ModuleWatcher::new(Arc::clone(&fixture.manager));
    watcher.watch("/modules");
    watcher
}

#[test]
fn test_reload_follows_dependency_order() {
    let fixture = MemoryFixture::new();
    // Registered first, but depends on the module registered after it
    fixture.put(
        "app",
        manifest(vec![template("app.Main", "main").requiring("zlib.Core")]),
    );
    fixture.put("zlib", manifest(vec![template("zlib.Core", "core")]));
    let mut watcher = watched(&fixture);

    let report = watcher.poll();
    assert_eq!(report.added, vec![fixture.path("app"), fixture.path("zlib")]);
    fixture.manager.resolve("app.Main").unwrap();

    fixture.source.touch(fixture.path("zlib"));
    let report = watcher.poll();
    assert_eq!(report.changed, vec![fixture.path("zlib")]);
    assert_eq!(report.reloaded, vec![fixture.path("zlib"), fixture.path("app")]);

    for module in fixture.manager.modules() {
        assert_eq!(module.state(), ModuleState::Active);
        assert_eq!(module.version(), 2);
    }
}

#[test]
fn test_removed_dependency_freezes_until_restored() {
    let fixture = MemoryFixture::new();
    let base = manifest(vec![template("base.Core", "core")]);
    fixture.put("base", base.clone());
    fixture.put(
        "mid",
        manifest(vec![template("mid.Service", "svc").requiring("base.Core")]),
    );
    let mut watcher = watched(&fixture);
    watcher.poll();
    fixture.manager.resolve("mid.Service").unwrap();
    let mid = fixture.manager.module(fixture.path("mid")).unwrap();

    fixture.source.remove(fixture.path("base"));
    let report = watcher.poll();
    assert_eq!(report.removed, vec![fixture.path("base")]);
    assert!(report.thawed.is_empty());
    assert_eq!(mid.state(), ModuleState::Frozen);

    // Still gone: nothing to do
    assert!(watcher.poll().is_empty());

    fixture.put("base", base);
    let report = watcher.poll();
    assert_eq!(report.added, vec![fixture.path("base")]);
    assert_eq!(report.thawed, vec![fixture.path("mid")]);
    assert_eq!(report.reloaded, vec![fixture.path("mid")]);
    assert_eq!(mid.state(), ModuleState::Active);
    assert_eq!(mid.version(), 2);
}

#[test]
fn test_freeze_is_not_transitive_but_thaw_cascades() {
    let fixture = MemoryFixture::new();
    let base = manifest(vec![template("base.Core", "core")]);
    fixture.put("base", base.clone());
    fixture.put(
        "mid",
        manifest(vec![template("mid.Service", "svc").requiring("base.Core")]),
    );
    fixture.put(
        "top",
        manifest(vec![template("top.App", "app").requiring("mid.Service")]),
    );
    let mut watcher = watched(&fixture);
    watcher.poll();
    fixture.manager.resolve("top.App").unwrap();

    let mid = fixture.manager.module(fixture.path("mid")).unwrap();
    let top = fixture.manager.module(fixture.path("top")).unwrap();

    fixture.source.remove(fixture.path("base"));
    watcher.poll();
    assert_eq!(mid.state(), ModuleState::Frozen);
    assert_eq!(top.state(), ModuleState::Active);

    fixture.put("base", base);
    let report = watcher.poll();
    assert_eq!(report.thawed, vec![fixture.path("mid")]);
    assert_eq!(report.reloaded, vec![fixture.path("mid"), fixture.path("top")]);
    assert_eq!(top.state(), ModuleState::Active);
}

#[test]
fn test_unreadable_change_unloads_module() {
    let fixture = MemoryFixture::new();
    fixture.put("svc", manifest(vec![template("svc.A", "a")]));
    let mut watcher = watched(&fixture);
    watcher.poll();
    let module = fixture.manager.module(fixture.path("svc")).unwrap();

    fixture.source.set_unreadable(fixture.path("svc"), true);
    fixture.source.touch(fixture.path("svc"));
    let report = watcher.poll();
    assert_eq!(report.changed, vec![fixture.path("svc")]);
    assert!(report.reloaded.is_empty());
    assert_eq!(module.state(), ModuleState::Unloaded);

    fixture.source.set_unreadable(fixture.path("svc"), false);
    fixture.source.touch(fixture.path("svc"));
    watcher.poll();
    assert_eq!(module.state(), ModuleState::Active);
}

#[test]
fn test_modules_loaded_before_watching_are_refreshed() {
    let fixture = MemoryFixture::new();
    let module = fixture.install("early", manifest(vec![template("e.A", "a")]));
    let mut watcher = watched(&fixture);

    let report = watcher.poll();
    assert_eq!(report.added, vec![fixture.path("early")]);
    assert_eq!(report.reloaded, vec![fixture.path("early")]);
    assert_eq!(module.version(), 2);
}

fn bump_mtime(path: &std::path::Path) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();
}

#[test]
fn test_disk_artifacts_reload_end_to_end() {
    let fixture = ModuleTestFixture::new().unwrap();
    let mut watcher = ModuleWatcher::new(Arc::clone(&fixture.manager));
    watcher.watch(fixture.modules_dir.clone());

    fixture
        .write_module("greeter", &manifest(vec![template("svc.Greeter", "v1")]))
        .unwrap();
    watcher.poll();
    let greeter = fixture.manager.service::<dyn Callable>("svc.Greeter");
    assert_eq!(greeter.call(|g| g.call()).unwrap().unwrap(), "v1");

    let path = fixture
        .write_module("greeter", &manifest(vec![template("svc.Greeter", "v2")]))
        .unwrap();
    bump_mtime(&path);
    let report = watcher.poll();
    assert_eq!(report.reloaded, vec![path.clone()]);
    assert_eq!(greeter.call(|g| g.call()).unwrap().unwrap(), "v2");

    std::fs::remove_file(&path).unwrap();
    let report = watcher.poll();
    assert_eq!(report.removed, vec![path]);
    assert!(greeter.get().is_err());
}

#[test]
fn test_unscannable_root_does_not_unload_modules() {
    let fixture = ModuleTestFixture::new().unwrap();
    let mut watcher = ModuleWatcher::new(Arc::clone(&fixture.manager));
    watcher.watch(fixture.modules_dir.clone());

    fixture
        .write_module("svc", &manifest(vec![template("svc.A", "a")]))
        .unwrap();
    watcher.poll();
    let module = fixture.load("svc");

    // Replace the directory with a plain file
    std::fs::remove_dir_all(&fixture.modules_dir).unwrap();
    std::fs::write(&fixture.modules_dir, "not a directory").unwrap();

    let report = watcher.poll();
    assert!(report.removed.is_empty());
    assert_eq!(module.state(), ModuleState::Active);
}

#[tokio::test]
async fn test_background_watcher_picks_up_artifacts() {
    let fixture = MemoryFixture::new();
    let watcher = watched(&fixture);
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(watcher.run(Duration::from_millis(10), rx));

    fixture.put("late", manifest(vec![template("late.A", "a")]));
    let path: PathBuf = fixture.path("late");
    let mut loaded = false;
    for _ in 0..200 {
        if fixture
            .manager
            .module(&path)
            .is_some_and(|m| m.state() == ModuleState::Active)
        {
            loaded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(loaded);

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_background_watcher_reports_changes() {
    let fixture = MemoryFixture::new();
    fixture.put("svc", manifest(vec![template("svc.Greeter", "v1")]));
    let mut watcher = watched(&fixture);
    watcher.poll();

    let handle = fixture.manager.service::<dyn Callable>("svc.Greeter");
    let (outputs_tx, mut outputs) = tokio::sync::mpsc::unbounded_channel();
    let (tx, rx) = watch::channel(false);
    let polled = handle.clone();
    let task = tokio::spawn(watcher.run_with(Duration::from_millis(10), rx, move |report| {
        if !report.reloaded.is_empty() {
            let output = polled.call(|g| g.call()).unwrap().unwrap();
            let _ = outputs_tx.send(output);
        }
    }));

    fixture.put("svc", manifest(vec![template("svc.Greeter", "v2")]));
    let output = tokio::time::timeout(Duration::from_secs(5), outputs.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(output, "v2");

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
}
