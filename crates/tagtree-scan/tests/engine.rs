mod support;

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use support::{key, keys, root, settings, FakeTree, FixedResolver, MissingResolver, Recorder};
use tagtree_core::{RootFolder, ScanSettings, ScanUnit};
use tagtree_scan::{EngineError, ScanEngine, ScanHandle};
use tokio::task::JoinHandle;

struct Harness {
    handle: ScanHandle,
    recorder: Recorder,
    tree: Arc<FakeTree>,
    join: JoinHandle<()>,
}

fn start(tree: FakeTree, root: RootFolder, pattern: &str) -> Harness {
    let tree = Arc::new(tree);
    let recorder = Recorder::default();
    let (handle, join) = ScanEngine::spawn(
        root,
        settings(pattern),
        FixedResolver::new(Arc::clone(&tree)),
        Box::new(recorder.clone()),
    );
    Harness {
        handle,
        recorder,
        tree,
        join,
    }
}

async fn idle(handle: &ScanHandle) {
    let idle = tokio::time::timeout(Duration::from_secs(10), handle.wait_idle())
        .await
        .expect("engine did not go idle");
    assert!(idle, "engine stopped unexpectedly");
}

async fn snapshot(handle: &ScanHandle) -> Vec<(PathBuf, u32)> {
    keys(&handle.snapshot().await.expect("engine stopped"))
}

#[tokio::test]
async fn startup_scans_root_and_projects_once() {
    let tree = FakeTree::new();
    tree.write("/w/a.txt", &["first", "TODO fix", "last"]);
    tree.write("/w/b.txt", &["nothing here"]);
    let h = start(tree, root("/w"), "TODO");

    h.handle.startup();
    idle(&h.handle).await;

    let projections = h.recorder.projections();
    assert_eq!(projections.len(), 1);
    assert_eq!(projections[0].0, root("/w"));
    assert_eq!(keys(&projections[0].1), vec![key("/w/a.txt", 2)]);
    assert_eq!(projections[0].1[0].column, 1);
    assert_eq!(h.recorder.started(), vec![root("/w")]);
    assert_eq!(h.tree.calls(), vec![(PathBuf::from("/w"), None)]);
}

#[tokio::test]
async fn open_documents_outside_root_are_scanned_individually() {
    let tree = FakeTree::new();
    tree.write("/w/a.txt", &["TODO inside"]);
    tree.write("/notes/todo.md", &["- FIXME outside"]);
    let h = start(tree, root("/w"), "TODO|FIXME");

    h.handle.document_opened("/notes/todo.md");
    h.handle.document_opened("/w/a.txt");
    h.handle.startup();
    idle(&h.handle).await;

    assert_eq!(
        h.tree.calls(),
        vec![
            (PathBuf::from("/w"), None),
            (
                PathBuf::from("/notes"),
                Some(PathBuf::from("/notes/todo.md"))
            ),
        ]
    );
    assert_eq!(
        snapshot(&h.handle).await,
        vec![key("/notes/todo.md", 1), key("/w/a.txt", 1)]
    );
    assert_eq!(h.recorder.projections().len(), 1);
}

#[tokio::test]
async fn saving_a_file_without_markers_removes_its_entries() {
    let tree = FakeTree::new();
    tree.write("/w/a.txt", &["first", "TODO fix", "last"]);
    tree.write("/w/b.txt", &["TODO keep"]);
    let h = start(tree, root("/w"), "TODO");

    h.handle.startup();
    idle(&h.handle).await;
    assert_eq!(
        snapshot(&h.handle).await,
        vec![key("/w/a.txt", 2), key("/w/b.txt", 1)]
    );

    h.tree.write("/w/a.txt", &["first", "fixed", "last"]);
    h.handle.file_saved("/w/a.txt");
    idle(&h.handle).await;

    assert_eq!(snapshot(&h.handle).await, vec![key("/w/b.txt", 1)]);
    let projections = h.recorder.projections();
    assert_eq!(projections.len(), 2);
    assert_eq!(keys(&projections[1].1), vec![key("/w/b.txt", 1)]);
    assert_eq!(
        h.tree.calls().last(),
        Some(&(PathBuf::from("/w"), Some(PathBuf::from("/w/a.txt"))))
    );
}

#[tokio::test]
async fn rescanning_an_unchanged_file_is_idempotent() {
    let tree = FakeTree::new();
    tree.write("/w/a.txt", &["TODO one", "TODO two"]);
    tree.write("/w/b.txt", &["TODO three"]);
    let h = start(tree, root("/w"), "TODO");

    h.handle.startup();
    idle(&h.handle).await;
    let before = h.handle.snapshot().await.unwrap();

    h.handle.file_saved("/w/a.txt");
    idle(&h.handle).await;
    h.handle.file_saved("/w/a.txt");
    idle(&h.handle).await;

    assert_eq!(h.handle.snapshot().await.unwrap(), before);
}

#[tokio::test]
async fn only_one_scan_runs_at_a_time() {
    let tree = FakeTree::new().with_delay(Duration::from_millis(5));
    tree.write("/w/a.txt", &["TODO a"]);
    for idx in 0..4 {
        tree.write(&format!("/out/{idx}.rs"), &["// TODO out"]);
    }
    let h = start(tree, root("/w"), "TODO");

    for idx in 0..4 {
        h.handle.document_opened(format!("/out/{idx}.rs"));
    }
    h.handle.startup();
    h.handle.file_saved("/w/a.txt");
    h.handle.file_saved("/out/1.rs");
    h.handle.file_closed("/out/2.rs");
    idle(&h.handle).await;

    assert_eq!(h.tree.max_running(), 1);
    assert_eq!(
        snapshot(&h.handle).await,
        vec![
            key("/out/0.rs", 1),
            key("/out/1.rs", 1),
            key("/out/2.rs", 1),
            key("/out/3.rs", 1),
            key("/w/a.txt", 1),
        ]
    );
}

#[tokio::test]
async fn missing_scanner_is_reported_once_and_nothing_is_scanned() {
    let resolver = Arc::new(MissingResolver::default());
    let recorder = Recorder::default();
    let (handle, _join) = ScanEngine::spawn(
        root("/w"),
        settings("TODO"),
        resolver.clone(),
        Box::new(recorder.clone()),
    );

    handle.startup();
    handle.full_refresh();
    handle.file_saved("/w/a.txt");
    idle(&handle).await;

    let reports = recorder.reports();
    assert_eq!(reports.len(), 1);
    assert!(matches!(reports[0], EngineError::Resolution(_)));
    assert!(reports[0].to_string().contains("scan.ripgrep"));
    assert!(recorder.projections().is_empty());
    assert!(recorder.started().is_empty());
    assert_eq!(resolver.attempts.load(Ordering::SeqCst), 3);

    // A new scanner path re-arms the report.
    handle.configuration_changed(ScanSettings {
        scanner_path: Some(PathBuf::from("/opt/rg")),
        ..settings("TODO")
    });
    handle.full_refresh();
    idle(&handle).await;
    assert_eq!(recorder.reports().len(), 2);
}

#[tokio::test]
async fn scan_failures_are_reported_and_other_units_still_apply() {
    let tree = FakeTree::new();
    tree.write("/w/a.txt", &["TODO inside"]);
    tree.write("/notes/todo.md", &["TODO outside"]);
    tree.fail("/notes/todo.md");
    let h = start(tree, root("/w"), "TODO");

    h.handle.document_opened("/notes/todo.md");
    h.handle.startup();
    idle(&h.handle).await;

    let reports = h.recorder.reports();
    assert_eq!(reports.len(), 1);
    match &reports[0] {
        EngineError::Adapter { unit, source } => {
            assert_eq!(unit, &ScanUnit::File(PathBuf::from("/notes/todo.md")));
            assert_eq!(source.diagnostic.as_deref(), Some("bad input"));
        }
        other => panic!("unexpected report: {other:?}"),
    }
    assert!(reports[0].to_string().contains("bad input"));
    assert_eq!(snapshot(&h.handle).await, vec![key("/w/a.txt", 1)]);
    assert_eq!(h.recorder.projections().len(), 1);
}

#[tokio::test]
async fn results_superseded_by_a_full_scan_are_discarded() {
    let (tree, gate, mut started) = FakeTree::new().gated();
    tree.write("/w/a.txt", &["TODO old root"]);
    tree.write("/x/b.txt", &["TODO new root"]);
    let h = start(tree, root("/w"), "TODO");

    h.handle.startup();
    let first = started.recv().await.unwrap();
    assert_eq!(first, (PathBuf::from("/w"), None));

    h.handle.active_context_changed(Some(PathBuf::from("/x")));
    gate.add_permits(2);
    idle(&h.handle).await;

    assert_eq!(snapshot(&h.handle).await, vec![key("/x/b.txt", 1)]);
    let projections = h.recorder.projections();
    assert_eq!(projections.len(), 1);
    assert_eq!(projections[0].0, root("/x"));
    assert_eq!(h.recorder.started(), vec![root("/w"), root("/x")]);
    assert_eq!(h.tree.max_running(), 1);
}

#[tokio::test]
async fn config_changes_rescan_only_when_the_pattern_changes() {
    let tree = FakeTree::new();
    tree.write("/w/a.txt", &["TODO a", "FIXME b"]);
    let h = start(tree, root("/w"), "TODO");

    h.handle.startup();
    idle(&h.handle).await;
    assert_eq!(snapshot(&h.handle).await, vec![key("/w/a.txt", 1)]);

    h.handle.configuration_changed(ScanSettings {
        globs: vec!["!target".to_string()],
        ..settings("TODO")
    });
    idle(&h.handle).await;
    assert_eq!(h.tree.calls().len(), 1);
    assert_eq!(h.recorder.projections().len(), 2);

    h.handle.configuration_changed(settings("TODO|FIXME"));
    idle(&h.handle).await;
    assert_eq!(h.tree.calls().len(), 2);
    assert_eq!(
        snapshot(&h.handle).await,
        vec![key("/w/a.txt", 1), key("/w/a.txt", 2)]
    );
}

#[tokio::test]
async fn switching_workspaces_rescans_only_on_change() {
    let tree = FakeTree::new();
    tree.write("/w/a.txt", &["TODO a"]);
    tree.write("/x/b.txt", &["TODO b"]);
    let h = start(tree, root("/w"), "TODO");

    h.handle.startup();
    idle(&h.handle).await;

    h.handle.active_context_changed(Some(PathBuf::from("/w")));
    idle(&h.handle).await;
    assert_eq!(h.tree.calls().len(), 1);
    assert_eq!(h.recorder.projections().len(), 1);

    h.handle.active_context_changed(Some(PathBuf::from("/x")));
    idle(&h.handle).await;
    assert_eq!(h.tree.calls().last(), Some(&(PathBuf::from("/x"), None)));
    assert_eq!(snapshot(&h.handle).await, vec![key("/x/b.txt", 1)]);

    // A document without a workspace rescans the current root.
    h.handle.active_context_changed(None);
    idle(&h.handle).await;
    assert_eq!(h.tree.calls().len(), 3);
    assert_eq!(h.recorder.projections().last().unwrap().0, root("/x"));
}

#[tokio::test]
async fn pinned_root_survives_workspace_switches() {
    let tree = Arc::new(FakeTree::new());
    tree.write("/pinned/a.txt", &["TODO pinned"]);
    tree.write("/other/b.txt", &["TODO other"]);
    let recorder = Recorder::default();
    let (engine, handle) = ScanEngine::new(
        root("/pinned"),
        settings("TODO"),
        FixedResolver::new(Arc::clone(&tree)),
        Box::new(recorder.clone()),
    );
    let _join = tokio::spawn(engine.with_pinned_root(true).run());

    handle.startup();
    idle(&handle).await;
    handle.active_context_changed(Some(PathBuf::from("/other")));
    handle.active_context_changed(None);
    idle(&handle).await;

    assert_eq!(tree.calls(), vec![(PathBuf::from("/pinned"), None)]);
    assert_eq!(recorder.projections().len(), 1);
    assert_eq!(snapshot(&handle).await, vec![key("/pinned/a.txt", 1)]);
}

#[tokio::test]
async fn without_a_root_only_open_documents_are_scanned() {
    let tree = FakeTree::new();
    tree.write("/a/one.rs", &["// TODO one"]);
    tree.write("/b/two.rs", &["// TODO two"]);
    tree.write("/b/unopened.rs", &["// TODO hidden"]);
    let h = start(tree, RootFolder::Unset, "TODO");

    h.handle.document_opened("/a/one.rs");
    h.handle.document_opened("/b/two.rs");
    h.handle.startup();
    idle(&h.handle).await;

    assert_eq!(
        h.tree.calls(),
        vec![
            (PathBuf::from("/b"), Some(PathBuf::from("/b/two.rs"))),
            (PathBuf::from("/a"), Some(PathBuf::from("/a/one.rs"))),
        ]
    );
    assert_eq!(
        snapshot(&h.handle).await,
        vec![key("/a/one.rs", 1), key("/b/two.rs", 1)]
    );
    assert_eq!(h.recorder.projections()[0].0, RootFolder::Unset);
}

fn note_scans(tree: &FakeTree) -> usize {
    tree.calls()
        .iter()
        .filter(|(_, only)| only.as_deref() == Some(Path::new("/notes/todo.md")))
        .count()
}

#[tokio::test]
async fn closed_documents_are_rescanned_then_forgotten() {
    let tree = FakeTree::new();
    tree.write("/w/a.txt", &["TODO a"]);
    tree.write("/notes/todo.md", &["TODO note"]);
    let h = start(tree, root("/w"), "TODO");

    h.handle.document_opened("/notes/todo.md");
    h.handle.startup();
    idle(&h.handle).await;
    assert_eq!(note_scans(&h.tree), 1);

    h.handle.file_closed("/notes/todo.md");
    idle(&h.handle).await;
    assert_eq!(note_scans(&h.tree), 2);

    h.handle.full_refresh();
    idle(&h.handle).await;
    assert_eq!(note_scans(&h.tree), 2);
    assert_eq!(snapshot(&h.handle).await, vec![key("/w/a.txt", 1)]);
}

#[tokio::test]
async fn shutdown_stops_the_engine() {
    let h = start(FakeTree::new(), root("/w"), "TODO");
    assert!(h.handle.wait_idle().await);

    h.handle.shutdown();
    tokio::time::timeout(Duration::from_secs(10), h.join)
        .await
        .expect("engine did not stop")
        .unwrap();

    assert!(!h.handle.wait_idle().await);
    assert!(h.handle.snapshot().await.is_none());
}
