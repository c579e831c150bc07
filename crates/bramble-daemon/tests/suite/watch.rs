use std::io;

use bramble_parser::CancellationToken;
use bramble_vfs::{FileChange, ManualFileWatcher, WatchMode};

use super::support::{wait_for, Project, RecordingWatcher};

#[test]
fn every_cell_root_is_watched_recursively() {
    let project = Project::new();
    project.write("vendor/bramble.toml", "");
    project.write(
        "bramble.toml",
        "[repositories]\nvendor = \"vendor\"\n\n[logging]\nlevel = \"warn\"\n",
    );
    let daemon = project.start();

    let watcher = RecordingWatcher::new(ManualFileWatcher::new());
    let watched = watcher.watched.clone();
    daemon.watch(watcher).unwrap();

    let mut watched = watched.lock().clone();
    watched.sort_by(|(a, _), (b, _)| a.cmp(b));
    assert_eq!(
        watched,
        [
            (project.root().to_path_buf(), WatchMode::Recursive),
            (project.path("vendor"), WatchMode::Recursive),
        ]
    );
}

#[test]
fn watcher_events_reach_the_parser() {
    let project = Project::new();
    let daemon = project.start();
    daemon
        .build_target_graph(["app"], &CancellationToken::new())
        .unwrap();
    assert_eq!(daemon.status().parser.cached_nodes, 2);

    let watcher = ManualFileWatcher::new();
    let handle = watcher.handle();
    daemon.watch(watcher).unwrap();

    handle
        .push_changes(vec![FileChange::modified(project.path("lib/BUCK"))])
        .unwrap();
    let status = wait_for(&daemon, |status| status.watch_events == 1);
    assert_eq!(status.rescans, 0);
    assert_eq!(status.parser.cached_nodes, 1);
    assert_eq!(status.parser.cached_build_files, 1);
}

#[test]
fn oversized_batches_become_a_rescan() {
    let project =
        Project::with_config("[watch]\noverflow_threshold = 2\n\n[logging]\nlevel = \"warn\"\n");
    let daemon = project.start();
    daemon
        .build_target_graph(["//app:app"], &CancellationToken::new())
        .unwrap();

    let watcher = ManualFileWatcher::new();
    let handle = watcher.handle();
    daemon.watch(watcher).unwrap();

    handle
        .push_changes(vec![FileChange::modified(project.path("app/main.txt"))])
        .unwrap();
    let status = wait_for(&daemon, |status| status.watch_events == 1);
    assert_eq!(status.rescans, 0);
    assert_eq!(status.parser.cached_nodes, 2);

    handle
        .push_changes(vec![
            FileChange::modified(project.path("app/a.txt")),
            FileChange::modified(project.path("app/b.txt")),
            FileChange::modified(project.path("app/c.txt")),
        ])
        .unwrap();
    let status = wait_for(&daemon, |status| status.watch_events == 2);
    assert_eq!(status.rescans, 1);
    assert_eq!(status.parser.generation, 1);
    assert_eq!(status.parser.cached_nodes, 0);
    assert_eq!(status.parser.cached_build_files, 0);
}

#[test]
fn watcher_errors_invalidate_everything() {
    let project = Project::new();
    let daemon = project.start();
    daemon
        .build_target_graph(["app"], &CancellationToken::new())
        .unwrap();

    let watcher = ManualFileWatcher::new();
    let handle = watcher.handle();
    daemon.watch(watcher).unwrap();

    handle
        .push_error(io::Error::new(io::ErrorKind::Other, "event queue overflowed"))
        .unwrap();
    let status = wait_for(&daemon, |status| status.rescans == 1);
    assert_eq!(status.parser.generation, 1);
    assert_eq!(status.parser.cached_nodes, 0);

    // The caches refill on the next request.
    daemon
        .build_target_graph(["app"], &CancellationToken::new())
        .unwrap();
    assert_eq!(daemon.status().parser.evaluations, 4);
}

#[test]
fn only_one_watcher_at_a_time() {
    let project = Project::new();
    let daemon = project.start();

    daemon.watch(ManualFileWatcher::new()).unwrap();
    let err = daemon.watch(ManualFileWatcher::new()).unwrap_err();
    assert!(err.to_string().contains("already watching"), "{err}");
}

#[test]
fn shutdown_stops_the_driver() {
    let project = Project::new();
    let daemon = project.start();

    let watcher = ManualFileWatcher::new();
    let handle = watcher.handle();
    daemon.watch(watcher).unwrap();

    daemon.shutdown();
    daemon.shutdown();

    let err = handle
        .push_changes(vec![FileChange::modified(project.path("lib/BUCK"))])
        .unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    assert_eq!(daemon.status().watch_events, 0);

    // A fresh watcher can be attached after a shutdown.
    let watcher = ManualFileWatcher::new();
    let handle = watcher.handle();
    daemon.watch(watcher).unwrap();
    handle
        .push_changes(vec![FileChange::modified(project.path("lib/BUCK"))])
        .unwrap();
    wait_for(&daemon, |status| status.watch_events == 1);
}

#[test]
fn dropping_the_daemon_stops_the_driver() {
    let project = Project::new();
    let daemon = project.start();

    let watcher = ManualFileWatcher::new();
    let handle = watcher.handle();
    daemon.watch(watcher).unwrap();
    drop(daemon);

    assert!(handle.push(bramble_vfs::WatchEvent::Rescan).is_err());
}
