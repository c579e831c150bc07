use std::sync::{Arc, Barrier};
use std::thread;

use bramble_parser::{ParserError, RawValue, BASE_PATH_KEY};
use serde_json::json;

use super::support::TestWorkspace;

#[test]
fn build_files_are_evaluated_once_and_stamped_with_their_package() {
    let ws = TestWorkspace::new();
    let build_file = ws.write_build_file(
        "java/lib",
        json!([
            {"name": "lib", "type": "library"},
            {"name": "util", "type": "library"}
        ]),
    );
    let parser = ws.parser();
    let cell = parser.cells().root_cell().clone();

    let first = parser.get_raw_target_nodes(&cell, &build_file).unwrap();
    let second = parser.get_raw_target_nodes(&cell, &build_file).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(ws.evaluator.count(&build_file), 1);
    assert_eq!(first.target_names().collect::<Vec<_>>(), ["lib", "util"]);
    assert_eq!(
        first.get("lib").unwrap().get(BASE_PATH_KEY),
        Some(&RawValue::from("java/lib"))
    );

    let stats = parser.stats();
    assert_eq!(stats.cached_build_files, 1);
    assert_eq!(stats.evaluations, 1);
}

#[test]
fn concurrent_requests_share_one_evaluation() {
    let ws = TestWorkspace::new();
    let build_file = ws.write_build_file("a", json!([{"name": "a", "type": "library"}]));
    let parser = ws.parser();
    let cell = parser.cells().root_cell().clone();

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let parser = parser.clone();
            let cell = cell.clone();
            let build_file = build_file.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                parser.get_raw_target_nodes(&cell, &build_file).unwrap()
            })
        })
        .collect();
    let manifests: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(ws.evaluator.count(&build_file), 1);
    assert!(manifests.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

#[test]
fn missing_build_files_are_reported_with_their_package() {
    let ws = TestWorkspace::new();
    std::fs::create_dir_all(ws.path("nowhere")).unwrap();
    let parser = ws.parser();
    let cell = parser.cells().root_cell().clone();

    let err = parser
        .get_raw_target_nodes(&cell, &ws.build_file("nowhere"))
        .unwrap_err();
    let ParserError::MissingBuildFile { spec, path } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(spec, "package `//nowhere`");
    assert_eq!(path, &ws.build_file("nowhere"));
    assert_eq!(ws.evaluator.total(), 0);
}

#[test]
fn paths_that_are_not_build_files_are_rejected() {
    let ws = TestWorkspace::new();
    let other = ws.write("a/README", "hello");
    let parser = ws.parser();
    let cell = parser.cells().root_cell().clone();

    let err = parser.get_raw_target_nodes(&cell, &other).unwrap_err();
    assert!(matches!(err, ParserError::InvalidSpec { .. }), "{err}");
}

#[test]
fn evaluation_failures_are_cached_until_the_file_changes() {
    let ws = TestWorkspace::new();
    let build_file = ws.write("a/BUCK", "{not json");
    let parser = ws.parser();
    let cell = parser.cells().root_cell().clone();

    for _ in 0..3 {
        let err = parser.get_raw_target_nodes(&cell, &build_file).unwrap_err();
        assert!(matches!(err, ParserError::BuildFileParse(_)), "{err}");
    }
    assert_eq!(ws.evaluator.count(&build_file), 1);

    ws.write_build_file("a", json!([{"name": "a", "type": "library"}]));
    parser.state().invalidate_path(&build_file);
    let manifest = parser.get_raw_target_nodes(&cell, &build_file).unwrap();
    assert_eq!(manifest.target_names().collect::<Vec<_>>(), ["a"]);
    assert_eq!(ws.evaluator.count(&build_file), 2);
}

#[test]
fn duplicate_rule_names_fail_the_whole_file() {
    let ws = TestWorkspace::new();
    let build_file = ws.write_build_file(
        "dup",
        json!([
            {"name": "x", "type": "library"},
            {"name": "x", "type": "binary"}
        ]),
    );
    let parser = ws.parser();
    let cell = parser.cells().root_cell().clone();

    let err = parser.get_raw_target_nodes(&cell, &build_file).unwrap_err();
    assert!(err.to_string().contains("duplicate rule definition `x`"), "{err}");
}
