use bramble_parser::{ParseOptions, ParserError, RawValue, DIRECT_DEPENDENCIES_KEY};
use serde_json::json;

use super::support::{names, target, TestWorkspace};

fn two_packages(ws: &TestWorkspace) {
    ws.write_build_file(
        "a",
        json!([{"name": "a", "type": "library", "srcs": ["A.java"], "visibility": ["PUBLIC"]}]),
    );
    ws.write_build_file(
        "b",
        json!([{"name": "b", "type": "binary", "deps": ["//a:a"]}]),
    );
}

#[test]
fn dependencies_come_before_dependents() {
    let ws = TestWorkspace::new();
    two_packages(&ws);
    let parser = ws.parser();

    let graph = parser
        .build_target_graph([target("//b:b")], &ParseOptions::new())
        .unwrap();

    assert_eq!(names(graph.targets()), ["//a:a", "//b:b"]);
    let edges: Vec<(String, String)> = graph
        .edges()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();
    assert_eq!(edges, [("//b:b".to_owned(), "//a:a".to_owned())]);
    assert_eq!(names(graph.incoming(&target("//a:a"))), ["//b:b"]);
    assert_eq!(graph.get(&target("//a:a")).unwrap().rule_type().name, "library");
}

#[test]
fn shared_dependencies_appear_once() {
    let ws = TestWorkspace::new();
    ws.write_build_file(
        "lib",
        json!([
            {"name": "base", "type": "library"},
            {"name": "left", "type": "library", "deps": [":base"]},
            {"name": "right", "type": "library", "deps": [":base"]},
            {"name": "top", "type": "binary", "deps": [":right", ":left"]}
        ]),
    );
    let parser = ws.parser();

    let graph = parser
        .build_target_graph([target("//lib:top"), target("//lib:base")], &ParseOptions::new())
        .unwrap();
    assert_eq!(
        names(graph.targets()),
        ["//lib:base", "//lib:left", "//lib:right", "//lib:top"]
    );
    assert_eq!(graph.edges().count(), 4);
}

#[test]
fn macro_references_are_graph_edges() {
    let ws = TestWorkspace::new();
    ws.write_build_file(
        "tools",
        json!([{"name": "gen", "type": "binary", "visibility": ["//gen/..."]}]),
    );
    ws.write_build_file(
        "gen",
        json!([{
            "name": "out",
            "type": "genrule",
            "out": "o.txt",
            "cmd": "$(exe //tools:gen) > $OUT"
        }]),
    );
    let parser = ws.parser();

    let graph = parser
        .build_target_graph([target("//gen:out")], &ParseOptions::new())
        .unwrap();
    assert_eq!(names(graph.targets()), ["//tools:gen", "//gen:out"]);
    let node = graph.get(&target("//gen:out")).unwrap();
    assert!(node.declared_deps().is_empty());
    assert_eq!(names(node.extra_deps()), ["//tools:gen"]);
}

#[test]
fn flavored_roots_resolve_through_the_unflavored_alias() {
    let ws = TestWorkspace::new();
    two_packages(&ws);
    let parser = ws.parser();

    let graph = parser
        .build_target_graph([target("//a:a#src")], &ParseOptions::new())
        .unwrap();
    assert!(graph.contains(&target("//a:a#src")));
    assert!(!graph.contains(&target("//a:a")));
    assert_eq!(
        graph.get(&target("//a:a")).unwrap().build_target(),
        &target("//a:a#src")
    );
}

#[test]
fn missing_dependencies_name_the_dependent() {
    let ws = TestWorkspace::new();
    ws.write_build_file(
        "a",
        json!([{"name": "other", "type": "library", "visibility": ["PUBLIC"]}]),
    );
    ws.write_build_file("b", json!([{"name": "b", "type": "binary", "deps": ["//a:a"]}]));
    let parser = ws.parser();

    let err = parser
        .build_target_graph([target("//b:b")], &ParseOptions::new())
        .unwrap_err();
    let ParserError::DependencyResolution {
        dependent,
        dependency,
        ..
    } = &err
    else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(dependent, &target("//b:b"));
    assert_eq!(dependency, &target("//a:a"));
    let ParserError::TargetNotFound { available, .. } = err.root_cause() else {
        panic!("unexpected cause: {err}");
    };
    assert_eq!(available, &["other".to_owned()]);
}

#[test]
fn missing_roots_are_not_wrapped() {
    let ws = TestWorkspace::new();
    two_packages(&ws);
    let parser = ws.parser();

    let err = parser
        .build_target_graph([target("//a:nope")], &ParseOptions::new())
        .unwrap_err();
    assert!(matches!(err, ParserError::TargetNotFound { .. }), "{err}");

    let err = parser
        .build_target_graph([target("//missing:x")], &ParseOptions::new())
        .unwrap_err();
    assert!(matches!(err, ParserError::MissingBuildFile { .. }), "{err}");
}

#[test]
fn raw_nodes_carry_their_direct_dependencies() {
    let ws = TestWorkspace::new();
    two_packages(&ws);
    let parser = ws.parser();
    let node = parser
        .get_target_node(&target("//b:b"), &ParseOptions::new())
        .unwrap();

    let raw = parser.get_raw_target_node(&node).unwrap();
    assert_eq!(raw.name(), Some("b"));
    assert_eq!(
        raw.get(DIRECT_DEPENDENCIES_KEY),
        Some(&RawValue::from(vec!["//a:a"]))
    );
}
