use bramble_parser::{ParseOptions, ParserError, VisibilityError};
use serde_json::json;

use super::support::{target, TestWorkspace};

#[test]
fn private_targets_reject_other_packages() {
    let ws = TestWorkspace::new();
    ws.write_build_file("a", json!([{"name": "a", "type": "library"}]));
    ws.write_build_file("b", json!([{"name": "b", "type": "binary", "deps": ["//a:a"]}]));
    let parser = ws.parser();

    let err = parser
        .build_target_graph([target("//b:b")], &ParseOptions::new())
        .unwrap_err();
    let ParserError::Visibility(VisibilityError::NotVisibleTo(owner, dependent)) = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(owner, &target("//a:a"));
    assert_eq!(dependent, &target("//b:b"));
    assert!(
        err.to_string().contains("check the `visibility` attribute of `//a:a`"),
        "{err}"
    );
}

#[test]
fn same_package_ignores_visibility() {
    let ws = TestWorkspace::new();
    ws.write_build_file(
        "a",
        json!([
            {"name": "impl", "type": "library"},
            {"name": "api", "type": "library", "deps": [":impl"]}
        ]),
    );
    let parser = ws.parser();

    let graph = parser
        .build_target_graph([target("//a:api")], &ParseOptions::new())
        .unwrap();
    assert_eq!(graph.len(), 2);
}

#[test]
fn patterns_grant_access_to_matching_dependents_only() {
    let ws = TestWorkspace::new();
    ws.write_build_file(
        "lib",
        json!([{"name": "lib", "type": "library", "visibility": ["//apps/...", "//tools:gen"]}]),
    );
    ws.write_build_file(
        "apps/web",
        json!([{"name": "web", "type": "binary", "deps": ["//lib:lib"]}]),
    );
    ws.write_build_file(
        "tools",
        json!([
            {"name": "gen", "type": "binary", "deps": ["//lib:lib"]},
            {"name": "lint", "type": "binary", "deps": ["//lib:lib"]}
        ]),
    );
    let parser = ws.parser();
    let options = ParseOptions::new();

    parser
        .build_target_graph([target("//apps/web:web"), target("//tools:gen")], &options)
        .unwrap();
    let err = parser
        .build_target_graph([target("//tools:lint")], &options)
        .unwrap_err();
    assert!(matches!(err, ParserError::Visibility(_)), "{err}");
}
