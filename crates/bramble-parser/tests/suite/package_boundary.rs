use bramble_config::ParserConfig;
use bramble_parser::{CoercedValue, ParseOptions, ParserError};
use serde_json::json;

use super::support::{target, TestWorkspace};

fn nested_project() -> TestWorkspace {
    let ws = TestWorkspace::new();
    ws.write_build_file(
        "a",
        json!([{"name": "a", "type": "filegroup", "srcs": ["own.txt", "b/inner.txt"]}]),
    );
    ws.write_build_file("a/b", json!([{"name": "b", "type": "filegroup"}]));
    ws.write("a/own.txt", "");
    ws.write("a/b/inner.txt", "");
    ws
}

#[test]
fn paths_may_not_cross_into_sub_packages() {
    let ws = nested_project();
    let parser = ws.parser();

    let err = parser
        .get_target_node(&target("//a:a"), &ParseOptions::new())
        .unwrap_err();
    let ParserError::PackageBoundary { target: owner, path, reason } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(owner, &target("//a:a"));
    assert_eq!(path, "b/inner.txt");
    assert!(reason.contains("crosses into package `//a/b`"), "{reason}");
}

#[test]
fn enforcement_can_be_disabled() {
    let ws = nested_project();
    let parser = ws.parser_with(ParserConfig {
        enforce_package_boundary: false,
        ..ParserConfig::default()
    });

    let node = parser
        .get_target_node(&target("//a:a"), &ParseOptions::new())
        .unwrap();
    let srcs = node.args().get("srcs").and_then(CoercedValue::as_list).unwrap();
    assert_eq!(
        srcs,
        [
            CoercedValue::Path("a/own.txt".into()),
            CoercedValue::Path("a/b/inner.txt".into()),
        ]
    );
}

#[test]
fn paths_may_never_leave_the_package() {
    let ws = TestWorkspace::new();
    for (package, src) in [("up", "../elsewhere.txt"), ("abs", "/etc/passwd"), ("dot", ".")] {
        ws.write_build_file(
            package,
            json!([{"name": "x", "type": "filegroup", "srcs": [src]}]),
        );
    }
    let parser = ws.parser_with(ParserConfig {
        enforce_package_boundary: false,
        ..ParserConfig::default()
    });

    for package in ["up", "abs", "dot"] {
        let err = parser
            .get_target_node(&target(&format!("//{package}:x")), &ParseOptions::new())
            .unwrap_err();
        assert!(matches!(err, ParserError::PackageBoundary { .. }), "{package}: {err}");
    }
}
