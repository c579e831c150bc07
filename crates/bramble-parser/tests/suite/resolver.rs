use bramble_parser::{
    CommandLineTargetNodeSpecParser, ParseOptions, ParserError, TargetNodeSpec,
};
use serde_json::json;

use super::support::{names, target, TestWorkspace};

fn project() -> TestWorkspace {
    let ws = TestWorkspace::new().with_ignore("third_party/huge");
    ws.write_build_file(
        "",
        json!([{"name": "root", "type": "filegroup", "visibility": ["PUBLIC"]}]),
    );
    ws.write_build_file(
        "app",
        json!([
            {"name": "app", "type": "binary", "deps": [":lib"]},
            {"name": "lib", "type": "library"},
            {"name": "app_test", "type": "test", "deps": [":lib"]}
        ]),
    );
    ws.write_build_file(
        "app/cli",
        json!([{"name": "cli", "type": "binary", "deps": ["//:root"]}]),
    );
    ws.write_build_file("third_party/huge", json!([{"name": "huge", "type": "library"}]));
    std::fs::create_dir_all(ws.path("empty")).unwrap();
    ws
}

fn parse(ws: &TestWorkspace, args: &[&str]) -> Result<Vec<TargetNodeSpec>, ParserError> {
    let cells = ws.cells();
    CommandLineTargetNodeSpecParser::new(&cells).parse_all(args.iter().copied())
}

#[test]
fn recursive_specs_skip_ignored_directories_without_reading_them() {
    let ws = project();
    let parser = ws.parser();
    let specs = parse(&ws, &["//..."]).unwrap();

    let targets = parser
        .resolve_target_specs(&specs, &ParseOptions::new())
        .unwrap();
    assert_eq!(
        names(&targets),
        ["//:root", "//app:app", "//app:app_test", "//app:lib", "//app/cli:cli"]
    );
    assert!(!ws
        .evaluator
        .evaluated()
        .contains(&ws.build_file("third_party/huge")));
    assert_eq!(ws.evaluator.total(), 3);
}

#[test]
fn package_and_subtree_specs() {
    let ws = project();
    let parser = ws.parser();
    let options = ParseOptions::new();

    let specs = parse(&ws, &["//app:"]).unwrap();
    let targets = parser.resolve_target_specs(&specs, &options).unwrap();
    assert_eq!(names(&targets), ["//app:app", "//app:app_test", "//app:lib"]);

    let specs = parse(&ws, &["app/..."]).unwrap();
    let targets = parser.resolve_target_specs(&specs, &options).unwrap();
    assert_eq!(targets.len(), 4);
    assert!(targets.contains(&target("//app/cli:cli")));

    let specs = parse(&ws, &["empty/..."]).unwrap();
    assert!(parser.resolve_target_specs(&specs, &options).unwrap().is_empty());
}

#[test]
fn test_predicates_keep_only_tests() {
    let ws = project();
    let parser = ws.parser();
    let cells = ws.cells();
    let TargetNodeSpec::Predicate(spec) = CommandLineTargetNodeSpecParser::new(&cells)
        .parse("//app:")
        .unwrap()
        .remove(0)
    else {
        panic!("expected a predicate spec");
    };

    let targets = parser
        .resolve_target_specs(
            &[TargetNodeSpec::Predicate(spec.only_tests())],
            &ParseOptions::new(),
        )
        .unwrap();
    assert_eq!(names(&targets), ["//app:app_test"]);
}

#[test]
fn target_specs_must_name_declared_targets() {
    let ws = project();
    let parser = ws.parser();
    let options = ParseOptions::new();

    let specs = parse(&ws, &["app", "//app:lib#shared"]).unwrap();
    let targets = parser.resolve_target_specs(&specs, &options).unwrap();
    assert_eq!(names(&targets), ["//app:app", "//app:lib#shared"]);

    let specs = parse(&ws, &["//app:missing"]).unwrap();
    let err = parser.resolve_target_specs(&specs, &options).unwrap_err();
    let ParserError::TargetNotFound { target: missing, available, .. } = err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(missing, target("//app:missing"));
    assert_eq!(available, ["app", "lib", "app_test"]);
}

#[test]
fn specs_over_missing_packages_fail() {
    let ws = project();
    let parser = ws.parser();

    let err = parse(&ws, &["//nowhere:x"]).unwrap_err();
    assert!(
        err.to_string().contains("references non-existent directory `nowhere`"),
        "{err}"
    );

    let specs = parse(&ws, &["//empty:"]).unwrap();
    let err = parser
        .resolve_target_specs(&specs, &ParseOptions::new())
        .unwrap_err();
    assert!(matches!(err, ParserError::MissingBuildFile { .. }), "{err}");

    let err = parse(&ws, &["nope//a:a"]).unwrap_err();
    assert!(matches!(err, ParserError::BuildTarget(_)), "{err}");
}

#[test]
fn aliases_expand_and_duplicates_collapse() {
    let ws = project();
    let cells = ws.cells();
    let spec_parser = CommandLineTargetNodeSpecParser::new(&cells)
        .with_alias("tools", vec!["//app/cli".to_owned(), "//app:app".to_owned()]);

    let specs = spec_parser.parse_all(["tools", "//app:app"]).unwrap();
    let rendered: Vec<String> = specs.iter().map(ToString::to_string).collect();
    assert_eq!(rendered, ["//app/cli:cli", "//app:app"]);
}

#[test]
fn specs_resolve_into_a_graph() {
    let ws = project();
    let parser = ws.parser();
    let specs = parse(&ws, &["//app/..."]).unwrap();

    let (targets, graph) = parser
        .build_target_graph_for_target_node_specs(&specs, &ParseOptions::new())
        .unwrap();
    assert_eq!(targets.len(), 4);
    assert_eq!(graph.len(), 5);
    assert!(graph.position(&target("//:root")) < graph.position(&target("//app/cli:cli")));
    assert!(graph.position(&target("//app:lib")) < graph.position(&target("//app:app")));
}
