use bramble_config::ParserConfig;
use bramble_parser::{CommandLineTargetNodeSpecParser, ParseOptions, TargetGraph};
use serde_json::json;

use super::support::{names, pool, target, TestWorkspace};

/// Twenty packages where `pN` depends on `p(N/2)` and `p(N/3)`.
fn layered_project() -> TestWorkspace {
    let ws = TestWorkspace::new();
    for n in 1..=20usize {
        let deps: Vec<String> = [n / 2, n / 3]
            .into_iter()
            .filter(|d| *d >= 1)
            .map(|d| format!("//p{d}:lib"))
            .collect();
        ws.write_build_file(
            &format!("p{n}"),
            json!([
                {"name": "lib", "type": "library", "deps": deps, "visibility": ["PUBLIC"]},
                {"name": "lib_test", "type": "test", "deps": [":lib"]}
            ]),
        );
    }
    ws
}

fn edges(graph: &TargetGraph) -> Vec<(String, String)> {
    graph
        .edges()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect()
}

#[test]
fn parallel_and_serial_graphs_are_identical() {
    let roots = || (11..=20).map(|n| target(&format!("//p{n}:lib_test")));

    let serial_ws = layered_project();
    let serial = serial_ws
        .parser()
        .build_target_graph(roots(), &ParseOptions::new())
        .unwrap();

    let parallel_ws = layered_project();
    let parallel = parallel_ws
        .parser()
        .build_target_graph(roots(), &ParseOptions::new().with_executor(pool(4)))
        .unwrap();

    assert_eq!(names(serial.targets()), names(parallel.targets()));
    assert_eq!(edges(&serial), edges(&parallel));
    for n in 1..=20 {
        let build_file = parallel_ws.build_file(&format!("p{n}"));
        assert!(parallel_ws.evaluator.count(&build_file) <= 1, "p{n}");
    }
}

#[test]
fn parallel_errors_match_serial_errors() {
    let ws = layered_project();
    ws.write_build_file(
        "p5",
        json!([{
            "name": "lib",
            "type": "library",
            "deps": ["//p2:gone"],
            "visibility": ["PUBLIC"]
        }]),
    );
    let parser = ws.parser();
    let roots = [target("//p20:lib")];

    let serial = parser
        .build_target_graph(roots.clone(), &ParseOptions::new())
        .unwrap_err();
    parser.state().invalidate_all();
    let parallel = parser
        .build_target_graph(roots, &ParseOptions::new().with_executor(pool(4)))
        .unwrap_err();
    assert_eq!(serial.to_string(), parallel.to_string());
}

#[test]
fn parallel_spec_resolution_evaluates_each_file_once() {
    let ws = layered_project();
    let parser = ws.parser();
    let cells = ws.cells();
    let args: Vec<String> = (1..=20).map(|n| format!("//p{n}:")).collect();
    let specs = CommandLineTargetNodeSpecParser::new(&cells)
        .parse_all(args.iter().map(String::as_str))
        .unwrap();

    let options = ParseOptions::new()
        .with_executor(pool(4))
        .with_profiling(true);
    let (targets, graph) = parser
        .build_target_graph_for_target_node_specs(&specs, &options)
        .unwrap();
    assert_eq!(targets.len(), 40);
    assert_eq!(graph.len(), 40);
    assert_eq!(ws.evaluator.total(), 20);
}

#[test]
fn disabled_parallel_parsing_ignores_the_executor() {
    let ws = layered_project();
    let parser = ws.parser_with(ParserConfig {
        enable_parallel_parsing: false,
        ..ParserConfig::default()
    });
    let graph = parser
        .build_target_graph(
            [target("//p20:lib")],
            &ParseOptions::new().with_executor(pool(2)),
        )
        .unwrap();
    assert_eq!(
        names(graph.targets()),
        names(
            ws.parser()
                .build_target_graph([target("//p20:lib")], &ParseOptions::new())
                .unwrap()
                .targets()
        )
    );
}
