use bramble_parser::{CancellationToken, ParseOptions, ParserError};
use serde_json::json;

use super::support::{pool, target, TestWorkspace};

fn chain(ws: &TestWorkspace) {
    ws.write_build_file(
        "a",
        json!([{"name": "a", "type": "binary", "deps": ["//b:b"]}]),
    );
    ws.write_build_file(
        "b",
        json!([{"name": "b", "type": "library", "deps": ["//c:c"], "visibility": ["PUBLIC"]}]),
    );
    ws.write_build_file(
        "c",
        json!([{"name": "c", "type": "library", "visibility": ["PUBLIC"]}]),
    );
}

#[test]
fn cancelled_requests_stop_before_evaluating() {
    let ws = TestWorkspace::new();
    chain(&ws);
    let parser = ws.parser();
    let token = CancellationToken::new();
    token.cancel();
    let options = ParseOptions::new().with_cancellation(token);

    let err = parser
        .build_target_graph([target("//a:a")], &options)
        .unwrap_err();
    assert!(matches!(err, ParserError::Cancelled), "{err}");
    assert_eq!(ws.evaluator.total(), 0);
}

#[test]
fn cancelling_mid_request_aborts_and_keeps_caches_usable() {
    let ws = TestWorkspace::new();
    chain(&ws);
    let parser = ws.parser();
    let token = CancellationToken::new();
    let trigger = token.clone();
    let c = ws.build_file("c");
    ws.evaluator.set_hook(move |build_file| {
        if build_file == c {
            trigger.cancel();
        }
    });

    let err = parser
        .build_target_graph(
            [target("//a:a")],
            &ParseOptions::new().with_cancellation(token),
        )
        .unwrap_err();
    assert!(matches!(err.root_cause(), ParserError::Cancelled), "{err}");

    let graph = parser
        .build_target_graph([target("//a:a")], &ParseOptions::new())
        .unwrap();
    assert_eq!(graph.len(), 3);
    assert_eq!(ws.evaluator.total(), 3);
}

#[test]
fn parallel_warm_up_honours_cancellation() {
    let ws = TestWorkspace::new();
    chain(&ws);
    let parser = ws.parser();
    let token = CancellationToken::new();
    token.cancel();

    let err = parser
        .build_target_graph(
            [target("//a:a")],
            &ParseOptions::new()
                .with_executor(pool(2))
                .with_cancellation(token),
        )
        .unwrap_err();
    assert!(matches!(err, ParserError::Cancelled), "{err}");
    assert_eq!(ws.evaluator.total(), 0);
}
