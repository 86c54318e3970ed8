//! Loop node behavior: iteration records, body sub-traversals, the break
//! condition, the hard iteration cap, and parallel mode ordering.

mod common;

use serde_json::{json, Value};
use std::sync::Arc;

use aeroflow::{NoCapabilities, RunStatus};
use common::{definition, engine_with, StubCapability};

fn loop_def(loop_fields: Value) -> Value {
    let mut node = json!({"id": "each", "type": "loop"});
    node.as_object_mut()
        .unwrap()
        .extend(loop_fields.as_object().unwrap().clone());
    json!({
        "id": "wf", "name": "looper",
        "nodes": [
            {"id": "in", "type": "input"},
            node,
            {"id": "out", "type": "output"}
        ],
        "edges": [
            {"id": "e1", "source": "in", "target": "each"},
            {"id": "e2", "source": "each", "target": "out"}
        ]
    })
}

#[tokio::test]
async fn sequential_loop_binds_item_and_index() {
    let def = definition(loop_def(json!({"iteratorExpression": "in.items"})));
    let (engine, _, _) = engine_with(Arc::new(NoCapabilities));

    let result = engine
        .execute(&def, json!({"items": ["a", "b", "c"]}))
        .await
        .unwrap();
    assert_eq!(result.status, RunStatus::Completed);

    let output = result.output.unwrap();
    assert_eq!(output["totalIterations"], json!(3));
    assert_eq!(output["breakTriggered"], json!(false));
    assert_eq!(output["mode"], json!("sequential"));
    assert_eq!(
        output["iterations"],
        json!([
            {"item": "a", "index": 0},
            {"item": "b", "index": 1},
            {"item": "c", "index": 2}
        ])
    );
}

#[tokio::test]
async fn loop_body_runs_once_per_item() {
    let def = definition(loop_def(json!({
        "iteratorExpression": "in.items",
        "bodyNodes": ["double"]
    })));
    // The body node exists in the definition but is owned by the loop, so it
    // carries no main-graph edges.
    let mut def = def;
    def.nodes.push(
        serde_json::from_value(json!({
            "id": "double", "type": "tool", "name": "double", "input": "item"
        }))
        .unwrap(),
    );
    let caps = Arc::new(StubCapability::new());
    let (engine, _, _) = engine_with(caps.clone());

    let result = engine.execute(&def, json!({"items": [1, 2]})).await.unwrap();
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(caps.calls(), vec!["double", "double"]);

    let output = result.output.unwrap();
    assert_eq!(
        output["iterations"],
        json!([
            {"tool": "double", "echo": 1},
            {"tool": "double", "echo": 2}
        ])
    );
}

#[tokio::test]
async fn break_condition_stops_the_loop() {
    let def = definition(loop_def(json!({
        "iteratorExpression": "in.items",
        "breakCondition": "index >= 2"
    })));
    let (engine, _, _) = engine_with(Arc::new(NoCapabilities));

    let result = engine
        .execute(&def, json!({"items": [10, 20, 30, 40, 50]}))
        .await
        .unwrap();
    assert_eq!(result.status, RunStatus::Completed);

    let output = result.output.unwrap();
    assert_eq!(output["totalIterations"], json!(2));
    assert_eq!(output["breakTriggered"], json!(true));
}

#[tokio::test]
async fn iteration_cap_truncates_large_collections() {
    let def = definition(loop_def(json!({
        "iteratorExpression": "in.items",
        "maxIterations": 5000
    })));
    let (engine, _, _) = engine_with(Arc::new(NoCapabilities));

    let items: Vec<u32> = (0..1005).collect();
    let result = engine.execute(&def, json!({"items": items})).await.unwrap();
    assert_eq!(result.status, RunStatus::Completed);
    // The configured maximum cannot exceed the hard cap.
    assert_eq!(result.output.unwrap()["totalIterations"], json!(1000));
}

#[tokio::test]
async fn configured_maximum_below_cap_is_honored() {
    let def = definition(loop_def(json!({
        "iteratorExpression": "in.items",
        "maxIterations": 2
    })));
    let (engine, _, _) = engine_with(Arc::new(NoCapabilities));

    let result = engine
        .execute(&def, json!({"items": [1, 2, 3, 4]}))
        .await
        .unwrap();
    assert_eq!(result.output.unwrap()["totalIterations"], json!(2));
}

#[tokio::test]
async fn parallel_mode_keeps_index_order() {
    let def = definition(loop_def(json!({
        "iteratorExpression": "in.items",
        "executionMode": "parallel"
    })));
    let (engine, _, _) = engine_with(Arc::new(NoCapabilities));

    let result = engine
        .execute(&def, json!({"items": [1, 2, 3]}))
        .await
        .unwrap();

    let output = result.output.unwrap();
    assert_eq!(output["mode"], json!("parallel"));
    assert_eq!(
        output["iterations"],
        json!([
            {"item": 1, "index": 0},
            {"item": 2, "index": 1},
            {"item": 3, "index": 2}
        ])
    );
}

#[tokio::test]
async fn non_array_iterator_fails_the_run() {
    let def = definition(loop_def(json!({"iteratorExpression": "in.items"})));
    let (engine, _, _) = engine_with(Arc::new(NoCapabilities));

    let result = engine
        .execute(&def, json!({"items": "not-a-list"}))
        .await
        .unwrap();
    assert_eq!(result.status, RunStatus::Failed);
    let failure = result.error.unwrap();
    assert_eq!(failure.node_id, "each");
    assert!(failure.message.contains("array"));
}

#[tokio::test]
async fn custom_binding_names() {
    let def = definition(loop_def(json!({
        "iteratorExpression": "in.items",
        "iterationVariable": "row",
        "indexVariable": "pos"
    })));
    let (engine, _, _) = engine_with(Arc::new(NoCapabilities));

    let result = engine.execute(&def, json!({"items": ["x"]})).await.unwrap();
    assert_eq!(
        result.output.unwrap()["iterations"],
        json!([{"row": "x", "pos": 0}])
    );
}
