//! End-to-end traversal: linear chains, branch pruning, failures, loops,
//! and parallel fan-out.

mod common;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use aeroflow::{
    EngineConfig, ExecutionEngine, MemoryApprovalStore, MemoryRunStore, NoCapabilities,
    RunStatus, RunStore, StepStatus,
};
use common::{definition, engine_with, StubCapability};

#[tokio::test]
async fn trivial_graph_passes_input_through() {
    let def = definition(json!({
        "id": "wf", "name": "pass-through",
        "nodes": [
            {"id": "in", "type": "input"},
            {"id": "out", "type": "output"}
        ],
        "edges": [{"id": "e1", "source": "in", "target": "out"}]
    }));
    let (engine, runs, _) = engine_with(Arc::new(NoCapabilities));

    let result = engine.execute(&def, json!({"x": 1})).await.unwrap();
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.output, Some(json!({"x": 1})));
    assert!(result.step_results.contains_key("in"));
    assert!(result.step_results.contains_key("out"));

    let run = runs.get_run(&result.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.output, Some(json!({"x": 1})));
}

#[tokio::test]
async fn tool_chain_executes_in_order() {
    let def = definition(json!({
        "id": "wf", "name": "chain",
        "nodes": [
            {"id": "in", "type": "input"},
            {"id": "fetch", "type": "tool", "name": "fetch", "input": "in"},
            {"id": "transform", "type": "tool", "name": "transform", "input": "fetch"},
            {"id": "out", "type": "output"}
        ],
        "edges": [
            {"id": "e1", "source": "in", "target": "fetch"},
            {"id": "e2", "source": "fetch", "target": "transform"},
            {"id": "e3", "source": "transform", "target": "out"}
        ]
    }));
    let caps = Arc::new(StubCapability::new());
    let (engine, runs, _) = engine_with(caps.clone());

    let result = engine.execute(&def, json!({"q": "hi"})).await.unwrap();
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(caps.calls(), vec!["fetch", "transform"]);
    // The transform node saw fetch's output as its input.
    assert_eq!(
        result.output,
        Some(json!({
            "tool": "transform",
            "echo": {"tool": "fetch", "echo": {"q": "hi"}}
        }))
    );

    let steps = runs.list_steps(&result.run_id).await.unwrap();
    let order: Vec<_> = steps.iter().map(|s| s.node_id.as_str()).collect();
    assert_eq!(order, vec!["in", "fetch", "transform", "out"]);
    assert!(steps.iter().all(|s| s.status == StepStatus::Completed));
}

#[tokio::test]
async fn condition_prunes_the_losing_branch() {
    let diamond = json!({
        "id": "wf", "name": "diamond",
        "nodes": [
            {"id": "in", "type": "input"},
            {"id": "cond", "type": "condition",
             "expression": "in.flag == true", "trueBranch": "a", "falseBranch": "b"},
            {"id": "a", "type": "tool", "name": "a"},
            {"id": "b", "type": "tool", "name": "b"},
            {"id": "b2", "type": "tool", "name": "b2"},
            {"id": "out", "type": "output"}
        ],
        "edges": [
            {"id": "e1", "source": "in", "target": "cond"},
            {"id": "e2", "source": "cond", "target": "a", "label": "true"},
            {"id": "e3", "source": "cond", "target": "b", "label": "false"},
            {"id": "e4", "source": "b", "target": "b2"},
            {"id": "e5", "source": "a", "target": "out"},
            {"id": "e6", "source": "b2", "target": "out"}
        ]
    });
    let def = definition(diamond);
    let caps = Arc::new(StubCapability::new());
    let (engine, runs, _) = engine_with(caps.clone());

    let result = engine.execute(&def, json!({"flag": true})).await.unwrap();
    assert_eq!(result.status, RunStatus::Completed);
    assert!(result.step_results.contains_key("a"));
    assert!(!result.step_results.contains_key("b"));
    assert!(!result.step_results.contains_key("b2"));
    assert_eq!(caps.calls(), vec!["a"]);
    assert_eq!(
        result.step_results["cond"],
        json!({"result": true, "selectedBranch": "a"})
    );
    // Only the winning branch reached the output node.
    assert_eq!(result.output, Some(json!({"tool": "a", "echo": null})));

    let steps = runs.list_steps(&result.run_id).await.unwrap();
    let mut skipped: Vec<_> = steps
        .iter()
        .filter(|s| s.status == StepStatus::Skipped)
        .map(|s| s.node_id.as_str())
        .collect();
    skipped.sort();
    assert_eq!(skipped, vec!["b", "b2"]);
}

#[tokio::test]
async fn condition_false_branch_wins() {
    let def = definition(json!({
        "id": "wf", "name": "diamond",
        "nodes": [
            {"id": "in", "type": "input"},
            {"id": "cond", "type": "condition",
             "expression": "in.count > 10", "trueBranch": "a", "falseBranch": "b"},
            {"id": "a", "type": "tool", "name": "a"},
            {"id": "b", "type": "tool", "name": "b"},
            {"id": "out", "type": "output"}
        ],
        "edges": [
            {"id": "e1", "source": "in", "target": "cond"},
            {"id": "e2", "source": "cond", "target": "a", "label": "true"},
            {"id": "e3", "source": "cond", "target": "b", "label": "false"},
            {"id": "e4", "source": "a", "target": "out"},
            {"id": "e5", "source": "b", "target": "out"}
        ]
    }));
    let caps = Arc::new(StubCapability::new());
    let (engine, _, _) = engine_with(caps.clone());

    let result = engine.execute(&def, json!({"count": 3})).await.unwrap();
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(caps.calls(), vec!["b"]);
    assert_eq!(
        result.step_results["cond"],
        json!({"result": false, "selectedBranch": "b"})
    );
}

#[tokio::test]
async fn stalled_traversal_fails_the_run() {
    // The false branch wins but only the true branch leads to the output
    // node, so the traversal runs out of ready nodes.
    let def = definition(json!({
        "id": "wf", "name": "dead-end",
        "nodes": [
            {"id": "in", "type": "input"},
            {"id": "cond", "type": "condition",
             "expression": "in.flag", "trueBranch": "a", "falseBranch": "b"},
            {"id": "a", "type": "tool", "name": "a"},
            {"id": "b", "type": "tool", "name": "b"},
            {"id": "out", "type": "output"}
        ],
        "edges": [
            {"id": "e1", "source": "in", "target": "cond"},
            {"id": "e2", "source": "cond", "target": "a"},
            {"id": "e3", "source": "cond", "target": "b"},
            {"id": "e4", "source": "a", "target": "out"}
        ]
    }));
    let (engine, _, _) = engine_with(Arc::new(StubCapability::new()));

    let result = engine.execute(&def, json!({"flag": false})).await.unwrap();
    assert_eq!(result.status, RunStatus::Failed);
    let failure = result.error.unwrap();
    assert_eq!(failure.node_id, "out");
}

#[tokio::test]
async fn node_failure_names_the_node() {
    let def = definition(json!({
        "id": "wf", "name": "boom",
        "nodes": [
            {"id": "in", "type": "input"},
            {"id": "bad", "type": "tool", "name": "bad"},
            {"id": "out", "type": "output"}
        ],
        "edges": [
            {"id": "e1", "source": "in", "target": "bad"},
            {"id": "e2", "source": "bad", "target": "out"}
        ]
    }));
    let caps = Arc::new(StubCapability::new().failing("bad"));
    let (engine, runs, _) = engine_with(caps);

    let result = engine.execute(&def, json!({})).await.unwrap();
    assert_eq!(result.status, RunStatus::Failed);
    let failure = result.error.unwrap();
    assert_eq!(failure.node_id, "bad");
    assert_eq!(failure.node_kind, "tool");
    assert!(failure.message.contains("exploded"));

    let run = runs.get_run(&result.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.unwrap().contains("bad"));
}

#[tokio::test]
async fn graph_errors_are_fatal_before_any_node_runs() {
    let def = definition(json!({
        "id": "wf", "name": "no-output",
        "nodes": [{"id": "in", "type": "input"}],
        "edges": []
    }));
    let (engine, runs, _) = engine_with(Arc::new(NoCapabilities));

    assert!(engine.execute(&def, json!({})).await.is_err());
    assert!(runs
        .list_runs_by_status(RunStatus::Failed)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn max_steps_limit_fails_the_run() {
    let def = definition(json!({
        "id": "wf", "name": "long",
        "nodes": [
            {"id": "in", "type": "input"},
            {"id": "t1", "type": "tool", "name": "t1"},
            {"id": "t2", "type": "tool", "name": "t2"},
            {"id": "out", "type": "output"}
        ],
        "edges": [
            {"id": "e1", "source": "in", "target": "t1"},
            {"id": "e2", "source": "t1", "target": "t2"},
            {"id": "e3", "source": "t2", "target": "out"}
        ]
    }));
    let runs = Arc::new(MemoryRunStore::new());
    let engine = ExecutionEngine::new(
        Arc::new(StubCapability::new()),
        runs,
        Arc::new(MemoryApprovalStore::new()),
    )
    .with_config(EngineConfig {
        max_steps: 2,
        ..EngineConfig::default()
    });

    let result = engine.execute(&def, json!({})).await.unwrap();
    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.error.unwrap().message.contains("Max steps"));
}

#[tokio::test]
async fn cancellation_stops_the_traversal() {
    let def = definition(json!({
        "id": "wf", "name": "cancellable",
        "nodes": [
            {"id": "in", "type": "input"},
            {"id": "slow", "type": "tool", "name": "slow"},
            {"id": "after", "type": "tool", "name": "after"},
            {"id": "out", "type": "output"}
        ],
        "edges": [
            {"id": "e1", "source": "in", "target": "slow"},
            {"id": "e2", "source": "slow", "target": "after"},
            {"id": "e3", "source": "after", "target": "out"}
        ]
    }));
    let caps = Arc::new(StubCapability::new().delayed("slow", 300));
    let runs = Arc::new(MemoryRunStore::new());
    let engine = Arc::new(ExecutionEngine::new(
        caps.clone(),
        runs.clone(),
        Arc::new(MemoryApprovalStore::new()),
    ));

    let handle = tokio::spawn({
        let engine = engine.clone();
        let def = def.clone();
        async move { engine.execute(&def, json!({})).await }
    });

    // Wait for the run to appear, then flip it to cancelled while the slow
    // tool is still executing.
    let mut run = loop {
        if let Some(run) = runs
            .list_runs_by_status(RunStatus::Running)
            .await
            .unwrap()
            .pop()
        {
            break run;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    run.status = RunStatus::Cancelled;
    runs.update_run(&run).await.unwrap();

    let result = handle.await.unwrap().unwrap();
    assert_eq!(result.status, RunStatus::Cancelled);
    // Nothing past the in-flight node was dispatched.
    assert!(!caps.calls().contains(&"after".to_string()));
}
