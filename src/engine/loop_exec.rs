//! Loop node executor.
//!
//! Iterates the collection resolved from the loop's iterator expression,
//! binding `item`/`index` (or the configured names) into a scoped overlay per
//! iteration. Sequential mode honors the break condition; parallel mode runs
//! every iteration concurrently and reports results in index order.

use serde_json::{json, Value};
use std::collections::HashMap;

use crate::context::ResultContext;
use crate::definition::{LoopData, LoopMode, WorkflowDefinition, LOOP_ITERATION_CAP};
use crate::error::NodeError;
use crate::expression;

use super::ExecutionEngine;

impl ExecutionEngine {
    pub(super) async fn run_loop(
        &self,
        definition: &WorkflowDefinition,
        data: &LoopData,
        ctx: &ResultContext,
    ) -> Result<Value, NodeError> {
        let collection = ctx.resolve(&data.iterator_expression)?;
        let items = match collection {
            Value::Array(items) => items,
            other => {
                return Err(NodeError::TypeError(format!(
                    "iterator expression '{}' must resolve to an array, got {}",
                    data.iterator_expression,
                    value_kind(&other)
                )))
            }
        };

        let cap = data.max_iterations.min(LOOP_ITERATION_CAP);
        let take = items.len().min(cap);
        let truncated = items.len() > take;
        if truncated {
            tracing::warn!(
                total = items.len(),
                cap = take,
                "loop collection exceeds iteration cap, truncating"
            );
        }
        let items = &items[..take];

        match data.execution_mode {
            LoopMode::Sequential => self.loop_sequential(definition, data, ctx, items).await,
            LoopMode::Parallel => self.loop_parallel(definition, data, ctx, items).await,
        }
    }

    async fn loop_sequential(
        &self,
        definition: &WorkflowDefinition,
        data: &LoopData,
        ctx: &ResultContext,
        items: &[Value],
    ) -> Result<Value, NodeError> {
        let mut iterations: Vec<Value> = Vec::with_capacity(items.len());
        let mut break_triggered = false;

        for (index, item) in items.iter().enumerate() {
            let scoped = ctx.scoped(bindings(data, item, index));

            // The break condition sees the upcoming iteration's bindings, so
            // the iteration it stops never runs. The first iteration is
            // unconditional.
            if index > 0 {
                if let Some(expr) = &data.break_condition {
                    if expression::evaluate(expr, &scoped)? {
                        break_triggered = true;
                        break;
                    }
                }
            }

            let output = self.iteration_output(definition, data, &scoped, item, index).await?;
            iterations.push(output);
        }

        Ok(loop_result(iterations, break_triggered, "sequential"))
    }

    async fn loop_parallel(
        &self,
        definition: &WorkflowDefinition,
        data: &LoopData,
        ctx: &ResultContext,
        items: &[Value],
    ) -> Result<Value, NodeError> {
        let tasks = items.iter().enumerate().map(|(index, item)| async move {
            let scoped = ctx.scoped(bindings(data, item, index));
            self.iteration_output(definition, data, &scoped, item, index)
                .await
        });

        // join_all keeps results in submission order, so the output list is
        // index-ordered no matter which iteration finishes first.
        let settled = futures::future::join_all(tasks).await;
        let mut iterations = Vec::with_capacity(settled.len());
        for result in settled {
            iterations.push(result?);
        }

        Ok(loop_result(iterations, false, "parallel"))
    }

    async fn iteration_output(
        &self,
        definition: &WorkflowDefinition,
        data: &LoopData,
        scoped: &ResultContext,
        item: &Value,
        index: usize,
    ) -> Result<Value, NodeError> {
        if data.body_nodes.is_empty() {
            let mut record = serde_json::Map::new();
            record.insert(data.iteration_variable.clone(), item.clone());
            record.insert(data.index_variable.clone(), json!(index));
            return Ok(Value::Object(record));
        }
        self.run_linear(definition, &data.body_nodes, scoped).await
    }
}

fn bindings(data: &LoopData, item: &Value, index: usize) -> HashMap<String, Value> {
    HashMap::from([
        (data.iteration_variable.clone(), item.clone()),
        (data.index_variable.clone(), json!(index)),
    ])
}

fn loop_result(iterations: Vec<Value>, break_triggered: bool, mode: &str) -> Value {
    json!({
        "totalIterations": iterations.len(),
        "iterations": iterations,
        "breakTriggered": break_triggered,
        "mode": mode,
    })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
