//! Parallel node executor.
//!
//! Runs each named branch as a concurrent linear walk over a snapshot of the
//! result context, then merges the settled outcomes according to the node's
//! strategy. Branches are isolated: none sees another's intermediate writes,
//! and a per-branch timeout turns a slow branch into a rejection rather than
//! hanging the run.

use futures::future;
use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::context::ResultContext;
use crate::definition::{ErrorHandling, MergeStrategy, ParallelData, WorkflowDefinition};
use crate::error::NodeError;

use super::ExecutionEngine;

impl ExecutionEngine {
    pub(super) async fn run_parallel(
        &self,
        definition: &WorkflowDefinition,
        data: &ParallelData,
        ctx: &ResultContext,
    ) -> Result<Value, NodeError> {
        if data.branches.is_empty() {
            return Err(NodeError::ConfigError(
                "parallel node has no branches".to_string(),
            ));
        }

        let timeout_ms = data.timeout_ms.or(self.config.default_branch_timeout_ms);
        let total = data.branches.len();

        let mut pending: Vec<_> = data
            .branches
            .iter()
            .map(|(name, nodes)| {
                Box::pin(async move {
                    let result = self
                        .run_branch(definition, name, nodes, ctx, timeout_ms)
                        .await;
                    (name.as_str(), result)
                })
            })
            .collect();

        match data.merge_strategy {
            MergeStrategy::First => {
                let ((name, result), _, _) = future::select_all(pending).await;
                let mut outcomes = Map::new();
                record_outcome(&mut outcomes, name, &result);
                Ok(merge_result(outcomes, total, "first"))
            }
            MergeStrategy::Any => {
                let mut outcomes = Map::new();
                while !pending.is_empty() {
                    let ((name, result), _, rest) = future::select_all(pending).await;
                    pending = rest;
                    let succeeded = result.is_ok();
                    record_outcome(&mut outcomes, name, &result);
                    if succeeded {
                        return Ok(merge_result(outcomes, total, "any"));
                    }
                }
                Err(NodeError::AllBranchesFailed(rejection_summary(&outcomes)))
            }
            MergeStrategy::All => {
                let mut outcomes = Map::new();
                while !pending.is_empty() {
                    let ((name, result), _, rest) = future::select_all(pending).await;
                    pending = rest;
                    if let Err(err) = &result {
                        if data.error_handling == ErrorHandling::FailFast {
                            tracing::debug!(branch = name, "branch failed, aborting siblings");
                            return Err(NodeError::ExecutionError(format!(
                                "branch '{}' failed: {}",
                                name, err
                            )));
                        }
                    }
                    record_outcome(&mut outcomes, name, &result);
                }
                Ok(merge_result(outcomes, total, "all"))
            }
        }
    }

    async fn run_branch(
        &self,
        definition: &WorkflowDefinition,
        name: &str,
        nodes: &[String],
        ctx: &ResultContext,
        timeout_ms: Option<u64>,
    ) -> Result<Value, NodeError> {
        let walk = self.run_linear(definition, nodes, ctx);
        match timeout_ms {
            Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), walk).await {
                Ok(result) => result,
                Err(_) => Err(NodeError::BranchTimeout {
                    branch: name.to_string(),
                    timeout_ms: ms,
                }),
            },
            None => walk.await,
        }
    }
}

fn record_outcome(outcomes: &mut Map<String, Value>, name: &str, result: &Result<Value, NodeError>) {
    let entry = match result {
        Ok(value) => json!({ "status": "fulfilled", "value": value }),
        Err(err) => json!({ "status": "rejected", "error": err.to_string() }),
    };
    outcomes.insert(name.to_string(), entry);
}

fn merge_result(outcomes: Map<String, Value>, total: usize, strategy: &str) -> Value {
    let succeeded = outcomes
        .values()
        .filter(|o| o["status"] == "fulfilled")
        .count();
    let failed = outcomes.len() - succeeded;
    json!({
        "outcomes": outcomes,
        "succeeded": succeeded,
        "failed": failed,
        "total": total,
        "strategy": strategy,
    })
}

fn rejection_summary(outcomes: &Map<String, Value>) -> String {
    let mut parts: Vec<String> = outcomes
        .iter()
        .map(|(name, outcome)| {
            let error = outcome["error"].as_str().unwrap_or("unknown error");
            format!("{}: {}", name, error)
        })
        .collect();
    parts.sort();
    parts.join("; ")
}
