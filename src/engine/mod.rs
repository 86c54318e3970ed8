//! The execution engine — the main traversal driver.
//!
//! [`ExecutionEngine`] walks a definition's DAG in dependency order,
//! dispatching each ready node through an exhaustive match on its kind,
//! recording outputs into the shared [`ResultContext`], and deciding when to
//! stop, skip, suspend, or fail. It is the only component with that
//! authority: loop and parallel fan-out live in their own executors
//! ([`loop_exec`], [`parallel`]) and fan back in before the traversal
//! continues.

mod loop_exec;
mod parallel;
mod recovery;

pub use recovery::RecoveryScanner;

use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::capability::CapabilityProvider;
use crate::config::EngineConfig;
use crate::context::ResultContext;
use crate::definition::{NodeKind, WorkflowDefinition, WorkflowNode};
use crate::error::{EngineError, EngineResult, NodeError};
use crate::events::{EngineEvent, EventPublisher, StepStage};
use crate::expression;
use crate::graph::{branch_skip_set, WorkflowGraph};
use crate::run::{
    EngineState, RunFailure, RunResult, RunStatus, StepStatus, WorkflowRun, WorkflowStep,
};
use crate::store::{ApprovalStore, PendingApproval, RunStore};

/// Orchestrates graph execution against the injected collaborators.
pub struct ExecutionEngine {
    capabilities: Arc<dyn CapabilityProvider>,
    runs: Arc<dyn RunStore>,
    approvals: Arc<dyn ApprovalStore>,
    publisher: EventPublisher,
    config: EngineConfig,
}

/// What one node dispatch produced: its output plus any branch-pruning
/// decision (non-empty only for condition nodes).
struct NodeOutcome {
    output: Value,
    skip: HashSet<String>,
}

impl NodeOutcome {
    fn value(output: Value) -> Self {
        NodeOutcome {
            output,
            skip: HashSet::new(),
        }
    }
}

impl ExecutionEngine {
    pub fn new(
        capabilities: Arc<dyn CapabilityProvider>,
        runs: Arc<dyn RunStore>,
        approvals: Arc<dyn ApprovalStore>,
    ) -> Self {
        ExecutionEngine {
            capabilities,
            runs,
            approvals,
            publisher: EventPublisher::disabled(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_publisher(mut self, publisher: EventPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    /// Run a definition from the top. Graph problems are fatal
    /// [`EngineError`]s raised before any node executes; node failures come
    /// back as a `Failed` run result naming the broken node.
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        input: Value,
    ) -> EngineResult<RunResult> {
        let graph = WorkflowGraph::build(definition)?;

        let mut run = WorkflowRun::new(&definition.id, definition.version, input.clone());
        self.runs.create_run(&run).await?;
        run.status = RunStatus::Running;
        self.runs.update_run(&run).await?;
        self.publish_status(&run);

        self.drive(
            definition,
            &graph,
            run,
            ResultContext::new(),
            HashSet::new(),
            HashSet::new(),
            input,
        )
        .await
    }

    /// Re-enter a suspended run. `input` carries the approval outcome; the
    /// pending approval is consumed atomically, so of two concurrent resume
    /// calls exactly one proceeds and the other gets
    /// [`EngineError::ApprovalNotPending`]. `input = None` re-drives the run
    /// without deciding the approval (the recovery path) and will suspend at
    /// the same node again. A run already in a terminal status is rejected
    /// with [`EngineError::RunNotResumable`].
    pub async fn resume(
        &self,
        definition: &WorkflowDefinition,
        state: EngineState,
        input: Option<Value>,
    ) -> EngineResult<RunResult> {
        let graph = WorkflowGraph::build(definition)?;

        let mut run = self
            .runs
            .get_run(&state.run_id)
            .await?
            .ok_or_else(|| EngineError::RunNotFound(state.run_id.clone()))?;

        // Terminal statuses are final: a run cancelled (or completed/failed)
        // while suspended must not be revived, even though its pending
        // approval row may still exist.
        if run.status.is_terminal() {
            return Err(EngineError::RunNotResumable {
                run_id: run.id.clone(),
                status: run.status.as_str().to_string(),
            });
        }

        let suspended_node = definition
            .node(&state.suspended_at_node_id)
            .ok_or_else(|| EngineError::NodeNotFound(state.suspended_at_node_id.clone()))?;
        if !matches!(suspended_node.kind, NodeKind::Approval(_)) {
            return Err(EngineError::InvalidSuspensionPoint {
                node_id: state.suspended_at_node_id.clone(),
            });
        }

        let mut ctx = ResultContext::from_outputs(state.node_outputs.clone());
        let mut completed = state.completed_set();
        let skipped = state.skipped_set();

        if let Some(outcome) = input {
            self.approvals
                .consume(&run.id)
                .await?
                .ok_or_else(|| EngineError::ApprovalNotPending(run.id.clone()))?;

            // A re-attempt is a new step record, never an update.
            let step = WorkflowStep::started(
                &run.id,
                &suspended_node.id,
                suspended_node.kind.name(),
                None,
            );
            self.runs
                .append_step(&step.finish(StepStatus::Completed, Some(outcome.clone()), None))
                .await?;
            self.publish_step(
                &run.id,
                StepStage::Complete,
                &suspended_node.id,
                suspended_node.kind.name(),
                outcome.clone(),
            );

            ctx.set(suspended_node.id.clone(), outcome);
            completed.insert(suspended_node.id.clone());
        }

        run.status = RunStatus::Running;
        run.engine_state = None;
        self.runs.update_run(&run).await?;
        self.publish_status(&run);

        let run_input = run.input.clone();
        self.drive(definition, &graph, run, ctx, completed, skipped, run_input)
            .await
    }

    /// The traversal loop. Single-threaded per run: one node at a time,
    /// except where loop/parallel executors fan out internally.
    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        definition: &WorkflowDefinition,
        graph: &WorkflowGraph,
        mut run: WorkflowRun,
        mut ctx: ResultContext,
        mut completed: HashSet<String>,
        mut skipped: HashSet<String>,
        input: Value,
    ) -> EngineResult<RunResult> {
        let mut step_results: HashMap<String, Value> = HashMap::new();
        let mut step_count: u32 = 0;

        loop {
            // External cancel: let in-flight work finish, dispatch nothing new.
            if let Some(stored) = self.runs.get_run(&run.id).await? {
                if stored.status == RunStatus::Cancelled {
                    run.status = RunStatus::Cancelled;
                    self.runs.update_run(&run).await?;
                    self.publish_status(&run);
                    return Ok(self.result(&run, step_results, None));
                }
            }

            let Some(node_id) = graph.ready_nodes(&completed, &skipped).into_iter().next()
            else {
                // Nothing ready and the output never completed: the winning
                // branch of some condition did not lead to the output node.
                let failure = RunFailure {
                    node_id: graph.output_node().to_string(),
                    node_kind: "output".to_string(),
                    message: "traversal stalled before reaching the output node".to_string(),
                };
                return self.finalize_failed(run, failure, step_results).await;
            };

            let node = definition
                .node(&node_id)
                .ok_or_else(|| EngineError::NodeNotFound(node_id.clone()))?;

            step_count += 1;
            if step_count > self.config.max_steps {
                let failure = RunFailure {
                    node_id: node_id.clone(),
                    node_kind: node.kind.name().to_string(),
                    message: NodeError::MaxStepsExceeded(self.config.max_steps).to_string(),
                };
                return self.finalize_failed(run, failure, step_results).await;
            }

            if let NodeKind::Approval(data) = &node.kind {
                return self
                    .suspend(run, node, data.message.clone(), data.approvers.clone(), &ctx, &completed, &skipped, step_results)
                    .await;
            }

            tracing::debug!(run_id = %run.id, node_id = %node_id, kind = node.kind.name(), "dispatching node");

            let step_input = self.step_input(node, &ctx);
            let step = WorkflowStep::started(&run.id, &node_id, node.kind.name(), step_input.clone());
            self.publish_step(
                &run.id,
                StepStage::Start,
                &node_id,
                node.kind.name(),
                step_input.unwrap_or(Value::Null),
            );

            match self.dispatch(definition, graph, node, &ctx, &completed, &input).await {
                Ok(outcome) => {
                    self.runs
                        .append_step(&step.finish(
                            StepStatus::Completed,
                            Some(outcome.output.clone()),
                            None,
                        ))
                        .await?;
                    self.publish_step(
                        &run.id,
                        StepStage::Complete,
                        &node_id,
                        node.kind.name(),
                        outcome.output.clone(),
                    );

                    ctx.set(node_id.clone(), outcome.output.clone());
                    step_results.insert(node_id.clone(), outcome.output.clone());
                    completed.insert(node_id.clone());

                    for skip_id in outcome.skip {
                        if completed.contains(&skip_id) || skipped.contains(&skip_id) {
                            continue;
                        }
                        let kind = definition
                            .node(&skip_id)
                            .map(|n| n.kind.name())
                            .unwrap_or("unknown");
                        self.runs
                            .append_step(&WorkflowStep::skipped(&run.id, &skip_id, kind))
                            .await?;
                        skipped.insert(skip_id);
                    }

                    if node_id == graph.output_node() {
                        return self
                            .finalize_completed(run, outcome.output, step_results)
                            .await;
                    }
                }
                Err(err) => {
                    let message = err.to_string();
                    self.runs
                        .append_step(&step.finish(StepStatus::Failed, None, Some(message.clone())))
                        .await?;
                    let failure = RunFailure {
                        node_id: node_id.clone(),
                        node_kind: node.kind.name().to_string(),
                        message,
                    };
                    return self.finalize_failed(run, failure, step_results).await;
                }
            }
        }
    }

    /// Exhaustive dispatch on the node kind. Approval is handled before this
    /// point; it is the only kind allowed to leave a run half-executed.
    async fn dispatch(
        &self,
        definition: &WorkflowDefinition,
        graph: &WorkflowGraph,
        node: &WorkflowNode,
        ctx: &ResultContext,
        completed: &HashSet<String>,
        input: &Value,
    ) -> Result<NodeOutcome, NodeError> {
        match &node.kind {
            NodeKind::Input => Ok(NodeOutcome::value(input.clone())),
            NodeKind::Output(data) => {
                let output = match &data.source {
                    Some(path) => ctx.resolve(path)?,
                    None => predecessor_output(graph, &node.id, ctx),
                };
                Ok(NodeOutcome::value(output))
            }
            NodeKind::Tool(data) => {
                let resolved = resolve_optional(ctx, data.input.as_deref())?;
                let data_value = serde_json::to_value(data)
                    .map_err(|e| NodeError::ConfigError(e.to_string()))?;
                let output = self
                    .capabilities
                    .invoke("tool", &data_value, resolved)
                    .await?;
                Ok(NodeOutcome::value(output))
            }
            NodeKind::AiStep(data) => {
                let resolved = resolve_optional(ctx, data.input.as_deref())?;
                let data_value = serde_json::to_value(data)
                    .map_err(|e| NodeError::ConfigError(e.to_string()))?;
                let output = self
                    .capabilities
                    .invoke("ai-step", &data_value, resolved)
                    .await?;
                Ok(NodeOutcome::value(output))
            }
            NodeKind::Condition(data) => {
                let result = expression::evaluate(&data.expression, ctx)?;
                let (winner, loser) = if result {
                    (&data.true_branch, &data.false_branch)
                } else {
                    (&data.false_branch, &data.true_branch)
                };
                let mut skip = branch_skip_set(graph, loser, winner);
                skip.retain(|id| !completed.contains(id));
                Ok(NodeOutcome {
                    output: json!({
                        "result": result,
                        "selectedBranch": winner,
                    }),
                    skip,
                })
            }
            NodeKind::Loop(data) => {
                let output = self.run_loop(definition, data, ctx).await?;
                Ok(NodeOutcome::value(output))
            }
            NodeKind::Parallel(data) => {
                let output = self.run_parallel(definition, data, ctx).await?;
                Ok(NodeOutcome::value(output))
            }
            NodeKind::Approval(_) => Err(NodeError::ExecutionError(
                "approval nodes suspend, they are never dispatched".to_string(),
            )),
        }
    }

    /// Walk an ordered node-id list (a loop body or parallel branch) against
    /// a private overlay of the context. Returns the last node's output;
    /// intermediate outputs are visible to later members under their ids.
    pub(super) async fn run_linear(
        &self,
        definition: &WorkflowDefinition,
        node_ids: &[String],
        ctx: &ResultContext,
    ) -> Result<Value, NodeError> {
        let mut local = ctx.clone();
        let mut last = Value::Null;

        for node_id in node_ids {
            let node = definition.node(node_id).ok_or_else(|| {
                NodeError::ConfigError(format!("unknown node in container: {}", node_id))
            })?;
            let output = match &node.kind {
                NodeKind::Tool(data) => {
                    let resolved = resolve_optional(&local, data.input.as_deref())?;
                    let data_value = serde_json::to_value(data)
                        .map_err(|e| NodeError::ConfigError(e.to_string()))?;
                    self.capabilities.invoke("tool", &data_value, resolved).await?
                }
                NodeKind::AiStep(data) => {
                    let resolved = resolve_optional(&local, data.input.as_deref())?;
                    let data_value = serde_json::to_value(data)
                        .map_err(|e| NodeError::ConfigError(e.to_string()))?;
                    self.capabilities
                        .invoke("ai-step", &data_value, resolved)
                        .await?
                }
                other => {
                    return Err(NodeError::ConfigError(format!(
                        "container member '{}' must be a tool or ai-step node, got {}",
                        node_id,
                        other.name()
                    )))
                }
            };
            local.set(node_id.clone(), output.clone());
            last = output;
        }

        Ok(last)
    }

    #[allow(clippy::too_many_arguments)]
    async fn suspend(
        &self,
        mut run: WorkflowRun,
        node: &WorkflowNode,
        message: String,
        approvers: Vec<String>,
        ctx: &ResultContext,
        completed: &HashSet<String>,
        skipped: &HashSet<String>,
        step_results: HashMap<String, Value>,
    ) -> EngineResult<RunResult> {
        let step = WorkflowStep::started(&run.id, &node.id, node.kind.name(), None);
        self.runs
            .append_step(&step.finish(StepStatus::Suspended, None, None))
            .await?;
        self.publish_step(
            &run.id,
            StepStage::Start,
            &node.id,
            node.kind.name(),
            json!({ "message": message }),
        );

        let mut completed_ids: Vec<String> = completed.iter().cloned().collect();
        completed_ids.sort();
        let mut skipped_ids: Vec<String> = skipped.iter().cloned().collect();
        skipped_ids.sort();

        let state = EngineState {
            run_id: run.id.clone(),
            suspended_at_node_id: node.id.clone(),
            completed_node_ids: completed_ids,
            skipped_node_ids: skipped_ids,
            node_outputs: ctx.outputs().clone(),
        };

        self.approvals
            .register(PendingApproval {
                run_id: run.id.clone(),
                node_id: node.id.clone(),
                message,
                approvers,
                requested_at: chrono::Utc::now(),
            })
            .await?;

        run.status = RunStatus::Suspended;
        run.engine_state = Some(state.clone());
        self.runs.update_run(&run).await?;
        self.publish_status(&run);

        let mut result = self.result(&run, step_results, None);
        result.engine_state = Some(state);
        Ok(result)
    }

    async fn finalize_completed(
        &self,
        mut run: WorkflowRun,
        output: Value,
        step_results: HashMap<String, Value>,
    ) -> EngineResult<RunResult> {
        run.status = RunStatus::Completed;
        run.output = Some(output);
        run.engine_state = None;
        self.runs.update_run(&run).await?;
        self.publish_status(&run);
        Ok(self.result(&run, step_results, None))
    }

    async fn finalize_failed(
        &self,
        mut run: WorkflowRun,
        failure: RunFailure,
        step_results: HashMap<String, Value>,
    ) -> EngineResult<RunResult> {
        tracing::debug!(
            run_id = %run.id,
            node_id = %failure.node_id,
            "run failed: {}",
            failure.message
        );
        run.status = RunStatus::Failed;
        run.error = Some(format!(
            "node '{}' ({}) failed: {}",
            failure.node_id, failure.node_kind, failure.message
        ));
        run.engine_state = None;
        self.runs.update_run(&run).await?;
        self.publish_status(&run);
        Ok(self.result(&run, step_results, Some(failure)))
    }

    fn result(
        &self,
        run: &WorkflowRun,
        step_results: HashMap<String, Value>,
        error: Option<RunFailure>,
    ) -> RunResult {
        RunResult {
            run_id: run.id.clone(),
            status: run.status,
            output: run.output.clone(),
            error,
            step_results,
            engine_state: None,
        }
    }

    fn step_input(&self, node: &WorkflowNode, ctx: &ResultContext) -> Option<Value> {
        let path = match &node.kind {
            NodeKind::Tool(data) => data.input.as_deref(),
            NodeKind::AiStep(data) => data.input.as_deref(),
            _ => None,
        }?;
        ctx.resolve(path).ok()
    }

    fn publish_step(
        &self,
        run_id: &str,
        stage: StepStage,
        node_id: &str,
        node_kind: &str,
        payload: Value,
    ) {
        self.publisher.publish(EngineEvent::Step {
            run_id: run_id.to_string(),
            stage,
            node_id: node_id.to_string(),
            node_kind: node_kind.to_string(),
            payload,
        });
    }

    fn publish_status(&self, run: &WorkflowRun) {
        self.publisher.publish(EngineEvent::Status {
            run_id: run.id.clone(),
            status: run.status,
            output: run.output.clone(),
            error: run.error.clone(),
        });
    }
}

fn resolve_optional(ctx: &ResultContext, path: Option<&str>) -> Result<Value, NodeError> {
    match path {
        Some(path) => ctx.resolve(path),
        None => Ok(Value::Null),
    }
}

/// Default output-node value: the single completed predecessor's output, or
/// an object of predecessor outputs when several paths converge on it.
fn predecessor_output(graph: &WorkflowGraph, node_id: &str, ctx: &ResultContext) -> Value {
    let mut present: Vec<(&str, &Value)> = graph
        .predecessors(node_id)
        .into_iter()
        .filter_map(|pred| ctx.get(pred).map(|value| (pred, value)))
        .collect();
    match present.len() {
        0 => Value::Null,
        1 => present.remove(0).1.clone(),
        _ => Value::Object(
            present
                .into_iter()
                .map(|(id, value)| (id.to_string(), value.clone()))
                .collect(),
        ),
    }
}
