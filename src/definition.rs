//! Workflow definition schema.
//!
//! A [`WorkflowDefinition`] is the immutable description of a graph: a set of
//! typed nodes and the edges between them. Node payloads are modeled as a
//! closed tagged enum ([`NodeKind`]) so that dispatch is an exhaustive match
//! and adding a node type is a compile-time-checked change. Nodes reference
//! each other only by id; the graph arena lives in [`crate::graph`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Lifecycle status of a definition. Only published definitions should be
/// executed; the engine does not enforce this, the surrounding service does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

/// An immutable workflow definition: nodes plus edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub status: DefinitionStatus,
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
}

fn default_version() -> u32 {
    1
}

impl WorkflowDefinition {
    /// Look up a node by id.
    pub fn node(&self, node_id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }
}

/// A single node in the graph. The `type` field of the wire format selects
/// the [`NodeKind`] variant; remaining fields are the kind-specific payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// A directed edge between two nodes, referenced by id. The optional label
/// tags condition branches ("true"/"false") for readability; branch routing
/// itself uses the target ids carried by [`ConditionData`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Closed set of node types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NodeKind {
    Input,
    Output(OutputData),
    Tool(ToolData),
    AiStep(AiStepData),
    Condition(ConditionData),
    Loop(LoopData),
    Parallel(ParallelData),
    Approval(ApprovalData),
}

impl NodeKind {
    /// Stable name of the kind, used in step records and events.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Input => "input",
            NodeKind::Output(_) => "output",
            NodeKind::Tool(_) => "tool",
            NodeKind::AiStep(_) => "ai-step",
            NodeKind::Condition(_) => "condition",
            NodeKind::Loop(_) => "loop",
            NodeKind::Parallel(_) => "parallel",
            NodeKind::Approval(_) => "approval",
        }
    }
}

/// Output node payload. `source` is a dot path resolved against the result
/// context; when absent the node echoes its predecessor's output (or an
/// object of predecessor outputs if it has several).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Tool node payload, executed through the capability provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolData {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    /// Dot path resolved to the capability call's input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
}

/// AI step payload, executed through the capability provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiStepData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Dot path resolved to the capability call's input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
}

/// Condition node payload: a boolean expression plus the two branch targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionData {
    pub expression: String,
    pub true_branch: String,
    pub false_branch: String,
}

/// Loop execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    #[default]
    Sequential,
    Parallel,
}

/// Hard upper bound on loop iterations, applied regardless of configuration.
pub const LOOP_ITERATION_CAP: usize = 1000;

/// Loop node payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopData {
    /// Dot path resolving to the collection to iterate.
    pub iterator_expression: String,
    #[serde(default = "default_iteration_variable")]
    pub iteration_variable: String,
    #[serde(default = "default_index_variable")]
    pub index_variable: String,
    #[serde(default)]
    pub execution_mode: LoopMode,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Sequential mode only: evaluated against each iteration's bound scope
    /// before the iteration runs (except the first); true stops the loop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_condition: Option<String>,
    /// Ordered node ids walked once per iteration as a private sub-traversal.
    /// Empty means the iteration output is the bound `{item, index}` record.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub body_nodes: Vec<String>,
}

fn default_iteration_variable() -> String {
    "item".to_string()
}

fn default_index_variable() -> String {
    "index".to_string()
}

fn default_max_iterations() -> usize {
    LOOP_ITERATION_CAP
}

/// Policy for combining concurrent branch outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Wait for every branch.
    #[default]
    All,
    /// First branch to succeed wins; all failing fails the node.
    Any,
    /// First branch to settle wins, success or failure.
    First,
}

/// What a branch failure does under the `all` strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorHandling {
    /// Abort on the first rejected branch.
    #[default]
    FailFast,
    /// Record every branch outcome and let the caller inspect them.
    CollectAll,
}

/// Parallel node payload: named branches, each an ordered node-id list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelData {
    pub branches: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub error_handling: ErrorHandling,
}

/// Approval node payload. The only node kind allowed to suspend a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalData {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub approvers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u64>,
}
