//! Run, step, and checkpoint records.
//!
//! These are the records the engine exchanges with the run store and hands
//! back to callers. [`WorkflowStep`] rows are append-only: a node re-attempt
//! on resume produces a new row, never an update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Run lifecycle. Monotonic except for the suspended ⇄ running cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Suspended,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Suspended => "suspended",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// Step lifecycle for one node attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Suspended,
    Completed,
    Failed,
    Skipped,
}

/// One execution instance of a definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub id: String,
    pub definition_id: String,
    pub definition_version: u32,
    pub status: RunStatus,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Present only while suspended, or kept for forensic replay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_state: Option<EngineState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRun {
    pub fn new(definition_id: &str, definition_version: u32, input: Value) -> Self {
        let now = Utc::now();
        WorkflowRun {
            id: Uuid::new_v4().to_string(),
            definition_id: definition_id.to_string(),
            definition_version,
            status: RunStatus::Pending,
            input,
            output: None,
            error: None,
            engine_state: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Append-only record of one node attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub id: String,
    pub run_id: String,
    pub node_id: String,
    pub node_kind: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl WorkflowStep {
    pub fn started(run_id: &str, node_id: &str, node_kind: &str, input: Option<Value>) -> Self {
        WorkflowStep {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            node_id: node_id.to_string(),
            node_kind: node_kind.to_string(),
            status: StepStatus::Running,
            input,
            output: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
        }
    }

    pub fn skipped(run_id: &str, node_id: &str, node_kind: &str) -> Self {
        let now = Utc::now();
        WorkflowStep {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            node_id: node_id.to_string(),
            node_kind: node_kind.to_string(),
            status: StepStatus::Skipped,
            input: None,
            output: None,
            error: None,
            started_at: now,
            finished_at: Some(now),
            duration_ms: Some(0),
        }
    }

    pub fn finish(mut self, status: StepStatus, output: Option<Value>, error: Option<String>) -> Self {
        let now = Utc::now();
        self.duration_ms = Some(
            (now - self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
        self.finished_at = Some(now);
        self.status = status;
        self.output = output;
        self.error = error;
        self
    }
}

/// Suspension checkpoint: everything needed to re-enter the traversal after
/// the approval outcome arrives, possibly in another process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineState {
    pub run_id: String,
    pub suspended_at_node_id: String,
    pub completed_node_ids: Vec<String>,
    /// Branch-pruning decisions already taken, so a resume never re-runs a
    /// condition to rediscover them.
    #[serde(default)]
    pub skipped_node_ids: Vec<String>,
    pub node_outputs: HashMap<String, Value>,
}

impl EngineState {
    pub fn completed_set(&self) -> HashSet<String> {
        self.completed_node_ids.iter().cloned().collect()
    }

    pub fn skipped_set(&self) -> HashSet<String> {
        self.skipped_node_ids.iter().cloned().collect()
    }
}

/// The failing node's coordinates, surfaced so operators can pinpoint the
/// break in the graph. Internal stack traces stay behind the engine boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFailure {
    pub node_id: String,
    pub node_kind: String,
    pub message: String,
}

/// What `execute`/`resume` hand back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub run_id: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunFailure>,
    /// Node id → output for every node that completed during this call.
    pub step_results: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_state: Option<EngineState>,
}

/// Outcome of a startup recovery scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub restarted: usize,
    pub failed: usize,
}
