//! Run-store and approval-store collaborator interfaces.
//!
//! The engine calls these at traversal boundaries (run start, each step,
//! suspension, terminal status) but does not own the storage schema. The
//! in-memory implementations exist for single-instance deployments and
//! tests; multi-instance deployments must bring a store that enforces
//! at-most-one-active-executor per run id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::run::{RunStatus, WorkflowRun, WorkflowStep};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Run not found: {0}")]
    RunNotFound(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for runs and their append-only step records.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create_run(&self, run: &WorkflowRun) -> Result<(), StoreError>;
    async fn get_run(&self, run_id: &str) -> Result<Option<WorkflowRun>, StoreError>;
    /// Full-record upsert; the engine owns the run while executing it.
    async fn update_run(&self, run: &WorkflowRun) -> Result<(), StoreError>;
    async fn list_runs_by_status(&self, status: RunStatus) -> Result<Vec<WorkflowRun>, StoreError>;
    async fn append_step(&self, step: &WorkflowStep) -> Result<(), StoreError>;
    async fn list_steps(&self, run_id: &str) -> Result<Vec<WorkflowStep>, StoreError>;
}

/// A suspended run waiting on an external approval decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingApproval {
    pub run_id: String,
    pub node_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub approvers: Vec<String>,
    pub requested_at: DateTime<Utc>,
}

/// Pending-approval table. `consume` must be a single atomic
/// delete-returning-row so two concurrent resumers cannot both claim the
/// same approval.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn register(&self, approval: PendingApproval) -> Result<(), StoreError>;
    async fn consume(&self, run_id: &str) -> Result<Option<PendingApproval>, StoreError>;
    async fn get(&self, run_id: &str) -> Result<Option<PendingApproval>, StoreError>;
}

/// In-memory run store for single-instance deployments and tests.
#[derive(Default)]
pub struct MemoryRunStore {
    runs: RwLock<HashMap<String, WorkflowRun>>,
    steps: RwLock<HashMap<String, Vec<WorkflowStep>>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create_run(&self, run: &WorkflowRun) -> Result<(), StoreError> {
        self.runs.write().insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<WorkflowRun>, StoreError> {
        Ok(self.runs.read().get(run_id).cloned())
    }

    async fn update_run(&self, run: &WorkflowRun) -> Result<(), StoreError> {
        let mut run = run.clone();
        run.updated_at = Utc::now();
        self.runs.write().insert(run.id.clone(), run);
        Ok(())
    }

    async fn list_runs_by_status(&self, status: RunStatus) -> Result<Vec<WorkflowRun>, StoreError> {
        Ok(self
            .runs
            .read()
            .values()
            .filter(|run| run.status == status)
            .cloned()
            .collect())
    }

    async fn append_step(&self, step: &WorkflowStep) -> Result<(), StoreError> {
        self.steps
            .write()
            .entry(step.run_id.clone())
            .or_default()
            .push(step.clone());
        Ok(())
    }

    async fn list_steps(&self, run_id: &str) -> Result<Vec<WorkflowStep>, StoreError> {
        Ok(self.steps.read().get(run_id).cloned().unwrap_or_default())
    }
}

/// In-memory approval table. `DashMap::remove` gives the atomic consume.
#[derive(Default)]
pub struct MemoryApprovalStore {
    pending: DashMap<String, PendingApproval>,
}

impl MemoryApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApprovalStore for MemoryApprovalStore {
    async fn register(&self, approval: PendingApproval) -> Result<(), StoreError> {
        self.pending.insert(approval.run_id.clone(), approval);
        Ok(())
    }

    async fn consume(&self, run_id: &str) -> Result<Option<PendingApproval>, StoreError> {
        Ok(self.pending.remove(run_id).map(|(_, approval)| approval))
    }

    async fn get(&self, run_id: &str) -> Result<Option<PendingApproval>, StoreError> {
        Ok(self.pending.get(run_id).map(|entry| entry.value().clone()))
    }
}
