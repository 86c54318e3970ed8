//! Crash recovery scan.
//!
//! On startup, runs left in `running` status belong to a process that died
//! mid-traversal. Those that carry a resumable checkpoint are re-driven (an
//! approval-suspended run will simply suspend at the same node again); the
//! rest are marked failed so operators see them instead of a silent hang.
//! The scan itself never fails: store errors are logged and reported as a
//! zero-effect pass.

use std::collections::HashMap;
use std::sync::Arc;

use crate::definition::WorkflowDefinition;
use crate::run::{RecoveryReport, RunStatus, WorkflowRun};

use super::ExecutionEngine;

pub struct RecoveryScanner {
    engine: Arc<ExecutionEngine>,
}

impl RecoveryScanner {
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        RecoveryScanner { engine }
    }

    /// Scan for interrupted runs and recover or fail each one.
    /// `definitions` maps definition id to the definition, since a checkpoint
    /// alone cannot be re-driven without its graph.
    pub async fn scan(
        &self,
        definitions: &HashMap<String, WorkflowDefinition>,
    ) -> RecoveryReport {
        let stale = match self
            .engine
            .runs
            .list_runs_by_status(RunStatus::Running)
            .await
        {
            Ok(runs) => runs,
            Err(err) => {
                tracing::warn!("recovery scan could not list runs: {}", err);
                return RecoveryReport::default();
            }
        };

        let mut report = RecoveryReport::default();
        for run in stale {
            let state = run.engine_state.clone();
            match (state, definitions.get(&run.definition_id)) {
                (Some(state), Some(definition)) => {
                    match self.engine.resume(definition, state, None).await {
                        Ok(_) => {
                            tracing::info!(run_id = %run.id, "recovered interrupted run");
                            report.restarted += 1;
                        }
                        Err(err) => {
                            tracing::warn!(run_id = %run.id, "recovery resume failed: {}", err);
                            self.mark_failed(run, format!("recovery failed: {}", err)).await;
                            report.failed += 1;
                        }
                    }
                }
                (None, _) => {
                    self.mark_failed(
                        run,
                        "interrupted by process crash with no resumable checkpoint".to_string(),
                    )
                    .await;
                    report.failed += 1;
                }
                (Some(_), None) => {
                    self.mark_failed(
                        run,
                        "interrupted by process crash; definition no longer available"
                            .to_string(),
                    )
                    .await;
                    report.failed += 1;
                }
            }
        }

        if report != RecoveryReport::default() {
            tracing::info!(
                restarted = report.restarted,
                failed = report.failed,
                "recovery scan finished"
            );
        }
        report
    }

    async fn mark_failed(&self, mut run: WorkflowRun, reason: String) {
        tracing::warn!(run_id = %run.id, "marking interrupted run failed: {}", reason);
        run.status = RunStatus::Failed;
        run.error = Some(reason);
        run.engine_state = None;
        if let Err(err) = self.engine.runs.update_run(&run).await {
            tracing::warn!(run_id = %run.id, "could not mark run failed: {}", err);
        }
    }
}
