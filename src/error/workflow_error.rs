//! Engine-level error types.

use super::NodeError;
use thiserror::Error;

/// Errors raised by the engine outside of any single node's execution.
///
/// Everything here is either a configuration problem detected before the
/// first node runs, or an infrastructure failure (store, state decode) that
/// prevents the traversal from proceeding at all. Per-node failures are
/// reported through [`RunResult`](crate::run::RunResult) instead, so callers
/// always learn which node broke.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Graph build error: {0}")]
    GraphBuildError(String),
    #[error("Graph validation error: {0}")]
    GraphValidationError(String),
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("No input node found")]
    NoInputNode,
    #[error("No output node found")]
    NoOutputNode,
    #[error("Output node '{0}' is not reachable from the input node")]
    OutputUnreachable(String),
    #[error("Cycle detected in graph")]
    CycleDetected,
    #[error("Run not found: {0}")]
    RunNotFound(String),
    #[error("Run '{run_id}' is {status} and cannot be resumed")]
    RunNotResumable { run_id: String, status: String },
    #[error("Engine state references node '{node_id}', which is not an approval node")]
    InvalidSuspensionPoint { node_id: String },
    #[error("No pending approval for run: {0}")]
    ApprovalNotPending(String),
    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),
    #[error("Node error: {0}")]
    Node(Box<NodeError>),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<NodeError> for EngineError {
    fn from(value: NodeError) -> Self {
        EngineError::Node(Box::new(value))
    }
}
