//! A graph-based workflow execution engine.
//!
//! Workflows are directed acyclic graphs of typed nodes: exactly one input
//! and one output node, with tool calls, AI steps, conditional branches,
//! loops, parallel fan-out, and human approval gates in between. The engine
//! walks the graph in dependency order, records every node's output in a
//! shared result context, prunes the losing side of each condition, and can
//! suspend a run at an approval node into a serializable checkpoint that a
//! different process may later resume.
//!
//! ```no_run
//! use std::sync::Arc;
//! use aeroflow::{
//!     ExecutionEngine, MemoryApprovalStore, MemoryRunStore, NoCapabilities,
//!     WorkflowDefinition,
//! };
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let definition: WorkflowDefinition = serde_json::from_value(json!({
//!     "id": "wf-1",
//!     "name": "pass-through",
//!     "nodes": [
//!         {"id": "in", "type": "input"},
//!         {"id": "out", "type": "output"}
//!     ],
//!     "edges": [{"id": "e1", "source": "in", "target": "out"}]
//! }))?;
//!
//! let engine = ExecutionEngine::new(
//!     Arc::new(NoCapabilities),
//!     Arc::new(MemoryRunStore::new()),
//!     Arc::new(MemoryApprovalStore::new()),
//! );
//! let result = engine.execute(&definition, json!({"x": 1})).await?;
//! assert_eq!(result.output, Some(json!({"x": 1})));
//! # Ok(())
//! # }
//! ```

pub mod capability;
pub mod config;
pub mod context;
pub mod definition;
pub mod engine;
pub mod error;
pub mod events;
pub mod expression;
pub mod graph;
pub mod run;
pub mod store;

pub use capability::{CapabilityProvider, NoCapabilities};
pub use config::EngineConfig;
pub use context::ResultContext;
pub use definition::{
    AiStepData, ApprovalData, ConditionData, DefinitionStatus, ErrorHandling, LoopData,
    LoopMode, MergeStrategy, NodeKind, OutputData, ParallelData, ToolData, WorkflowDefinition,
    WorkflowEdge, WorkflowNode, LOOP_ITERATION_CAP,
};
pub use engine::{ExecutionEngine, RecoveryScanner};
pub use error::{EngineError, EngineResult, NodeError};
pub use events::{EngineEvent, EventPublisher, EventReceiver, StepStage};
pub use graph::WorkflowGraph;
pub use run::{
    EngineState, RecoveryReport, RunFailure, RunResult, RunStatus, StepStatus, WorkflowRun,
    WorkflowStep,
};
pub use store::{
    ApprovalStore, MemoryApprovalStore, MemoryRunStore, PendingApproval, RunStore, StoreError,
};
