//! Error taxonomy for the engine.
//!
//! Two layers, mirroring where a failure is handled:
//!
//! - [`EngineError`] — configuration and infrastructure failures that stop a
//!   run before or outside node execution.
//! - [`NodeError`] — failures of one node's execution, surfaced on the run
//!   result together with the failing node's id and kind.

mod node_error;
mod workflow_error;

pub use node_error::NodeError;
pub use workflow_error::EngineError;

/// Convenience alias for engine-level results.
pub type EngineResult<T> = Result<T, EngineError>;
