//! Capability provider seam.
//!
//! Tool and ai-step node bodies live outside the engine (cloud API calls,
//! LLM calls). The engine only ever reaches them through this interface;
//! capability errors propagate as node failures.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::NodeError;

/// Executes the body of a tool or ai-step node.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// `node_kind` is the node's kind name ("tool" / "ai-step"), `node_data`
    /// the serialized kind payload, `input` the value resolved from the
    /// result context. At-least-once: a resumed run may invoke the same
    /// capability again.
    async fn invoke(
        &self,
        node_kind: &str,
        node_data: &Value,
        input: Value,
    ) -> Result<Value, NodeError>;
}

/// Provider for graphs without tool/ai-step nodes; any invocation is an
/// error naming the missing capability.
pub struct NoCapabilities;

#[async_trait]
impl CapabilityProvider for NoCapabilities {
    async fn invoke(
        &self,
        node_kind: &str,
        _node_data: &Value,
        _input: Value,
    ) -> Result<Value, NodeError> {
        Err(NodeError::CapabilityError(format!(
            "no capability provider registered for node kind: {}",
            node_kind
        )))
    }
}
