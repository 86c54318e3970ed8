//! Shared result context.
//!
//! As the traversal advances, each completed node's output is recorded here
//! under the node's id. Expressions and capability inputs address values by
//! dot path (`node_id.field.0.sub`). Loop iterations get a scoped overlay so
//! `item`/`index` bindings shadow node outputs without mutating the parent
//! context.

use serde_json::Value;
use std::collections::HashMap;

use crate::error::NodeError;

/// Node-id → output map with dot-path resolution and scope overlays.
#[derive(Debug, Clone, Default)]
pub struct ResultContext {
    outputs: HashMap<String, Value>,
    scope: HashMap<String, Value>,
}

impl ResultContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a context from previously persisted node outputs.
    pub fn from_outputs(outputs: HashMap<String, Value>) -> Self {
        Self {
            outputs,
            scope: HashMap::new(),
        }
    }

    /// Record a node's output.
    pub fn set(&mut self, node_id: impl Into<String>, output: Value) {
        self.outputs.insert(node_id.into(), output);
    }

    /// Fetch a node's raw output, if recorded.
    pub fn get(&self, node_id: &str) -> Option<&Value> {
        self.outputs.get(node_id)
    }

    pub fn outputs(&self) -> &HashMap<String, Value> {
        &self.outputs
    }

    /// Clone this context with extra scope bindings layered on top. Scope
    /// names shadow node ids during path resolution.
    pub fn scoped(&self, bindings: HashMap<String, Value>) -> Self {
        let mut child = self.clone();
        child.scope.extend(bindings);
        child
    }

    /// Resolve a dot path against the context. The first segment names a
    /// scope binding or a node id; the rest index into the value (object
    /// keys and zero-based array positions). A missing root or segment is an
    /// error, never a silent default.
    pub fn resolve(&self, path: &str) -> Result<Value, NodeError> {
        let mut segments = path.split('.');
        let root = segments
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| NodeError::ExpressionError(format!("empty path: '{}'", path)))?;

        let mut current = self
            .scope
            .get(root)
            .or_else(|| self.outputs.get(root))
            .ok_or_else(|| {
                NodeError::ExpressionError(format!("path root '{}' not found", root))
            })?;

        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|idx| items.get(idx)),
                _ => None,
            }
            .ok_or_else(|| {
                NodeError::ExpressionError(format!(
                    "path '{}' has no segment '{}'",
                    path, segment
                ))
            })?;
        }

        Ok(current.clone())
    }
}
