#![allow(dead_code)]

//! Shared test fixtures: a scriptable capability provider and engine wiring.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use aeroflow::{
    CapabilityProvider, ExecutionEngine, MemoryApprovalStore, MemoryRunStore, NodeError,
    WorkflowDefinition,
};

/// Capability provider that echoes its input, with per-tool failure and
/// delay scripting.
#[derive(Default)]
pub struct StubCapability {
    fail: HashSet<String>,
    delays: HashMap<String, u64>,
    calls: Mutex<Vec<String>>,
}

impl StubCapability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, name: &str) -> Self {
        self.fail.insert(name.to_string());
        self
    }

    pub fn delayed(mut self, name: &str, ms: u64) -> Self {
        self.delays.insert(name.to_string(), ms);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CapabilityProvider for StubCapability {
    async fn invoke(
        &self,
        node_kind: &str,
        node_data: &Value,
        input: Value,
    ) -> Result<Value, NodeError> {
        let name = node_data
            .get("name")
            .and_then(Value::as_str)
            .or_else(|| node_data.get("model").and_then(Value::as_str))
            .unwrap_or(node_kind)
            .to_string();
        self.calls.lock().push(name.clone());

        if let Some(ms) = self.delays.get(&name) {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
        if self.fail.contains(&name) {
            return Err(NodeError::ExecutionError(format!("tool '{}' exploded", name)));
        }
        Ok(json!({ "tool": name, "echo": input }))
    }
}

pub fn definition(value: Value) -> WorkflowDefinition {
    serde_json::from_value(value).unwrap()
}

pub fn engine_with(
    capabilities: Arc<dyn CapabilityProvider>,
) -> (ExecutionEngine, Arc<MemoryRunStore>, Arc<MemoryApprovalStore>) {
    let runs = Arc::new(MemoryRunStore::new());
    let approvals = Arc::new(MemoryApprovalStore::new());
    let engine = ExecutionEngine::new(capabilities, runs.clone(), approvals.clone());
    (engine, runs, approvals)
}
