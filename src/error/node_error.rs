//! Node-level error types.

use thiserror::Error;

/// Errors raised while executing a single node.
///
/// These abort the run unless the node sits inside a parallel branch running
/// under the collect-all policy, in which case the branch outcome is recorded
/// as rejected and traversal continues.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("Execution error: {0}")]
    ExecutionError(String),
    #[error("Expression error: {0}")]
    ExpressionError(String),
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("Capability error: {0}")]
    CapabilityError(String),
    #[error("Branch '{branch}' timed out after {timeout_ms}ms")]
    BranchTimeout { branch: String, timeout_ms: u64 },
    #[error("All branches failed: {0}")]
    AllBranchesFailed(String),
    #[error("Max steps exceeded: {0}")]
    MaxStepsExceeded(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_error_display() {
        assert_eq!(
            NodeError::ConfigError("bad".into()).to_string(),
            "Config error: bad"
        );
        assert_eq!(
            NodeError::ExpressionError("no such path".into()).to_string(),
            "Expression error: no such path"
        );
        assert_eq!(
            NodeError::BranchTimeout {
                branch: "b1".into(),
                timeout_ms: 250
            }
            .to_string(),
            "Branch 'b1' timed out after 250ms"
        );
    }
}
