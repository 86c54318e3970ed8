//! Branch reachability analysis for condition nodes.

use std::collections::HashSet;

use super::WorkflowGraph;

/// Nodes reachable only from the losing branch of a condition.
///
/// Forward closure from each branch root independently; the skip set is
/// `reachable(losing) − reachable(winning)`. Nodes both branches feed into
/// (a re-merge point downstream of the condition) stay executable. The walk
/// follows the full downstream closure, so a multi-node else-path is skipped
/// in its entirety.
pub fn branch_skip_set(
    graph: &WorkflowGraph,
    losing_root: &str,
    winning_root: &str,
) -> HashSet<String> {
    let losing = graph.reachable_from(losing_root);
    let winning = graph.reachable_from(winning_root);
    losing.difference(&winning).cloned().collect()
}
