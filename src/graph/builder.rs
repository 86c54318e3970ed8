//! Graph construction and structural validation.

use std::collections::{HashMap, HashSet};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};

use crate::definition::{NodeKind, WorkflowDefinition};
use crate::error::{EngineError, EngineResult};

/// Id-keyed adjacency view over a [`WorkflowDefinition`].
///
/// Built once per execution. Construction performs the fatal configuration
/// checks: unique node ids, valid edge endpoints, exactly one input and one
/// output node, acyclicity, output reachability, and well-formed container
/// nodes (condition targets, loop bodies, parallel branches).
#[derive(Debug)]
pub struct WorkflowGraph {
    graph: StableDiGraph<String, Option<String>>,
    index: HashMap<String, NodeIndex>,
    input_node: String,
    output_node: String,
    /// Nodes owned by a loop body or parallel branch. They are executed by
    /// their container as a private sub-traversal, never by the main loop.
    contained: HashSet<String>,
    /// Node ids in definition order, for deterministic ready scans.
    order: Vec<String>,
}

impl WorkflowGraph {
    pub fn build(definition: &WorkflowDefinition) -> EngineResult<Self> {
        let mut graph = StableDiGraph::new();
        let mut index: HashMap<String, NodeIndex> = HashMap::new();
        let mut order = Vec::with_capacity(definition.nodes.len());

        for node in &definition.nodes {
            if index.contains_key(&node.id) {
                return Err(EngineError::GraphBuildError(format!(
                    "duplicate node id: {}",
                    node.id
                )));
            }
            let idx = graph.add_node(node.id.clone());
            index.insert(node.id.clone(), idx);
            order.push(node.id.clone());
        }

        for edge in &definition.edges {
            let source = index.get(&edge.source).ok_or_else(|| {
                EngineError::GraphBuildError(format!(
                    "edge '{}' references missing source node: {}",
                    edge.id, edge.source
                ))
            })?;
            let target = index.get(&edge.target).ok_or_else(|| {
                EngineError::GraphBuildError(format!(
                    "edge '{}' references missing target node: {}",
                    edge.id, edge.target
                ))
            })?;
            graph.add_edge(*source, *target, edge.label.clone());
        }

        let input_node = single_node_of(definition, "input", |k| matches!(k, NodeKind::Input))?
            .ok_or(EngineError::NoInputNode)?;
        let output_node =
            single_node_of(definition, "output", |k| matches!(k, NodeKind::Output(_)))?
                .ok_or(EngineError::NoOutputNode)?;

        let contained = collect_contained(definition, &index, &input_node, &output_node)?;

        let built = WorkflowGraph {
            graph,
            index,
            input_node,
            output_node,
            contained,
            order,
        };

        built.validate_condition_targets(definition)?;
        built.validate_contained_isolation()?;
        built.validate_acyclic()?;
        built.validate_output_reachable()?;

        Ok(built)
    }

    pub fn input_node(&self) -> &str {
        &self.input_node
    }

    pub fn output_node(&self) -> &str {
        &self.output_node
    }

    pub fn is_contained(&self, node_id: &str) -> bool {
        self.contained.contains(node_id)
    }

    pub fn predecessors(&self, node_id: &str) -> Vec<&str> {
        self.neighbors(node_id, petgraph::Direction::Incoming)
    }

    pub fn successors(&self, node_id: &str) -> Vec<&str> {
        self.neighbors(node_id, petgraph::Direction::Outgoing)
    }

    fn neighbors(&self, node_id: &str, direction: petgraph::Direction) -> Vec<&str> {
        let Some(idx) = self.index.get(node_id) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(*idx, direction)
            .filter_map(|n| self.graph.node_weight(n).map(String::as_str))
            .collect()
    }

    /// All nodes whose inbound edges are settled (completed or skipped) and
    /// which have not themselves run, in definition order. Contained nodes
    /// are owned by their container and never surface here.
    pub fn ready_nodes(
        &self,
        completed: &HashSet<String>,
        skipped: &HashSet<String>,
    ) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| {
                !completed.contains(*id)
                    && !skipped.contains(*id)
                    && !self.contained.contains(*id)
            })
            .filter(|id| {
                self.predecessors(id)
                    .iter()
                    .all(|pred| completed.contains(*pred) || skipped.contains(*pred))
            })
            .cloned()
            .collect()
    }

    /// Forward closure from `start`, including `start` itself.
    pub fn reachable_from(&self, start: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let Some(start_idx) = self.index.get(start) else {
            return seen;
        };
        let mut stack = vec![*start_idx];
        while let Some(idx) = stack.pop() {
            let Some(id) = self.graph.node_weight(idx) else {
                continue;
            };
            if !seen.insert(id.clone()) {
                continue;
            }
            stack.extend(self.graph.neighbors_directed(idx, petgraph::Direction::Outgoing));
        }
        seen
    }

    fn validate_condition_targets(&self, definition: &WorkflowDefinition) -> EngineResult<()> {
        for node in &definition.nodes {
            let NodeKind::Condition(data) = &node.kind else {
                continue;
            };
            for target in [&data.true_branch, &data.false_branch] {
                if !self.index.contains_key(target) {
                    return Err(EngineError::GraphValidationError(format!(
                        "condition '{}' references missing branch target: {}",
                        node.id, target
                    )));
                }
                if !self.successors(&node.id).contains(&target.as_str()) {
                    return Err(EngineError::GraphValidationError(format!(
                        "condition '{}' has no edge to branch target: {}",
                        node.id, target
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_contained_isolation(&self) -> EngineResult<()> {
        for id in &self.contained {
            if !self.predecessors(id).is_empty() || !self.successors(id).is_empty() {
                return Err(EngineError::GraphValidationError(format!(
                    "node '{}' belongs to a loop body or parallel branch and must not \
                     be wired into the main graph",
                    id
                )));
            }
        }
        Ok(())
    }

    fn validate_acyclic(&self) -> EngineResult<()> {
        if petgraph::algo::toposort(&self.graph, None).is_err() {
            return Err(EngineError::CycleDetected);
        }
        Ok(())
    }

    fn validate_output_reachable(&self) -> EngineResult<()> {
        if !self.reachable_from(&self.input_node).contains(&self.output_node) {
            return Err(EngineError::OutputUnreachable(self.output_node.clone()));
        }
        Ok(())
    }
}

fn single_node_of(
    definition: &WorkflowDefinition,
    kind_name: &str,
    matcher: impl Fn(&NodeKind) -> bool,
) -> EngineResult<Option<String>> {
    let mut found = None;
    for node in &definition.nodes {
        if matcher(&node.kind) {
            if found.is_some() {
                return Err(EngineError::GraphValidationError(format!(
                    "multiple {} nodes found",
                    kind_name
                )));
            }
            found = Some(node.id.clone());
        }
    }
    Ok(found)
}

/// Collect loop-body and parallel-branch member ids, checking that each one
/// exists, appears in exactly one container, and is a plain tool/ai-step
/// node. Approvals may only suspend at the top level, and nesting parallel
/// or loop containers inside a branch is rejected outright.
fn collect_contained(
    definition: &WorkflowDefinition,
    index: &HashMap<String, NodeIndex>,
    input_node: &str,
    output_node: &str,
) -> EngineResult<HashSet<String>> {
    let mut contained = HashSet::new();

    let mut claim = |container: &str, member: &str| -> EngineResult<()> {
        let Some(member_node) = definition.node(member).filter(|_| index.contains_key(member))
        else {
            return Err(EngineError::GraphValidationError(format!(
                "container '{}' references missing node: {}",
                container, member
            )));
        };
        if member == input_node || member == output_node {
            return Err(EngineError::GraphValidationError(format!(
                "container '{}' may not include the input or output node",
                container
            )));
        }
        if !matches!(member_node.kind, NodeKind::Tool(_) | NodeKind::AiStep(_)) {
            return Err(EngineError::GraphValidationError(format!(
                "container '{}' member '{}' must be a tool or ai-step node, got {}",
                container,
                member,
                member_node.kind.name()
            )));
        }
        if !contained.insert(member.to_string()) {
            return Err(EngineError::GraphValidationError(format!(
                "node '{}' is claimed by more than one container",
                member
            )));
        }
        Ok(())
    };

    for node in &definition.nodes {
        match &node.kind {
            NodeKind::Loop(data) => {
                for member in &data.body_nodes {
                    claim(&node.id, member)?;
                }
            }
            NodeKind::Parallel(data) => {
                for members in data.branches.values() {
                    for member in members {
                        claim(&node.id, member)?;
                    }
                }
            }
            _ => {}
        }
    }

    Ok(contained)
}
