//! Graph arena and traversal analysis.
//!
//! Nodes and edges are kept in a [`petgraph`] stable graph whose weights are
//! plain node ids; all cross-references in the engine go through ids, never
//! pointers, which keeps reachability analysis a pure function over ids.

mod builder;
mod reachability;

pub use builder::WorkflowGraph;
pub use reachability::branch_skip_set;
