//! # condeval-graph — dependency graphs over rules data
//!
//! Each (campaign, branch) pair owns an in-memory directed graph of
//! variables, conditions, effects and entities. The graph orders batch
//! evaluations, detects dependency cycles, and scopes cache invalidation.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`DependencyGraph`] | Node/edge store with reachability, cycle detection and topological sort |
//! | [`GraphCoordinator`] | Lazy per-key cache of graphs, built from the [`RuleStore`](condeval_store::RuleStore) |
//! | [`Node`], [`Edge`], [`NodeType`], [`EdgeType`] | The typed graph model |
//!
//! Edge direction follows the convention *A → B means A depends on B*: a
//! condition points at the variables it reads, an effect at the variables
//! it touches, an entity at the conditions and effects bound to it.
//! Graphs are process-local and never persisted; eviction or invalidation
//! simply forces a rebuild on next use.

mod coordinator;
mod error;
mod graph;
mod node;

pub use coordinator::{GraphCoordinator, GraphKey, DEFAULT_BRANCH};
pub use error::GraphError;
pub use graph::{CycleInfo, CycleReport, DependencyGraph, TopoResult};
pub use node::{parse_node_id, Edge, EdgeType, Node, NodeType};
