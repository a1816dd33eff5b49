use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use condeval_store::{Condition, Effect, RuleStore};

use crate::error::GraphError;
use crate::graph::{CycleReport, DependencyGraph, TopoResult};
use crate::node::{Edge, EdgeType, Node, NodeType};

/// Branch used when callers leave the branch id empty.
pub const DEFAULT_BRANCH: &str = "main";

const MAX_CAMPAIGN_ID_LEN: usize = 100;
const MAX_BRANCH_ID_LEN: usize = 200;

/// The scope a graph belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GraphKey {
    pub campaign_id: String,
    pub branch_id: String,
}

impl GraphKey {
    /// Validate both ids and normalise an empty branch to
    /// [`DEFAULT_BRANCH`]. Validation guards the cache-key delimiter
    /// scheme downstream, so violations are fatal input errors.
    pub fn validated(campaign_id: &str, branch_id: &str) -> Result<GraphKey, GraphError> {
        validate_campaign_id(campaign_id)?;
        let branch_id = if branch_id.is_empty() {
            DEFAULT_BRANCH
        } else {
            branch_id
        };
        validate_branch_id(branch_id)?;
        Ok(GraphKey {
            campaign_id: campaign_id.to_string(),
            branch_id: branch_id.to_string(),
        })
    }
}

fn validate_campaign_id(campaign_id: &str) -> Result<(), GraphError> {
    if campaign_id.is_empty() || campaign_id.len() > MAX_CAMPAIGN_ID_LEN {
        return Err(GraphError::InvalidId(format!(
            "Invalid campaign id: must be 1-{MAX_CAMPAIGN_ID_LEN} characters"
        )));
    }
    if !campaign_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(GraphError::InvalidId(
            "Invalid campaign id: only letters, digits, '_' and '-' are allowed".to_string(),
        ));
    }
    Ok(())
}

fn validate_branch_id(branch_id: &str) -> Result<(), GraphError> {
    if branch_id.is_empty() || branch_id.len() > MAX_BRANCH_ID_LEN {
        return Err(GraphError::InvalidId(format!(
            "Invalid branch id: must be 1-{MAX_BRANCH_ID_LEN} characters"
        )));
    }
    if !branch_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '/')
    {
        return Err(GraphError::InvalidId(
            "Invalid branch id: only letters, digits, '_', '-' and '/' are allowed".to_string(),
        ));
    }
    Ok(())
}

/// Lazily built cache of dependency graphs, one per (campaign, branch).
///
/// Graphs are shared as `Arc<RwLock<_>>`: handlers read them concurrently
/// while the coordinator serialises patches through the write half.
/// Racing cold-key builders may duplicate work; the first inserted graph
/// wins and the duplicates are equivalent, so either outcome is sound.
pub struct GraphCoordinator {
    graphs: DashMap<GraphKey, Arc<RwLock<DependencyGraph>>>,
    store: Arc<dyn RuleStore>,
}

impl GraphCoordinator {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self {
            graphs: DashMap::new(),
            store,
        }
    }

    /// The graph for (campaign, branch), building it from the store on a
    /// cold key.
    pub async fn graph(
        &self,
        campaign_id: &str,
        branch_id: &str,
    ) -> Result<Arc<RwLock<DependencyGraph>>, GraphError> {
        let key = GraphKey::validated(campaign_id, branch_id)?;
        if let Some(graph) = self.graphs.get(&key) {
            return Ok(graph.value().clone());
        }
        let built = self.build(&key).await?;
        let entry = self
            .graphs
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(built)));
        Ok(entry.value().clone())
    }

    /// Drop the cached graph; the next access rebuilds. Idempotent.
    pub fn invalidate(&self, campaign_id: &str, branch_id: &str) -> Result<bool, GraphError> {
        let key = GraphKey::validated(campaign_id, branch_id)?;
        Ok(self.graphs.remove(&key).is_some())
    }

    /// Number of graphs currently materialised.
    pub fn cached_graphs(&self) -> usize {
        self.graphs.len()
    }

    /// Re-derive a single condition's node and edges inside a cached
    /// graph. No-op on cold keys: the next build sees the store's truth
    /// anyway.
    pub async fn update_condition(
        &self,
        campaign_id: &str,
        branch_id: &str,
        condition_id: &str,
    ) -> Result<(), GraphError> {
        let key = GraphKey::validated(campaign_id, branch_id)?;
        let Some(shared) = self.graphs.get(&key).map(|g| g.value().clone()) else {
            return Ok(());
        };
        let condition = self.store.find_condition(condition_id).await?;
        let mut graph = shared.write().await;
        graph.remove_node(&NodeType::Condition.id_for(condition_id));
        if let Some(condition) = condition {
            if condition.campaign_id == key.campaign_id && condition.branch_id == key.branch_id {
                link_condition(&mut graph, &condition)?;
            }
        }
        Ok(())
    }

    /// Re-derive a single variable's node inside a cached graph, restoring
    /// the edges of every reader and writer recorded in node metadata.
    pub async fn update_variable(
        &self,
        campaign_id: &str,
        branch_id: &str,
        variable_key: &str,
    ) -> Result<(), GraphError> {
        let key = GraphKey::validated(campaign_id, branch_id)?;
        let Some(shared) = self.graphs.get(&key).map(|g| g.value().clone()) else {
            return Ok(());
        };
        let variable = self
            .store
            .find_variable(&key.campaign_id, &key.branch_id, variable_key)
            .await?;
        let mut graph = shared.write().await;
        let node_id = NodeType::Variable.id_for(variable_key);
        graph.remove_node(&node_id);
        if variable.is_none() {
            return Ok(());
        }
        graph.add_node(Node::new(NodeType::Variable, variable_key));
        // Readers and writers keep their var lists in metadata; relink
        // from there rather than refetching every expression.
        let links: Vec<(String, EdgeType)> = graph
            .all_nodes()
            .flat_map(|node| {
                let mut links = Vec::new();
                if let Some(meta) = node.metadata.as_ref() {
                    if metadata_refs(meta, "reads").any(|v| v == variable_key) {
                        links.push((node.id.clone(), EdgeType::Reads));
                    }
                    if metadata_refs(meta, "writes").any(|v| v == variable_key) {
                        links.push((node.id.clone(), EdgeType::Writes));
                    }
                }
                links
            })
            .collect();
        for (from, edge_type) in links {
            graph.add_edge(Edge::new(from, node_id.clone(), edge_type))?;
        }
        Ok(())
    }

    /// Ids this node depends on (targets of its outgoing edges).
    pub async fn dependencies_of(
        &self,
        campaign_id: &str,
        branch_id: &str,
        node_id: &str,
    ) -> Result<Vec<String>, GraphError> {
        let graph = self.graph(campaign_id, branch_id).await?;
        let graph = graph.read().await;
        Ok(graph.outgoing(node_id).iter().map(|e| e.to.clone()).collect())
    }

    /// Ids depending on this node (sources of its incoming edges).
    pub async fn dependents_of(
        &self,
        campaign_id: &str,
        branch_id: &str,
        node_id: &str,
    ) -> Result<Vec<String>, GraphError> {
        let graph = self.graph(campaign_id, branch_id).await?;
        let graph = graph.read().await;
        Ok(graph.incoming(node_id).iter().map(|e| e.from.clone()).collect())
    }

    pub async fn validate_no_cycles(
        &self,
        campaign_id: &str,
        branch_id: &str,
    ) -> Result<CycleReport, GraphError> {
        let graph = self.graph(campaign_id, branch_id).await?;
        let graph = graph.read().await;
        Ok(graph.detect_cycles())
    }

    pub async fn evaluation_order(
        &self,
        campaign_id: &str,
        branch_id: &str,
    ) -> Result<TopoResult, GraphError> {
        let graph = self.graph(campaign_id, branch_id).await?;
        let graph = graph.read().await;
        Ok(graph.topological_sort())
    }

    async fn build(&self, key: &GraphKey) -> Result<DependencyGraph, GraphError> {
        let conditions = self
            .store
            .list_conditions(&key.campaign_id, &key.branch_id)
            .await?;
        let variables = self
            .store
            .list_variables(&key.campaign_id, &key.branch_id)
            .await?;
        let effects = self
            .store
            .list_effects(&key.campaign_id, &key.branch_id)
            .await?;

        let mut graph = DependencyGraph::new();
        for variable in &variables {
            graph.add_node(Node::new(NodeType::Variable, &variable.key));
        }
        for condition in &conditions {
            link_condition(&mut graph, condition)?;
        }
        for effect in &effects {
            link_effect(&mut graph, effect)?;
        }

        tracing::debug!(
            campaign_id = %key.campaign_id,
            branch_id = %key.branch_id,
            nodes = graph.node_count(),
            edges = graph.all_edges().count(),
            "dependency graph built"
        );
        Ok(graph)
    }
}

/// Var paths referenced by an expression, reduced to their head segments
/// (the variable keys the graph knows about).
fn read_heads(expression: &Value) -> Vec<String> {
    let mut heads: Vec<String> = condeval_logic::extract_vars(expression)
        .into_iter()
        .filter_map(|path| path.split('.').next().map(str::to_string))
        .collect();
    heads.sort();
    heads.dedup();
    heads
}

fn metadata_refs<'a>(
    metadata: &'a Map<String, Value>,
    field: &str,
) -> impl Iterator<Item = &'a str> {
    metadata
        .get(field)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

/// Insert a condition node, its entity, and READS edges to every known
/// variable it references. The var list is recorded in metadata so
/// variable patches can relink without refetching the expression.
fn link_condition(graph: &mut DependencyGraph, condition: &Condition) -> Result<(), GraphError> {
    let heads = read_heads(&condition.expression);
    let mut metadata = Map::new();
    metadata.insert("field".to_string(), Value::from(condition.field.clone()));
    metadata.insert(
        "entityId".to_string(),
        Value::from(condition.entity_id.clone()),
    );
    metadata.insert(
        "reads".to_string(),
        Value::from(heads.iter().cloned().map(Value::from).collect::<Vec<_>>()),
    );
    let node = Node::new(NodeType::Condition, &condition.id)
        .with_label(format!("{}.{}", condition.entity_type, condition.field))
        .with_metadata(metadata);
    let condition_node_id = node.id.clone();
    graph.add_node(node);

    let entity_node_id = NodeType::Entity.id_for(&condition.entity_id);
    if !graph.contains(&entity_node_id) {
        graph.add_node(
            Node::new(NodeType::Entity, &condition.entity_id)
                .with_label(condition.entity_type.clone()),
        );
    }
    graph.add_edge(Edge::new(
        entity_node_id,
        condition_node_id.clone(),
        EdgeType::DependsOn,
    ))?;

    for head in heads {
        let variable_node_id = NodeType::Variable.id_for(&head);
        if graph.contains(&variable_node_id) {
            graph.add_edge(Edge::new(
                condition_node_id.clone(),
                variable_node_id,
                EdgeType::Reads,
            ))?;
        }
    }
    Ok(())
}

/// Insert an effect node with READS/WRITES edges to its variables.
fn link_effect(graph: &mut DependencyGraph, effect: &Effect) -> Result<(), GraphError> {
    let mut metadata = Map::new();
    metadata.insert(
        "reads".to_string(),
        Value::from(effect.reads.iter().cloned().map(Value::from).collect::<Vec<_>>()),
    );
    metadata.insert(
        "writes".to_string(),
        Value::from(effect.writes.iter().cloned().map(Value::from).collect::<Vec<_>>()),
    );
    let node = Node::new(NodeType::Effect, &effect.id).with_metadata(metadata);
    let effect_node_id = node.id.clone();
    graph.add_node(node);

    let entity_node_id = NodeType::Entity.id_for(&effect.entity_id);
    if !graph.contains(&entity_node_id) {
        graph.add_node(
            Node::new(NodeType::Entity, &effect.entity_id).with_label(effect.entity_type.clone()),
        );
    }
    graph.add_edge(Edge::new(
        entity_node_id,
        effect_node_id.clone(),
        EdgeType::DependsOn,
    ))?;

    for (keys, edge_type) in [(&effect.writes, EdgeType::Writes), (&effect.reads, EdgeType::Reads)] {
        for key in keys {
            let variable_node_id = NodeType::Variable.id_for(key);
            if graph.contains(&variable_node_id) {
                graph.add_edge(Edge::new(
                    effect_node_id.clone(),
                    variable_node_id,
                    edge_type,
                ))?;
            }
        }
    }
    Ok(())
}
