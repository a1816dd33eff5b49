use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The four kinds of graph node. The discriminant doubles as the id
/// prefix: a node's id is always `TYPE:entityId`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Variable,
    Condition,
    Effect,
    Entity,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Variable => "VARIABLE",
            NodeType::Condition => "CONDITION",
            NodeType::Effect => "EFFECT",
            NodeType::Entity => "ENTITY",
        }
    }

    pub fn parse(s: &str) -> Option<NodeType> {
        match s {
            "VARIABLE" => Some(NodeType::Variable),
            "CONDITION" => Some(NodeType::Condition),
            "EFFECT" => Some(NodeType::Effect),
            "ENTITY" => Some(NodeType::Entity),
            _ => None,
        }
    }

    /// The graph id of the node representing `entity_id` at this type.
    pub fn id_for(&self, entity_id: &str) -> String {
        format!("{}:{entity_id}", self.as_str())
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split a node id into its type and underlying entity id.
///
/// Splits on the first `:` only; entity ids may themselves contain the
/// delimiter.
pub fn parse_node_id(id: &str) -> Option<(NodeType, &str)> {
    let (prefix, entity_id) = id.split_once(':')?;
    NodeType::parse(prefix).map(|t| (t, entity_id))
}

/// A graph node. `id` is derived from type and entity id and is unique
/// per graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub node_type: NodeType,
    pub entity_id: String,
    pub label: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

impl Node {
    pub fn new(node_type: NodeType, entity_id: impl Into<String>) -> Self {
        let entity_id = entity_id.into();
        Node {
            id: node_type.id_for(&entity_id),
            node_type,
            entity_id,
            label: None,
            metadata: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// The relationship an edge encodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    /// A condition or effect reads a variable.
    Reads,
    /// An effect writes a variable.
    Writes,
    /// Generic dependency (entity on condition/effect).
    DependsOn,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Reads => "READS",
            EdgeType::Writes => "WRITES",
            EdgeType::DependsOn => "DEPENDS_ON",
        }
    }
}

/// A directed edge between two existing nodes. Duplicates across distinct
/// edge types are permitted; the graph stores whatever it is given.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub edge_type: EdgeType,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, edge_type: EdgeType) -> Self {
        Edge {
            from: from.into(),
            to: to.into(),
            edge_type,
        }
    }
}
