use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A field condition: a JSONLogic expression bound to an entity field.
///
/// Usable only when `deleted_at` is null and `is_active` is true; the
/// engine reports each violation distinctly.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Condition {
    pub id: String,
    pub campaign_id: String,
    pub branch_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub field: String,
    pub expression: Value,
    pub is_active: bool,
    pub priority: i32,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Condition {
    /// Whether the condition may be evaluated at all.
    pub fn is_usable(&self) -> bool {
        self.deleted_at.is_none() && self.is_active
    }
}

/// A named datum whose value feeds conditions through `var`.
///
/// `key` is the head segment expressions reference; `value` is arbitrary
/// JSON (scalar or structured).
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Variable {
    pub id: String,
    pub campaign_id: String,
    pub branch_id: String,
    pub key: String,
    pub value: Value,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A state mutation bound to an entity; not evaluated by this engine but
/// represented in the dependency graph through the variables it reads
/// and writes.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Effect {
    pub id: String,
    pub campaign_id: String,
    pub branch_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub reads: Vec<String>,
    pub writes: Vec<String>,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}
