use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::error::StoreError;
use crate::model::{Condition, Effect, Variable};
use crate::RuleStore;

/// In-process [`RuleStore`] backed by `DashMap`.
///
/// Serves tests and local development; the mutators stand in for the
/// external service that owns the data. `find_condition` calls are
/// counted so tests can assert cache behaviour.
#[derive(Default)]
pub struct MemoryStore {
    conditions: DashMap<String, Condition>,
    variables: DashMap<String, Variable>,
    effects: DashMap<String, Effect>,
    condition_fetches: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_condition(&self, condition: Condition) {
        self.conditions.insert(condition.id.clone(), condition);
    }

    pub fn remove_condition(&self, id: &str) {
        self.conditions.remove(id);
    }

    pub fn put_variable(&self, variable: Variable) {
        let key = scoped_key(&variable.campaign_id, &variable.branch_id, &variable.key);
        self.variables.insert(key, variable);
    }

    pub fn remove_variable(&self, campaign_id: &str, branch_id: &str, key: &str) {
        self.variables.remove(&scoped_key(campaign_id, branch_id, key));
    }

    pub fn put_effect(&self, effect: Effect) {
        self.effects.insert(effect.id.clone(), effect);
    }

    /// How many times `find_condition` has been called.
    pub fn condition_fetches(&self) -> usize {
        self.condition_fetches.load(Ordering::Relaxed)
    }
}

fn scoped_key(campaign_id: &str, branch_id: &str, key: &str) -> String {
    format!("{campaign_id}/{branch_id}/{key}")
}

#[async_trait::async_trait]
impl RuleStore for MemoryStore {
    async fn find_condition(&self, id: &str) -> Result<Option<Condition>, StoreError> {
        self.condition_fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .conditions
            .get(id)
            .map(|c| c.value().clone())
            .filter(|c| c.deleted_at.is_none()))
    }

    async fn find_variable(
        &self,
        campaign_id: &str,
        branch_id: &str,
        key: &str,
    ) -> Result<Option<Variable>, StoreError> {
        Ok(self
            .variables
            .get(&scoped_key(campaign_id, branch_id, key))
            .map(|v| v.value().clone())
            .filter(|v| v.deleted_at.is_none()))
    }

    async fn list_conditions(
        &self,
        campaign_id: &str,
        branch_id: &str,
    ) -> Result<Vec<Condition>, StoreError> {
        let mut conditions: Vec<Condition> = self
            .conditions
            .iter()
            .filter(|entry| {
                entry.campaign_id == campaign_id
                    && entry.branch_id == branch_id
                    && entry.deleted_at.is_none()
            })
            .map(|entry| entry.value().clone())
            .collect();
        conditions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(conditions)
    }

    async fn list_variables(
        &self,
        campaign_id: &str,
        branch_id: &str,
    ) -> Result<Vec<Variable>, StoreError> {
        let mut variables: Vec<Variable> = self
            .variables
            .iter()
            .filter(|entry| {
                entry.campaign_id == campaign_id
                    && entry.branch_id == branch_id
                    && entry.deleted_at.is_none()
            })
            .map(|entry| entry.value().clone())
            .collect();
        variables.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(variables)
    }

    async fn list_effects(
        &self,
        campaign_id: &str,
        branch_id: &str,
    ) -> Result<Vec<Effect>, StoreError> {
        let mut effects: Vec<Effect> = self
            .effects
            .iter()
            .filter(|entry| {
                entry.campaign_id == campaign_id
                    && entry.branch_id == branch_id
                    && entry.deleted_at.is_none()
            })
            .map(|entry| entry.value().clone())
            .collect();
        effects.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn condition(id: &str) -> Condition {
        Condition {
            id: id.to_string(),
            campaign_id: "camp".to_string(),
            branch_id: "main".to_string(),
            entity_type: "settlement".to_string(),
            entity_id: "riverton".to_string(),
            field: "prosperous".to_string(),
            expression: json!({">=": [{"var": "population"}, 5000]}),
            is_active: true,
            priority: 0,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn soft_deleted_rows_are_invisible() {
        let store = MemoryStore::new();
        let mut dead = condition("c1");
        dead.deleted_at = Some(chrono::Utc::now());
        store.put_condition(dead);
        store.put_condition(condition("c2"));

        assert!(store.find_condition("c1").await.unwrap().is_none());
        assert!(store.find_condition("c2").await.unwrap().is_some());
        let listed = store.list_conditions("camp", "main").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "c2");
    }

    #[tokio::test]
    async fn fetches_are_counted() {
        let store = MemoryStore::new();
        store.put_condition(condition("c1"));
        let _ = store.find_condition("c1").await.unwrap();
        let _ = store.find_condition("c1").await.unwrap();
        assert_eq!(store.condition_fetches(), 2);
    }
}
