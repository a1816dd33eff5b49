use sqlx::PgPool;

use crate::error::StoreError;
use crate::model::{Condition, Effect, Variable};
use crate::RuleStore;

const CONDITION_COLUMNS: &str = "id, campaign_id, branch_id, entity_type, entity_id, \
     field, expression, is_active, priority, deleted_at";

const VARIABLE_COLUMNS: &str = "id, campaign_id, branch_id, key, value, deleted_at";

const EFFECT_COLUMNS: &str =
    "id, campaign_id, branch_id, entity_type, entity_id, reads, writes, is_active, deleted_at";

/// Postgres-backed [`RuleStore`] over an `sqlx` connection pool.
///
/// Queries are plain `query_as` with hand-written SQL; every statement
/// carries the soft-delete filter.
#[derive(Clone)]
pub struct PgRuleStore {
    pool: PgPool,
}

impl PgRuleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for health probes.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl RuleStore for PgRuleStore {
    async fn find_condition(&self, id: &str) -> Result<Option<Condition>, StoreError> {
        let condition = sqlx::query_as::<_, Condition>(&format!(
            "SELECT {CONDITION_COLUMNS} FROM conditions WHERE id = $1 AND deleted_at IS NULL",
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(condition)
    }

    async fn find_variable(
        &self,
        campaign_id: &str,
        branch_id: &str,
        key: &str,
    ) -> Result<Option<Variable>, StoreError> {
        let variable = sqlx::query_as::<_, Variable>(&format!(
            "SELECT {VARIABLE_COLUMNS} FROM variables \
             WHERE campaign_id = $1 AND branch_id = $2 AND key = $3 AND deleted_at IS NULL",
        ))
        .bind(campaign_id)
        .bind(branch_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(variable)
    }

    async fn list_conditions(
        &self,
        campaign_id: &str,
        branch_id: &str,
    ) -> Result<Vec<Condition>, StoreError> {
        let conditions = sqlx::query_as::<_, Condition>(&format!(
            "SELECT {CONDITION_COLUMNS} FROM conditions \
             WHERE campaign_id = $1 AND branch_id = $2 AND deleted_at IS NULL \
             ORDER BY priority DESC, id",
        ))
        .bind(campaign_id)
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(conditions)
    }

    async fn list_variables(
        &self,
        campaign_id: &str,
        branch_id: &str,
    ) -> Result<Vec<Variable>, StoreError> {
        let variables = sqlx::query_as::<_, Variable>(&format!(
            "SELECT {VARIABLE_COLUMNS} FROM variables \
             WHERE campaign_id = $1 AND branch_id = $2 AND deleted_at IS NULL ORDER BY key",
        ))
        .bind(campaign_id)
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(variables)
    }

    async fn list_effects(
        &self,
        campaign_id: &str,
        branch_id: &str,
    ) -> Result<Vec<Effect>, StoreError> {
        let effects = sqlx::query_as::<_, Effect>(&format!(
            "SELECT {EFFECT_COLUMNS} FROM effects \
             WHERE campaign_id = $1 AND branch_id = $2 AND deleted_at IS NULL ORDER BY id",
        ))
        .bind(campaign_id)
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(effects)
    }
}
