//! # condeval-store — read-only store surface
//!
//! The authoritative home of conditions, variables and effects is an
//! external relational database owned by another service. This crate is
//! the narrow, read-only view the evaluation worker consumes:
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RuleStore`] | Object-safe async trait over the queries the worker needs |
//! | [`Condition`], [`Variable`], [`Effect`] | Domain models, soft-delete aware |
//! | [`PgRuleStore`] | Postgres implementation over an `sqlx` pool |
//! | [`MemoryStore`] | In-process implementation for tests and local development |
//! | [`StoreError`] | Error type bridging driver failures |
//!
//! The worker never writes: no schema, no migrations, no transactions.

mod error;
mod memory;
mod model;
mod postgres;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use model::{Condition, Effect, Variable};
pub use postgres::PgRuleStore;

/// Read-only query surface over the rules database.
///
/// All lookups apply the soft-delete filter (`deleted_at IS NULL`); a
/// deleted row is indistinguishable from an absent one.
#[async_trait::async_trait]
pub trait RuleStore: Send + Sync {
    /// Fetch a single condition by id.
    async fn find_condition(&self, id: &str) -> Result<Option<Condition>, StoreError>;

    /// Fetch a single variable by its expression-facing key.
    async fn find_variable(
        &self,
        campaign_id: &str,
        branch_id: &str,
        key: &str,
    ) -> Result<Option<Variable>, StoreError>;

    /// All live conditions for a (campaign, branch), for graph builds.
    async fn list_conditions(
        &self,
        campaign_id: &str,
        branch_id: &str,
    ) -> Result<Vec<Condition>, StoreError>;

    /// All live variables for a (campaign, branch), for graph builds.
    async fn list_variables(
        &self,
        campaign_id: &str,
        branch_id: &str,
    ) -> Result<Vec<Variable>, StoreError>;

    /// All live effects with their read/write variable relationships.
    async fn list_effects(
        &self,
        campaign_id: &str,
        branch_id: &str,
    ) -> Result<Vec<Effect>, StoreError>;
}
