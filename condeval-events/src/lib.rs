//! # condeval-events — cache and graph invalidation over the bus
//!
//! The authoring service publishes change notices on six pub/sub
//! channels; this crate turns them into the right cache and graph
//! actions:
//!
//! | Channel | Cache action | Graph action |
//! |---------|--------------|--------------|
//! | `condition.created` | none | invalidate graph |
//! | `condition.updated` | invalidate the condition's entry | invalidate graph |
//! | `condition.deleted` | invalidate the condition's entry | invalidate graph |
//! | `variable.created` | none | invalidate graph |
//! | `variable.updated` | invalidate the (campaign, branch) prefix | none — values change, structure does not |
//! | `variable.deleted` | invalidate the (campaign, branch) prefix | invalidate graph |
//!
//! Malformed payloads, unknown channels and events without a campaign id
//! are logged and dropped; the bus is advisory and must never take the
//! worker down. Dispatch is awaited per message, so an event handled
//! before an RPC starts is visible to that RPC's first cache lookup.

mod subscriber;

pub use subscriber::{backoff_delay, BusConfig, RedisSubscriber, MAX_RECONNECT_ATTEMPTS};

use std::sync::Arc;

use serde::Deserialize;

use condeval_cache::{CacheKey, ResultCache, Weigh};
use condeval_graph::{GraphCoordinator, NodeType, DEFAULT_BRANCH};

/// Every channel the subscriber listens on.
pub const CHANNELS: [&str; 6] = [
    "condition.created",
    "condition.updated",
    "condition.deleted",
    "variable.created",
    "variable.updated",
    "variable.deleted",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    ConditionCreated,
    ConditionUpdated,
    ConditionDeleted,
    VariableCreated,
    VariableUpdated,
    VariableDeleted,
}

impl Channel {
    pub fn from_name(name: &str) -> Option<Channel> {
        match name {
            "condition.created" => Some(Channel::ConditionCreated),
            "condition.updated" => Some(Channel::ConditionUpdated),
            "condition.deleted" => Some(Channel::ConditionDeleted),
            "variable.created" => Some(Channel::VariableCreated),
            "variable.updated" => Some(Channel::VariableUpdated),
            "variable.deleted" => Some(Channel::VariableDeleted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::ConditionCreated => "condition.created",
            Channel::ConditionUpdated => "condition.updated",
            Channel::ConditionDeleted => "condition.deleted",
            Channel::VariableCreated => "variable.created",
            Channel::VariableUpdated => "variable.updated",
            Channel::VariableDeleted => "variable.deleted",
        }
    }
}

/// The JSON body published on every channel.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationEvent {
    pub campaign_id: String,
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl InvalidationEvent {
    pub fn branch(&self) -> &str {
        self.branch_id.as_deref().unwrap_or(DEFAULT_BRANCH)
    }
}

/// Applies the invalidation table to the shared cache and coordinator.
pub struct InvalidationRouter<V: Clone + Weigh> {
    cache: ResultCache<V>,
    graphs: Arc<GraphCoordinator>,
}

impl<V: Clone + Weigh> InvalidationRouter<V> {
    pub fn new(cache: ResultCache<V>, graphs: Arc<GraphCoordinator>) -> Self {
        InvalidationRouter { cache, graphs }
    }

    /// Handle one raw bus message. Never fails; bad input is logged and
    /// dropped.
    pub async fn dispatch(&self, channel_name: &str, payload: &str) {
        let Some(channel) = Channel::from_name(channel_name) else {
            tracing::warn!(channel = channel_name, "dropping message on unknown channel");
            return;
        };
        let event: InvalidationEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(
                    channel = channel_name,
                    error = %err,
                    "dropping malformed bus message"
                );
                return;
            }
        };
        if event.campaign_id.is_empty() {
            tracing::warn!(channel = channel_name, "dropping bus message without campaignId");
            return;
        }
        self.apply(channel, &event).await;
    }

    /// Apply the table for an already-parsed event.
    pub async fn apply(&self, channel: Channel, event: &InvalidationEvent) {
        let campaign_id = event.campaign_id.as_str();
        let branch_id = event.branch();
        match channel {
            Channel::ConditionCreated | Channel::VariableCreated => {
                self.invalidate_graph(campaign_id, branch_id);
            }
            Channel::ConditionUpdated | Channel::ConditionDeleted => {
                if let Some(entity_id) = event.entity_id.as_deref() {
                    let key = CacheKey::new(
                        campaign_id,
                        branch_id,
                        NodeType::Condition.id_for(entity_id),
                    );
                    self.cache.invalidate(&key);
                }
                self.invalidate_graph(campaign_id, branch_id);
            }
            Channel::VariableUpdated => {
                // Values changed, structure did not: drop cached results,
                // keep the graph.
                let dropped = self.cache.invalidate_by_prefix(campaign_id, Some(branch_id));
                tracing::debug!(campaign_id, branch_id, dropped, "variable update invalidation");
            }
            Channel::VariableDeleted => {
                self.cache.invalidate_by_prefix(campaign_id, Some(branch_id));
                self.invalidate_graph(campaign_id, branch_id);
            }
        }
    }

    fn invalidate_graph(&self, campaign_id: &str, branch_id: &str) {
        if let Err(err) = self.graphs.invalidate(campaign_id, branch_id) {
            tracing::warn!(
                campaign_id,
                branch_id,
                error = %err,
                "graph invalidation skipped"
            );
        }
    }
}
