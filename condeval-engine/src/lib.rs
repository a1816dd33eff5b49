//! # condeval-engine — the evaluation orchestrator
//!
//! Ties the worker together: fetch a condition from the
//! [store](condeval_store), validate and interpret its
//! [expression](condeval_logic), consult and populate the
//! [result cache](condeval_cache), and order batches through the
//! [dependency graph](condeval_graph).
//!
//! Two entry points:
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`Engine::evaluate`] | One condition against a caller-supplied context |
//! | [`Engine::evaluate_many`] | A batch, dependency-ordered where the graph allows |
//!
//! The engine never raises: every failure becomes an [`Evaluation`] with
//! `success = false` and a message, which is what the RPC layer returns
//! verbatim. Traced runs are always live — the cache is neither read nor
//! written when a trace is requested.

mod result;
mod trace;

pub use result::{BatchEvaluation, Evaluation, TraceStep};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value};

use condeval_cache::{CacheKey, ResultCache};
use condeval_graph::{parse_node_id, GraphCoordinator, NodeType, DEFAULT_BRANCH};
use condeval_store::RuleStore;

use trace::TraceRecorder;

pub struct Engine {
    store: Arc<dyn RuleStore>,
    cache: ResultCache<Evaluation>,
    graphs: Arc<GraphCoordinator>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn RuleStore>,
        cache: ResultCache<Evaluation>,
        graphs: Arc<GraphCoordinator>,
    ) -> Self {
        Engine {
            store,
            cache,
            graphs,
        }
    }

    /// Evaluate one condition against `context`.
    ///
    /// The cache is consulted first unless a trace was requested; a hit
    /// is returned as-is with only its timing rewritten to the current
    /// lookup. Successful untraced results are cached under
    /// `(campaign, branch, CONDITION:<id>)`.
    pub async fn evaluate(
        &self,
        condition_id: &str,
        context: &Value,
        campaign_id: &str,
        branch_id: &str,
        include_trace: bool,
    ) -> Evaluation {
        let started = Instant::now();
        let branch_id = normalize_branch(branch_id);
        let cache_key = CacheKey::new(
            campaign_id,
            branch_id,
            NodeType::Condition.id_for(condition_id),
        );

        if !include_trace {
            if let Some(mut hit) = self.cache.get(&cache_key) {
                hit.evaluation_time_ms = elapsed_ms(started);
                return hit;
            }
        }

        let mut trace = TraceRecorder::new(include_trace);
        match self.run(condition_id, context, &mut trace).await {
            Ok(value) => {
                let value_json = value.to_string();
                let evaluation = Evaluation {
                    success: true,
                    value_json: Some(value_json),
                    error: None,
                    trace: trace.into_steps(),
                    evaluation_time_ms: elapsed_ms(started),
                };
                if !include_trace {
                    self.cache.set(&cache_key, evaluation.clone(), None);
                }
                evaluation
            }
            Err(message) => Evaluation::failure(message, trace.into_steps(), elapsed_ms(started)),
        }
    }

    /// Evaluate a set of conditions, in dependency order where the graph
    /// provides one.
    ///
    /// Cycles are logged and tolerated: a partial order still beats no
    /// result at all. Ids the graph does not know about are evaluated
    /// after the ordered ones, in request order, since the graph may lag
    /// behind schema changes. If the graph pipeline itself fails the
    /// whole batch falls back to request order.
    pub async fn evaluate_many(
        &self,
        condition_ids: &[String],
        context: &Value,
        campaign_id: &str,
        branch_id: &str,
        include_trace: bool,
    ) -> BatchEvaluation {
        if condition_ids.is_empty() {
            return BatchEvaluation::default();
        }
        let branch_id = normalize_branch(branch_id);
        let order = match self
            .dependency_order(condition_ids, campaign_id, branch_id)
            .await
        {
            Ok(order) => order,
            Err(err) => {
                tracing::warn!(
                    campaign_id,
                    branch_id,
                    error = %err,
                    "dependency ordering unavailable, evaluating in request order"
                );
                dedup(condition_ids)
            }
        };

        let mut batch = BatchEvaluation::default();
        for id in order {
            let evaluation = self
                .evaluate(&id, context, campaign_id, branch_id, include_trace)
                .await;
            batch.results.insert(id.clone(), evaluation);
            batch.order.push(id);
        }
        batch
    }

    /// The ids to evaluate, dependency-ordered: the graph's topological
    /// order filtered down to the requested conditions, then any
    /// requested ids the graph has never seen.
    async fn dependency_order(
        &self,
        condition_ids: &[String],
        campaign_id: &str,
        branch_id: &str,
    ) -> Result<Vec<String>, condeval_graph::GraphError> {
        let graph = self.graphs.graph(campaign_id, branch_id).await?;
        let graph = graph.read().await;

        let cycles = graph.detect_cycles();
        if cycles.has_cycles {
            let paths: Vec<&str> = cycles.cycles.iter().map(|c| c.description.as_str()).collect();
            tracing::warn!(
                campaign_id,
                branch_id,
                cycles = ?paths,
                "dependency cycles present, proceeding with best-effort order"
            );
        }

        let requested: HashSet<&str> = condition_ids.iter().map(String::as_str).collect();
        let sorted = graph.topological_sort();
        let mut order: Vec<String> = sorted
            .order
            .iter()
            .filter_map(|node_id| match parse_node_id(node_id) {
                Some((NodeType::Condition, entity_id)) if requested.contains(entity_id) => {
                    Some(entity_id.to_string())
                }
                _ => None,
            })
            .collect();
        for id in condition_ids {
            if !order.contains(id) {
                order.push(id.clone());
            }
        }
        Ok(order)
    }

    async fn run(
        &self,
        condition_id: &str,
        context: &Value,
        trace: &mut TraceRecorder,
    ) -> Result<Value, String> {
        let fetched = match self.store.find_condition(condition_id).await {
            Ok(fetched) => fetched,
            Err(err) => {
                trace.record(
                    "Fetched condition",
                    json!({ "conditionId": condition_id }),
                    json!({ "error": err.to_string() }),
                    false,
                );
                return Err(err.to_string());
            }
        };
        let Some(condition) = fetched else {
            trace.record(
                "Fetched condition",
                json!({ "conditionId": condition_id }),
                json!({ "found": false }),
                false,
            );
            return Err(format!("Condition not found: {condition_id}"));
        };
        trace.record(
            "Fetched condition",
            json!({ "conditionId": condition_id }),
            json!({
                "found": true,
                "entityType": condition.entity_type,
                "entityId": condition.entity_id,
                "field": condition.field,
                "priority": condition.priority,
            }),
            true,
        );

        trace.record(
            "Checked condition is active",
            json!({ "conditionId": condition_id }),
            json!({ "isActive": condition.is_active }),
            condition.is_active,
        );
        if !condition.is_active {
            return Err(format!("Condition is not active: {condition_id}"));
        }

        if let Err(messages) = condeval_logic::validate(&condition.expression) {
            trace.record(
                "Validated expression",
                condition.expression.clone(),
                json!({ "errors": messages }),
                false,
            );
            return Err(format!("Invalid expression: {}", messages.join(", ")));
        }
        trace.record(
            "Validated expression",
            condition.expression.clone(),
            json!({ "valid": true }),
            true,
        );

        // The caller's map is used verbatim; anything else is an empty
        // context, not an error.
        let evaluation_context = if context.is_object() {
            context.clone()
        } else {
            Value::Object(Map::new())
        };
        trace.record(
            "Built evaluation context",
            json!({ "provided": context.is_object() }),
            json!({
                "keys": evaluation_context
                    .as_object()
                    .map(|m| m.keys().cloned().collect::<Vec<_>>())
                    .unwrap_or_default()
            }),
            true,
        );

        let value = match condeval_logic::evaluate(&condition.expression, &evaluation_context) {
            Ok(value) => value,
            Err(err) => {
                trace.record(
                    "Evaluated expression",
                    condition.expression.clone(),
                    json!({ "error": err.to_string() }),
                    false,
                );
                return Err(err.to_string());
            }
        };
        trace.record(
            "Evaluated expression",
            condition.expression.clone(),
            json!({ "value": value }),
            condeval_logic::truthy(&value),
        );

        if trace.enabled() {
            let vars = condeval_logic::extract_vars(&condition.expression);
            if !vars.is_empty() {
                let mut resolved = Map::new();
                for path in &vars {
                    let lookup = condeval_logic::evaluate(
                        &json!({ "var": path }),
                        &evaluation_context,
                    )
                    .unwrap_or(Value::Null);
                    resolved.insert(path.clone(), lookup);
                }
                trace.record(
                    "Resolved variables",
                    json!({ "vars": vars.iter().collect::<Vec<_>>() }),
                    Value::Object(resolved),
                    true,
                );
            }
        }

        Ok(value)
    }
}

fn normalize_branch(branch_id: &str) -> &str {
    if branch_id.is_empty() {
        DEFAULT_BRANCH
    } else {
        branch_id
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn dedup(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}
