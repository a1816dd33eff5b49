//! The tonic service implementation.
//!
//! Handlers are deliberately thin: parse `context_json`, call the
//! engine/coordinator/cache, convert to proto. Evaluation failures are
//! payloads (`success = false`), not gRPC errors; only malformed
//! campaign/branch ids and store failures surface as `Status`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tonic::{Request, Response, Status};

use condeval_cache::ResultCache;
use condeval_engine::{Engine, Evaluation};
use condeval_graph::{parse_node_id, GraphCoordinator, GraphError, NodeType, DEFAULT_BRANCH};

use crate::proto;
use crate::proto::condition_engine_server::ConditionEngine;

pub struct ConditionEngineService {
    engine: Arc<Engine>,
    cache: ResultCache<Evaluation>,
    graphs: Arc<GraphCoordinator>,
}

impl ConditionEngineService {
    pub fn new(
        engine: Arc<Engine>,
        cache: ResultCache<Evaluation>,
        graphs: Arc<GraphCoordinator>,
    ) -> Self {
        ConditionEngineService {
            engine,
            cache,
            graphs,
        }
    }
}

#[tonic::async_trait]
impl ConditionEngine for ConditionEngineService {
    async fn evaluate_condition(
        &self,
        request: Request<proto::EvaluateConditionRequest>,
    ) -> Result<Response<proto::EvaluationResult>, Status> {
        let req = request.into_inner();
        let context = match parse_context(&req.context_json) {
            Ok(context) => context,
            Err(message) => return Ok(Response::new(failure(message))),
        };
        let evaluation = self
            .engine
            .evaluate(
                &req.condition_id,
                &context,
                &req.campaign_id,
                &req.branch_id,
                req.include_trace,
            )
            .await;
        Ok(Response::new(to_proto(evaluation)))
    }

    async fn evaluate_conditions(
        &self,
        request: Request<proto::EvaluateConditionsRequest>,
    ) -> Result<Response<proto::EvaluateConditionsResponse>, Status> {
        let started = Instant::now();
        let req = request.into_inner();

        let context = match parse_context(&req.context_json) {
            Ok(context) => context,
            Err(message) => {
                // Bad context fails every requested id without touching
                // the engine.
                let results = req
                    .condition_ids
                    .iter()
                    .map(|id| (id.clone(), failure(message.clone())))
                    .collect();
                return Ok(Response::new(proto::EvaluateConditionsResponse {
                    results,
                    total_evaluation_time_ms: elapsed_ms(started),
                    evaluation_order: Vec::new(),
                }));
            }
        };

        let batch = if req.use_dependency_order {
            self.engine
                .evaluate_many(
                    &req.condition_ids,
                    &context,
                    &req.campaign_id,
                    &req.branch_id,
                    req.include_trace,
                )
                .await
        } else {
            let mut batch = condeval_engine::BatchEvaluation::default();
            let mut seen = HashSet::new();
            for id in &req.condition_ids {
                if !seen.insert(id.as_str()) {
                    continue;
                }
                let evaluation = self
                    .engine
                    .evaluate(
                        id,
                        &context,
                        &req.campaign_id,
                        &req.branch_id,
                        req.include_trace,
                    )
                    .await;
                batch.results.insert(id.clone(), evaluation);
                batch.order.push(id.clone());
            }
            batch
        };

        Ok(Response::new(proto::EvaluateConditionsResponse {
            results: batch
                .results
                .into_iter()
                .map(|(id, evaluation)| (id, to_proto(evaluation)))
                .collect(),
            total_evaluation_time_ms: elapsed_ms(started),
            evaluation_order: batch.order,
        }))
    }

    async fn get_evaluation_order(
        &self,
        request: Request<proto::GetEvaluationOrderRequest>,
    ) -> Result<Response<proto::GetEvaluationOrderResponse>, Status> {
        let req = request.into_inner();
        let sorted = self
            .graphs
            .evaluation_order(&req.campaign_id, &req.branch_id)
            .await
            .map_err(to_status)?;
        let requested: HashSet<&str> = req.condition_ids.iter().map(String::as_str).collect();
        let node_ids: Vec<String> = sorted
            .order
            .iter()
            .filter(|node_id| match parse_node_id(node_id) {
                Some((NodeType::Condition, entity_id)) => requested.contains(entity_id),
                _ => false,
            })
            .cloned()
            .collect();
        Ok(Response::new(proto::GetEvaluationOrderResponse {
            node_ids,
            total_nodes: sorted.order.len() as u32,
        }))
    }

    async fn validate_dependencies(
        &self,
        request: Request<proto::ValidateDependenciesRequest>,
    ) -> Result<Response<proto::ValidateDependenciesResponse>, Status> {
        let req = request.into_inner();
        let report = self
            .graphs
            .validate_no_cycles(&req.campaign_id, &req.branch_id)
            .await
            .map_err(to_status)?;
        let message = if report.has_cycles {
            format!("Found {} dependency cycle(s)", report.cycle_count)
        } else {
            "No dependency cycles detected".to_string()
        };
        Ok(Response::new(proto::ValidateDependenciesResponse {
            has_cycle: report.has_cycles,
            cycles: report.cycles.into_iter().map(|c| c.description).collect(),
            message,
        }))
    }

    async fn invalidate_cache(
        &self,
        request: Request<proto::InvalidateCacheRequest>,
    ) -> Result<Response<proto::InvalidateCacheResponse>, Status> {
        let req = request.into_inner();
        let branch_id = normalize_branch(&req.branch_id);

        let invalidated = if req.node_ids.is_empty() {
            self.cache.invalidate_by_prefix(&req.campaign_id, Some(branch_id))
        } else {
            req.node_ids
                .iter()
                .filter(|node_id| {
                    self.cache.invalidate(&condeval_cache::CacheKey::new(
                        req.campaign_id.clone(),
                        branch_id,
                        node_id.as_str(),
                    ))
                })
                .count()
        };

        // The graph goes with the cached results either way.
        if let Err(err) = self.graphs.invalidate(&req.campaign_id, branch_id) {
            if matches!(err, GraphError::InvalidId(_)) {
                return Err(to_status(err));
            }
        }

        Ok(Response::new(proto::InvalidateCacheResponse {
            invalidated_count: invalidated as u32,
            message: format!("Invalidated {invalidated} cache entries"),
        }))
    }

    async fn get_cache_stats(
        &self,
        request: Request<proto::GetCacheStatsRequest>,
    ) -> Result<Response<proto::GetCacheStatsResponse>, Status> {
        let req = request.into_inner();
        let stats = self.cache.stats();
        // No campaign scope, no key material: encoded keys would leak
        // campaign and branch names to any caller.
        let sample_keys = if req.campaign_id.is_empty() {
            Vec::new()
        } else {
            let branch_id = if req.branch_id.is_empty() {
                None
            } else {
                Some(req.branch_id.as_str())
            };
            let mut keys = self.cache.keys_by_prefix(&req.campaign_id, branch_id);
            keys.sort();
            keys.truncate(10);
            keys
        };
        Ok(Response::new(proto::GetCacheStatsResponse {
            hits: stats.hits,
            misses: stats.misses,
            keys: stats.keys as u64,
            ksize: stats.ksize as u64,
            vsize: stats.vsize as u64,
            hit_rate: stats.hit_rate,
            sample_keys,
        }))
    }
}

fn parse_context(context_json: &str) -> Result<Value, String> {
    if context_json.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(context_json).map_err(|err| format!("Invalid context JSON: {err}"))
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

fn failure(message: String) -> proto::EvaluationResult {
    proto::EvaluationResult {
        success: false,
        value_json: String::new(),
        error: message,
        trace: Vec::new(),
        evaluation_time_ms: 0,
    }
}

fn to_proto(evaluation: Evaluation) -> proto::EvaluationResult {
    proto::EvaluationResult {
        success: evaluation.success,
        value_json: evaluation.value_json.unwrap_or_default(),
        error: evaluation.error.unwrap_or_default(),
        trace: evaluation
            .trace
            .into_iter()
            .map(|step| proto::TraceStep {
                step: step.step,
                description: step.description,
                input_json: step.input_json,
                output_json: step.output_json,
                passed: step.passed,
            })
            .collect(),
        evaluation_time_ms: evaluation.evaluation_time_ms,
    }
}

fn to_status(err: GraphError) -> Status {
    match err {
        GraphError::InvalidId(message) => Status::invalid_argument(message),
        GraphError::Store(err) => Status::unavailable(err.to_string()),
        other => Status::internal(other.to_string()),
    }
}
