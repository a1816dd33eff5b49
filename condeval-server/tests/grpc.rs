use std::sync::Arc;

use serde_json::{json, Value};
use tonic::Request;

use condeval_cache::{CacheConfig, CacheKey, ResultCache};
use condeval_engine::{Engine, Evaluation};
use condeval_graph::{Edge, EdgeType, GraphCoordinator};
use condeval_server::grpc::ConditionEngineService;
use condeval_server::proto;
use condeval_server::proto::condition_engine_server::ConditionEngine;
use condeval_store::{Condition, MemoryStore};

fn condition(id: &str, expression: Value) -> Condition {
    Condition {
        id: id.to_string(),
        campaign_id: "camp".to_string(),
        branch_id: "main".to_string(),
        entity_type: "settlement".to_string(),
        entity_id: "riverton".to_string(),
        field: "flag".to_string(),
        expression,
        is_active: true,
        priority: 0,
        deleted_at: None,
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    cache: ResultCache<Evaluation>,
    graphs: Arc<GraphCoordinator>,
    service: ConditionEngineService,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let cache = ResultCache::new(CacheConfig::default());
    let graphs = Arc::new(GraphCoordinator::new(store.clone()));
    let engine = Arc::new(Engine::new(store.clone(), cache.clone(), graphs.clone()));
    let service = ConditionEngineService::new(engine, cache.clone(), graphs.clone());
    Harness {
        store,
        cache,
        graphs,
        service,
    }
}

#[tokio::test]
async fn evaluate_condition_round_trips() {
    let h = harness();
    h.store.put_condition(condition(
        "prosperous",
        json!({">=": [{"var": "population"}, 5000]}),
    ));

    let response = h
        .service
        .evaluate_condition(Request::new(proto::EvaluateConditionRequest {
            condition_id: "prosperous".to_string(),
            campaign_id: "camp".to_string(),
            branch_id: "main".to_string(),
            context_json: r#"{"population": 6000}"#.to_string(),
            include_trace: false,
        }))
        .await
        .unwrap()
        .into_inner();

    assert!(response.success);
    assert_eq!(response.value_json, "true");
    assert!(response.error.is_empty());
    assert!(response.trace.is_empty());
}

#[tokio::test]
async fn bad_context_json_never_reaches_the_engine() {
    let h = harness();
    h.store
        .put_condition(condition("any", json!({"==": [1, 1]})));

    let response = h
        .service
        .evaluate_condition(Request::new(proto::EvaluateConditionRequest {
            condition_id: "any".to_string(),
            campaign_id: "camp".to_string(),
            branch_id: "main".to_string(),
            context_json: "{broken".to_string(),
            include_trace: false,
        }))
        .await
        .unwrap()
        .into_inner();

    assert!(!response.success);
    assert!(response.error.starts_with("Invalid context JSON:"));
    assert_eq!(h.store.condition_fetches(), 0);
}

#[tokio::test]
async fn batch_reports_order_and_total_time() {
    let h = harness();
    h.store.put_condition(condition("a", json!({"==": [1, 1]})));
    h.store.put_condition(condition("b", json!({"==": [2, 2]})));

    let response = h
        .service
        .evaluate_conditions(Request::new(proto::EvaluateConditionsRequest {
            condition_ids: vec!["b".to_string(), "a".to_string()],
            campaign_id: "camp".to_string(),
            branch_id: "main".to_string(),
            context_json: "{}".to_string(),
            include_trace: false,
            use_dependency_order: false,
        }))
        .await
        .unwrap()
        .into_inner();

    // Without dependency ordering the request order is kept.
    assert_eq!(response.evaluation_order, vec!["b", "a"]);
    assert_eq!(response.results.len(), 2);
    assert!(response.results.values().all(|r| r.success));
}

#[tokio::test]
async fn empty_batch_is_empty_and_instant() {
    let h = harness();
    let response = h
        .service
        .evaluate_conditions(Request::new(proto::EvaluateConditionsRequest {
            condition_ids: Vec::new(),
            campaign_id: "camp".to_string(),
            branch_id: "main".to_string(),
            context_json: "{}".to_string(),
            include_trace: false,
            use_dependency_order: true,
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(response.results.is_empty());
    assert!(response.evaluation_order.is_empty());
}

#[tokio::test]
async fn evaluation_order_is_filtered_to_requested_conditions() {
    let h = harness();
    h.store.put_condition(condition("a", json!({"==": [1, 1]})));
    h.store.put_condition(condition("b", json!({"==": [2, 2]})));

    let response = h
        .service
        .get_evaluation_order(Request::new(proto::GetEvaluationOrderRequest {
            campaign_id: "camp".to_string(),
            branch_id: "main".to_string(),
            condition_ids: vec!["a".to_string()],
        }))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.node_ids, vec!["CONDITION:a"]);
    // Total counts every node in the graph, not just the filtered ones.
    assert!(response.total_nodes > 1);
}

#[tokio::test]
async fn validate_dependencies_surfaces_cycles() {
    let h = harness();
    h.store.put_condition(condition("x", json!({"==": [1, 1]})));
    h.store.put_condition(condition("y", json!({"==": [2, 2]})));

    let graph = h.graphs.graph("camp", "main").await.unwrap();
    {
        let mut graph = graph.write().await;
        graph
            .add_edge(Edge::new("CONDITION:x", "CONDITION:y", EdgeType::DependsOn))
            .unwrap();
        graph
            .add_edge(Edge::new("CONDITION:y", "CONDITION:x", EdgeType::DependsOn))
            .unwrap();
    }

    let response = h
        .service
        .validate_dependencies(Request::new(proto::ValidateDependenciesRequest {
            campaign_id: "camp".to_string(),
            branch_id: "main".to_string(),
        }))
        .await
        .unwrap()
        .into_inner();

    assert!(response.has_cycle);
    assert_eq!(response.cycles.len(), 1);
    assert!(response.cycles[0].contains(" -> "));
    assert!(response.message.contains("1"));
}

#[tokio::test]
async fn validate_dependencies_on_a_clean_graph() {
    let h = harness();
    h.store.put_condition(condition("a", json!({"==": [1, 1]})));
    let response = h
        .service
        .validate_dependencies(Request::new(proto::ValidateDependenciesRequest {
            campaign_id: "camp".to_string(),
            branch_id: "main".to_string(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(!response.has_cycle);
    assert!(response.cycles.is_empty());
    assert_eq!(response.message, "No dependency cycles detected");
}

#[tokio::test]
async fn invalid_campaign_id_is_an_invalid_argument() {
    let h = harness();
    let status = h
        .service
        .validate_dependencies(Request::new(proto::ValidateDependenciesRequest {
            campaign_id: "not a valid id".to_string(),
            branch_id: "main".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::InvalidArgument);
}

#[tokio::test]
async fn invalidate_cache_counts_targeted_entries_and_drops_the_graph() {
    let h = harness();
    h.store.put_condition(condition("a", json!({"==": [1, 1]})));
    h.store.put_condition(condition("b", json!({"==": [2, 2]})));
    for id in ["a", "b"] {
        h.cache.set(
            &CacheKey::new("camp", "main", format!("CONDITION:{id}")),
            Evaluation::failure("seed", Vec::new(), 0),
            None,
        );
    }
    let graph_before = h.graphs.graph("camp", "main").await.unwrap();

    let response = h
        .service
        .invalidate_cache(Request::new(proto::InvalidateCacheRequest {
            campaign_id: "camp".to_string(),
            branch_id: "main".to_string(),
            node_ids: vec!["CONDITION:a".to_string(), "CONDITION:ghost".to_string()],
        }))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.invalidated_count, 1);
    assert!(h.cache.has(&CacheKey::new("camp", "main", "CONDITION:b")));

    let graph_after = h.graphs.graph("camp", "main").await.unwrap();
    assert!(!Arc::ptr_eq(&graph_before, &graph_after));
}

#[tokio::test]
async fn invalidate_cache_without_node_ids_clears_the_branch() {
    let h = harness();
    for id in ["a", "b", "c"] {
        h.cache.set(
            &CacheKey::new("camp", "main", format!("CONDITION:{id}")),
            Evaluation::failure("seed", Vec::new(), 0),
            None,
        );
    }
    h.cache.set(
        &CacheKey::new("camp", "alt", "CONDITION:a"),
        Evaluation::failure("seed", Vec::new(), 0),
        None,
    );

    let response = h
        .service
        .invalidate_cache(Request::new(proto::InvalidateCacheRequest {
            campaign_id: "camp".to_string(),
            branch_id: String::new(),
            node_ids: Vec::new(),
        }))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.invalidated_count, 3);
    assert!(h.cache.has(&CacheKey::new("camp", "alt", "CONDITION:a")));
}

#[tokio::test]
async fn cache_stats_sample_is_scoped_and_guarded() {
    let h = harness();
    for id in ["a", "b"] {
        h.cache.set(
            &CacheKey::new("camp", "main", format!("CONDITION:{id}")),
            Evaluation::failure("seed", Vec::new(), 0),
            None,
        );
    }

    let scoped = h
        .service
        .get_cache_stats(Request::new(proto::GetCacheStatsRequest {
            campaign_id: "camp".to_string(),
            branch_id: "main".to_string(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(scoped.keys, 2);
    assert_eq!(scoped.sample_keys.len(), 2);

    // Without a campaign scope the sample must stay empty.
    let unscoped = h
        .service
        .get_cache_stats(Request::new(proto::GetCacheStatsRequest {
            campaign_id: String::new(),
            branch_id: String::new(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(unscoped.keys, 2);
    assert!(unscoped.sample_keys.is_empty());
}
