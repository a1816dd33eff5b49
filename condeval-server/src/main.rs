use std::sync::Arc;
use std::time::Instant;

use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use condeval_cache::ResultCache;
use condeval_engine::{Engine, Evaluation};
use condeval_events::{InvalidationRouter, RedisSubscriber};
use condeval_graph::GraphCoordinator;
use condeval_store::{PgRuleStore, RuleStore};

use condeval_server::config::AppConfig;
use condeval_server::grpc::ConditionEngineService;
use condeval_server::health::{self, HealthState};
use condeval_server::proto::condition_engine_server::ConditionEngineServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    let store: Arc<dyn RuleStore> = Arc::new(PgRuleStore::new(pool.clone()));
    let cache: ResultCache<Evaluation> = ResultCache::new(config.cache);
    let graphs = Arc::new(GraphCoordinator::new(store.clone()));
    let engine = Arc::new(Engine::new(store, cache.clone(), graphs.clone()));

    let shutdown = CancellationToken::new();
    let sweeper = cache.spawn_sweeper(shutdown.clone());

    let router = Arc::new(InvalidationRouter::new(cache.clone(), graphs.clone()));
    let subscriber = RedisSubscriber::new(config.bus.clone(), router, shutdown.clone());
    let bus_connected = subscriber.connected_flag();
    let bus_task = subscriber.spawn();

    let health_state = HealthState {
        pool: pool.clone(),
        bus_connected,
        started_at: Instant::now(),
    };
    let http_listener =
        tokio::net::TcpListener::bind(("0.0.0.0", config.http_port)).await?;
    let health_task = tokio::spawn(async move {
        if let Err(err) = axum::serve(http_listener, health::router(health_state)).await {
            tracing::error!(error = %err, "health listener failed");
        }
    });

    let grpc_addr: std::net::SocketAddr = config.grpc_addr.parse()?;
    let service = ConditionEngineService::new(engine, cache.clone(), graphs);
    tracing::info!(
        grpc = %grpc_addr,
        http_port = config.http_port,
        "condeval worker listening"
    );

    tonic::transport::Server::builder()
        .add_service(ConditionEngineServer::new(service))
        .serve_with_shutdown(grpc_addr, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    // Drain: stop background tasks, drop cached state, release the pool.
    tracing::info!("shutting down");
    shutdown.cancel();
    let _ = sweeper.await;
    let _ = bus_task.await;
    health_task.abort();
    cache.clear();
    pool.close().await;
    Ok(())
}
