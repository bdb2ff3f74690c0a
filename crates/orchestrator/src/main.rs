use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use orchestrator_core::config::OrchestratorConfig;
use orchestrator_core::consumer::QueueConsumer;
use orchestrator_core::executor::ExecutorDeps;
use orchestrator_core::outbox::OutboxPublisher;
use orchestrator_core::ports::Queue;
use orchestrator_core::registry::JobContextRegistry;
use orchestrator_core::signature::Ed25519Verifier;
use orchestrator_core::sweeper::TimeoutSweeper;
use orchestrator_postgres::{PgStore, RedisLeaseStore, RedisQueue};
use orchestrator_router_client::HttpRouterClient;

const QUEUE_TOPIC: &str = "orchestrator:jobs";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    orchestrator_analysis::install();

    let config = OrchestratorConfig::from_env();
    info!(database_url = %config.database_url, redis_url = %config.redis_url, "starting orchestrator");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    let store = Arc::new(PgStore::new(pool));

    let lease_store = Arc::new(RedisLeaseStore::connect(&config.redis_url).await?);
    let queue = Arc::new(RedisQueue::connect(&config.redis_url).await?);

    let router_client = Arc::new(
        HttpRouterClient::from_env().unwrap_or_else(|_| HttpRouterClient::new("http://localhost:9000")),
    );
    let signature_verifier = Arc::new(Ed25519Verifier);

    let registry = JobContextRegistry::new();
    let executor_deps = ExecutorDeps::new(store.clone(), router_client, signature_verifier);
    let consumer = Arc::new(QueueConsumer::new(store.clone(), lease_store, registry, config.clone()));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let outbox_publisher = OutboxPublisher::new(store.clone(), queue.clone(), config.clone());
    let outbox_shutdown = shutdown_rx.clone();
    let outbox_task = tokio::spawn(async move { outbox_publisher.run(outbox_shutdown).await });

    let sweeper = TimeoutSweeper::new(store.clone(), config.clone());
    let sweeper_shutdown = shutdown_rx.clone();
    let sweeper_task = tokio::spawn(async move { sweeper.run(sweeper_shutdown).await });

    let consumer_shutdown = shutdown_rx.clone();
    let consumer_queue = queue.clone();
    let consumer_task = tokio::spawn(async move {
        run_consumer_loop(consumer, consumer_queue, consumer_shutdown, executor_deps).await
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(outbox_task, sweeper_task, consumer_task);
    Ok(())
}

async fn run_consumer_loop<S, L, QU, Q, V>(
    consumer: Arc<QueueConsumer<S, L>>,
    queue: Arc<QU>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
    executor_deps: ExecutorDeps<S, Q, V>,
) where
    S: orchestrator_core::ports::Store,
    L: orchestrator_core::ports::LeaseStore,
    QU: orchestrator_core::ports::Queue,
    Q: orchestrator_core::ports::RouterClient + orchestrator_core::ports::RegionProbe,
    V: orchestrator_core::ports::SignatureVerifier,
{
    loop {
        if *shutdown.borrow() {
            return;
        }
        tokio::select! {
            popped = queue.pop(QUEUE_TOPIC, orchestrator_core::consumer::default_poll_timeout()) => {
                match popped {
                    Ok(Some(payload)) => {
                        if let Err(e) = consumer.handle_envelope(&payload, &executor_deps).await {
                            error!(error = %e, "envelope handling failed");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(error = %e, "queue pop failed");
                        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("queue consumer shutting down");
                    return;
                }
            }
        }
    }
}
