//! sat-worker entry point.
//!
//! Thin by design: loads config, wires the Postgres `Store` and Redis
//! `Broker`, installs shutdown signal handling, and runs the worker loop.

use anyhow::Context;
use sat_worker::{Worker, WorkerConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = sat_config::Config::from_env().context("failed to load configuration")?;

    init_tracing();

    let pg_pool = sat_store::connect(&cfg.postgres.connection_url(), cfg.postgres.pool_max)
        .await
        .context("failed to connect to Postgres")?;
    sat_store::migrate(&pg_pool).await.context("failed to run migrations")?;
    let store: Arc<dyn sat_core::Store> = Arc::new(sat_store::PgStore::new(pg_pool));

    let broker_pool = sat_broker::BrokerPool::connect(&cfg.redis.connection_url(), cfg.redis.pool_max)
        .await
        .context("failed to connect to redis")?;
    let broker: Arc<dyn sat_core::Broker> =
        Arc::new(sat_broker::RedisBroker::new(broker_pool, cfg.job_ttl_s));

    let worker = Worker::new(
        store,
        broker,
        WorkerConfig {
            poll_timeout_s: cfg.worker_poll_timeout_s,
            solver_path_fast: cfg.solver_path_fast.clone(),
        },
    );

    let running = Arc::new(AtomicBool::new(true));
    install_signal_handlers(running.clone());

    worker.run_forever(running).await;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn install_signal_handlers(running: Arc<AtomicBool>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let r = running.clone();
        tokio::spawn(async move {
            sigterm.recv().await;
            info!("received SIGTERM, shutting down after current job");
            r.store(false, Ordering::SeqCst);
        });
    }

    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received SIGINT, shutting down after current job");
        running.store(false, Ordering::SeqCst);
    });
}
