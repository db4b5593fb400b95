use std::sync::Arc;
use std::time::Duration;

use courseboard_queue::{
    InMemoryJobStore, JobAdmin, JobRegistry, PostgresJobStore, Scheduler, SchedulerConfig,
    SharedJobStore,
};

#[tokio::main]
async fn main() {
    courseboard_observability::init();

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let store: SharedJobStore = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await
                .expect("failed to connect to DATABASE_URL");
            let store = PostgresJobStore::new(pool);
            store
                .ensure_schema()
                .await
                .expect("failed to ensure jobs schema");
            Arc::new(store)
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; using in-memory job store (dev only)");
            Arc::new(InMemoryJobStore::new())
        }
    };

    // Definitions must be in place before the poller starts.
    let mut registry = JobRegistry::new();
    courseboard_api::jobs::register_all(&mut registry);

    let mut config = SchedulerConfig::default();
    if let Ok(raw) = std::env::var("POLL_INTERVAL_SECS") {
        match raw.parse::<u64>() {
            Ok(secs) if secs > 0 => config = config.with_poll_interval(Duration::from_secs(secs)),
            _ => tracing::warn!(value = %raw, "ignoring invalid POLL_INTERVAL_SECS"),
        }
    }

    let scheduler = Scheduler::new(store.clone(), Arc::new(registry), config).spawn();
    tracing::info!("job queue started");

    let app = courseboard_api::app::build_app(JobAdmin::new(store));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {bind_addr}: {e}"));
    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    // Let in-flight handlers finish before the process exits.
    scheduler.shutdown().await;
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
    tracing::info!("shutdown signal received");
}
