use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;

use cache_counter::clock::{Clock, SystemClock};
use cache_counter::config::{Config, StoreBackend};
use cache_counter::counter::CounterService;
use cache_counter::store::{KeyValueStore, MemoryStore, RedisStore};
use cache_counter::workers::timer::{Schedule, spawn_timer};
use cache_counter::{AppState, build_router};

#[tokio::main]
async fn main() {
    // Load config
    let config = Config::from_env();

    // Initialize tracing
    let log_level = if config.debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("cache_counter={log_level},tower_http=info").into());
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::debug!(?config, "configuration loaded");

    match config.store_backend {
        StoreBackend::Redis => {
            let store = RedisStore::connect(
                &config.redis_url(),
                &config.instance_name,
                config.redis_timeout(),
            )
            .await
            .expect("failed to connect to Redis");

            tracing::info!(
                host = config.redis_host,
                port = config.redis_port,
                instance = config.instance_name,
                "connected to Redis"
            );
            run(store, config).await;
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store, counts are local to this process");
            run(MemoryStore::new(), config).await;
        }
    }
}

async fn run<S: KeyValueStore>(store: S, config: Config) {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    match Schedule::every(Duration::from_secs(config.timer_interval_secs)) {
        Some(schedule) => {
            spawn_timer(schedule, clock.clone(), shutdown_rx.clone());
        }
        None if config.timer_interval_secs == 0 => {
            tracing::info!("timer disabled (TIMER_INTERVAL_SECS=0)");
        }
        None => {
            tracing::warn!(
                interval_secs = config.timer_interval_secs,
                "TIMER_INTERVAL_SECS out of range, timer disabled"
            );
        }
    }

    let state = AppState {
        counter: CounterService::new(store, config.counter_settings()),
        clock,
    };
    let app = build_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");

    tracing::info!(port = config.port, "counter function starting");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .expect("server error");
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");

    // Notify workers to exit
    let _ = shutdown_tx.send(true);

    tracing::info!("shutdown complete");
}
