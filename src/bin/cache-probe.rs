//! Writes a value to the configured store, waits a second and reads it back.
//! Useful to check connectivity before deploying the counter function.

use std::process::ExitCode;
use std::time::Duration;

use cache_counter::config::{Config, StoreBackend};
use cache_counter::counter::format_timestamp;
use cache_counter::store::{KeyValueStore, MemoryStore, RedisStore, StoreError};

const READ_BACK_DELAY: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cache_probe=info,cache_counter=info".into()),
        )
        .init();

    tracing::info!("welcome to the cache probe");

    let result = match config.store_backend {
        StoreBackend::Redis => {
            tracing::info!(
                host = config.redis_host,
                port = config.redis_port,
                "initializing connection to the Redis instance"
            );
            match RedisStore::connect(
                &config.redis_url(),
                &config.instance_name,
                config.redis_timeout(),
            )
            .await
            {
                Ok(store) => probe(&store, &config.probe_key).await,
                Err(e) => Err(e),
            }
        }
        StoreBackend::Memory => probe(&MemoryStore::new(), &config.probe_key).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "error while testing the cache");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the value read back matches the one written.
async fn probe<S: KeyValueStore>(store: &S, key: &str) -> Result<bool, StoreError> {
    let expected = format!(
        "value inserted in Redis cache at {}",
        format_timestamp(chrono::Utc::now())
    );

    tracing::info!(key, "set key");
    store.set_string(key, &expected).await?;

    tokio::time::sleep(READ_BACK_DELAY).await;

    let retrieved = store.get_string(key).await?;
    let matches = retrieved.as_deref() == Some(expected.as_str());

    if matches {
        tracing::info!(
            key,
            retrieved = retrieved.as_deref().unwrap_or(""),
            expected,
            "retrieved value matches"
        );
    } else {
        tracing::warn!(
            key,
            retrieved = retrieved.as_deref().unwrap_or("<missing>"),
            expected,
            "retrieved value differs from the one written"
        );
    }

    Ok(matches)
}
