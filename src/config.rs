use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use std::env;
use std::time::Duration;

use crate::counter::CounterSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    /// Process-local map; counts reset on restart and are not shared.
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: Option<String>,
    pub redis_db: u8,
    /// Key prefix in the store and the label shown in responses.
    pub instance_name: String,
    pub redis_timeout_ms: u64,
    pub store_backend: StoreBackend,
    pub port: u16,
    pub debug: bool,
    pub log_json: bool,
    /// 0 disables the timer worker.
    pub timer_interval_secs: u64,
    pub probe_key: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("redis_host", &self.redis_host)
            .field("redis_port", &self.redis_port)
            .field(
                "redis_password",
                &self.redis_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redis_db", &self.redis_db)
            .field("instance_name", &self.instance_name)
            .field("redis_timeout_ms", &self.redis_timeout_ms)
            .field("store_backend", &self.store_backend)
            .field("port", &self.port)
            .field("debug", &self.debug)
            .field("log_json", &self.log_json)
            .field("timer_interval_secs", &self.timer_interval_secs)
            .field("probe_key", &self.probe_key)
            .finish()
    }
}

fn parse_env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(v) => match v.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!("invalid {} value '{}', using default", name, v);
                default
            }
        },
        Err(_) => default,
    }
}

fn default_instance_name() -> String {
    gethostname::gethostname()
        .into_string()
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "local".into())
}

impl Config {
    pub fn from_env() -> Self {
        let redis_host = env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".into());
        let redis_port: u16 = parse_env_or("REDIS_PORT", 6379);
        let redis_password = env::var("REDIS_PASSWORD").ok().filter(|s| !s.is_empty());
        let redis_db: u8 = parse_env_or("REDIS_DB", 0);
        let instance_name = env::var("REDIS_INSTANCE_NAME")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(default_instance_name);
        let redis_timeout_ms: u64 = parse_env_or("REDIS_TIMEOUT_MS", 2000);
        let store_backend: StoreBackend = parse_env_or("STORE_BACKEND", StoreBackend::Redis);

        let port: u16 = parse_env_or("PORT", 7071);
        let debug = env::var("COUNTER_DEBUG").is_ok_and(|v| !v.is_empty());
        let log_json = env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

        let timer_interval_secs: u64 = parse_env_or("TIMER_INTERVAL_SECS", 15);
        let probe_key = env::var("PROBE_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "mykey".into());

        assert!(redis_timeout_ms > 0, "REDIS_TIMEOUT_MS must be > 0");

        Self {
            redis_host,
            redis_port,
            redis_password,
            redis_db,
            instance_name,
            redis_timeout_ms,
            store_backend,
            port,
            debug,
            log_json,
            timer_interval_secs,
            probe_key,
        }
    }

    pub fn redis_url(&self) -> String {
        match &self.redis_password {
            Some(pw) => format!(
                "redis://:{}@{}:{}/{}",
                utf8_percent_encode(pw, NON_ALPHANUMERIC),
                self.redis_host,
                self.redis_port,
                self.redis_db
            ),
            None => format!(
                "redis://{}:{}/{}",
                self.redis_host, self.redis_port, self.redis_db
            ),
        }
    }

    pub fn redis_timeout(&self) -> Duration {
        Duration::from_millis(self.redis_timeout_ms)
    }

    pub fn counter_settings(&self) -> CounterSettings {
        CounterSettings {
            instance_label: self.instance_name.clone(),
        }
    }
}
