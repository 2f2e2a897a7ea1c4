pub mod memory;
pub mod redis;

use std::future::Future;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

/// Scalar string key/value store shared by every instance of the service.
///
/// No atomicity is assumed across keys: callers doing read-modify-write on
/// several keys must tolerate interleaving with other callers.
pub trait KeyValueStore: Clone + Send + Sync + 'static {
    /// Read a key. `Ok(None)` when the key does not exist.
    fn get_string(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Write a key, replacing any previous value.
    fn set_string(
        &self,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection refused, dropped or failed at the IO layer.
    Unavailable(String),
    /// The per-operation deadline elapsed.
    Timeout,
    /// The server answered with an error or an unexpected reply.
    Command(String),
}

impl std::error::Error for StoreError {}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(e) => write!(f, "store unavailable: {}", e),
            StoreError::Timeout => write!(f, "store operation timed out"),
            StoreError::Command(e) => write!(f, "store command failed: {}", e),
        }
    }
}

impl From<::redis::RedisError> for StoreError {
    fn from(e: ::redis::RedisError) -> Self {
        if e.is_timeout() {
            StoreError::Timeout
        } else if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Command(e.to_string())
        }
    }
}
