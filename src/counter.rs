use chrono::{DateTime, SecondsFormat, Utc};

use crate::store::{KeyValueStore, StoreError};

pub const LAST_CALL_KEY: &str = "LastCall";
pub const TOTAL_CALL_COUNT_KEY: &str = "TotalCallCount";

/// Marker rendered when no previous call has been recorded.
const NEVER: &str = "never";

#[derive(Debug, Clone)]
pub struct CounterSettings {
    /// Environment/instance label echoed in every response.
    pub instance_label: String,
}

/// Outcome of one successful invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterResponse {
    pub current_time: DateTime<Utc>,
    /// `LastCall` as it was before this invocation overwrote it.
    pub previous_call_time: Option<String>,
    pub total_call_count: u64,
    pub instance_label: String,
}

impl std::fmt::Display for CounterResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Welcome! Date & time (UTC): {}. Env: {}. {} calls to this function. Last call date: {}",
            format_timestamp(self.current_time),
            self.instance_label,
            self.total_call_count,
            self.previous_call_time.as_deref().unwrap_or(NEVER),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    StoreFailure(StoreError),
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HandlerError::StoreFailure(e) => Some(e),
        }
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerError::StoreFailure(e) => write!(f, "counter store failure: {}", e),
        }
    }
}

impl From<StoreError> for HandlerError {
    fn from(e: StoreError) -> Self {
        HandlerError::StoreFailure(e)
    }
}

/// Counts invocations in an external store.
///
/// The service keeps no state between calls, so any number of instances may
/// run against the same store. The read-modify-write is not atomic: two
/// overlapping calls can read the same count and one increment is lost.
#[derive(Clone)]
pub struct CounterService<S> {
    store: S,
    settings: CounterSettings,
}

impl<S: KeyValueStore> CounterService<S> {
    pub fn new(store: S, settings: CounterSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &CounterSettings {
        &self.settings
    }

    /// Record one invocation at `now`.
    ///
    /// The first store failure ends the call. Writes that already succeeded
    /// are left in place.
    pub async fn handle(&self, now: DateTime<Utc>) -> Result<CounterResponse, HandlerError> {
        let previous_call_time = self.store.get_string(LAST_CALL_KEY).await?;
        let raw_count = self.store.get_string(TOTAL_CALL_COUNT_KEY).await?;

        let total_call_count = parse_count(raw_count.as_deref()).saturating_add(1);

        self.store
            .set_string(TOTAL_CALL_COUNT_KEY, &total_call_count.to_string())
            .await?;
        self.store
            .set_string(LAST_CALL_KEY, &format_timestamp(now))
            .await?;

        Ok(CounterResponse {
            current_time: now,
            previous_call_time: previous_call_time.filter(|s| !s.is_empty()),
            total_call_count,
            instance_label: self.settings.instance_label.clone(),
        })
    }
}

/// Stored count, or 0 when absent or not a non-negative integer.
fn parse_count(raw: Option<&str>) -> u64 {
    let Some(raw) = raw else {
        return 0;
    };
    match raw.trim().parse::<u64>() {
        Ok(n) => n,
        Err(e) => {
            tracing::debug!(value = raw, error = %e, "unparsable call count, restarting at 0");
            0
        }
    }
}

/// ISO-8601 UTC with microseconds and a `Z` suffix.
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}
