use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::AppState;
use crate::store::KeyValueStore;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Returned on any failure. Error details stay in the logs.
const INTERNAL_ERROR_BODY: &str = "Internal server error.";

/// GET / and GET /api/HttpFunction
pub async fn counter<S: KeyValueStore>(State(state): State<AppState<S>>) -> Response {
    let now = state.clock.now();
    tracing::debug!(
        instance = %state.counter.settings().instance_label,
        "counter request received"
    );

    match state.counter.handle(now).await {
        Ok(payload) => {
            let body = payload.to_string();
            tracing::info!(
                total_calls = payload.total_call_count,
                previous_call = payload.previous_call_time.as_deref().unwrap_or(""),
                "response sent: {body}"
            );
            (StatusCode::OK, [(header::CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "error while processing counter request");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, TEXT_PLAIN)],
                INTERNAL_ERROR_BODY,
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::INTERNAL_ERROR_BODY;
    use crate::clock::ManualClock;
    use crate::counter::{CounterService, CounterSettings, LAST_CALL_KEY, TOTAL_CALL_COUNT_KEY};
    use crate::store::{KeyValueStore, MemoryStore};
    use crate::{AppState, build_router};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()
    }

    fn state<S: KeyValueStore>(store: S, clock: Arc<ManualClock>) -> AppState<S> {
        AppState {
            counter: CounterService::new(
                store,
                CounterSettings {
                    instance_label: "unit".to_string(),
                },
            ),
            clock,
        }
    }

    async fn get(state: AppState<MemoryStore>, uri: &str) -> (StatusCode, String, String) {
        let resp = build_router(state)
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        (
            status,
            content_type,
            String::from_utf8_lossy(&bytes).into_owned(),
        )
    }

    #[tokio::test]
    async fn success_is_plain_text_line() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(start()));

        let (status, content_type, body) = get(state(store.clone(), clock), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "text/plain; charset=utf-8");
        assert!(body.contains("Date & time (UTC): 2025-01-02T03:04:05.000000Z"));
        assert!(body.contains("Env: unit"));
        assert!(body.contains("1 calls to this function"));
        assert!(body.ends_with("Last call date: never"));
        assert_eq!(store.value(TOTAL_CALL_COUNT_KEY).as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn function_route_shares_the_counter() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(start()));

        get(state(store.clone(), clock.clone()), "/").await;
        clock.advance(Duration::seconds(30));
        let (status, _, body) = get(state(store.clone(), clock), "/api/HttpFunction").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("2 calls to this function"));
        assert!(body.ends_with("Last call date: 2025-01-02T03:04:05.000000Z"));
        assert_eq!(
            store.value(LAST_CALL_KEY).as_deref(),
            Some("2025-01-02T03:04:35.000000Z")
        );
    }

    #[tokio::test]
    async fn store_failure_is_generic_500() {
        let store = MemoryStore::failing_at(2);
        let clock = Arc::new(ManualClock::new(start()));

        let (status, content_type, body) = get(state(store, clock), "/").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(content_type, "text/plain; charset=utf-8");
        assert_eq!(body, INTERNAL_ERROR_BODY);
        assert!(!body.contains("injected"));
    }

    #[tokio::test]
    async fn post_is_not_routed() {
        let clock = Arc::new(ManualClock::new(start()));
        let resp = build_router(state(MemoryStore::new(), clock))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn health_reports_instance() {
        let clock = Arc::new(ManualClock::new(start()));
        let store = MemoryStore::new();
        let (status, content_type, body) = get(state(store.clone(), clock), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "application/json");
        let json: serde_json::Value = serde_json::from_str(&body).expect("json body");
        assert_eq!(json["status"], "ok");
        assert_eq!(json["instance"], "unit");
        assert_eq!(store.op_count(), 0);
    }
}
