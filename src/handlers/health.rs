use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::AppState;
use crate::store::KeyValueStore;

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    instance: String,
}

/// Liveness only; the store is not contacted.
pub async fn health<S: KeyValueStore>(State(state): State<AppState<S>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthBody {
            status: "ok",
            instance: state.counter.settings().instance_label.clone(),
        }),
    )
}
