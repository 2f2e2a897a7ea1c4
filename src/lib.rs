pub mod clock;
pub mod config;
pub mod counter;
pub mod handlers;
pub mod store;
pub mod workers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use clock::Clock;
use counter::CounterService;
use store::KeyValueStore;

/// GET-only surface; anything larger than this is not a valid request.
const MAX_BODY_SIZE: usize = 16 * 1024;

/// Shared application state passed to all handlers.
pub struct AppState<S> {
    pub counter: CounterService<S>,
    pub clock: Arc<dyn Clock>,
}

impl<S: Clone> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            counter: self.counter.clone(),
            clock: self.clock.clone(),
        }
    }
}

pub fn build_router<S: KeyValueStore>(state: AppState<S>) -> Router {
    Router::new()
        // One counter endpoint, also reachable under the function-style path
        // existing callers use. Both routes share the same keys.
        .route("/", get(handlers::counter::counter::<S>))
        .route("/api/HttpFunction", get(handlers::counter::counter::<S>))
        .route("/health", get(handlers::health::health::<S>))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
