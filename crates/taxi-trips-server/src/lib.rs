//! HTTP surface of the taxi trips service.
//!
//! Exposes `GET /trips` (cursor-paginated trips from the month containing the
//! cursor) and `GET /health`, optionally timing `/trips` requests into an
//! [`analytics::AnalyticsSink`].

pub mod analytics;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use taxi_trips_core::TripQueryService;
use tower_http::trace::TraceLayer;

use crate::analytics::AnalyticsSink;

/// Shared state for all handlers.
pub struct AppState {
    pub service: TripQueryService,
    pub analytics: Option<Arc<dyn AnalyticsSink>>,
}

impl AppState {
    pub fn new(service: TripQueryService) -> Self {
        Self {
            service,
            analytics: None,
        }
    }

    pub fn with_analytics(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = Some(sink);
        self
    }
}

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut trips: Router<Arc<AppState>> = Router::new().route("/trips", get(routes::get_trips));
    if let Some(sink) = state.analytics.clone() {
        trips = trips.route_layer(middleware::from_fn_with_state(
            sink,
            analytics::record_request_timing,
        ));
    }

    Router::new()
        .merge(trips)
        .route("/health", get(routes::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
