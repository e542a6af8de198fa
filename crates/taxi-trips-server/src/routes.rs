use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use taxi_trips_core::{QueryError, Trip, TripPage};
use tracing::error;

use crate::AppState;

/// Page size used when the request does not name one.
pub const DEFAULT_N_RESULTS: usize = 100;

fn default_n_results() -> usize {
    DEFAULT_N_RESULTS
}

/// `GET /trips` query parameters.
#[derive(Debug, Deserialize)]
pub struct TripsQuery {
    /// Exclusive lower bound on pickup time, epoch milliseconds.
    pub from_ms: i64,
    #[serde(default = "default_n_results")]
    pub n_results: usize,
}

/// `GET /trips` body.
///
/// A non-empty page carries `trips` and `next_from_ms`; an empty one only
/// carries `message`.
#[derive(Debug, Default, Serialize)]
pub struct TripsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trips: Option<Vec<Trip>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_from_ms: Option<i64>,
    pub message: String,
}

impl From<TripPage> for TripsResponse {
    fn from(page: TripPage) -> Self {
        if page.is_empty() {
            return Self {
                message: "No trips found for the given time range.".to_string(),
                ..Default::default()
            };
        }
        Self {
            message: format!("Success. Returned {} trips.", page.trips.len()),
            next_from_ms: page.next_from_ms,
            trips: Some(page.trips),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error_code: &'static str,
    error_message: String,
}

/// Query failures rendered as `500` with a JSON body.
#[derive(Debug)]
pub struct ApiError(QueryError);

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn error_code(&self) -> &'static str {
        match self.0 {
            QueryError::Cache { .. } => "PARTITION_UNAVAILABLE",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Trips query failed: {}", self.0);
        let body = ErrorBody {
            error_code: self.error_code(),
            error_message: self.0.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// GET /trips
pub async fn get_trips(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TripsQuery>,
) -> Result<Json<TripsResponse>, ApiError> {
    let page = state.service.query(params.from_ms, params.n_results).await?;
    Ok(Json(page.into()))
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy!" })
}
