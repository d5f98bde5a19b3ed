use crate::services::metrics::get_metrics;
use crate::startup::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use service_core::error::AppError;

pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Ready only when the database answers.
pub async fn ready(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    state.db.health_check().await?;
    Ok(StatusCode::OK)
}

pub async fn metrics() -> impl IntoResponse {
    get_metrics()
}
