use axum::{
    extract::{Json, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};

use super::common::success_response;
use crate::{
    errors::ServiceError,
    handlers::AppState,
    services::stock::{ReservationInput, StockFilter},
};

async fn query_stock(
    State(state): State<AppState>,
    Query(filter): Query<StockFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let rows = state.services.stock.query(&filter).await?;
    Ok(success_response(rows))
}

async fn reserve_stock(
    State(state): State<AppState>,
    Json(payload): Json<ReservationInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let row = state.services.stock.reserve(payload).await?;
    Ok(success_response(row))
}

async fn release_stock(
    State(state): State<AppState>,
    Json(payload): Json<ReservationInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let row = state.services.stock.release(payload).await?;
    Ok(success_response(row))
}

pub fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/stock", get(query_stock))
        .route("/stock/reserve", post(reserve_stock))
        .route("/stock/release", post(release_stock))
}
