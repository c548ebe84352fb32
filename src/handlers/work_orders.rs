use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};

use super::common::{created_response, success_response, Principal};
use crate::{
    errors::ServiceError,
    handlers::AppState,
    services::work_orders::{CreateWorkOrderInput, RecordProductionInput},
};

pub fn work_order_routes() -> Router<AppState> {
    Router::new()
        .route("/work-orders", post(create_work_order))
        .route("/work-orders/:id", get(get_work_order))
        .route("/work-orders/:id/production", post(record_production))
}

async fn create_work_order(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<CreateWorkOrderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let work_order = state
        .services
        .work_orders
        .create_work_order(payload, principal.as_str())
        .await?;
    Ok(created_response(work_order))
}

async fn get_work_order(
    State(state): State<AppState>,
    Path(work_order_id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(
        state.services.work_orders.get_work_order(work_order_id).await?,
    ))
}

async fn record_production(
    State(state): State<AppState>,
    principal: Principal,
    Path(work_order_id): Path<i64>,
    Json(payload): Json<RecordProductionInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let result = state
        .services
        .work_orders
        .record_production(work_order_id, payload, principal.as_str())
        .await?;
    Ok(created_response(result))
}
