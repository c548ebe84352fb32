use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};

use super::common::{created_response, success_response, Principal};
use crate::{
    errors::ServiceError, handlers::AppState,
    services::procurement::CreatePurchaseOrderInput,
};

pub fn purchase_order_routes() -> Router<AppState> {
    Router::new()
        .route("/purchase-orders", post(create_purchase_order))
        .route("/purchase-orders/:id", get(get_purchase_order))
}

async fn create_purchase_order(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<CreatePurchaseOrderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let purchase_order = state
        .services
        .purchase_orders
        .create_purchase_order(payload, principal.as_str())
        .await?;
    Ok(created_response(purchase_order))
}

async fn get_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(
        state.services.purchase_orders.get_purchase_order(id).await?,
    ))
}
