use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use super::common::{created_response, success_response};
use crate::{
    errors::ServiceError,
    handlers::AppState,
    services::registry::{CreateBinInput, CreateItemInput, CreateWarehouseInput, UpdateItemInput},
};

#[derive(Debug, Default, Deserialize)]
pub struct ListItemsQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

async fn create_item(
    State(state): State<AppState>,
    Json(payload): Json<CreateItemInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state.services.registry.create_item(payload).await?;
    Ok(created_response(item))
}

async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ListItemsQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let items = state
        .services
        .registry
        .list_items(query.include_inactive)
        .await?;
    Ok(success_response(items))
}

async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.services.registry.get_item(item_id).await?))
}

async fn update_item(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
    Json(payload): Json<UpdateItemInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state.services.registry.update_item(item_id, payload).await?;
    Ok(success_response(item))
}

async fn deactivate_item(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state.services.registry.deactivate_item(item_id).await?;
    Ok(success_response(item))
}

async fn create_warehouse(
    State(state): State<AppState>,
    Json(payload): Json<CreateWarehouseInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let warehouse = state.services.registry.create_warehouse(payload).await?;
    Ok(created_response(warehouse))
}

async fn list_warehouses(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(
        state.services.registry.list_warehouses().await?,
    ))
}

async fn create_bin(
    State(state): State<AppState>,
    Path(warehouse_id): Path<i64>,
    Json(payload): Json<CreateBinInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let bin = state
        .services
        .registry
        .create_bin(warehouse_id, payload)
        .await?;
    Ok(created_response(bin))
}

async fn list_bins(
    State(state): State<AppState>,
    Path(warehouse_id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(
        state.services.registry.list_bins(warehouse_id).await?,
    ))
}

pub fn registry_routes() -> Router<AppState> {
    Router::new()
        .route("/items", post(create_item).get(list_items))
        .route("/items/:id", get(get_item).put(update_item))
        .route("/items/:id/deactivate", post(deactivate_item))
        .route("/warehouses", post(create_warehouse).get(list_warehouses))
        .route("/warehouses/:id/bins", post(create_bin).get(list_bins))
}
