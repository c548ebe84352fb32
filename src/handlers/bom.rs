use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tracing::info;

use super::common::{created_response, success_response};
use crate::{errors::ServiceError, handlers::AppState, services::bom::CreateBomInput};

#[derive(Debug, Default, Deserialize)]
pub struct FeasibilityQuery {
    /// Omit to sum availability over all warehouses
    pub warehouse_id: Option<i64>,
}

/// Creates the router for BOM endpoints
pub fn bom_routes() -> Router<AppState> {
    Router::new()
        .route("/boms", post(create_bom))
        .route("/boms/:id", get(get_bom))
        .route("/boms/:id/activate", post(activate_bom))
        .route("/boms/:id/feasibility", get(feasibility))
        .route("/items/:id/active-bom", get(active_bom))
}

async fn create_bom(
    State(state): State<AppState>,
    Json(payload): Json<CreateBomInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.services.bom.create_bom(payload).await?;
    info!("BOM created: {} v{}", created.bom.id, created.bom.version);
    Ok(created_response(created))
}

async fn get_bom(
    State(state): State<AppState>,
    Path(bom_id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.services.bom.get_bom(bom_id).await?))
}

async fn activate_bom(
    State(state): State<AppState>,
    Path(bom_id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.services.bom.activate_bom(bom_id).await?))
}

async fn active_bom(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.services.bom.active_bom(item_id).await?))
}

async fn feasibility(
    State(state): State<AppState>,
    Path(bom_id): Path<i64>,
    Query(query): Query<FeasibilityQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let report = state
        .services
        .bom
        .feasibility(bom_id, query.warehouse_id)
        .await?;
    Ok(success_response(report))
}
