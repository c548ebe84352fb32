use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;

use super::common::success_response;
use crate::{errors::ServiceError, handlers::AppState, services::ledger::LedgerFilter};

#[derive(Debug, Deserialize)]
pub struct ReconcileQuery {
    pub item_id: i64,
    pub warehouse_id: i64,
}

async fn query_ledger(
    State(state): State<AppState>,
    Query(filter): Query<LedgerFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let entries = state.services.ledger.query(&filter).await?;
    Ok(success_response(entries))
}

async fn reconcile(
    State(state): State<AppState>,
    Query(query): Query<ReconcileQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let report = state
        .services
        .ledger
        .reconcile(query.item_id, query.warehouse_id)
        .await?;
    Ok(success_response(report))
}

pub fn ledger_routes() -> Router<AppState> {
    Router::new()
        .route("/ledger", get(query_ledger))
        .route("/ledger/reconcile", get(reconcile))
}
