use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tracing::info;

use super::common::{created_response, success_response, Principal};
use crate::{
    errors::ServiceError,
    handlers::AppState,
    services::posting::{
        AdjustmentInput, DocumentFilter, GoodsReceiptInput, MaterialIssueInput,
        MaterialReturnInput, ReverseDocumentInput, TransferInput,
    },
};

#[derive(Debug, Serialize)]
pub struct DocumentNumberResponse {
    pub prefix: String,
    pub document_number: String,
}

async fn post_receipt(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<GoodsReceiptInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let posted = state
        .services
        .posting
        .post_receipt(payload, principal.as_str())
        .await?;
    Ok(created_response(posted))
}

async fn post_issue(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<MaterialIssueInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let posted = state
        .services
        .posting
        .post_issue(payload, principal.as_str())
        .await?;
    Ok(created_response(posted))
}

async fn post_return(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<MaterialReturnInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let posted = state
        .services
        .posting
        .post_return(payload, principal.as_str())
        .await?;
    Ok(created_response(posted))
}

async fn post_transfer(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<TransferInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let posted = state
        .services
        .posting
        .post_transfer(payload, principal.as_str())
        .await?;
    Ok(created_response(posted))
}

async fn post_adjustment(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<AdjustmentInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let posted = state
        .services
        .posting
        .post_adjustment(payload, principal.as_str())
        .await?;
    Ok(created_response(posted))
}

async fn list_documents(
    State(state): State<AppState>,
    Query(filter): Query<DocumentFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let documents = state.services.posting.list_documents(&filter).await?;
    Ok(success_response(documents))
}

async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(
        state.services.posting.get_document(document_id).await?,
    ))
}

async fn reverse_document(
    State(state): State<AppState>,
    principal: Principal,
    Path(document_id): Path<i64>,
    Json(payload): Json<ReverseDocumentInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let reversed = state
        .services
        .posting
        .reverse_document(document_id, payload, principal.as_str())
        .await?;
    info!(document_id, actor = %principal.as_str(), "document reversed via API");
    Ok(success_response(reversed))
}

async fn next_document_number(
    State(state): State<AppState>,
    Path(prefix): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let document_number = state.services.document_numbers.next(&prefix).await?;
    Ok(created_response(DocumentNumberResponse {
        prefix,
        document_number,
    }))
}

pub fn document_routes() -> Router<AppState> {
    Router::new()
        .route("/documents", get(list_documents))
        .route("/documents/receipts", post(post_receipt))
        .route("/documents/issues", post(post_issue))
        .route("/documents/returns", post(post_return))
        .route("/documents/transfers", post(post_transfer))
        .route("/documents/adjustments", post(post_adjustment))
        .route("/documents/:id", get(get_document))
        .route("/documents/:id/reverse", post(reverse_document))
        .route("/document-numbers/:prefix", post(next_document_number))
}
