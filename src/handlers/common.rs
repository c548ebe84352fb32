use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::ApiResponse;

pub const USER_ID_HEADER: &str = "x-user-id";
const SYSTEM_ACTOR: &str = "system";

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

/// Actor recorded as `created_by` on documents and ledger entries, taken
/// from the `x-user-id` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(pub String);

impl Principal {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(SYSTEM_ACTOR);
        Ok(Principal(actor.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn principal_of(request: Request<()>) -> Principal {
        let (mut parts, _) = request.into_parts();
        Principal::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn reads_user_header() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "clerk-7")
            .body(())
            .unwrap();
        assert_eq!(principal_of(request).await.as_str(), "clerk-7");
    }

    #[tokio::test]
    async fn falls_back_to_system() {
        let request = Request::builder().body(()).unwrap();
        assert_eq!(principal_of(request).await.as_str(), "system");
    }
}
