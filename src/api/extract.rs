//! Extractors whose rejections render as the crate's JSON error body.

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::StatusCode;

use crate::ProfhubError;

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ProfhubError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ProfhubError))]
pub struct ApiPath<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ProfhubError))]
pub struct ApiQuery<T>(pub T);

/// Raw request body, capped by the router's body limit.
#[derive(Debug)]
pub struct ApiBytes(pub Bytes);

impl<S> FromRequest<S> for ApiBytes
where
    S: Send + Sync,
{
    type Rejection = ProfhubError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await?;
        Ok(Self(bytes))
    }
}

fn rejected(status: StatusCode, body_text: String) -> ProfhubError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ProfhubError::PayloadTooLarge(body_text)
    } else {
        ProfhubError::InvalidArgument(body_text)
    }
}

impl From<BytesRejection> for ProfhubError {
    fn from(rejection: BytesRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

impl From<JsonRejection> for ProfhubError {
    fn from(rejection: JsonRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ProfhubError {
    fn from(rejection: PathRejection) -> Self {
        Self::InvalidArgument(rejection.body_text())
    }
}

impl From<QueryRejection> for ProfhubError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidArgument(rejection.body_text())
    }
}
