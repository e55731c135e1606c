use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use thiserror::Error;
use tracing::{error, warn};
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::Rejection;

use crate::error::StoreError;

/// Every route answers with `{success, data}` or `{success: false, message}`.
pub type ApiReply = WithStatus<Json>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Edit access denied")]
    Forbidden,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}

impl warp::reject::Reject for ApiError {}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            // The UI treats an existing file or folder as a bad request.
            Self::Store(StoreError::Validation(_) | StoreError::Conflict(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::Io { .. } | StoreError::Serialize { .. })
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn into_reply(self) -> ApiReply {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        failure(status, &self.to_string())
    }
}

pub fn success<T: Serialize>(status: StatusCode, data: &T) -> ApiReply {
    warp::reply::with_status(
        warp::reply::json(&json!({ "success": true, "data": data })),
        status,
    )
}

pub fn failure(status: StatusCode, message: &str) -> ApiReply {
    warp::reply::with_status(
        warp::reply::json(&json!({ "success": false, "message": message })),
        status,
    )
}

/// Collapse a handler result into a reply; errors never escape as rejections.
pub fn respond(result: Result<ApiReply, ApiError>) -> Result<ApiReply, Infallible> {
    Ok(result.unwrap_or_else(ApiError::into_reply))
}

/// Turn unmatched routes and malformed bodies into the JSON envelope.
pub async fn handle_rejection(rejection: Rejection) -> Result<ApiReply, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(err) = rejection.find::<ApiError>() {
        (err.status(), err.to_string())
    } else if let Some(err) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, err.to_string())
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large".to_string())
    } else if rejection.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Content-Length required".to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        warn!(?rejection, "unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    };
    Ok(failure(status, &message))
}
