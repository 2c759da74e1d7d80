use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{flagged::AddError, store::StoreError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("Missing fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Backend failure: {0}")]
    Backend(#[from] StoreError),
}

impl From<AddError> for AppError {
    fn from(e: AddError) -> Self {
        match e {
            AddError::Missing(fields) => AppError::MissingFields(fields),
            AddError::Store(e) => AppError::Backend(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::MalformedPayload => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Malformed payload" }),
            ),
            AppError::MissingFields(fields) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Missing fields", "fields": fields }),
            ),
            AppError::Backend(e) => {
                error!("Store failure: {e}");

                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
