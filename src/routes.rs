use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use tracing::debug;

use crate::{
    error::AppError,
    flagged::{BOT_COMMENTS, BOT_PROFILES},
    models::{
        AddProfileRequest, CheckResponse, CommentAdded, CommentRequest, ProfileAdded,
        TotalResponse, UrlCheckRequest,
    },
    record::Fields,
    state::AppState,
};

type Payload<T> = Result<Json<T>, JsonRejection>;

pub async fn ping_handler() -> &'static str {
    "ping"
}

pub async fn url_check_handler(
    State(state): State<Arc<AppState>>,
    payload: Payload<UrlCheckRequest>,
) -> Result<Json<CheckResponse>, AppError> {
    let Json(request) = payload.map_err(rejected)?;
    let url = require("url", request.url)?;

    let valid = state.flagged.exists(&BOT_PROFILES, &url).await?;

    Ok(Json(CheckResponse {
        valid,
        message: if valid { "BOT found" } else { "BOT not found" },
    }))
}

pub async fn add_profile_handler(
    State(state): State<Arc<AppState>>,
    payload: Payload<AddProfileRequest>,
) -> Result<Json<ProfileAdded>, AppError> {
    let Json(request) = payload.map_err(rejected)?;
    let url = require("profileUrl", request.profile_url)?;

    let mut fields = Fields::from([("url".to_string(), url.clone())]);
    if let Some(reason) = &request.reason {
        fields.insert("reason".to_string(), reason.clone());
    }

    let id = state.flagged.add(&BOT_PROFILES, fields).await?;

    Ok(Json(ProfileAdded {
        message: "User successfully added",
        id,
        url,
        reason: request.reason,
    }))
}

pub async fn comment_valid_handler(
    State(state): State<Arc<AppState>>,
    payload: Payload<CommentRequest>,
) -> Result<Json<CheckResponse>, AppError> {
    let Json(request) = payload.map_err(rejected)?;
    let comment = require("comment", request.comment)?;

    let valid = state.flagged.exists(&BOT_COMMENTS, &comment).await?;

    Ok(Json(CheckResponse {
        valid,
        message: if valid {
            "Comment found"
        } else {
            "Comment not found"
        },
    }))
}

pub async fn comment_add_handler(
    State(state): State<Arc<AppState>>,
    payload: Payload<CommentRequest>,
) -> Result<Json<CommentAdded>, AppError> {
    let Json(request) = payload.map_err(rejected)?;
    let comment = require("comment", request.comment)?;

    let fields = Fields::from([("comment".to_string(), comment.clone())]);
    let id = state.flagged.add(&BOT_COMMENTS, fields).await?;

    Ok(Json(CommentAdded {
        message: "Comment successfully added",
        id,
        comment,
    }))
}

pub async fn total_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TotalResponse>, AppError> {
    let total = state.flagged.total(&BOT_PROFILES).await?;

    Ok(Json(TotalResponse { total }))
}

fn rejected(rejection: JsonRejection) -> AppError {
    debug!("Rejected payload: {rejection}");

    AppError::MalformedPayload
}

fn require(field: &str, value: Option<String>) -> Result<String, AppError> {
    value.ok_or_else(|| AppError::MissingFields(vec![field.to_string()]))
}
