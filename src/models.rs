use serde::{Deserialize, Serialize};

use crate::record::RecordId;

// Every request field is optional at the serde level so that an absent field
// is reported by name instead of as an unreadable body.

#[derive(Deserialize)]
pub struct UrlCheckRequest {
    pub url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddProfileRequest {
    pub profile_url: Option<String>,
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub valid: bool,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ProfileAdded {
    pub message: &'static str,
    pub id: RecordId,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommentAdded {
    pub message: &'static str,
    pub id: RecordId,
    pub comment: String,
}

#[derive(Debug, Serialize)]
pub struct TotalResponse {
    pub total: u64,
}
