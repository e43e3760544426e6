//! POST /identify

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use idlink_common::Error;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::reconcile::{ConsolidatedView, IdentifyRequest};
use crate::AppState;

/// Phone numbers arrive either as JSON strings or as bare numbers
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PhoneValue {
    Text(String),
    Number(serde_json::Number),
}

impl PhoneValue {
    fn into_string(self) -> String {
        match self {
            PhoneValue::Text(s) => s,
            PhoneValue::Number(n) => n.to_string(),
        }
    }
}

/// Request body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyBody {
    #[serde(default)]
    pub email: Option<String>,

    #[serde(default, alias = "phone")]
    pub phone_number: Option<PhoneValue>,
}

impl From<IdentifyBody> for IdentifyRequest {
    fn from(body: IdentifyBody) -> Self {
        IdentifyRequest::new(body.email, body.phone_number.map(PhoneValue::into_string))
    }
}

/// Response body
#[derive(Debug, Serialize)]
pub struct IdentifyResponse {
    pub contact: ConsolidatedView,
}

/// Identify errors
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Reconcile(Error),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Reconcile(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Reconcile(e) => {
                let status = match &e {
                    Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
                    Error::NotFound(_) => StatusCode::NOT_FOUND,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    error!("identify failed: {}", e);
                }
                (status, e.to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// POST /identify
///
/// Accepts `{"email"?, "phoneNumber"?}` and returns the consolidated
/// contact for the customer those values belong to.
pub async fn identify(
    State(state): State<AppState>,
    payload: Result<Json<IdentifyBody>, JsonRejection>,
) -> Result<Json<IdentifyResponse>, ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let contact = state.reconciler.identify(body.into()).await?;
    Ok(Json(IdentifyResponse { contact }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_phone_accepted() {
        let body: IdentifyBody = serde_json::from_str(r#"{"phoneNumber": 123456}"#).unwrap();
        let request: IdentifyRequest = body.into();
        assert_eq!(request.phone_number.as_deref(), Some("123456"));
        assert!(request.email.is_none());
    }

    #[test]
    fn test_phone_alias_and_nulls() {
        let body: IdentifyBody =
            serde_json::from_str(r#"{"email": null, "phone": "555"}"#).unwrap();
        let request: IdentifyRequest = body.into();
        assert_eq!(request.phone_number.as_deref(), Some("555"));
        assert!(request.email.is_none());
    }

    #[test]
    fn test_empty_strings_are_absent() {
        let body: IdentifyBody =
            serde_json::from_str(r#"{"email": "", "phoneNumber": ""}"#).unwrap();
        let request: IdentifyRequest = body.into();
        assert_eq!(request, IdentifyRequest::default());
    }
}
