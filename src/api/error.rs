//! HTTP error mapping.

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use validator::ValidationErrors;
use crate::domain::aggregates::OrderError;
use crate::ServiceError;

#[derive(Debug)]
pub enum ApiError {
    Service(ServiceError),
    InvalidRequest(ValidationErrors),
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self { Self::Service(e) }
}

impl From<ValidationErrors> for ApiError {
    fn from(e: ValidationErrors) -> Self { Self::InvalidRequest(e) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::InvalidRequest(errors) => (StatusCode::UNPROCESSABLE_ENTITY, json!({"error": "Invalid request", "fields": errors})),
            Self::Service(e) => match e {
                ServiceError::NotFound => (StatusCode::NOT_FOUND, json!({"error": e.to_string()})),
                ServiceError::DuplicateCode(_) => (StatusCode::CONFLICT, json!({"error": e.to_string()})),
                ServiceError::InvalidCode(_) | ServiceError::InvalidDiscount(_) | ServiceError::InvalidContext(_) => (StatusCode::UNPROCESSABLE_ENTITY, json!({"error": e.to_string()})),
                ServiceError::Order(OrderError::NotEditable) => (StatusCode::CONFLICT, json!({"error": e.to_string()})),
                ServiceError::Order(_) => (StatusCode::UNPROCESSABLE_ENTITY, json!({"error": e.to_string()})),
                ServiceError::Rejected(ref rejection) => {
                    let mut body = serde_json::to_value(rejection).unwrap_or_else(|_| json!({}));
                    body["error"] = json!(e.to_string());
                    (StatusCode::UNPROCESSABLE_ENTITY, body)
                }
                ServiceError::Storage(ref source) => {
                    tracing::error!(error = %source, "storage failure");
                    (StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "Internal server error"}))
                }
            },
        };
        (status, Json(body)).into_response()
    }
}
