//! HTTP error mapping.
//!
//! `ApiError` is the only place a `BillingError` becomes a status code and a
//! JSON body.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::subscription::{BillingError, SubscriptionStatus};

/// Error body shared by every endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SubscriptionStatus>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            code: None,
            existing_subscription_id: None,
            status: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            ..Self::new(error)
        }
    }
}

/// API error type that converts billing errors to HTTP responses.
#[derive(Debug)]
pub struct ApiError(pub BillingError);

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(BillingError::validation("body", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(BillingError::validation("query", rejection.body_text()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            BillingError::Validation { .. }
            | BillingError::PaymentRejected(_)
            | BillingError::BadSignature(_) => StatusCode::BAD_REQUEST,
            BillingError::NotFound { .. } => StatusCode::NOT_FOUND,
            BillingError::Conflict { .. } | BillingError::DuplicateCode(_) => StatusCode::CONFLICT,
            BillingError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BillingError::Initialization(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn body(&self) -> ErrorResponse {
        let mut body = match &self.0 {
            BillingError::Validation { message, .. } => ErrorResponse::new(message.clone()),
            BillingError::NotFound { resource, id } => {
                ErrorResponse::with_details(format!("{} not found", resource), id.clone())
            }
            BillingError::Conflict {
                kind,
                subscription_id,
                status,
            } => ErrorResponse {
                details: Some(format!(
                    "Existing subscription {} is {}",
                    subscription_id, status
                )),
                existing_subscription_id: Some(subscription_id.clone()),
                status: Some(*status),
                ..ErrorResponse::new(kind.message())
            },
            BillingError::DuplicateCode(message) => {
                ErrorResponse::with_details("Code already exists", message.clone())
            }
            BillingError::PaymentRejected(message) => {
                ErrorResponse::with_details("Payment rejected", message.clone())
            }
            BillingError::BadSignature(message) => {
                ErrorResponse::with_details("Webhook signature verification failed", message.clone())
            }
            BillingError::Upstream(message) => {
                ErrorResponse::with_details("Internal server error", message.clone())
            }
            BillingError::Initialization(message) => {
                ErrorResponse::with_details("Service not initialized", message.clone())
            }
        };
        body.code = Some(self.0.code());
        body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, code = self.0.code(), "Request failed");
        } else {
            tracing::debug!(error = %self.0, code = self.0.code(), "Request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}

/// 405 with an `Allow` header and the allowed verbs in prose.
pub fn method_not_allowed(allowed: &'static str) -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, allowed)],
        Json(ErrorResponse::with_details(
            "Method not allowed",
            format!("Allowed: {}", allowed),
        )),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::subscription::ConflictKind;

    fn json_body(err: BillingError) -> serde_json::Value {
        serde_json::to_value(ApiError(err).body()).unwrap()
    }

    #[test]
    fn status_mapping() {
        let cases = [
            (BillingError::missing("userId"), StatusCode::BAD_REQUEST),
            (BillingError::PaymentRejected("declined".into()), StatusCode::BAD_REQUEST),
            (BillingError::BadSignature("bad".into()), StatusCode::BAD_REQUEST),
            (BillingError::not_found("Plan", "P"), StatusCode::NOT_FOUND),
            (BillingError::DuplicateCode("SAVE10".into()), StatusCode::CONFLICT),
            (BillingError::upstream("timeout"), StatusCode::INTERNAL_SERVER_ERROR),
            (BillingError::initialization("no key"), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err.clone()).status(), expected, "{:?}", err);
        }
    }

    #[test]
    fn conflict_body_carries_existing_subscription() {
        let body = json_body(BillingError::conflict(
            ConflictKind::AlreadyActive,
            "sub_a",
            SubscriptionStatus::Active,
        ));
        assert_eq!(body["existingSubscriptionId"], "sub_a");
        assert_eq!(body["status"], "active");
        assert_eq!(body["code"], "already-active");
        assert_eq!(body["error"], "User already has an active subscription");
    }

    #[test]
    fn initialization_body() {
        let body = json_body(BillingError::initialization("STRIPE_SECRET_KEY missing"));
        assert_eq!(body["error"], "Service not initialized");
        assert_eq!(body["details"], "STRIPE_SECRET_KEY missing");
    }

    #[test]
    fn validation_body_omits_empty_fields() {
        let body = json_body(BillingError::missing("email"));
        assert_eq!(body["error"], "Missing required field: email");
        assert!(body.get("details").is_none());
        assert!(body.get("existingSubscriptionId").is_none());
    }

    #[test]
    fn method_not_allowed_sets_allow_header() {
        let response = method_not_allowed("GET");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET");
    }
}
