//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use storefront_core::DomainError;
use storefront_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but insufficient permissions.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists or invalid state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A business rule rejected the request.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::InsufficientWallet { .. } => StatusCode::PAYMENT_REQUIRED,
        DomainError::SignInRequired(_) => StatusCode::UNAUTHORIZED,
        DomainError::AccountDisabled => StatusCode::FORBIDDEN,
        DomainError::ProductNotFound(_) | DomainError::EditionNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        e if e.is_conflict() => StatusCode::CONFLICT,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn domain_details(err: &DomainError) -> Option<serde_json::Value> {
    match err {
        DomainError::InsufficientWallet { balance, required } => Some(serde_json::json!({
            "balance": balance,
            "required": required
        })),
        DomainError::InsufficientStock {
            product,
            available,
            requested,
        } => Some(serde_json::json!({
            "product": product,
            "available": available,
            "requested": requested
        })),
        DomainError::MissingGameCodes {
            product,
            needed,
            available,
        } => Some(serde_json::json!({
            "product": product,
            "needed": needed,
            "available": available
        })),
        _ => None,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::Domain(err) => (
                domain_status(err),
                err.code(),
                err.to_string(),
                domain_details(err),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "external_service_error",
                msg.clone(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => {
                Self::NotFound(format!("{entity} not found: {id}"))
            }
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Domain(err) => Self::Domain(err),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_core::OrderStatus;

    #[test]
    fn insufficient_wallet_is_payment_required() {
        let response = ApiError::from(DomainError::InsufficientWallet {
            balance: 100,
            required: 500,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn transitions_conflict() {
        let err = DomainError::InvalidTransition {
            from: OrderStatus::Delivered,
            to: OrderStatus::Cancelled,
        };
        assert_eq!(domain_status(&err), StatusCode::CONFLICT);
        assert_eq!(domain_status(&DomainError::EmptyCart), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_errors_map_to_statuses() {
        let not_found: ApiError = StoreError::not_found("order", "x").into();
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);

        let conflict: ApiError = StoreError::Conflict("dup".into()).into();
        assert_eq!(conflict.into_response().status(), StatusCode::CONFLICT);

        let internal: ApiError = StoreError::Database("boom".into()).into();
        assert_eq!(
            internal.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
