use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{ValidationErrors, ValidationErrorsKind};

/// Failure envelope returned by every endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "success": false,
    "message": "Insufficient stock for product: Desk Lamp",
    "error": {
        "code": "INSUFFICIENT_STOCK",
        "details": null
    }
}))]
pub struct ErrorResponse {
    /// Always `false` for failures
    pub success: bool,
    /// Human-readable error description
    pub message: String,
    /// Machine-readable code plus optional field details
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    #[schema(example = "VALIDATION_ERROR")]
    pub code: String,
    #[schema(example = "shipping_address.city: length")]
    pub details: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("{0}")]
    NotFound(String),

    /// Carries the per-field details; the envelope message is always "Validation failed".
    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Cart is empty")]
    CartEmpty,

    #[error("{0}")]
    InsufficientStock(String),

    #[error("Order cannot be cancelled")]
    OrderNotCancellable,

    #[error("{0}")]
    PaymentError(String),

    #[error("{0}")]
    GatewayError(String),

    #[error("{0}")]
    WebhookSignature(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        let mut fields = Vec::new();
        flatten_validation_errors(None, &err, &mut fields);
        fields.sort();
        ServiceError::ValidationError(fields.join("; "))
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::InternalError(format!("serialization failed: {}", err))
    }
}

fn flatten_validation_errors(prefix: Option<&str>, errors: &ValidationErrors, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, field),
            None => (*field).to_string(),
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let reason = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| error.code.to_string());
                    out.push(format!("{}: {}", path, reason));
                }
            }
            ValidationErrorsKind::Struct(nested) => {
                flatten_validation_errors(Some(&path), nested, out);
            }
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    let indexed = format!("{}[{}]", path, index);
                    flatten_validation_errors(Some(&indexed), nested, out);
                }
            }
        }
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::BadRequest(_)
            | Self::CartEmpty
            | Self::InsufficientStock(_)
            | Self::OrderNotCancellable
            | Self::PaymentError(_)
            | Self::GatewayError(_)
            | Self::WebhookSignature(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code carried in the failure envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::CartEmpty => "CART_EMPTY",
            Self::InsufficientStock(_) => "INSUFFICIENT_STOCK",
            Self::OrderNotCancellable => "ORDER_NOT_CANCELLABLE",
            Self::PaymentError(_) => "PAYMENT_ERROR",
            Self::GatewayError(_) => "GATEWAY_ERROR",
            Self::WebhookSignature(_) => "INVALID_SIGNATURE",
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            Self::ValidationError(_) => "Validation failed".to_string(),
            _ => self.to_string(),
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            Self::ValidationError(details) => Some(details.clone()),
            _ => None,
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            success: false,
            message: self.response_message(),
            error: ErrorDetail {
                code: self.code().to_string(),
                details: self.details(),
            },
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, request_id = ?crate::tracing::current_request_id(), "request failed");
        } else {
            tracing::debug!(error = %self, code = self.code(), "request rejected");
        }

        (status, Json(self.to_error_response())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use validator::Validate;

    #[derive(Debug, Validate)]
    struct Inner {
        #[validate(length(min = 1))]
        city: String,
    }

    #[derive(Debug, Validate)]
    struct Outer {
        #[validate(range(min = 1))]
        quantity: i32,
        #[validate]
        address: Inner,
    }

    #[tokio::test]
    async fn domain_error_renders_failure_envelope() {
        let response =
            ServiceError::InsufficientStock("Insufficient stock for product: Lamp".into())
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(!payload.success);
        assert_eq!(payload.message, "Insufficient stock for product: Lamp");
        assert_eq!(payload.error.code, "INSUFFICIENT_STOCK");
        assert!(payload.error.details.is_none());
    }

    #[tokio::test]
    async fn database_error_hides_details() {
        let response = ServiceError::DatabaseError(DbErr::Custom("relation missing".into()))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.message, "Internal server error");
        assert_eq!(payload.error.code, "INTERNAL_ERROR");
    }

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("Order not found".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ServiceError::CartEmpty.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServiceError::OrderNotCancellable.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServiceError::InternalError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn domain_messages_pass_through_verbatim() {
        assert_eq!(ServiceError::CartEmpty.response_message(), "Cart is empty");
        assert_eq!(
            ServiceError::OrderNotCancellable.response_message(),
            "Order cannot be cancelled"
        );
        assert_eq!(
            ServiceError::NotFound("Order not found".into()).response_message(),
            "Order not found"
        );
    }

    #[test]
    fn validation_errors_are_flattened_with_nested_paths() {
        let input = Outer {
            quantity: 0,
            address: Inner {
                city: String::new(),
            },
        };
        let err: ServiceError = input.validate().unwrap_err().into();
        match err {
            ServiceError::ValidationError(details) => {
                assert!(details.contains("address.city: length"));
                assert!(details.contains("quantity: range"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
