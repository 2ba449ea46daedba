//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{CartServiceError, CheckoutError, CheckoutStatus, ExperimentError, OrderError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout or coupon apply failure; the body carries its status.
    Checkout(CheckoutError),
    Experiment(ExperimentError),
    Cart(CartServiceError),
    Order(OrderError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, error_body(msg)),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Experiment(err) => experiment_error_to_response(err),
            ApiError::Cart(err) => cart_error_to_response(err),
            ApiError::Order(err) => order_error_to_response(err),
            ApiError::Internal(msg) => internal(msg),
        };

        (status, axum::Json(body)).into_response()
    }
}

fn error_body(message: String) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

fn internal(message: String) -> (StatusCode, serde_json::Value) {
    tracing::error!(error = %message, "internal server error");
    (StatusCode::INTERNAL_SERVER_ERROR, error_body(message))
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, serde_json::Value) {
    let status = err.status();
    let code = match status {
        CheckoutStatus::Stock => StatusCode::CONFLICT,
        CheckoutStatus::Coupon | CheckoutStatus::AddressRequired | CheckoutStatus::Empty => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CheckoutStatus::PaymentUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        CheckoutStatus::Error => {
            tracing::error!(error = %err, "checkout failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    // Fatal failures are surfaced generically.
    let message = if status == CheckoutStatus::Error {
        "Checkout could not be completed".to_string()
    } else {
        err.to_string()
    };

    let mut body = serde_json::json!({ "error": message, "status": status });
    if let CheckoutError::Coupon(reason) = &err {
        body["reason"] = serde_json::Value::from(reason.code());
    }
    (code, body)
}

fn experiment_error_to_response(err: ExperimentError) -> (StatusCode, serde_json::Value) {
    match &err {
        ExperimentError::NotFound(_) => (StatusCode::NOT_FOUND, error_body(err.to_string())),
        ExperimentError::NoWinner { .. } | ExperimentError::VersionMismatch { .. } => {
            (StatusCode::CONFLICT, error_body(err.to_string()))
        }
        ExperimentError::Store(_) | ExperimentError::EventLog(_) => internal(err.to_string()),
    }
}

fn cart_error_to_response(err: CartServiceError) -> (StatusCode, serde_json::Value) {
    match &err {
        CartServiceError::Cart(domain::CartError::ItemNotFound { .. })
        | CartServiceError::ProductNotFound(_) => {
            (StatusCode::NOT_FOUND, error_body(err.to_string()))
        }
        CartServiceError::Cart(_) => (StatusCode::BAD_REQUEST, error_body(err.to_string())),
        CartServiceError::Store(_) => internal(err.to_string()),
    }
}

fn order_error_to_response(err: OrderError) -> (StatusCode, serde_json::Value) {
    match &err {
        OrderError::NotFound(_) => (StatusCode::NOT_FOUND, error_body(err.to_string())),
        OrderError::InvalidTransition(_) | OrderError::Conflict(_) => {
            (StatusCode::CONFLICT, error_body(err.to_string()))
        }
        OrderError::Store(_) => internal(err.to_string()),
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<ExperimentError> for ApiError {
    fn from(err: ExperimentError) -> Self {
        ApiError::Experiment(err)
    }
}

impl From<CartServiceError> for ApiError {
    fn from(err: CartServiceError) -> Self {
        ApiError::Cart(err)
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Order(err)
    }
}

impl From<store::StoreError> for ApiError {
    fn from(err: store::StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
