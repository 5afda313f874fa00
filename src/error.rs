use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    models::OrderStatus,
    response::ApiResponse,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid promo code {0}")]
    InvalidPromoCode(String),

    #[error("Order subtotal {subtotal} is below the promo minimum of {minimum}")]
    PromoMinimumNotMet { minimum: Decimal, subtotal: Decimal },

    #[error("Insufficient stock for product {product_id}")]
    InsufficientStock { product_id: Uuid },

    #[error("Product {product_id} is unavailable")]
    ProductUnavailable { product_id: Uuid },

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Checkout already in progress")]
    CheckoutInProgress,

    #[error("Reservation {0} is not in a valid state")]
    InvalidTokenState(Uuid),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code returned to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::EmptyCart => "empty_cart",
            AppError::InvalidPromoCode(_) => "invalid_promo_code",
            AppError::PromoMinimumNotMet { .. } => "promo_minimum_not_met",
            AppError::InsufficientStock { .. } => "insufficient_stock",
            AppError::ProductUnavailable { .. } => "product_unavailable",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::CheckoutInProgress => "checkout_in_progress",
            AppError::InvalidTokenState(_) => "invalid_token_state",
            AppError::DbError(_) | AppError::OrmError(_) => "storage_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::EmptyCart => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::InvalidPromoCode(_) | AppError::PromoMinimumNotMet { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::InsufficientStock { .. }
            | AppError::ProductUnavailable { .. }
            | AppError::InvalidTransition { .. }
            | AppError::CheckoutInProgress
            | AppError::InvalidTokenState(_) => StatusCode::CONFLICT,
            AppError::DbError(_) | AppError::OrmError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Infrastructure failures that may succeed when tried again.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::DbError(_) | AppError::OrmError(_))
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::InsufficientStock { product_id } | AppError::ProductUnavailable { product_id } => {
                Some(serde_json::json!({ "product_id": product_id }))
            }
            AppError::InvalidTransition { from, to } => {
                Some(serde_json::json!({ "from": from, "to": to }))
            }
            AppError::PromoMinimumNotMet { minimum, subtotal } => {
                Some(serde_json::json!({ "minimum": minimum, "subtotal": subtotal }))
            }
            AppError::InvalidPromoCode(code) => Some(serde_json::json!({ "promo_code": code })),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorData {
    code: &'static str,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::DbError(source) => tracing::error!(error = %source, "database failure"),
            AppError::OrmError(source) => tracing::error!(error = %source, "orm failure"),
            AppError::Internal(source) => tracing::error!(error = %source, "internal failure"),
            _ => {}
        }

        let body = ApiResponse::failure(
            self.to_string(),
            ErrorData {
                code: self.code(),
                error: self.to_string(),
                details: self.details(),
            },
        );

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_client_errors() {
        let cases = [
            (AppError::EmptyCart, StatusCode::BAD_REQUEST, "empty_cart"),
            (
                AppError::InvalidPromoCode("X".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_promo_code",
            ),
            (
                AppError::InsufficientStock { product_id: Uuid::nil() },
                StatusCode::CONFLICT,
                "insufficient_stock",
            ),
            (
                AppError::InvalidTransition {
                    from: OrderStatus::Shipped,
                    to: OrderStatus::Pending,
                },
                StatusCode::CONFLICT,
                "invalid_transition",
            ),
            (AppError::CheckoutInProgress, StatusCode::CONFLICT, "checkout_in_progress"),
        ];

        for (error, status, code) in cases {
            assert_eq!(error.status(), status);
            assert_eq!(error.code(), code);
            assert!(!error.is_transient());
        }
    }

    #[test]
    fn storage_errors_are_transient() {
        let error = AppError::OrmError(sea_orm::DbErr::Custom("connection reset".into()));
        assert!(error.is_transient());
        assert_eq!(error.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
