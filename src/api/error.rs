//! HTTP error mapping.
//!
//! Every failure leaves as `{"kind": ..., "message": ...}` with a status that
//! tells the caller whether retrying can help.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::amount::AmountError;
use crate::payments::PaymentError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("invalid amount: {0}")]
    Amount(#[from] AmountError),

    #[error("missing webhook signature header")]
    MissingSignature,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Payment(e) => e.kind(),
            ApiError::Amount(_) => "invalid_amount",
            ApiError::MissingSignature => "signature_invalid",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            "not_found" => StatusCode::NOT_FOUND,
            "invalid_amount" | "invalid_request" | "signature_invalid" => StatusCode::BAD_REQUEST,
            "already_refunded" | "not_yet_paid" | "illegal_transition" | "conflict" => {
                StatusCode::CONFLICT
            }
            "gateway_rejected" => StatusCode::BAD_GATEWAY,
            "gateway_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        if status.is_server_error() {
            error!(kind, error = %self, "request failed");
        } else {
            warn!(kind, error = %self, "request rejected");
        }

        let body = ErrorBody {
            kind,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
