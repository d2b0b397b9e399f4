//! Error taxonomy of the payment adapters.

use thiserror::Error;

use crate::gateway::{GatewayError, SignatureError};
use crate::ledger::LedgerError;
use crate::model::BookingId;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("{0}")]
    NotFound(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("webhook signature invalid: {0}")]
    SignatureInvalid(#[from] SignatureError),

    #[error("booking {0} is already refunded")]
    AlreadyRefunded(BookingId),

    #[error("booking {0} has no settled payment")]
    NotYetPaid(BookingId),

    #[error(transparent)]
    Ledger(LedgerError),
}

impl From<LedgerError> for PaymentError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::BookingNotFound(id) => PaymentError::NotFound(format!("booking {id} not found")),
            LedgerError::EntryNotFound { .. } => PaymentError::NotFound(e.to_string()),
            other => PaymentError::Ledger(other),
        }
    }
}

impl PaymentError {
    /// Stable machine-readable kind reported to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            PaymentError::NotFound(_) => "not_found",
            PaymentError::InvalidAmount(_) => "invalid_amount",
            PaymentError::InvalidRequest(_) => "invalid_request",
            PaymentError::Gateway(GatewayError::Rejected { .. }) => "gateway_rejected",
            PaymentError::Gateway(_) => "gateway_unavailable",
            PaymentError::SignatureInvalid(_) => "signature_invalid",
            PaymentError::AlreadyRefunded(_) => "already_refunded",
            PaymentError::NotYetPaid(_) => "not_yet_paid",
            PaymentError::Ledger(LedgerError::IllegalTransition { .. }) => "illegal_transition",
            PaymentError::Ledger(LedgerError::Contention { .. }) => "conflict",
            PaymentError::Ledger(_) => "ledger_error",
        }
    }
}
