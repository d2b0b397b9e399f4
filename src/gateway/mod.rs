//! Payment gateway boundary.
//!
//! The ledger only consumes gateway objects shaped like `{id, amount, status,
//! currency, metadata}`. [`PaymentGateway`] is the RPC seam; [`HttpGateway`]
//! talks to a Stripe-style REST API and [`MemoryGateway`] is an in-process
//! sandbox.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Amount;
use crate::model::Metadata;

mod event;
mod http;
mod memory;
mod signature;

pub use event::{ChargeObject, EventPayload, GatewayEvent, WebhookDelivery};
pub use http::HttpGateway;
pub use memory::MemoryGateway;
pub use signature::{SIGNATURE_HEADER, SignatureError, WebhookVerifier};

/// Errors raised by gateway calls.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway unreachable: {0}")]
    Unavailable(String),

    #[error("gateway call timed out")]
    Timeout,

    #[error("gateway rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("gateway misconfigured: {0}")]
    Misconfigured(String),

    #[error("unexpected gateway response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

/// A charge in progress. Its `id` is the ledger reference of the payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: Amount,
    pub currency: String,
    pub status: IntentStatus,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    /// Set when the last charge attempt failed.
    #[serde(default)]
    pub last_payment_error: Option<serde_json::Value>,
}

impl PaymentIntent {
    pub fn is_failed(&self) -> bool {
        self.status == IntentStatus::Canceled
            || (self.status == IntentStatus::RequiresPaymentMethod
                && self.last_payment_error.is_some())
    }

    /// Ledger reference of a failed attempt on this intent.
    pub fn failure_reference(&self) -> String {
        failure_reference(&self.id, self.last_payment_error.as_ref())
    }
}

/// Failed attempts are keyed by the failing charge so that a later success
/// on the same intent is not mistaken for a duplicate.
pub(crate) fn failure_reference(intent_id: &str, error: Option<&serde_json::Value>) -> String {
    error
        .and_then(|e| e.get("charge"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{intent_id}:failed"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Complete,
    Expired,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
    #[serde(other)]
    Unknown,
}

/// Hosted checkout session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    pub status: SessionStatus,
    pub payment_status: SessionPaymentStatus,
    #[serde(default)]
    pub amount_total: Option<Amount>,
    pub currency: String,
    /// The intent that carries the money once the session is paid.
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub amount: Amount,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateIntent {
    pub amount: Amount,
    pub currency: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone)]
pub struct CreateCheckoutSession {
    pub amount: Amount,
    pub currency: String,
    pub description: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Copied onto the session and onto the intent it creates.
    pub metadata: Metadata,
}

#[derive(Debug, Clone)]
pub struct CreateRefund {
    pub payment_intent: String,
    pub amount: Amount,
    pub metadata: Metadata,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(&self, request: CreateIntent) -> Result<PaymentIntent, GatewayError>;

    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, GatewayError>;

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutSession,
    ) -> Result<CheckoutSession, GatewayError>;

    async fn retrieve_checkout_session(&self, id: &str) -> Result<CheckoutSession, GatewayError>;

    async fn create_refund(&self, request: CreateRefund) -> Result<Refund, GatewayError>;
}
