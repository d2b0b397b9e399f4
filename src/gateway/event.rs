use serde::Deserialize;

use crate::Amount;
use crate::gateway::{CheckoutSession, failure_reference};
use crate::model::Metadata;

/// Body of a webhook delivery: a single event or a batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WebhookDelivery {
    Batch { events: Vec<GatewayEvent> },
    Single(GatewayEvent),
}

impl WebhookDelivery {
    pub fn into_events(self) -> Vec<GatewayEvent> {
        match self {
            WebhookDelivery::Batch { events } => events,
            WebhookDelivery::Single(event) => vec![event],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// Charge (or intent) object carried by payment events.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChargeObject {
    pub id: String,
    pub amount: Amount,
    pub currency: String,
    #[serde(default)]
    pub status: Option<String>,
    /// Owning intent, when the object is a charge rather than an intent.
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    /// Present on intent objects whose last attempt failed.
    #[serde(default)]
    pub last_payment_error: Option<serde_json::Value>,
}

impl ChargeObject {
    /// Ledger reference: the intent id when known, so that charges and
    /// intents for the same payment collapse onto one entry.
    pub fn reference_id(&self) -> &str {
        self.payment_intent.as_deref().unwrap_or(&self.id)
    }

    /// Ledger reference of a failed attempt: the charge itself, or the
    /// failing charge named by an intent object.
    pub fn failure_reference(&self) -> String {
        if self.payment_intent.is_some() {
            return self.id.clone();
        }
        failure_reference(&self.id, self.last_payment_error.as_ref())
    }
}

/// Typed view of the events the ledger acts on.
#[derive(Debug, Clone)]
pub enum EventPayload {
    ChargeSucceeded(ChargeObject),
    ChargeFailed(ChargeObject),
    SessionCompleted(CheckoutSession),
    SessionExpired(CheckoutSession),
    Ignored,
}

impl GatewayEvent {
    pub fn payload(&self) -> Result<EventPayload, serde_json::Error> {
        let object = || self.data.object.clone();
        Ok(match self.kind.as_str() {
            "charge.succeeded" | "payment_intent.succeeded" => {
                EventPayload::ChargeSucceeded(serde_json::from_value(object())?)
            }
            "charge.failed" | "payment_intent.payment_failed" => {
                EventPayload::ChargeFailed(serde_json::from_value(object())?)
            }
            "checkout.session.completed" => {
                EventPayload::SessionCompleted(serde_json::from_value(object())?)
            }
            "checkout.session.expired" => {
                EventPayload::SessionExpired(serde_json::from_value(object())?)
            }
            _ => EventPayload::Ignored,
        })
    }
}
