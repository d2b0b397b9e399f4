use serde::Serialize;
use tracing::{debug, info};

use crate::Amount;
use crate::gateway::{CreateIntent, GatewayError, IntentStatus};
use crate::ledger::PaymentAttempt;
use crate::model::{Booking, Metadata, PaymentMethod};
use crate::payments::{
    META_BOOKING_ID, PaymentError, PaymentService, SettledCharge, booking_id_of,
    require_positive,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentCreated {
    pub client_secret: String,
    pub intent_id: String,
}

impl PaymentService {
    /// Open a direct card payment for `amount`. Nothing is recorded until
    /// the intent is confirmed.
    pub async fn create_intent(
        &self,
        booking_id: &str,
        amount: Amount,
    ) -> Result<IntentCreated, PaymentError> {
        require_positive(amount)?;
        let booking = self.ledger.booking(booking_id).await?;

        let mut metadata = Metadata::new();
        metadata.insert(META_BOOKING_ID.into(), booking.id.clone());
        let intent = self
            .gateway
            .create_payment_intent(CreateIntent {
                amount,
                currency: booking.currency.clone(),
                metadata,
            })
            .await?;
        let client_secret = intent
            .client_secret
            .clone()
            .ok_or_else(|| {
                GatewayError::Decode(format!("intent {} has no client secret", intent.id))
            })?;

        self.ledger
            .note_attempt(
                booking_id,
                PaymentAttempt {
                    method: PaymentMethod::Card,
                    amount,
                    gateway_handle: intent.id.clone(),
                },
            )
            .await?;
        info!(
            booking = %booking_id,
            intent = %intent.id,
            amount = %amount,
            "payment intent created"
        );

        Ok(IntentCreated {
            client_secret,
            intent_id: intent.id,
        })
    }

    /// Record the outcome of a client-confirmed intent.
    ///
    /// Succeeded intents settle with their full amount, failed ones leave a
    /// failed entry, and intents still in flight record nothing.
    pub async fn confirm_intent(
        &self,
        booking_id: &str,
        intent_id: &str,
    ) -> Result<Booking, PaymentError> {
        let booking = self.ledger.booking(booking_id).await?;
        let intent = self.gateway.retrieve_payment_intent(intent_id).await?;

        if let Some(owner) = booking_id_of(&intent.metadata) {
            if owner != booking_id {
                return Err(PaymentError::InvalidRequest(format!(
                    "intent {intent_id} belongs to booking {owner}"
                )));
            }
        }

        if intent.status == IntentStatus::Succeeded {
            return self
                .settle_charge(SettledCharge {
                    booking_id: booking_id.to_string(),
                    reference: intent.id.clone(),
                    amount: intent.amount,
                    session_id: None,
                    method: Some(PaymentMethod::Card),
                    metadata: intent.metadata,
                })
                .await;
        }

        if intent.is_failed() {
            let reference = intent.failure_reference();
            return self
                .record_failure(booking_id, reference, intent.amount, intent.metadata)
                .await;
        }

        debug!(
            booking = %booking_id,
            intent = %intent_id,
            status = ?intent.status,
            "intent not settled yet"
        );
        Ok(booking)
    }
}
