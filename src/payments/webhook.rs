use serde::Serialize;
use tracing::{info, warn};

use crate::gateway::{EventPayload, SessionPaymentStatus, WebhookDelivery};
use crate::payments::{PaymentError, PaymentService, SettledCharge, booking_id_of};

/// Tally of one webhook delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WebhookReport {
    /// Events that reached the ledger.
    pub applied: usize,
    /// Event types the ledger does not act on.
    pub ignored: usize,
    /// Events that cannot be attributed to a known booking.
    pub skipped: usize,
}

enum Handled {
    Applied,
    Ignored,
    Skipped,
}

impl PaymentService {
    /// Process a signed webhook delivery.
    ///
    /// The signature is checked and every event parsed before anything is
    /// recorded, so a bad delivery changes nothing. Events that name no known
    /// booking are logged and skipped; redelivery could not fix them.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookReport, PaymentError> {
        self.verifier.verify(payload, signature)?;

        let events = serde_json::from_slice::<WebhookDelivery>(payload)
            .map_err(|e| PaymentError::InvalidRequest(format!("malformed webhook body: {e}")))?
            .into_events();
        let parsed = events
            .iter()
            .map(|event| {
                event
                    .payload()
                    .map(|payload| (event.id.as_str(), event.kind.as_str(), payload))
                    .map_err(|e| {
                        PaymentError::InvalidRequest(format!("malformed event {}: {e}", event.id))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = WebhookReport::default();
        for (event_id, kind, payload) in parsed {
            match self.apply_event(event_id, payload).await {
                Ok(Handled::Applied) => report.applied += 1,
                Ok(Handled::Ignored) => report.ignored += 1,
                Ok(Handled::Skipped) => report.skipped += 1,
                Err(PaymentError::NotFound(reason)) => {
                    warn!(event = %event_id, kind, %reason, "webhook event skipped");
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            events = events.len(),
            applied = report.applied,
            ignored = report.ignored,
            skipped = report.skipped,
            "webhook delivery processed"
        );
        Ok(report)
    }

    async fn apply_event(
        &self,
        event_id: &str,
        payload: EventPayload,
    ) -> Result<Handled, PaymentError> {
        let metadata = match &payload {
            EventPayload::ChargeSucceeded(charge) | EventPayload::ChargeFailed(charge) => {
                &charge.metadata
            }
            EventPayload::SessionCompleted(session) | EventPayload::SessionExpired(session) => {
                &session.metadata
            }
            EventPayload::Ignored => return Ok(Handled::Ignored),
        };
        let Some(booking_id) = booking_id_of(metadata).map(str::to_string) else {
            warn!(event = %event_id, "webhook event names no booking");
            return Ok(Handled::Skipped);
        };

        match payload {
            EventPayload::ChargeSucceeded(charge) => {
                self.settle_charge(SettledCharge {
                    booking_id,
                    reference: charge.reference_id().to_string(),
                    amount: charge.amount,
                    session_id: None,
                    method: None,
                    metadata: charge.metadata,
                })
                .await?;
            }
            EventPayload::ChargeFailed(charge) => {
                let reference = charge.failure_reference();
                self.record_failure(&booking_id, reference, charge.amount, charge.metadata)
                    .await?;
            }
            EventPayload::SessionCompleted(session) => {
                let (Some(reference), Some(amount)) =
                    (session.payment_intent.clone(), session.amount_total)
                else {
                    warn!(
                        event = %event_id,
                        session = %session.id,
                        "completed session without payment"
                    );
                    return Ok(Handled::Ignored);
                };
                if session.payment_status != SessionPaymentStatus::Paid {
                    return Ok(Handled::Ignored);
                }
                self.settle_session(&booking_id, session, reference, amount).await?;
            }
            EventPayload::SessionExpired(session) => {
                self.expire_link(&booking_id, &session.id, &session.metadata).await?;
            }
            EventPayload::Ignored => return Ok(Handled::Ignored),
        }
        Ok(Handled::Applied)
    }
}
