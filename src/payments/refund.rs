use serde::Serialize;
use tracing::info;

use crate::Amount;
use crate::gateway::CreateRefund;
use crate::model::{Booking, EntryKind, EntryStatus, LedgerEntry, Metadata, PaymentStatus};
use crate::payments::{META_BOOKING_ID, PaymentError, PaymentService};

/// Gateway metadata key naming the charge a refund reverses.
const META_REFUNDED_REFERENCE: &str = "refunded_reference";
const META_REASON: &str = "reason";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundOutcome {
    pub refund_id: String,
    pub booking: Booking,
}

impl PaymentService {
    /// Refund part or all of what a booking has paid. `amount` defaults to
    /// everything paid.
    ///
    /// All checks run before the gateway is called; a rejected request
    /// never moves money.
    pub async fn refund(
        &self,
        booking_id: &str,
        amount: Option<Amount>,
        reason: Option<String>,
    ) -> Result<RefundOutcome, PaymentError> {
        let booking = self.ledger.booking(booking_id).await?;
        if booking.payment_status == PaymentStatus::Refunded {
            return Err(PaymentError::AlreadyRefunded(booking.id));
        }
        if !booking.has_settled_payment() {
            return Err(PaymentError::NotYetPaid(booking.id));
        }

        let amount = amount.unwrap_or(booking.amount_paid);
        if !amount.is_positive() {
            return Err(PaymentError::InvalidAmount(format!(
                "refund amount {amount} must be positive"
            )));
        }
        if amount > booking.amount_paid {
            return Err(PaymentError::InvalidAmount(format!(
                "refund {amount} exceeds paid amount {}",
                booking.amount_paid
            )));
        }
        let charge = refundable_charge(&booking, amount).ok_or_else(|| {
            PaymentError::InvalidAmount(format!(
                "no single charge has {amount} left to refund"
            ))
        })?;

        let mut metadata = Metadata::new();
        metadata.insert(META_BOOKING_ID.into(), booking.id.clone());
        metadata.insert(META_REFUNDED_REFERENCE.into(), charge.clone());
        if let Some(reason) = reason.filter(|r| !r.trim().is_empty()) {
            metadata.insert(META_REASON.into(), reason);
        }

        let refund = self
            .gateway
            .create_refund(CreateRefund {
                payment_intent: charge.clone(),
                amount,
                metadata: metadata.clone(),
            })
            .await?;

        let entry = LedgerEntry::new(EntryKind::Refund, refund.amount, EntryStatus::Succeeded)
            .with_reference(refund.id.clone())
            .with_refunded_reference(charge)
            .with_metadata(metadata);
        let recorded = self
            .ledger
            .record_entry(booking_id, entry, -refund.amount)
            .await?;
        info!(
            booking = %booking_id,
            refund = %refund.id,
            amount = %refund.amount,
            status = %recorded.booking.payment_status,
            "refund recorded"
        );

        Ok(RefundOutcome {
            refund_id: refund.id,
            booking: recorded.booking,
        })
    }
}

/// Reference of the newest succeeded charge with enough left unrefunded to
/// carry the whole refund.
fn refundable_charge(booking: &Booking, amount: Amount) -> Option<String> {
    booking
        .payment_history
        .iter()
        .rev()
        .filter(|e| e.is_money_in() && e.status == EntryStatus::Succeeded)
        .filter_map(|e| e.reference_id.as_deref())
        .find(|reference| booking.refundable_on(reference) >= amount)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::fixture::Harness;

    async fn paid(harness: &Harness, booking: &str, amount: i64) -> String {
        let created = harness
            .service
            .create_intent(booking, Amount::from_minor(amount))
            .await
            .unwrap();
        harness.gateway.succeed_intent(&created.intent_id).await.unwrap();
        harness
            .service
            .confirm_intent(booking, &created.intent_id)
            .await
            .unwrap();
        created.intent_id
    }

    #[tokio::test]
    async fn full_refund_marks_booking_refunded() {
        let harness = Harness::with_booking("b1", 9000).await;
        let intent = paid(&harness, "b1", 9000).await;

        let outcome = harness
            .service
            .refund("b1", None, Some("customer cancelled".into()))
            .await
            .unwrap();
        assert_eq!(outcome.booking.amount_paid, Amount::ZERO);
        assert_eq!(outcome.booking.payment_status, PaymentStatus::Refunded);

        let entry = outcome.booking.find_by_reference(&outcome.refund_id).unwrap();
        assert_eq!(entry.kind, EntryKind::Refund);
        assert_eq!(entry.refunded_reference.as_deref(), Some(intent.as_str()));

        let again = harness.service.refund("b1", None, None).await;
        assert!(matches!(again, Err(PaymentError::AlreadyRefunded(_))));
    }

    #[tokio::test]
    async fn partial_refund_keeps_partial_status() {
        let harness = Harness::with_booking("b1", 9000).await;
        paid(&harness, "b1", 9000).await;

        let outcome = harness
            .service
            .refund("b1", Some(Amount::from_minor(2500)), None)
            .await
            .unwrap();
        assert_eq!(outcome.booking.amount_paid, Amount::from_minor(6500));
        assert_eq!(outcome.booking.payment_status, PaymentStatus::PartiallyPaid);
    }

    #[tokio::test]
    async fn overshoot_is_rejected_before_the_gateway() {
        let harness = Harness::with_booking("b1", 9000).await;
        paid(&harness, "b1", 3000).await;

        let result = harness
            .service
            .refund("b1", Some(Amount::from_minor(6000)), None)
            .await;
        assert!(matches!(result, Err(PaymentError::InvalidAmount(_))));
        assert!(harness.gateway.refunds().await.is_empty());
        assert_eq!(
            harness.service.booking("b1").await.unwrap().amount_paid,
            Amount::from_minor(3000)
        );
    }

    #[tokio::test]
    async fn unpaid_and_missing_bookings() {
        let harness = Harness::with_booking("b1", 9000).await;
        assert!(matches!(
            harness.service.refund("b1", None, None).await,
            Err(PaymentError::NotYetPaid(_))
        ));
        assert!(matches!(
            harness.service.refund("missing", None, None).await,
            Err(PaymentError::NotFound(_))
        ));
        assert!(harness.gateway.refunds().await.is_empty());
    }

    #[tokio::test]
    async fn refund_spanning_charges_is_rejected() {
        let harness = Harness::with_booking("b1", 9000).await;
        paid(&harness, "b1", 3000).await;
        paid(&harness, "b1", 3000).await;

        let result = harness
            .service
            .refund("b1", Some(Amount::from_minor(4000)), None)
            .await;
        assert!(matches!(result, Err(PaymentError::InvalidAmount(_))));

        let newest_first = harness
            .service
            .refund("b1", Some(Amount::from_minor(3000)), None)
            .await
            .unwrap();
        assert_eq!(newest_first.booking.amount_paid, Amount::from_minor(3000));
    }

    #[tokio::test]
    async fn later_refund_falls_back_to_an_older_charge() {
        let harness = Harness::with_booking("b1", 9000).await;
        let older = paid(&harness, "b1", 3000).await;
        let newer = paid(&harness, "b1", 6000).await;

        let first = harness
            .service
            .refund("b1", Some(Amount::from_minor(6000)), None)
            .await
            .unwrap();
        assert_eq!(first.booking.amount_paid, Amount::from_minor(3000));
        assert_eq!(first.booking.payment_status, PaymentStatus::PartiallyPaid);
        assert_eq!(first.booking.refundable_on(&newer), Amount::ZERO);

        let second = harness
            .service
            .refund("b1", Some(Amount::from_minor(3000)), None)
            .await
            .unwrap();
        assert_eq!(second.booking.amount_paid, Amount::ZERO);
        assert_eq!(second.booking.payment_status, PaymentStatus::Refunded);
        let entry = second.booking.find_by_reference(&second.refund_id).unwrap();
        assert_eq!(entry.refunded_reference.as_deref(), Some(older.as_str()));

        let refunds = harness.gateway.refunds().await;
        assert_eq!(refunds.len(), 2);
    }

    #[tokio::test]
    async fn partially_refunded_charge_covers_only_its_remainder() {
        let harness = Harness::with_booking("b1", 9000).await;
        paid(&harness, "b1", 9000).await;
        harness
            .service
            .refund("b1", Some(Amount::from_minor(5000)), None)
            .await
            .unwrap();

        let too_much = harness
            .service
            .refund("b1", Some(Amount::from_minor(4001)), None)
            .await;
        assert!(matches!(too_much, Err(PaymentError::InvalidAmount(_))));

        let rest = harness.service.refund("b1", None, None).await.unwrap();
        assert_eq!(rest.booking.payment_status, PaymentStatus::Refunded);
        assert_eq!(harness.gateway.refunds().await.len(), 2);
    }

    #[tokio::test]
    async fn gateway_outage_records_nothing() {
        let harness = Harness::with_booking("b1", 9000).await;
        paid(&harness, "b1", 9000).await;
        harness.gateway.set_available(false);

        let result = harness.service.refund("b1", None, None).await;
        assert_eq!(result.unwrap_err().kind(), "gateway_unavailable");
        let booking = harness.service.booking("b1").await.unwrap();
        assert_eq!(booking.payment_status, PaymentStatus::Paid);
        assert_eq!(booking.payment_history.len(), 1);
    }
}
