//! Gateway ingress adapters.
//!
//! Each adapter turns a gateway object (intent, checkout session, webhook
//! event, refund) into a ledger entry and hands it to the [`Ledger`]. All of
//! them key succeeded payments on the gateway intent id, so the confirm,
//! verify and webhook paths converge on one entry however they race.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::Amount;
use crate::gateway::{PaymentGateway, WebhookVerifier};
use crate::ledger::{Correlation, Ledger, LedgerError};
use crate::model::{
    Booking, EntryKind, EntryLocator, EntryStatus, LedgerEntry, Metadata, PaymentMethod,
};
use crate::notify::{Notifier, PaymentCompleted};
use crate::store::StoreError;

mod checkout;
mod error;
mod intent;
mod refund;
mod webhook;

pub use checkout::{CheckoutCreated, PaymentLink};
pub use error::PaymentError;
pub use intent::IntentCreated;
pub use refund::RefundOutcome;
pub use webhook::WebhookReport;

/// Metadata key naming the booking a gateway object belongs to.
pub const META_BOOKING_ID: &str = "booking_id";
/// Metadata key carrying the local id of a pending link entry.
pub const META_ENTRY_ID: &str = "ledger_entry_id";
pub const META_PAYMENT_OPTION: &str = "payment_option";

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    /// Currency of bookings registered without one.
    pub currency: String,
    /// Where a payment link sends the customer after checkout.
    pub link_return_url: String,
}

/// A charge the gateway reports as succeeded, in ledger terms.
#[derive(Debug, Clone)]
struct SettledCharge {
    booking_id: String,
    reference: String,
    amount: Amount,
    session_id: Option<String>,
    method: Option<PaymentMethod>,
    metadata: Metadata,
}

#[derive(Clone)]
pub struct PaymentService {
    ledger: Ledger,
    gateway: Arc<dyn PaymentGateway>,
    verifier: WebhookVerifier,
    notifier: Arc<dyn Notifier>,
    settings: PaymentSettings,
}

impl PaymentService {
    pub fn new(
        ledger: Ledger,
        gateway: Arc<dyn PaymentGateway>,
        verifier: WebhookVerifier,
        notifier: Arc<dyn Notifier>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            ledger,
            gateway,
            verifier,
            notifier,
            settings,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Register a payable booking. The id is generated when not given.
    pub async fn register_booking(
        &self,
        booking_id: Option<String>,
        total: Amount,
        currency: Option<String>,
    ) -> Result<Booking, PaymentError> {
        if total < Amount::ZERO {
            return Err(PaymentError::InvalidAmount(format!(
                "total {total} must not be negative"
            )));
        }
        let id = booking_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let currency = currency.unwrap_or_else(|| self.settings.currency.clone());

        let booking = Booking::new(id, total, currency.to_lowercase());
        match self.ledger.store().insert(booking).await {
            Ok(booking) => {
                info!(booking = %booking.id, total = %booking.total_amount, "booking registered");
                Ok(booking)
            }
            Err(StoreError::AlreadyExists(id)) => Err(PaymentError::InvalidRequest(format!(
                "booking {id} already exists"
            ))),
            Err(e) => Err(LedgerError::from(e).into()),
        }
    }

    pub async fn booking(&self, booking_id: &str) -> Result<Booking, PaymentError> {
        Ok(self.ledger.booking(booking_id).await?)
    }
}

/// Shared settlement paths
impl PaymentService {
    /// Settle a succeeded charge: transition the pending link entry it was
    /// paid through, if any, then record the money. The record call is a
    /// duplicate when the link entry already carries the reference, and
    /// reconciles the derived fields.
    ///
    /// The notice goes out with whichever call moves the totals, so a retry
    /// after the record step failed still notifies exactly once.
    async fn settle_charge(&self, charge: SettledCharge) -> Result<Booking, PaymentError> {
        if let Some(locator) = link_locator(&charge.metadata, charge.session_id.as_deref()) {
            let correlation = Correlation {
                reference_id: Some(charge.reference.clone()),
                session_id: charge.session_id.clone(),
            };
            match self
                .ledger
                .update_entry_status(&charge.booking_id, &locator, EntryStatus::Succeeded, &correlation)
                .await
            {
                Ok(_) => {}
                // No usable link entry: the charge is recorded as a plain payment.
                Err(
                    LedgerError::EntryNotFound { .. }
                    | LedgerError::IllegalTransition { .. }
                    | LedgerError::ReferenceTaken { .. },
                ) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let method = charge.method.or_else(|| {
            charge
                .metadata
                .contains_key(META_ENTRY_ID)
                .then_some(PaymentMethod::PaymentLink)
        });
        let entry = LedgerEntry::new(EntryKind::Payment, charge.amount, EntryStatus::Succeeded)
            .with_reference(charge.reference.clone())
            .with_session(charge.session_id)
            .with_metadata(charge.metadata);
        let recorded = self
            .ledger
            .record_entry(&charge.booking_id, entry, charge.amount)
            .await?;

        if recorded.is_newly_counted() {
            self.notify_completed(&recorded.booking, charge.amount, method);
        } else {
            debug!(booking = %charge.booking_id, reference = %charge.reference, "charge already settled");
        }
        Ok(recorded.booking)
    }

    /// Record a failed attempt. Moves no money.
    async fn record_failure(
        &self,
        booking_id: &str,
        reference: String,
        amount: Amount,
        metadata: Metadata,
    ) -> Result<Booking, PaymentError> {
        let entry = LedgerEntry::new(EntryKind::Payment, amount, EntryStatus::Failed)
            .with_reference(reference)
            .with_metadata(metadata);
        let recorded = self.ledger.record_entry(booking_id, entry, Amount::ZERO).await?;
        Ok(recorded.booking)
    }

    /// Expire the pending link entry behind a checkout session. Sessions
    /// that were never links have no entry and are left alone.
    async fn expire_link(
        &self,
        booking_id: &str,
        session_id: &str,
        metadata: &Metadata,
    ) -> Result<(), PaymentError> {
        let Some(locator) = link_locator(metadata, Some(session_id)) else {
            return Ok(());
        };
        let correlation = Correlation {
            reference_id: None,
            session_id: Some(session_id.to_string()),
        };
        match self
            .ledger
            .update_entry_status(booking_id, &locator, EntryStatus::Expired, &correlation)
            .await
        {
            Ok(_) | Err(LedgerError::EntryNotFound { .. } | LedgerError::IllegalTransition { .. }) => {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn notify_completed(&self, booking: &Booking, amount: Amount, method: Option<PaymentMethod>) {
        let method = method
            .or(booking.payment_method)
            .unwrap_or(PaymentMethod::Card);
        self.notifier.notify(PaymentCompleted {
            booking_id: booking.id.clone(),
            amount,
            currency: booking.currency.clone(),
            method,
            paid_at: booking.last_paid_at.unwrap_or_else(Utc::now),
        });
    }
}

/// Booking id a gateway object was created for.
fn booking_id_of(metadata: &Metadata) -> Option<&str> {
    metadata
        .get(META_BOOKING_ID)
        .map(String::as_str)
        .filter(|id| !id.is_empty())
}

/// The link entry a charge or session points at: by local entry id when the
/// metadata carries one, else by checkout session.
fn link_locator(metadata: &Metadata, session_id: Option<&str>) -> Option<EntryLocator> {
    if let Some(raw) = metadata.get(META_ENTRY_ID) {
        match raw.parse::<Uuid>() {
            Ok(id) => return Some(EntryLocator::Id(id)),
            Err(_) => warn!(entry = %raw, "ignoring malformed ledger entry id in metadata"),
        }
    }
    session_id.map(|session| EntryLocator::Session(session.to_string()))
}

fn require_positive(amount: Amount) -> Result<(), PaymentError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(PaymentError::InvalidAmount(format!(
            "amount {amount} must be positive"
        )))
    }
}
