use tracing::{debug, info};
use uuid::Uuid;

use crate::Amount;
use crate::gateway::{
    CheckoutSession, CreateCheckoutSession, GatewayError, IntentStatus, SessionPaymentStatus,
    SessionStatus,
};
use crate::ledger::PaymentAttempt;
use crate::model::{
    Booking, EntryId, EntryKind, EntryStatus, LedgerEntry, Metadata, PaymentMethod,
    PaymentOption,
};
use crate::payments::{
    META_BOOKING_ID, META_ENTRY_ID, META_PAYMENT_OPTION, PaymentError, PaymentService,
    SettledCharge, booking_id_of, require_positive,
};

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutCreated {
    pub checkout_url: String,
    pub session_id: String,
}

/// A pending installment link and the checkout page that pays it.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentLink {
    pub checkout_url: String,
    pub session_id: String,
    pub entry_id: EntryId,
    pub amount: Amount,
}

impl PaymentService {
    /// Open a hosted checkout page. Only the intended attempt is stored; the
    /// ledger is untouched until the session is paid.
    pub async fn create_checkout_session(
        &self,
        booking_id: &str,
        amount: Amount,
        return_url: &str,
    ) -> Result<CheckoutCreated, PaymentError> {
        require_positive(amount)?;
        if return_url.trim().is_empty() {
            return Err(PaymentError::InvalidRequest("returnUrl is required".into()));
        }
        let booking = self.ledger.booking(booking_id).await?;

        let mut metadata = Metadata::new();
        metadata.insert(META_BOOKING_ID.into(), booking.id.clone());
        let session = self
            .gateway
            .create_checkout_session(CreateCheckoutSession {
                amount,
                currency: booking.currency.clone(),
                description: format!("Booking {}", booking.id),
                success_url: return_url.to_string(),
                cancel_url: return_url.to_string(),
                metadata,
            })
            .await?;
        let checkout_url = session_url(&session)?;

        self.ledger
            .note_attempt(
                booking_id,
                PaymentAttempt {
                    method: PaymentMethod::HostedCheckout,
                    amount,
                    gateway_handle: session.id.clone(),
                },
            )
            .await?;
        info!(
            booking = %booking_id,
            session = %session.id,
            amount = %amount,
            "checkout session created"
        );

        Ok(CheckoutCreated {
            checkout_url,
            session_id: session.id,
        })
    }

    /// Poll a checkout session after the customer's redirect and record its
    /// outcome. Safe to call any number of times.
    pub async fn verify_session(&self, session_id: &str) -> Result<Booking, PaymentError> {
        let session = self.gateway.retrieve_checkout_session(session_id).await?;
        let booking_id = booking_id_of(&session.metadata)
            .ok_or_else(|| {
                PaymentError::InvalidRequest(format!("session {session_id} names no booking"))
            })?
            .to_string();
        let booking = self.ledger.booking(&booking_id).await?;

        if session.payment_status == SessionPaymentStatus::Paid {
            let Some(intent_id) = session.payment_intent.clone() else {
                let reason = format!("paid session {session_id} has no payment");
                return Err(GatewayError::Decode(reason).into());
            };
            let intent = self.gateway.retrieve_payment_intent(&intent_id).await?;
            if intent.status != IntentStatus::Succeeded {
                debug!(
                    booking = %booking_id,
                    intent = %intent_id,
                    status = ?intent.status,
                    "session paid, intent not settled yet"
                );
                return Ok(booking);
            }
            return self.settle_session(&booking_id, session, intent.id, intent.amount).await;
        }

        if session.status == SessionStatus::Expired {
            self.expire_link(&booking_id, &session.id, &session.metadata).await?;
            return Ok(self.ledger.booking(&booking_id).await?);
        }

        debug!(
            booking = %booking_id,
            session = %session_id,
            status = ?session.status,
            "session not paid yet"
        );
        Ok(booking)
    }

    /// Create an installment link: a pending `link` entry whose id travels
    /// in the checkout metadata, so the settling event transitions this
    /// entry instead of adding another.
    pub async fn generate_payment_link(
        &self,
        booking_id: &str,
        option: PaymentOption,
        custom: Option<Amount>,
    ) -> Result<PaymentLink, PaymentError> {
        let booking = self.ledger.booking(booking_id).await?;
        let amount = option
            .amount_for(booking.total_amount, booking.amount_paid, custom)
            .ok_or_else(|| PaymentError::InvalidAmount("custom option requires an amount".into()))?;
        require_positive(amount)?;

        let entry_id = Uuid::new_v4();
        let mut metadata = Metadata::new();
        metadata.insert(META_BOOKING_ID.into(), booking.id.clone());
        metadata.insert(META_ENTRY_ID.into(), entry_id.to_string());
        metadata.insert(META_PAYMENT_OPTION.into(), option.as_str().into());

        let session = self
            .gateway
            .create_checkout_session(CreateCheckoutSession {
                amount,
                currency: booking.currency.clone(),
                description: format!("Booking {} ({})", booking.id, option.as_str()),
                success_url: self.settings.link_return_url.clone(),
                cancel_url: self.settings.link_return_url.clone(),
                metadata: metadata.clone(),
            })
            .await?;
        let checkout_url = session_url(&session)?;

        let entry = LedgerEntry::new(EntryKind::Link, amount, EntryStatus::Pending)
            .with_id(entry_id)
            .with_session(Some(session.id.clone()))
            .with_metadata(metadata);
        self.ledger.record_entry(booking_id, entry, Amount::ZERO).await?;
        info!(
            booking = %booking_id,
            entry = %entry_id,
            session = %session.id,
            option = option.as_str(),
            amount = %amount,
            "payment link created"
        );

        Ok(PaymentLink {
            checkout_url,
            session_id: session.id,
            entry_id,
            amount,
        })
    }

    /// Settle a paid checkout session, from verification or webhook.
    pub(super) async fn settle_session(
        &self,
        booking_id: &str,
        session: CheckoutSession,
        reference: String,
        amount: Amount,
    ) -> Result<Booking, PaymentError> {
        let method = if session.metadata.contains_key(META_ENTRY_ID) {
            PaymentMethod::PaymentLink
        } else {
            PaymentMethod::HostedCheckout
        };
        self.settle_charge(SettledCharge {
            booking_id: booking_id.to_string(),
            reference,
            amount,
            session_id: Some(session.id),
            method: Some(method),
            metadata: session.metadata,
        })
        .await
    }
}

fn session_url(session: &CheckoutSession) -> Result<String, GatewayError> {
    session
        .url
        .clone()
        .ok_or_else(|| GatewayError::Decode(format!("session {} has no url", session.id)))
}
