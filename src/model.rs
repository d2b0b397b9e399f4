//! Core domain types for the booking payment ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::Amount;

/// Booking identifier, owned by the booking store.
pub type BookingId = String;

/// Locally generated ledger entry identifier.
pub type EntryId = Uuid;

/// Opaque gateway context carried along with an entry. Never interpreted by
/// the ledger itself.
pub type Metadata = BTreeMap<String, String>;

/// What a ledger entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Money received for the booking.
    Payment,
    /// Money returned to the customer.
    Refund,
    /// Installment link awaiting payment; counts as money received once it
    /// succeeds.
    Link,
    /// Bookkeeping annotation with no money effect.
    Adjustment,
}

/// Lifecycle of a single ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
    Expired,
}

/// Result of checking a requested status change against the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The change is legal and must be applied.
    Apply,
    /// The entry is already in the requested status.
    Unchanged,
    /// The change is not allowed.
    Illegal,
}

impl EntryStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, EntryStatus::Pending)
    }

    /// Only `pending` entries move, and only to a terminal status.
    pub fn transition(self, next: EntryStatus) -> Transition {
        use EntryStatus::*;
        match (self, next) {
            (from, to) if from == to => Transition::Unchanged,
            (Pending, Succeeded | Failed | Cancelled | Expired) => Transition::Apply,
            _ => Transition::Illegal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Succeeded => "succeeded",
            EntryStatus::Failed => "failed",
            EntryStatus::Cancelled => "cancelled",
            EntryStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Booking-level payment status, derived from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    PartiallyPaid,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::PartiallyPaid => "partially_paid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the customer is paying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Client-side card confirmation of a payment intent.
    Card,
    /// Gateway-hosted checkout page.
    HostedCheckout,
    /// Installment link sent to the customer.
    PaymentLink,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::HostedCheckout => "hosted_checkout",
            PaymentMethod::PaymentLink => "payment_link",
        }
    }
}

/// Portion of the booking total a payment link asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOption {
    Full,
    Remaining,
    FirstThird,
    SecondThird,
    /// Last installment; absorbs the rounding remainder of the thirds.
    FinalThird,
    Custom,
}

impl PaymentOption {
    /// Amount requested by this option. `None` for `Custom` without an amount.
    pub fn amount_for(self, total: Amount, paid: Amount, custom: Option<Amount>) -> Option<Amount> {
        let third = Amount::from_minor(total.as_minor() / 3);
        match self {
            PaymentOption::Full => Some(total),
            PaymentOption::Remaining => Some((total - paid).floor_zero()),
            PaymentOption::FirstThird | PaymentOption::SecondThird => Some(third),
            PaymentOption::FinalThird => Some(total - third - third),
            PaymentOption::Custom => custom,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentOption::Full => "full",
            PaymentOption::Remaining => "remaining",
            PaymentOption::FirstThird => "first_third",
            PaymentOption::SecondThird => "second_third",
            PaymentOption::FinalThird => "final_third",
            PaymentOption::Custom => "custom",
        }
    }
}

/// One record of a money-moving or money-intent event tied to a booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: EntryId,
    pub kind: EntryKind,
    /// Always non-negative; the direction of the effect comes from `kind`.
    pub amount: Amount,
    pub status: EntryStatus,
    /// Gateway charge/refund id. Idempotency key.
    pub reference_id: Option<String>,
    /// Hosted-checkout correlation, known before `reference_id` is.
    pub session_id: Option<String>,
    /// Refunds only: reference of the charge this refund reverses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refunded_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl LedgerEntry {
    pub fn new(kind: EntryKind, amount: Amount, status: EntryStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            amount: amount.floor_zero(),
            status,
            reference_id: None,
            session_id: None,
            refunded_reference: None,
            created_at: now,
            completed_at: status.is_terminal().then_some(now),
            metadata: Metadata::new(),
        }
    }

    pub fn with_id(mut self, id: EntryId) -> Self {
        self.id = id;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference_id = Some(reference.into());
        self
    }

    pub fn with_session(mut self, session: Option<String>) -> Self {
        self.session_id = session;
        self
    }

    pub fn with_refunded_reference(mut self, reference: impl Into<String>) -> Self {
        self.refunded_reference = Some(reference.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Signed effect of this entry on the booking's paid amount.
    pub fn effect(&self) -> Amount {
        if self.status != EntryStatus::Succeeded {
            return Amount::ZERO;
        }
        match self.kind {
            EntryKind::Payment | EntryKind::Link => self.amount,
            EntryKind::Refund => -self.amount,
            EntryKind::Adjustment => Amount::ZERO,
        }
    }

    /// True for payments and links, the entries that bring money in.
    pub fn is_money_in(&self) -> bool {
        matches!(self.kind, EntryKind::Payment | EntryKind::Link)
    }
}

/// How the status updater finds the entry it should change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryLocator {
    Id(EntryId),
    Reference(String),
    Session(String),
}

impl fmt::Display for EntryLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryLocator::Id(id) => write!(f, "entry {id}"),
            EntryLocator::Reference(reference) => write!(f, "reference {reference}"),
            EntryLocator::Session(session) => write!(f, "session {session}"),
        }
    }
}

/// The payment-relevant part of a booking record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: BookingId,
    pub currency: String,
    pub total_amount: Amount,
    /// Derived from `payment_history`.
    pub amount_paid: Amount,
    /// Derived from `total_amount` and `payment_history`.
    pub payment_status: PaymentStatus,
    /// Append-only, in arrival order.
    pub payment_history: Vec<LedgerEntry>,
    /// Derived: completion time of the latest succeeded money-in entry.
    pub last_paid_at: Option<DateTime<Utc>>,
    /// Intended method and amount of the latest payment attempt.
    pub payment_method: Option<PaymentMethod>,
    pub requested_amount: Option<Amount>,
    /// Gateway handle of the latest payment attempt (intent or session id).
    pub gateway_handle: Option<String>,
    /// Optimistic concurrency counter, bumped by every store write.
    pub version: u64,
}

impl Booking {
    pub fn new(id: impl Into<BookingId>, total_amount: Amount, currency: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            currency: currency.into(),
            total_amount: total_amount.floor_zero(),
            amount_paid: Amount::ZERO,
            payment_status: PaymentStatus::Pending,
            payment_history: Vec::new(),
            last_paid_at: None,
            payment_method: None,
            requested_amount: None,
            gateway_handle: None,
            version: 0,
        }
    }

    pub fn find_by_reference(&self, reference: &str) -> Option<&LedgerEntry> {
        self.payment_history
            .iter()
            .find(|entry| entry.reference_id.as_deref() == Some(reference))
    }

    pub fn find_entry(&self, id: EntryId) -> Option<&LedgerEntry> {
        self.payment_history.iter().find(|entry| entry.id == id)
    }

    /// Position of the entry the locator points at. Session lookups prefer a
    /// pending entry, since payments settled from the same session share it.
    pub fn locate(&self, locator: &EntryLocator) -> Option<usize> {
        let history = &self.payment_history;
        match locator {
            EntryLocator::Id(id) => history.iter().position(|e| e.id == *id),
            EntryLocator::Reference(reference) => history
                .iter()
                .position(|e| e.reference_id.as_deref() == Some(reference.as_str())),
            EntryLocator::Session(session) => {
                let matches = |e: &LedgerEntry| e.session_id.as_deref() == Some(session.as_str());
                history
                    .iter()
                    .position(|e| matches(e) && e.status == EntryStatus::Pending)
                    .or_else(|| history.iter().position(matches))
            }
        }
    }

    /// True if any money-in entry has succeeded.
    pub fn has_settled_payment(&self) -> bool {
        self.payment_history
            .iter()
            .any(|e| e.is_money_in() && e.status == EntryStatus::Succeeded)
    }

    /// Amount still refundable on the succeeded charge recorded under
    /// `reference`: its amount less the succeeded refunds that reverse it.
    pub fn refundable_on(&self, reference: &str) -> Amount {
        let Some(charge) = self
            .find_by_reference(reference)
            .filter(|e| e.is_money_in() && e.status == EntryStatus::Succeeded)
        else {
            return Amount::ZERO;
        };
        let refunded: Amount = self
            .payment_history
            .iter()
            .filter(|e| e.kind == EntryKind::Refund && e.status == EntryStatus::Succeeded)
            .filter(|e| e.refunded_reference.as_deref() == Some(reference))
            .map(|e| e.amount)
            .sum();
        (charge.amount - refunded).floor_zero()
    }
}
