//! Payment status derivation.

use crate::Amount;
use crate::model::{EntryKind, EntryStatus, LedgerEntry, PaymentStatus};

/// Map a booking's total and paid amounts to its payment status.
///
/// Never yields `Failed` or `Refunded`; see [`settle_status`].
pub fn derive_status(total: Amount, paid: Amount) -> PaymentStatus {
    if total.is_zero() {
        return if paid.is_positive() {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Pending
        };
    }
    if paid >= total {
        PaymentStatus::Paid
    } else if paid.is_positive() {
        PaymentStatus::PartiallyPaid
    } else {
        PaymentStatus::Pending
    }
}

/// [`derive_status`] with the history-based overrides applied.
///
/// When nothing is paid, the last settled money event decides: a succeeded
/// refund means `Refunded`, a failed payment means `Failed`.
pub fn settle_status(total: Amount, paid: Amount, history: &[LedgerEntry]) -> PaymentStatus {
    if paid.is_positive() {
        return derive_status(total, paid);
    }

    let last_settled = history.iter().rev().find(|entry| {
        matches!(
            (entry.kind, entry.status),
            (EntryKind::Refund, EntryStatus::Succeeded)
                | (EntryKind::Payment | EntryKind::Link, EntryStatus::Succeeded | EntryStatus::Failed)
        )
    });

    match last_settled.map(|entry| (entry.kind, entry.status)) {
        Some((EntryKind::Refund, _)) => PaymentStatus::Refunded,
        Some((_, EntryStatus::Failed)) => PaymentStatus::Failed,
        _ => derive_status(total, paid),
    }
}
