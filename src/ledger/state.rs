use chrono::{DateTime, Utc};
use tracing::warn;

use crate::Amount;
use crate::ledger::status::settle_status;
use crate::model::{Booking, EntryStatus, LedgerEntry, PaymentStatus};

/// Derived payment fields of a booking, aggregated from its history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerTotals {
    pub amount_paid: Amount,
    pub payment_status: PaymentStatus,
    pub last_paid_at: Option<DateTime<Utc>>,
}

impl LedgerTotals {
    /// Net of all succeeded entries before clamping at zero.
    pub fn net_paid(history: &[LedgerEntry]) -> Amount {
        history.iter().map(LedgerEntry::effect).sum()
    }

    pub fn from_history(total: Amount, history: &[LedgerEntry]) -> Self {
        let net = Self::net_paid(history);
        if net < Amount::ZERO {
            warn!(net = %net, "refunds exceed payments, paid amount clamped to zero");
        }
        let amount_paid = net.floor_zero();

        let last_paid_at = history
            .iter()
            .filter(|e| e.is_money_in() && e.status == EntryStatus::Succeeded)
            .filter_map(|e| e.completed_at)
            .max();

        Self {
            amount_paid,
            payment_status: settle_status(total, amount_paid, history),
            last_paid_at,
        }
    }
}

impl Booking {
    pub fn totals(&self) -> LedgerTotals {
        LedgerTotals {
            amount_paid: self.amount_paid,
            payment_status: self.payment_status,
            last_paid_at: self.last_paid_at,
        }
    }

    /// Recompute the derived fields from the history. Returns whether any of
    /// them changed.
    pub fn recompute_totals(&mut self) -> bool {
        let next = LedgerTotals::from_history(self.total_amount, &self.payment_history);
        if next == self.totals() {
            return false;
        }
        self.amount_paid = next.amount_paid;
        self.payment_status = next.payment_status;
        self.last_paid_at = next.last_paid_at;
        true
    }
}
