//! Payment ledger.
//!
//! Records payment events against a booking's append-only history and keeps
//! the derived paid/status fields in step with it. Every mutation re-reads
//! the booking, applies a pure change and writes it back with a version
//! check, retrying on conflict. Reference ids are the idempotency key: an
//! event whose reference is already recorded never adds a second entry.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::Amount;
use crate::model::{
    Booking, EntryLocator, EntryStatus, LedgerEntry, PaymentMethod, Transition,
};
use crate::store::BookingStore;

pub mod state;
pub mod status;
pub use state::LedgerTotals;
pub use status::{derive_status, settle_status};

mod error;
pub use error::LedgerError;

/// Default number of optimistic write attempts per mutation.
pub const DEFAULT_MAX_ATTEMPTS: usize = 8;

/// What [`Ledger::record_entry`] did with the candidate entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The entry was new and has been appended.
    Appended,
    /// The reference was already recorded. `reconciled` is set when the
    /// derived fields had drifted and were rewritten.
    Duplicate { reconciled: bool },
}

/// Result of [`Ledger::record_entry`].
#[derive(Debug, Clone)]
pub struct Recorded {
    pub booking: Booking,
    pub outcome: RecordOutcome,
}

impl Recorded {
    pub fn is_appended(&self) -> bool {
        self.outcome == RecordOutcome::Appended
    }

    /// True when this call moved the derived totals: either the entry is new,
    /// or it was already in the history (a settled link, a retried call) but
    /// not yet counted.
    pub fn is_newly_counted(&self) -> bool {
        matches!(
            self.outcome,
            RecordOutcome::Appended | RecordOutcome::Duplicate { reconciled: true }
        )
    }
}

/// Result of [`Ledger::update_entry_status`].
#[derive(Debug, Clone)]
pub enum EntryUpdate {
    /// The entry moved to the requested status.
    Transitioned(LedgerEntry),
    /// The entry already had the requested status.
    Unchanged(LedgerEntry),
}

impl EntryUpdate {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            EntryUpdate::Transitioned(entry) | EntryUpdate::Unchanged(entry) => entry,
        }
    }

    pub fn is_transitioned(&self) -> bool {
        matches!(self, EntryUpdate::Transitioned(_))
    }
}

/// Gateway ids to attach to an entry when it leaves `pending`.
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    pub reference_id: Option<String>,
    pub session_id: Option<String>,
}

/// Intended payment attempt stored on the booking before money moves.
#[derive(Debug, Clone)]
pub struct PaymentAttempt {
    pub method: PaymentMethod,
    pub amount: Amount,
    pub gateway_handle: String,
}

/// Outcome of a mutation closure: write the changed booking, or skip the
/// write because nothing changed.
enum Mutation<T> {
    Write(T),
    Skip(T),
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn BookingStore>,
    max_attempts: usize,
}

/// Public API
impl Ledger {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn BookingStore> {
        &self.store
    }

    /// Read a booking straight from the store.
    pub async fn booking(&self, booking_id: &str) -> Result<Booking, LedgerError> {
        self.store
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| LedgerError::BookingNotFound(booking_id.to_string()))
    }

    /// Record a payment event.
    ///
    /// - Re-read the booking; the caller's copy may be stale
    /// - If the candidate's reference is already in the history, append
    ///   nothing. With a non-zero delta, rewrite drifted derived fields
    /// - Otherwise append the candidate and recompute the derived fields from
    ///   the full history
    ///
    /// `amount_delta` is the caller's expected change of the paid amount; the
    /// stored value is always the aggregate over the history, and a mismatch
    /// is logged.
    pub async fn record_entry(
        &self,
        booking_id: &str,
        candidate: LedgerEntry,
        amount_delta: Amount,
    ) -> Result<Recorded, LedgerError> {
        let result = self
            .mutate(booking_id, |booking| {
                Ok(Self::apply_record(booking, &candidate, amount_delta))
            })
            .await;

        Self::log_record(booking_id, &candidate, amount_delta, &result);
        let (booking, outcome) = result?;
        Ok(Recorded { booking, outcome })
    }

    /// Move an existing entry out of `pending`, backfilling gateway ids that
    /// were unknown when it was created. Leaves the derived fields alone.
    pub async fn update_entry_status(
        &self,
        booking_id: &str,
        locator: &EntryLocator,
        status: EntryStatus,
        correlation: &Correlation,
    ) -> Result<EntryUpdate, LedgerError> {
        let result = self
            .mutate(booking_id, |booking| {
                Self::apply_status(booking, locator, status, correlation)
            })
            .await;

        match &result {
            Ok((_, EntryUpdate::Transitioned(entry))) => info!(
                booking = %booking_id,
                entry = %entry.id,
                status = %status,
                reference = ?entry.reference_id,
                "entry transitioned"
            ),
            Ok((_, EntryUpdate::Unchanged(entry))) => debug!(
                booking = %booking_id,
                entry = %entry.id,
                status = %status,
                "entry already in status"
            ),
            Err(e) => info!(
                booking = %booking_id,
                locator = %locator,
                reason = %e,
                "entry transition skipped"
            ),
        }
        result.map(|(_, update)| update)
    }

    /// Remember the intended method and amount of a payment attempt. No
    /// ledger entry is created.
    pub async fn note_attempt(
        &self,
        booking_id: &str,
        attempt: PaymentAttempt,
    ) -> Result<Booking, LedgerError> {
        let (booking, ()) = self
            .mutate(booking_id, |booking| {
                booking.payment_method = Some(attempt.method);
                booking.requested_amount = Some(attempt.amount);
                booking.gateway_handle = Some(attempt.gateway_handle.clone());
                Ok(Mutation::Write(()))
            })
            .await?;
        Ok(booking)
    }
}

/// Private API
impl Ledger {
    /// Optimistic read-modify-write loop around a pure mutation.
    async fn mutate<T, F>(&self, booking_id: &str, mut apply: F) -> Result<(Booking, T), LedgerError>
    where
        F: FnMut(&mut Booking) -> Result<Mutation<T>, LedgerError>,
    {
        for attempt in 1..=self.max_attempts {
            let fresh = self.booking(booking_id).await?;
            let version = fresh.version;
            let mut next = fresh.clone();

            let value = match apply(&mut next)? {
                Mutation::Skip(value) => return Ok((fresh, value)),
                Mutation::Write(value) => value,
            };

            match self.store.replace(next, version).await {
                Ok(written) => return Ok((written, value)),
                Err(e) if e.is_conflict() => {
                    debug!(booking = %booking_id, attempt, reason = %e, "write conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::Contention {
            booking: booking_id.to_string(),
            attempts: self.max_attempts,
        })
    }

    fn apply_record(
        booking: &mut Booking,
        candidate: &LedgerEntry,
        amount_delta: Amount,
    ) -> Mutation<RecordOutcome> {
        let duplicate = candidate
            .reference_id
            .as_deref()
            .is_some_and(|reference| booking.find_by_reference(reference).is_some());

        if duplicate {
            if amount_delta.is_zero() || !booking.recompute_totals() {
                return Mutation::Skip(RecordOutcome::Duplicate { reconciled: false });
            }
            return Mutation::Write(RecordOutcome::Duplicate { reconciled: true });
        }

        let expected = (booking.amount_paid + amount_delta).floor_zero();
        booking.payment_history.push(candidate.clone());
        booking.recompute_totals();

        if booking.amount_paid != expected {
            warn!(
                booking = %booking.id,
                expected = %expected,
                actual = %booking.amount_paid,
                "paid amount reconciled from history"
            );
        }
        Mutation::Write(RecordOutcome::Appended)
    }

    fn apply_status(
        booking: &mut Booking,
        locator: &EntryLocator,
        status: EntryStatus,
        correlation: &Correlation,
    ) -> Result<Mutation<EntryUpdate>, LedgerError> {
        let index = booking
            .locate(locator)
            .ok_or_else(|| LedgerError::EntryNotFound {
                booking: booking.id.clone(),
                locator: locator.clone(),
            })?;

        let current = &booking.payment_history[index];
        match current.status.transition(status) {
            Transition::Unchanged => return Ok(Mutation::Skip(EntryUpdate::Unchanged(current.clone()))),
            Transition::Illegal => {
                return Err(LedgerError::IllegalTransition {
                    booking: booking.id.clone(),
                    entry: current.id,
                    from: current.status,
                    to: status,
                });
            }
            Transition::Apply => {}
        }

        if let Some(reference) = correlation.reference_id.as_deref() {
            let taken = booking.payment_history.iter().enumerate().any(|(i, e)| {
                i != index && e.reference_id.as_deref() == Some(reference)
            });
            if taken {
                return Err(LedgerError::ReferenceTaken {
                    booking: booking.id.clone(),
                    reference: reference.to_string(),
                });
            }
        }

        let entry = &mut booking.payment_history[index];
        entry.status = status;
        entry.completed_at = Some(Utc::now());
        if entry.reference_id.is_none() {
            entry.reference_id = correlation.reference_id.clone();
        }
        if entry.session_id.is_none() {
            entry.session_id = correlation.session_id.clone();
        }
        Ok(Mutation::Write(EntryUpdate::Transitioned(entry.clone())))
    }

    /// Small helper to log `record_entry` results
    fn log_record(
        booking_id: &str,
        candidate: &LedgerEntry,
        amount_delta: Amount,
        result: &Result<(Booking, RecordOutcome), LedgerError>,
    ) {
        let kind = candidate.kind;
        let reference = candidate.reference_id.as_deref().unwrap_or("-");
        match result {
            Ok((booking, RecordOutcome::Appended)) => info!(
                booking = %booking_id,
                entry = %candidate.id,
                ?kind,
                reference,
                delta = %amount_delta,
                paid = %booking.amount_paid,
                status = %booking.payment_status,
                "ledger entry appended"
            ),
            Ok((booking, RecordOutcome::Duplicate { reconciled })) => info!(
                booking = %booking_id,
                ?kind,
                reference,
                reconciled,
                paid = %booking.amount_paid,
                "duplicate event, no entry appended"
            ),
            Err(e) => info!(
                booking = %booking_id,
                ?kind,
                reference,
                reason = %e,
                "ledger entry skipped"
            ),
        }
    }
}
