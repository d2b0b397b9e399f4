//! Error types for ledger mutations.

use thiserror::Error;

use crate::model::{BookingId, EntryId, EntryLocator, EntryStatus};
use crate::store::StoreError;

/// Error returned by [`Ledger`](super::Ledger) operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("booking {0} not found")]
    BookingNotFound(BookingId),

    #[error("booking {booking}: {locator} not found")]
    EntryNotFound {
        booking: BookingId,
        locator: EntryLocator,
    },

    #[error("booking {booking}: entry {entry} cannot move from {from} to {to}")]
    IllegalTransition {
        booking: BookingId,
        entry: EntryId,
        from: EntryStatus,
        to: EntryStatus,
    },

    #[error("booking {booking}: reference {reference} already belongs to another entry")]
    ReferenceTaken { booking: BookingId, reference: String },

    #[error("booking {booking}: gave up after {attempts} conflicting writes")]
    Contention { booking: BookingId, attempts: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}
