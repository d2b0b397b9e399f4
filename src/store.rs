//! Booking persistence.
//!
//! [`BookingStore`] is the seam to the booking collaborator. A single
//! versioned `replace` is the only write primitive the ledger needs.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::model::{Booking, BookingId};

/// Errors raised by a [`BookingStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("booking {booking}: expected version {expected}, found {actual}")]
    VersionConflict {
        booking: BookingId,
        expected: u64,
        actual: u64,
    },

    #[error("booking {booking}: reference {reference} is already recorded")]
    DuplicateReference { booking: BookingId, reference: String },

    #[error("booking {0}: payment history may only grow")]
    AppendOnlyViolation(BookingId),

    #[error("booking {0} already exists")]
    AlreadyExists(BookingId),

    #[error("booking {0} not found")]
    NotFound(BookingId),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Conflicts that a fresh read and retry can resolve.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::VersionConflict { .. } | StoreError::DuplicateReference { .. }
        )
    }
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Booking>, StoreError>;

    async fn insert(&self, booking: Booking) -> Result<Booking, StoreError>;

    /// Atomically replace a booking if its stored version is still
    /// `expected_version`. The stored copy gets `expected_version + 1`.
    ///
    /// Rejects histories that hold a reference id twice or that are shorter
    /// than the stored one.
    async fn replace(&self, booking: Booking, expected_version: u64) -> Result<Booking, StoreError>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    bookings: RwLock<HashMap<BookingId, Booking>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.bookings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bookings.read().await.is_empty()
    }
}

/// Storage-level uniqueness of reference ids within one history.
fn check_unique_references(booking: &Booking) -> Result<(), StoreError> {
    let mut seen = HashSet::new();
    for reference in booking
        .payment_history
        .iter()
        .filter_map(|e| e.reference_id.as_deref())
    {
        if !seen.insert(reference) {
            return Err(StoreError::DuplicateReference {
                booking: booking.id.clone(),
                reference: reference.to_string(),
            });
        }
    }
    Ok(())
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.read().await.get(id).cloned())
    }

    async fn insert(&self, mut booking: Booking) -> Result<Booking, StoreError> {
        check_unique_references(&booking)?;
        let mut bookings = self.bookings.write().await;
        if bookings.contains_key(&booking.id) {
            return Err(StoreError::AlreadyExists(booking.id));
        }
        booking.version = 0;
        bookings.insert(booking.id.clone(), booking.clone());
        Ok(booking)
    }

    async fn replace(
        &self,
        mut booking: Booking,
        expected_version: u64,
    ) -> Result<Booking, StoreError> {
        let mut bookings = self.bookings.write().await;
        let current = bookings
            .get(&booking.id)
            .ok_or_else(|| StoreError::NotFound(booking.id.clone()))?;

        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                booking: booking.id,
                expected: expected_version,
                actual: current.version,
            });
        }
        if booking.payment_history.len() < current.payment_history.len() {
            return Err(StoreError::AppendOnlyViolation(booking.id));
        }
        check_unique_references(&booking)?;

        booking.version = expected_version + 1;
        bookings.insert(booking.id.clone(), booking.clone());
        Ok(booking)
    }
}
