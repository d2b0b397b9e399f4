pub mod amount;
pub mod api;
pub mod config;
pub mod gateway;
pub mod ledger;
pub mod model;
pub mod notify;
pub mod payments;
pub mod store;

pub use amount::Amount;
pub use config::Config;
pub use ledger::Ledger;
pub use model::{Booking, BookingId, EntryKind, EntryStatus, LedgerEntry, PaymentStatus};
pub use payments::{PaymentError, PaymentService};
pub use store::{BookingStore, MemoryStore};
