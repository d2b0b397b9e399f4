use std::sync::Arc;

use booking_ledger::{
    Amount, Booking, BookingStore, EntryKind, EntryStatus, Ledger, LedgerEntry, MemoryStore,
};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;

/// Generates gateway events for one booking.
///
/// Pattern (repeating):
/// 1. Payment 100
/// 2. Payment 50
/// 3. Refund 30
///
/// Every `duplicate_every`-th event replays an earlier reference instead
/// (0 = never).
pub struct EventGenerator {
    next: u32,
    count: u32,
    duplicate_every: u32,
}

impl EventGenerator {
    pub fn new(count: u32, duplicate_every: u32) -> Self {
        Self {
            next: 0,
            count,
            duplicate_every,
        }
    }
}

impl Iterator for EventGenerator {
    type Item = (LedgerEntry, Amount);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let step = self.next;
        self.next += 1;

        let replay = self.duplicate_every > 0 && step > 0 && step % self.duplicate_every == 0;
        let reference = if replay { step / 2 } else { step };

        let (kind, minor) = match reference % 3 {
            0 => (EntryKind::Payment, 10_000),
            1 => (EntryKind::Payment, 5_000),
            _ => (EntryKind::Refund, 3_000),
        };
        let amount = Amount::from_minor(minor);
        let delta = match kind {
            EntryKind::Refund => -amount,
            _ => amount,
        };
        let entry = LedgerEntry::new(kind, amount, EntryStatus::Succeeded)
            .with_reference(format!("ref_{reference}"));
        Some((entry, delta))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count.saturating_sub(self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for EventGenerator {}

async fn ledger_with_booking(id: &str) -> Ledger {
    let store = Arc::new(MemoryStore::new());
    store
        .insert(Booking::new(id, Amount::from_minor(1_000_000_000), "usd"))
        .await
        .unwrap();
    Ledger::new(store)
}

fn bench_appends(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("appends");

    for count in [100u32, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.to_async(&runtime).iter(|| async move {
                let ledger = ledger_with_booking("b1").await;
                for (entry, delta) in EventGenerator::new(count, 0) {
                    let _ = black_box(ledger.record_entry("b1", entry, delta).await);
                }
                ledger
            });
        });
    }

    group.finish();
}

fn bench_duplicates(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("duplicates");

    // One replayed reference every 4 events
    group.bench_function("1k_dup_25pct", |b| {
        b.to_async(&runtime).iter(|| async {
            let ledger = ledger_with_booking("b1").await;
            for (entry, delta) in EventGenerator::new(1_000, 4) {
                let _ = black_box(ledger.record_entry("b1", entry, delta).await);
            }
            ledger
        });
    });

    group.finish();
}

fn bench_contention(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("contention");
    group.sample_size(20);

    // Writers racing on one booking through the version check
    for writers in [2u32, 8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(writers),
            &writers,
            |b, &writers| {
                b.to_async(&runtime).iter(|| async move {
                    let ledger = ledger_with_booking("b1").await;
                    let tasks: Vec<_> = (0..writers)
                        .map(|writer| {
                            let ledger = ledger.clone();
                            tokio::spawn(async move {
                                for i in 0..50 {
                                    let entry = LedgerEntry::new(
                                        EntryKind::Payment,
                                        Amount::from_minor(100),
                                        EntryStatus::Succeeded,
                                    )
                                    .with_reference(format!("w{writer}_{i}"));
                                    let _ = ledger
                                        .record_entry("b1", entry, Amount::from_minor(100))
                                        .await;
                                }
                            })
                        })
                        .collect();
                    for task in tasks {
                        let _ = task.await;
                    }
                    ledger
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_appends, bench_duplicates, bench_contention);
criterion_main!(benches);
