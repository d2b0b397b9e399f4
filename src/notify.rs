//! Payment completion notices.
//!
//! Notifying is fire-and-forget: a full or closed channel is logged and the
//! payment that triggered it stands.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use crate::Amount;
use crate::model::{BookingId, PaymentMethod};

/// Emitted once per newly recorded payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCompleted {
    pub booking_id: BookingId,
    pub amount: Amount,
    pub currency: String,
    pub method: PaymentMethod,
    pub paid_at: DateTime<Utc>,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: PaymentCompleted);
}

/// Hands notices to a bounded channel drained by a [`NotificationDispatcher`].
#[derive(Clone)]
pub struct ChannelNotifier {
    sender: mpsc::Sender<PaymentCompleted>,
}

impl ChannelNotifier {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<PaymentCompleted>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: PaymentCompleted) {
        let booking = event.booking_id.clone();
        if let Err(e) = self.sender.try_send(event) {
            warn!(booking = %booking, reason = %e, "payment notice dropped");
        }
    }
}

/// Drains payment notices and hands them to the delivery collaborator.
pub struct NotificationDispatcher<F> {
    deliver: F,
    delivered: u64,
}

impl<F> NotificationDispatcher<F>
where
    F: FnMut(&PaymentCompleted),
{
    pub fn new(deliver: F) -> Self {
        Self {
            deliver,
            delivered: 0,
        }
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Run until the stream ends.
    pub async fn run(&mut self, mut stream: impl Stream<Item = PaymentCompleted> + Unpin) {
        while let Some(event) = stream.next().await {
            info!(
                booking = %event.booking_id,
                amount = %event.amount,
                currency = %event.currency,
                method = event.method.as_str(),
                "payment completed"
            );
            (self.deliver)(&event);
            self.delivered += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::wrappers::ReceiverStream;

    fn completed(booking: &str) -> PaymentCompleted {
        PaymentCompleted {
            booking_id: booking.into(),
            amount: Amount::from_minor(9000),
            currency: "usd".into(),
            method: PaymentMethod::Card,
            paid_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn dispatcher_delivers_everything_sent() {
        let (notifier, receiver) = ChannelNotifier::new(8);
        notifier.notify(completed("b1"));
        notifier.notify(completed("b2"));
        drop(notifier);

        let mut seen = Vec::new();
        let mut dispatcher = NotificationDispatcher::new(|e: &PaymentCompleted| {
            seen.push(e.booking_id.clone())
        });
        dispatcher.run(ReceiverStream::new(receiver)).await;

        assert_eq!(dispatcher.delivered(), 2);
        drop(dispatcher);
        assert_eq!(seen, vec!["b1".to_string(), "b2".to_string()]);
    }

    #[tokio::test]
    async fn full_channel_drops_without_panicking() {
        let (notifier, mut receiver) = ChannelNotifier::new(1);
        notifier.notify(completed("b1"));
        notifier.notify(completed("b2"));

        assert_eq!(receiver.recv().await.unwrap().booking_id, "b1");
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_channel_is_ignored() {
        let (notifier, receiver) = ChannelNotifier::new(4);
        drop(receiver);
        notifier.notify(completed("b1"));
    }
}
