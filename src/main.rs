use std::error::Error;
use std::sync::Arc;

use booking_ledger::api::{self, AppState};
use booking_ledger::gateway::{HttpGateway, MemoryGateway, PaymentGateway, WebhookVerifier};
use booking_ledger::notify::{ChannelNotifier, NotificationDispatcher, PaymentCompleted};
use booking_ledger::payments::PaymentSettings;
use booking_ledger::{Config, Ledger, MemoryStore, PaymentService};
use tokio::net::TcpListener;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    info!(?config, "configuration loaded");

    let ledger =
        Ledger::new(Arc::new(MemoryStore::new())).with_max_attempts(config.ledger_max_attempts);

    let gateway: Arc<dyn PaymentGateway> = match &config.gateway_api_key {
        Some(key) => Arc::new(HttpGateway::new(
            &config.gateway_base_url,
            key,
            config.gateway_timeout,
        )?),
        None => {
            warn!("GATEWAY_API_KEY not set, using the sandbox gateway");
            Arc::new(MemoryGateway::new())
        }
    };

    let (notifier, notices) = ChannelNotifier::new(config.notify_buffer);
    tokio::spawn(async move {
        // Email delivery lives outside this service; notices end here.
        let mut dispatcher = NotificationDispatcher::new(|notice: &PaymentCompleted| {
            debug!(booking = %notice.booking_id, "payment notice handed off");
        });
        dispatcher.run(ReceiverStream::new(notices)).await;
    });

    let service = PaymentService::new(
        ledger,
        gateway,
        WebhookVerifier::new(config.webhook_secret.clone(), config.webhook_tolerance),
        Arc::new(notifier),
        PaymentSettings {
            currency: config.currency.clone(),
            link_return_url: config.link_return_url.clone(),
        },
    );

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, api::router(AppState::new(service))).await?;
    Ok(())
}
