//! HTTP surface.
//!
//! Amounts cross this boundary as decimal major units; everything behind it
//! works in minor units.

use axum::Json;
use axum::Router;
use axum::routing::{get, post};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::payments::PaymentService;

mod error;
mod payments;

pub use error::{ApiError, ErrorBody};
pub use payments::{BookingView, EntryView};

#[derive(Clone)]
pub struct AppState {
    pub payments: Arc<PaymentService>,
}

impl AppState {
    pub fn new(payments: PaymentService) -> Self {
        Self {
            payments: Arc::new(payments),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let payments = Router::new()
        .route("/payments/create-intent", post(payments::create_intent))
        .route("/payments/confirm", post(payments::confirm))
        .route("/payments/checkout-session", post(payments::checkout_session))
        .route(
            "/payments/verify-session",
            get(payments::verify_session_query).post(payments::verify_session_body),
        )
        .route("/payments/link", post(payments::payment_link))
        .route("/payments/refund", post(payments::refund))
        // Raw body: the signature covers the exact bytes.
        .route("/payments/webhook", post(payments::webhook))
        .route("/payments/{booking_id}", get(payments::summary));

    Router::new()
        .route("/health", get(health))
        .route("/bookings", post(payments::register_booking))
        .merge(payments)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
