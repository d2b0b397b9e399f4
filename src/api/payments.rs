use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Amount;
use crate::api::{ApiError, AppState};
use crate::gateway::SIGNATURE_HEADER;
use crate::model::{
    Booking, EntryId, EntryKind, EntryStatus, LedgerEntry, Metadata, PaymentMethod,
    PaymentOption, PaymentStatus,
};
use crate::payments::{IntentCreated, WebhookReport};

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Ledger entry as exposed over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
    pub id: EntryId,
    pub kind: EntryKind,
    pub amount: f64,
    pub status: EntryStatus,
    pub reference_id: Option<String>,
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refunded_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: Metadata,
}

impl From<&LedgerEntry> for EntryView {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            id: entry.id,
            kind: entry.kind,
            amount: entry.amount.to_major(),
            status: entry.status,
            reference_id: entry.reference_id.clone(),
            session_id: entry.session_id.clone(),
            refunded_reference: entry.refunded_reference.clone(),
            created_at: entry.created_at,
            completed_at: entry.completed_at,
            metadata: entry.metadata.clone(),
        }
    }
}

/// Payment view of a booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    pub id: String,
    pub currency: String,
    pub total_amount: f64,
    pub amount_paid: f64,
    pub payment_status: PaymentStatus,
    pub last_paid_at: Option<DateTime<Utc>>,
    pub payment_method: Option<PaymentMethod>,
    pub requested_amount: Option<f64>,
    pub payment_history: Vec<EntryView>,
}

impl From<&Booking> for BookingView {
    fn from(booking: &Booking) -> Self {
        Self {
            id: booking.id.clone(),
            currency: booking.currency.clone(),
            total_amount: booking.total_amount.to_major(),
            amount_paid: booking.amount_paid.to_major(),
            payment_status: booking.payment_status,
            last_paid_at: booking.last_paid_at,
            payment_method: booking.payment_method,
            requested_amount: booking.requested_amount.map(Amount::to_major),
            payment_history: booking.payment_history.iter().map(EntryView::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBookingRequest {
    pub booking_id: Option<String>,
    pub total_amount: f64,
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    pub booking_id: String,
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub booking_id: String,
    pub intent_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub payment_status: PaymentStatus,
    pub amount_paid: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub booking_id: String,
    pub amount: f64,
    pub return_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifySessionRequest {
    /// Gateways append `session_id` to the return URL.
    #[serde(alias = "session_id")]
    pub session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifySessionResponse {
    pub payment_status: PaymentStatus,
    pub booking: BookingView,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLinkRequest {
    pub booking_id: String,
    pub option: PaymentOption,
    pub amount: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLinkResponse {
    pub checkout_url: String,
    pub session_id: String,
    pub entry_id: EntryId,
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub booking_id: String,
    pub amount: Option<f64>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    pub refund_id: String,
    pub payment_status: PaymentStatus,
    pub amount_paid: f64,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(flatten)]
    pub report: WebhookReport,
}

fn major(value: Option<f64>) -> Result<Option<Amount>, ApiError> {
    value.map(Amount::try_from_major).transpose().map_err(ApiError::from)
}

pub async fn register_booking(
    State(state): State<AppState>,
    Json(request): Json<RegisterBookingRequest>,
) -> Result<(StatusCode, Json<BookingView>), ApiError> {
    let total = Amount::try_from_major(request.total_amount)?;
    let booking = state
        .payments
        .register_booking(request.booking_id, total, request.currency)
        .await?;
    Ok((StatusCode::CREATED, Json(BookingView::from(&booking))))
}

pub async fn summary(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
) -> ApiResult<BookingView> {
    let booking = state.payments.booking(&booking_id).await?;
    Ok(Json(BookingView::from(&booking)))
}

pub async fn create_intent(
    State(state): State<AppState>,
    Json(request): Json<CreateIntentRequest>,
) -> ApiResult<IntentCreated> {
    let amount = Amount::try_from_major(request.amount)?;
    let created = state
        .payments
        .create_intent(&request.booking_id, amount)
        .await?;
    Ok(Json(created))
}

pub async fn confirm(
    State(state): State<AppState>,
    Json(request): Json<ConfirmRequest>,
) -> ApiResult<ConfirmResponse> {
    let booking = state
        .payments
        .confirm_intent(&request.booking_id, &request.intent_id)
        .await?;
    Ok(Json(ConfirmResponse {
        payment_status: booking.payment_status,
        amount_paid: booking.amount_paid.to_major(),
    }))
}

pub async fn checkout_session(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> ApiResult<CheckoutResponse> {
    let amount = Amount::try_from_major(request.amount)?;
    let created = state
        .payments
        .create_checkout_session(&request.booking_id, amount, &request.return_url)
        .await?;
    Ok(Json(CheckoutResponse {
        checkout_url: created.checkout_url,
        session_id: created.session_id,
    }))
}

pub async fn verify_session_query(
    State(state): State<AppState>,
    Query(request): Query<VerifySessionRequest>,
) -> ApiResult<VerifySessionResponse> {
    verify_session(&state, &request.session_id).await
}

pub async fn verify_session_body(
    State(state): State<AppState>,
    Json(request): Json<VerifySessionRequest>,
) -> ApiResult<VerifySessionResponse> {
    verify_session(&state, &request.session_id).await
}

async fn verify_session(state: &AppState, session_id: &str) -> ApiResult<VerifySessionResponse> {
    let booking = state.payments.verify_session(session_id).await?;
    Ok(Json(VerifySessionResponse {
        payment_status: booking.payment_status,
        booking: BookingView::from(&booking),
    }))
}

pub async fn payment_link(
    State(state): State<AppState>,
    Json(request): Json<PaymentLinkRequest>,
) -> ApiResult<PaymentLinkResponse> {
    let custom = major(request.amount)?;
    let link = state
        .payments
        .generate_payment_link(&request.booking_id, request.option, custom)
        .await?;
    Ok(Json(PaymentLinkResponse {
        checkout_url: link.checkout_url,
        session_id: link.session_id,
        entry_id: link.entry_id,
        amount: link.amount.to_major(),
    }))
}

pub async fn refund(
    State(state): State<AppState>,
    Json(request): Json<RefundRequest>,
) -> ApiResult<RefundResponse> {
    let amount = major(request.amount)?;
    let outcome = state
        .payments
        .refund(&request.booking_id, amount, request.reason)
        .await?;
    Ok(Json(RefundResponse {
        refund_id: outcome.refund_id,
        payment_status: outcome.booking.payment_status,
        amount_paid: outcome.booking.amount_paid.to_major(),
    }))
}

pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<WebhookAck> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::MissingSignature)?;
    let report = state.payments.handle_webhook(&body, signature).await?;
    Ok(Json(WebhookAck {
        received: true,
        report,
    }))
}
