use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::info;

use crate::gateway::{
    CheckoutSession, CreateCheckoutSession, CreateIntent, CreateRefund, GatewayError,
    IntentStatus, PaymentGateway, PaymentIntent, Refund, SessionPaymentStatus, SessionStatus,
};

#[derive(Default)]
struct SandboxState {
    intents: HashMap<String, PaymentIntent>,
    sessions: HashMap<String, CheckoutSession>,
    refunds: Vec<Refund>,
}

/// In-process gateway sandbox.
///
/// Intents and sessions are created unpaid; the `succeed_*`, `fail_*`,
/// `complete_*` and `expire_*` controls play the customer's part.
pub struct MemoryGateway {
    state: Mutex<SandboxState>,
    available: AtomicBool,
    sequence: AtomicU64,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SandboxState::default()),
            available: AtomicBool::new(true),
            sequence: AtomicU64::new(1),
        }
    }

    /// Simulate an outage: every call fails with `Unavailable` while off.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn succeed_intent(&self, id: &str) -> Option<PaymentIntent> {
        self.set_intent_status(id, IntentStatus::Succeeded, None).await
    }

    pub async fn fail_intent(&self, id: &str) -> Option<PaymentIntent> {
        let error = serde_json::json!({ "code": "card_declined" });
        self.set_intent_status(id, IntentStatus::RequiresPaymentMethod, Some(error))
            .await
    }

    /// Pay a checkout session: creates its intent, succeeded, carrying the
    /// session metadata.
    pub async fn complete_session(&self, id: &str) -> Option<CheckoutSession> {
        let intent_id = self.next_id("pi");
        let mut state = self.state.lock().await;
        let session = state.sessions.get_mut(id)?;
        let intent = PaymentIntent {
            id: intent_id.clone(),
            amount: session.amount_total.unwrap_or_default(),
            currency: session.currency.clone(),
            status: IntentStatus::Succeeded,
            client_secret: None,
            metadata: session.metadata.clone(),
            last_payment_error: None,
        };
        session.status = SessionStatus::Complete;
        session.payment_status = SessionPaymentStatus::Paid;
        session.payment_intent = Some(intent_id.clone());
        let session = session.clone();
        state.intents.insert(intent_id, intent);
        Some(session)
    }

    pub async fn expire_session(&self, id: &str) -> Option<CheckoutSession> {
        let mut state = self.state.lock().await;
        let session = state.sessions.get_mut(id)?;
        session.status = SessionStatus::Expired;
        Some(session.clone())
    }

    pub async fn refunds(&self) -> Vec<Refund> {
        self.state.lock().await.refunds.clone()
    }

    async fn set_intent_status(
        &self,
        id: &str,
        status: IntentStatus,
        error: Option<serde_json::Value>,
    ) -> Option<PaymentIntent> {
        let mut state = self.state.lock().await;
        let intent = state.intents.get_mut(id)?;
        intent.status = status;
        intent.last_payment_error = error;
        Some(intent.clone())
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}_sandbox_{n:06}")
    }

    fn ensure_available(&self) -> Result<(), GatewayError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GatewayError::Unavailable("sandbox gateway offline".into()))
        }
    }

    fn not_found(kind: &str, id: &str) -> GatewayError {
        GatewayError::Rejected {
            status: 404,
            message: format!("no such {kind}: {id}"),
        }
    }
}

#[async_trait]
impl PaymentGateway for MemoryGateway {
    async fn create_payment_intent(&self, request: CreateIntent) -> Result<PaymentIntent, GatewayError> {
        self.ensure_available()?;
        let id = self.next_id("pi");
        let intent = PaymentIntent {
            client_secret: Some(format!("{id}_secret")),
            id: id.clone(),
            amount: request.amount,
            currency: request.currency,
            status: IntentStatus::RequiresPaymentMethod,
            metadata: request.metadata,
            last_payment_error: None,
        };
        self.state.lock().await.intents.insert(id, intent.clone());
        info!(intent = %intent.id, amount = %intent.amount, "sandbox intent created");
        Ok(intent)
    }

    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, GatewayError> {
        self.ensure_available()?;
        self.state
            .lock()
            .await
            .intents
            .get(id)
            .cloned()
            .ok_or_else(|| Self::not_found("payment_intent", id))
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutSession,
    ) -> Result<CheckoutSession, GatewayError> {
        self.ensure_available()?;
        let id = self.next_id("cs");
        let session = CheckoutSession {
            url: Some(format!("https://checkout.sandbox.invalid/pay/{id}")),
            id: id.clone(),
            status: SessionStatus::Open,
            payment_status: SessionPaymentStatus::Unpaid,
            amount_total: Some(request.amount),
            currency: request.currency,
            payment_intent: None,
            metadata: request.metadata,
        };
        self.state.lock().await.sessions.insert(id, session.clone());
        info!(session = %session.id, amount = %request.amount, "sandbox session created");
        Ok(session)
    }

    async fn retrieve_checkout_session(&self, id: &str) -> Result<CheckoutSession, GatewayError> {
        self.ensure_available()?;
        self.state
            .lock()
            .await
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| Self::not_found("checkout session", id))
    }

    async fn create_refund(&self, request: CreateRefund) -> Result<Refund, GatewayError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        let intent = state
            .intents
            .get(&request.payment_intent)
            .ok_or_else(|| Self::not_found("payment_intent", &request.payment_intent))?;
        if intent.status != IntentStatus::Succeeded {
            return Err(GatewayError::Rejected {
                status: 400,
                message: format!("payment_intent {} has not succeeded", intent.id),
            });
        }

        let already: i64 = state
            .refunds
            .iter()
            .filter(|r| r.payment_intent.as_deref() == Some(request.payment_intent.as_str()))
            .map(|r| r.amount.as_minor())
            .sum();
        if already + request.amount.as_minor() > intent.amount.as_minor() {
            return Err(GatewayError::Rejected {
                status: 400,
                message: "refund exceeds charge amount".into(),
            });
        }

        let refund = Refund {
            id: self.next_id("re"),
            amount: request.amount,
            currency: intent.currency.clone(),
            status: "succeeded".into(),
            payment_intent: Some(request.payment_intent),
        };
        state.refunds.push(refund.clone());
        Ok(refund)
    }
}
