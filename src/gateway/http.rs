use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::gateway::{
    CheckoutSession, CreateCheckoutSession, CreateIntent, CreateRefund, GatewayError,
    PaymentGateway, PaymentIntent, Refund,
};
use crate::model::Metadata;

/// Client for a Stripe-style REST API: form-encoded requests, bearer
/// authentication, JSON responses.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl HttpGateway {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GatewayError::Misconfigured("empty api key".into()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Misconfigured(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(map_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport)?;
        if !status.is_success() {
            return Err(map_status(status, &body));
        }
        serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

fn map_transport(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Unavailable(e.to_string())
    }
}

fn map_status(status: StatusCode, body: &str) -> GatewayError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Misconfigured(message),
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            GatewayError::Unavailable(format!("{s}: {message}"))
        }
        s => GatewayError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

/// Flatten metadata into `prefix[key]=value` form fields.
fn metadata_fields(prefix: &str, metadata: &Metadata) -> Vec<(String, String)> {
    metadata
        .iter()
        .map(|(key, value)| (format!("{prefix}[{key}]"), value.clone()))
        .collect()
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_payment_intent(&self, request: CreateIntent) -> Result<PaymentIntent, GatewayError> {
        let mut form = vec![
            ("amount".to_string(), request.amount.as_minor().to_string()),
            ("currency".to_string(), request.currency),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        form.extend(metadata_fields("metadata", &request.metadata));

        debug!(amount = %request.amount, "creating payment intent");
        self.send(self.client.post(self.url("payment_intents")).form(&form))
            .await
    }

    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, GatewayError> {
        self.send(self.client.get(self.url(&format!("payment_intents/{id}"))))
            .await
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutSession,
    ) -> Result<CheckoutSession, GatewayError> {
        let item = "line_items[0]";
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), request.success_url),
            ("cancel_url".to_string(), request.cancel_url),
            (format!("{item}[quantity]"), "1".to_string()),
            (format!("{item}[price_data][currency]"), request.currency),
            (
                format!("{item}[price_data][unit_amount]"),
                request.amount.as_minor().to_string(),
            ),
            (
                format!("{item}[price_data][product_data][name]"),
                request.description,
            ),
        ];
        form.extend(metadata_fields("metadata", &request.metadata));
        form.extend(metadata_fields(
            "payment_intent_data[metadata]",
            &request.metadata,
        ));

        debug!(amount = %request.amount, "creating checkout session");
        self.send(self.client.post(self.url("checkout/sessions")).form(&form))
            .await
    }

    async fn retrieve_checkout_session(&self, id: &str) -> Result<CheckoutSession, GatewayError> {
        self.send(self.client.get(self.url(&format!("checkout/sessions/{id}"))))
            .await
    }

    async fn create_refund(&self, request: CreateRefund) -> Result<Refund, GatewayError> {
        let mut form = vec![
            ("payment_intent".to_string(), request.payment_intent),
            ("amount".to_string(), request.amount.as_minor().to_string()),
        ];
        form.extend(metadata_fields("metadata", &request.metadata));

        debug!(amount = %request.amount, "creating refund");
        self.send(self.client.post(self.url("refunds")).form(&form))
            .await
    }
}
