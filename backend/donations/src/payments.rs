//! Payment provider client — builds and submits hosted checkout sessions.
//!
//! The provider speaks `application/x-www-form-urlencoded` with bracketed
//! keys for nested fields (`line_items[0][price_data][currency]`), so the
//! request is flattened by [`encode_form`] before it goes on the wire.
//! No retry is attempted; failures surface to the caller unchanged.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::errors::{AppError, Result};
use crate::models::Currency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutMode {
    Payment,
    Subscription,
}

impl CheckoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Subscription => "subscription",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethodType {
    Card,
}

impl PaymentMethodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Card => "card",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    /// Minor units of `currency`.
    pub amount: i64,
    pub currency: Currency,
    pub name: String,
    pub quantity: u32,
}

/// Provider-agnostic description of a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub mode: CheckoutMode,
    pub line_items: Vec<LineItem>,
    pub payment_method_types: Vec<PaymentMethodType>,
    /// Attached to the resulting payment intent (or subscription).
    pub metadata: BTreeMap<String, String>,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    pub tax_id_collection: bool,
}

/// The provider's session object. Fields this service doesn't model are kept in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub mode: Option<String>,
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession>;
}

// ─────────────────────────────────────────────────────────
// Stripe
// ─────────────────────────────────────────────────────────

pub struct StripeClient {
    client: Client,
    api_base: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(client: Client, api_base: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn build_http_client(timeout_secs: u64) -> Result<Client> {
        Ok(Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ProviderError,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    message: Option<String>,
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession> {
        let url = format!("{}/v1/checkout/sessions", self.api_base);
        let form = encode_form(request);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                });
            warn!("Checkout session rejected by provider ({status}): {message}");
            return Err(AppError::PaymentProvider {
                status: status.as_u16(),
                message,
            });
        }

        let session: CheckoutSession = resp.json().await?;
        debug!("Created checkout session {}", session.id);
        Ok(session)
    }
}

/// Flatten a session request into the provider's bracketed form keys.
pub fn encode_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut form = vec![("mode".to_string(), request.mode.as_str().to_string())];

    for (i, item) in request.line_items.iter().enumerate() {
        let price = format!("line_items[{i}][price_data]");
        form.push((format!("{price}[currency]"), item.currency.as_str().to_string()));
        form.push((format!("{price}[unit_amount]"), item.amount.to_string()));
        form.push((format!("{price}[product_data][name]"), item.name.clone()));
        if request.mode == CheckoutMode::Subscription {
            form.push((format!("{price}[recurring][interval]"), "month".to_string()));
        }
        form.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
    }

    for (i, method) in request.payment_method_types.iter().enumerate() {
        form.push((format!("payment_method_types[{i}]"), method.as_str().to_string()));
    }

    // Payment intents don't exist in subscription mode; the subscription carries the metadata.
    let metadata_root = match request.mode {
        CheckoutMode::Payment => "payment_intent_data",
        CheckoutMode::Subscription => "subscription_data",
    };
    for (key, value) in &request.metadata {
        form.push((format!("{metadata_root}[metadata][{key}]"), value.clone()));
    }

    form.push(("success_url".to_string(), request.success_url.clone()));
    form.push(("cancel_url".to_string(), request.cancel_url.clone()));
    if let Some(email) = &request.customer_email {
        form.push(("customer_email".to_string(), email.clone()));
    }
    form.push((
        "tax_id_collection[enabled]".to_string(),
        request.tax_id_collection.to_string(),
    ));

    form
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
