//! Checkout eligibility gate.
//!
//! Decides whether a campaign may open a new payment session and, if so,
//! maps the request onto a single-line-item, card-only checkout session.

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::Url;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::db::Repository;
use crate::errors::{AppError, Result};
use crate::models::{Campaign, Currency};
use crate::payments::{
    CheckoutMode, CheckoutSession, CheckoutSessionRequest, LineItem, PaymentMethodType,
    PaymentProvider,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutSession {
    pub mode: CheckoutMode,
    /// Minor units of `currency`.
    pub amount: i64,
    pub currency: Option<Currency>,
    pub campaign_id: String,
    pub person_id: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub billing_email: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

pub struct CheckoutGate {
    repo: Arc<dyn Repository>,
    provider: Arc<dyn PaymentProvider>,
    default_currency: Currency,
}

impl CheckoutGate {
    pub fn new(
        repo: Arc<dyn Repository>,
        provider: Arc<dyn PaymentProvider>,
        default_currency: Currency,
    ) -> Self {
        Self {
            repo,
            provider,
            default_currency,
        }
    }

    #[instrument(skip(self, params), fields(campaign_id = %params.campaign_id))]
    pub async fn create_session(&self, params: CreateCheckoutSession) -> Result<CheckoutSession> {
        validate(&params)?;

        let campaign = self
            .repo
            .campaign(&params.campaign_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Campaign {} not found", params.campaign_id))
            })?;

        if !campaign.accepts_donations() {
            warn!("Rejected checkout for campaign {} in state {}", campaign.id, campaign.state);
            return Err(AppError::NotAcceptable(format!(
                "Campaign cannot accept donations in state: {}",
                campaign.state
            )));
        }

        if let (Some(person_id), false) = (&params.person_id, params.is_anonymous) {
            self.repo
                .person(person_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Person {person_id} not found")))?;
        }

        let request = session_request(&campaign, params, self.default_currency);
        let session = self.provider.create_checkout_session(&request).await?;
        info!("Opened checkout session {} for campaign {}", session.id, campaign.id);
        Ok(session)
    }
}

fn validate(params: &CreateCheckoutSession) -> Result<()> {
    if params.amount <= 0 {
        return Err(AppError::NotAcceptable(format!(
            "Checkout amount must be positive, got {}",
            params.amount
        )));
    }
    for (field, value) in [
        ("successUrl", &params.success_url),
        ("cancelUrl", &params.cancel_url),
    ] {
        Url::parse(value)
            .map_err(|_| AppError::NotAcceptable(format!("{field} must be an absolute URL")))?;
    }
    Ok(())
}

fn session_request(
    campaign: &Campaign,
    params: CreateCheckoutSession,
    default_currency: Currency,
) -> CheckoutSessionRequest {
    let mut metadata = BTreeMap::new();
    metadata.insert("campaignId".to_string(), campaign.id.clone());
    if params.is_anonymous {
        metadata.insert("isAnonymous".to_string(), "true".to_string());
    } else if let Some(person_id) = params.person_id {
        metadata.insert("personId".to_string(), person_id);
    }

    CheckoutSessionRequest {
        mode: params.mode,
        line_items: vec![LineItem {
            amount: params.amount,
            currency: params.currency.unwrap_or(default_currency),
            name: format!("Donation to {}", campaign.name),
            quantity: 1,
        }],
        payment_method_types: vec![PaymentMethodType::Card],
        metadata,
        success_url: params.success_url,
        cancel_url: params.cancel_url,
        customer_email: params.billing_email,
        tax_id_collection: true,
    }
}
