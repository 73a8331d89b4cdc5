//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::checkout::{CheckoutGate, CreateCheckoutSession};
use crate::db::Repository;
use crate::errors::{AppError, Result};
use crate::models::{Campaign, Donation, Vault};
use crate::payments::CheckoutSession;
use crate::transitions::{TransitionHandler, UpdateDonation};

pub struct ApiState {
    pub repo: Arc<dyn Repository>,
    pub transitions: TransitionHandler,
    pub checkout: CheckoutGate,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/donations/:id", get(get_donation).patch(update_donation))
        .route("/campaigns/:id", get(get_campaign))
        .route("/checkout/sessions", post(create_checkout_session))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignResponse {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub vault: Vault,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /donations/:id`
pub async fn get_donation(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<Donation>> {
    let donation = state
        .repo
        .donation(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Donation {id} not found")))?;
    Ok(Json(donation))
}

/// `PATCH /donations/:id`
///
/// Applies a partial update; moving into `succeeded` credits the donation's vault.
pub async fn update_donation(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<UpdateDonation>, JsonRejection>,
) -> Result<Json<Donation>> {
    let Json(update) = payload?;
    let donation = state.transitions.update_donation(&id, update).await?;
    Ok(Json(donation))
}

/// `GET /campaigns/:id`
///
/// Returns the campaign together with its vault's current balance.
pub async fn get_campaign(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<CampaignResponse>> {
    let campaign = state
        .repo
        .campaign(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Campaign {id} not found")))?;
    let vault = state
        .repo
        .vault(&campaign.vault_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Vault {} not found", campaign.vault_id)))?;
    Ok(Json(CampaignResponse { campaign, vault }))
}

/// `POST /checkout/sessions`
pub async fn create_checkout_session(
    State(state): State<Arc<ApiState>>,
    payload: std::result::Result<Json<CreateCheckoutSession>, JsonRejection>,
) -> Result<Json<CheckoutSession>> {
    let Json(params) = payload?;
    let session = state.checkout.create_session(params).await?;
    Ok(Json(session))
}
