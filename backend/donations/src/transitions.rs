//! Donation status transitions and the vault credit they trigger.
//!
//! An update is decided in full before anything is written: the target
//! person is resolved, the status change is checked against
//! [`DonationStatus::can_transition_to`], and the credit decision is made
//! from the status read at the start. The repository then commits the
//! donation write and the credit in one transaction, conditioned on that
//! status being unchanged.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument};

use crate::db::{DonationTransition, Repository, VaultCredit};
use crate::errors::{AppError, Result};
use crate::models::{Donation, DonationStatus, DonationType};

/// Partial update of a donation. Omitted fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDonation {
    pub status: Option<DonationStatus>,
    pub target_person_id: Option<String>,
    #[serde(rename = "type")]
    pub donation_type: Option<DonationType>,
    pub amount: Option<i64>,
    pub customer_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub payment_method_id: Option<String>,
}

pub struct TransitionHandler {
    repo: Arc<dyn Repository>,
}

impl TransitionHandler {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    #[instrument(skip(self, update))]
    pub async fn update_donation(&self, id: &str, update: UpdateDonation) -> Result<Donation> {
        let current = self
            .repo
            .donation(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Donation {id} not found")))?;

        let person_id = match update.target_person_id {
            Some(person_id) if current.person_id.as_deref() != Some(person_id.as_str()) => {
                self.repo
                    .person(&person_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Person {person_id} not found")))?;
                Some(person_id)
            }
            Some(person_id) => Some(person_id),
            None => current.person_id.clone(),
        };

        let status = update.status.unwrap_or(current.status);
        if !current.status.can_transition_to(status) {
            return Err(AppError::NotAcceptable(format!(
                "Donation cannot transition from {} to {}",
                current.status, status
            )));
        }

        let amount = match update.amount {
            None => current.amount,
            Some(amount) if amount <= 0 => {
                return Err(AppError::NotAcceptable(format!(
                    "Donation amount must be positive, got {amount}"
                )));
            }
            Some(amount) if amount != current.amount && was_credited(current.status) => {
                return Err(AppError::NotAcceptable(format!(
                    "Donation {id} has already been credited; its amount cannot change"
                )));
            }
            Some(amount) => amount,
        };

        let customer_id = keep_once_set(
            id,
            "customer id",
            current.customer_id.clone(),
            update.customer_id,
        )?;
        let payment_intent_id = keep_once_set(
            id,
            "payment intent id",
            current.payment_intent_id.clone(),
            update.payment_intent_id,
        )?;
        let payment_method_id = keep_once_set(
            id,
            "payment method id",
            current.payment_method_id.clone(),
            update.payment_method_id,
        )?;

        let credit = if credits_vault(current.status, status) {
            let vault = self.repo.vault(&current.vault_id).await?.ok_or_else(|| {
                AppError::NotFound(format!("Vault {} not found", current.vault_id))
            })?;
            if vault.currency != current.currency {
                return Err(AppError::NotAcceptable(format!(
                    "Vault {} holds {} and cannot be credited in {}",
                    vault.id, vault.currency, current.currency
                )));
            }
            Some(VaultCredit {
                vault_id: vault.id,
                amount,
                currency: current.currency,
            })
        } else {
            None
        };

        let transition = DonationTransition {
            donation_id: current.id.clone(),
            expected_status: current.status,
            status,
            person_id,
            donation_type: update.donation_type.unwrap_or(current.donation_type),
            amount,
            customer_id,
            payment_intent_id,
            payment_method_id,
            credit,
        };

        let committed = self.repo.commit_transition(&transition).await?;
        if committed.credited {
            info!(
                "Donation {id} succeeded; credited {} {} to vault {}",
                amount, current.currency, current.vault_id
            );
        } else if current.status != status {
            info!("Donation {id} moved from {} to {}", current.status, status);
        }

        Ok(committed.donation)
    }
}

/// The vault is credited only on the move *into* `Succeeded`.
fn credits_vault(previous: DonationStatus, next: DonationStatus) -> bool {
    previous != DonationStatus::Succeeded && next == DonationStatus::Succeeded
}

/// Donations that reached `Succeeded` have a matching vault credit on record.
fn was_credited(status: DonationStatus) -> bool {
    matches!(status, DonationStatus::Succeeded | DonationStatus::Refunded)
}

/// Payment-provider identifiers are write-once.
fn keep_once_set(
    donation_id: &str,
    field: &str,
    current: Option<String>,
    supplied: Option<String>,
) -> Result<Option<String>> {
    match (current, supplied) {
        (Some(current), Some(supplied)) if current != supplied => Err(AppError::NotAcceptable(
            format!("Donation {donation_id} already has a different {field}"),
        )),
        (Some(current), _) => Ok(Some(current)),
        (None, supplied) => Ok(supplied),
    }
}
