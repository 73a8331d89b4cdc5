//! Domain records and the closed enumerations they are built from.
//!
//! Every enumeration is stored as lowercase text in SQLite and serialised
//! the same way over JSON, so `as_str` is the single canonical spelling.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// ISO currency codes accepted by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Cad,
    Aud,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usd => "usd",
            Self::Eur => "eur",
            Self::Gbp => "gbp",
            Self::Cad => "cad",
            Self::Aud => "aud",
        }
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "usd" => Ok(Self::Usd),
            "eur" => Ok(Self::Eur),
            "gbp" => Ok(Self::Gbp),
            "cad" => Ok(Self::Cad),
            "aud" => Ok(Self::Aud),
            other => Err(format!("unsupported currency: {other}")),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a donation.
///
/// ```text
/// Pending ──► Processing ──► Succeeded ──► Refunded
///    │            │
///    ├────────────┴──► Failed
///    └────────────┴──► Canceled
/// Pending ──► Succeeded
/// ```
///
/// `Failed`, `Canceled` and `Refunded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DonationStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    Refunded,
}

impl DonationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Refunded => "refunded",
        }
    }

    /// Whether a donation in `self` may move to `next`.
    ///
    /// Re-asserting the current status is always allowed and is a no-op.
    pub fn can_transition_to(&self, next: DonationStatus) -> bool {
        use DonationStatus::*;

        if *self == next {
            return true;
        }
        match self {
            Pending => matches!(next, Processing | Succeeded | Failed | Canceled),
            Processing => matches!(next, Succeeded | Failed | Canceled),
            Succeeded => matches!(next, Refunded),
            Failed | Canceled | Refunded => false,
        }
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DonationType {
    Donation,
    Subscription,
    Other,
}

/// Lifecycle stage of a fundraising campaign. Transitions happen elsewhere;
/// this service only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum CampaignState {
    Initial,
    Active,
    Complete,
}

impl CampaignState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Active => "active",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for CampaignState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub id: String,
    /// Minor units of `currency`.
    pub amount: i64,
    pub currency: Currency,
    pub status: DonationStatus,
    #[serde(rename = "type")]
    pub donation_type: DonationType,
    /// `None` for anonymous donations.
    pub person_id: Option<String>,
    pub vault_id: String,
    pub customer_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub identity_provider_id: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub state: CampaignState,
    pub allow_donation_on_complete: bool,
    pub vault_id: String,
    pub created_at: i64,
}

impl Campaign {
    /// A completed campaign only takes new donations when explicitly allowed to.
    pub fn accepts_donations(&self) -> bool {
        match self.state {
            CampaignState::Initial | CampaignState::Active => true,
            CampaignState::Complete => self.allow_donation_on_complete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Vault {
    pub id: String,
    pub currency: Currency,
    /// Minor units of `currency`.
    pub balance: i64,
    pub created_at: i64,
    pub updated_at: i64,
}
