//! Shared fixtures for the in-crate test modules.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing_subscriber::EnvFilter;

use crate::db;
use crate::errors::{AppError, Result};
use crate::models::{Currency, DonationStatus};
use crate::payments::{CheckoutSession, CheckoutSessionRequest, PaymentProvider};

pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Fresh in-memory database with migrations applied.
///
/// A single connection keeps every query on the same `:memory:` database.
pub(crate) async fn setup_test_db() -> Result<SqlitePool> {
    init_test_tracing();
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    db::migrate(&pool).await?;
    Ok(pool)
}

/// Seed one person, one USD vault and a campaign in every interesting state.
///
/// | campaign                | state    | allow on complete |
/// |-------------------------|----------|-------------------|
/// | `camp-active`           | active   | no                |
/// | `camp-active-override`  | active   | yes               |
/// | `camp-complete`         | complete | no                |
/// | `camp-complete-override`| complete | yes               |
/// | `camp-initial`          | initial  | no                |
pub(crate) async fn seed_world(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "INSERT INTO people (id, first_name, last_name, email) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind("person-1")
    .bind("Ada")
    .bind("Lovelace")
    .bind("ada@example.org")
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO people (id, first_name, last_name, email) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind("person-2")
    .bind("Grace")
    .bind("Hopper")
    .bind("grace@example.org")
    .execute(pool)
    .await?;

    seed_vault(pool, "vault-1", Currency::Usd).await?;

    for (id, state, allow) in [
        ("camp-active", "active", false),
        ("camp-active-override", "active", true),
        ("camp-complete", "complete", false),
        ("camp-complete-override", "complete", true),
        ("camp-initial", "initial", false),
    ] {
        sqlx::query(
            r#"
            INSERT INTO campaigns (id, name, state, allow_donation_on_complete, vault_id)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(id)
        .bind("Clean Water")
        .bind(state)
        .bind(allow)
        .bind("vault-1")
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub(crate) async fn seed_vault(pool: &SqlitePool, id: &str, currency: Currency) -> Result<()> {
    sqlx::query("INSERT INTO vaults (id, currency, balance) VALUES (?1, ?2, 0)")
        .bind(id)
        .bind(currency)
        .execute(pool)
        .await?;
    Ok(())
}

/// Insert a USD donation into `vault-1`.
pub(crate) async fn seed_donation(
    pool: &SqlitePool,
    id: &str,
    amount: i64,
    status: DonationStatus,
    person_id: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO donations (id, amount, currency, status, donation_type, person_id, vault_id)
        VALUES (?1, ?2, 'usd', ?3, 'donation', ?4, 'vault-1')
        "#,
    )
    .bind(id)
    .bind(amount)
    .bind(status)
    .bind(person_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn vault_balance(pool: &SqlitePool, id: &str) -> i64 {
    let (balance,): (i64,) = sqlx::query_as("SELECT balance FROM vaults WHERE id = ?1")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("vault exists");
    balance
}

/// Payment provider double that records every request it receives.
#[derive(Default)]
pub(crate) struct RecordingProvider {
    pub requests: Mutex<Vec<CheckoutSessionRequest>>,
    pub fail_with: Option<(u16, String)>,
}

impl RecordingProvider {
    pub fn failing(status: u16, message: &str) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail_with: Some((status, message.to_string())),
        }
    }

    pub fn calls(&self) -> Vec<CheckoutSessionRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl PaymentProvider for RecordingProvider {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession> {
        let sequence = {
            let mut requests = self.requests.lock().expect("lock");
            requests.push(request.clone());
            requests.len()
        };

        if let Some((status, message)) = &self.fail_with {
            return Err(AppError::PaymentProvider {
                status: *status,
                message: message.clone(),
            });
        }

        Ok(CheckoutSession {
            id: format!("cs_test_{sequence}"),
            url: Some(format!("https://checkout.example/pay/cs_test_{sequence}")),
            mode: Some(request.mode.as_str().to_string()),
            status: Some("open".to_string()),
            extra: Default::default(),
        })
    }
}

pub(crate) fn recording_provider() -> Arc<RecordingProvider> {
    Arc::new(RecordingProvider::default())
}
