//! Database layer — migrations, the repository seam, and its SQLite implementation.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tracing::{debug, info, instrument};

use crate::errors::{AppError, Result};
use crate::models::{Campaign, Currency, Donation, DonationStatus, DonationType, Person, Vault};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let options = SqliteConnectOptions::from_str(&url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied successfully");
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Repository seam
// ─────────────────────────────────────────────────────────

/// A fully decided donation update, ready to be committed.
///
/// The handler decides *what* changes; the repository guarantees that the
/// write happens only if the donation still has `expected_status`, and that
/// the donation write and the vault credit land together or not at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonationTransition {
    pub donation_id: String,
    pub expected_status: DonationStatus,
    pub status: DonationStatus,
    pub person_id: Option<String>,
    pub donation_type: DonationType,
    pub amount: i64,
    pub customer_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub credit: Option<VaultCredit>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultCredit {
    pub vault_id: String,
    pub amount: i64,
    pub currency: Currency,
}

#[derive(Debug, Clone)]
pub struct CommittedTransition {
    pub donation: Donation,
    /// `true` when this commit incremented the vault balance.
    pub credited: bool,
}

/// Typed persistence operations the transition handler and checkout gate depend on.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn donation(&self, id: &str) -> Result<Option<Donation>>;
    async fn person(&self, id: &str) -> Result<Option<Person>>;
    async fn campaign(&self, id: &str) -> Result<Option<Campaign>>;
    async fn vault(&self, id: &str) -> Result<Option<Vault>>;

    /// Apply `transition` atomically. Fails with [`AppError::Conflict`] when
    /// the donation's status no longer matches `expected_status`.
    async fn commit_transition(
        &self,
        transition: &DonationTransition,
    ) -> Result<CommittedTransition>;
}

// ─────────────────────────────────────────────────────────
// SQLite implementation
// ─────────────────────────────────────────────────────────

const DONATION_COLUMNS: &str = r#"
    id, amount, currency, status, donation_type, person_id, vault_id,
    customer_id, payment_intent_id, payment_method_id, created_at, updated_at
"#;

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn donation(&self, id: &str) -> Result<Option<Donation>> {
        let row = sqlx::query_as::<_, Donation>(&format!(
            "SELECT {DONATION_COLUMNS} FROM donations WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn person(&self, id: &str) -> Result<Option<Person>> {
        let row = sqlx::query_as::<_, Person>(
            r#"
            SELECT id, first_name, last_name, email, identity_provider_id, created_at
            FROM   people
            WHERE  id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn campaign(&self, id: &str) -> Result<Option<Campaign>> {
        let row = sqlx::query_as::<_, Campaign>(
            r#"
            SELECT id, name, state, allow_donation_on_complete, vault_id, created_at
            FROM   campaigns
            WHERE  id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn vault(&self, id: &str) -> Result<Option<Vault>> {
        let row = sqlx::query_as::<_, Vault>(
            "SELECT id, currency, balance, created_at, updated_at FROM vaults WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    #[instrument(skip(self, transition), fields(donation_id = %transition.donation_id))]
    async fn commit_transition(
        &self,
        transition: &DonationTransition,
    ) -> Result<CommittedTransition> {
        let now = chrono::Utc::now().timestamp();
        // Dropping `tx` without committing rolls everything back.
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE donations
            SET    status = ?1, person_id = ?2, donation_type = ?3, amount = ?4,
                   customer_id = ?5, payment_intent_id = ?6, payment_method_id = ?7,
                   updated_at = ?8
            WHERE  id = ?9 AND status = ?10
            "#,
        )
        .bind(transition.status)
        .bind(&transition.person_id)
        .bind(transition.donation_type)
        .bind(transition.amount)
        .bind(&transition.customer_id)
        .bind(&transition.payment_intent_id)
        .bind(&transition.payment_method_id)
        .bind(now)
        .bind(&transition.donation_id)
        .bind(transition.expected_status)
        .execute(&mut *tx)
        .await
        .map_err(unique_payment_intent)?
        .rows_affected();

        if updated == 0 {
            return Err(AppError::Conflict(format!(
                "Donation {} was modified concurrently; expected status {}",
                transition.donation_id, transition.expected_status
            )));
        }

        let mut credited = false;
        if let Some(credit) = &transition.credit {
            // The vault_credits primary key is the idempotency key of the increment.
            let inserted = sqlx::query(
                r#"
                INSERT OR IGNORE INTO vault_credits (donation_id, vault_id, amount, created_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(&transition.donation_id)
            .bind(&credit.vault_id)
            .bind(credit.amount)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if inserted == 1 {
                let rows = sqlx::query(
                    r#"
                    UPDATE vaults
                    SET    balance = balance + ?1, updated_at = ?2
                    WHERE  id = ?3 AND currency = ?4
                    "#,
                )
                .bind(credit.amount)
                .bind(now)
                .bind(&credit.vault_id)
                .bind(credit.currency)
                .execute(&mut *tx)
                .await?
                .rows_affected();

                if rows == 0 {
                    return Err(AppError::NotFound(format!(
                        "Vault {} not found for currency {}",
                        credit.vault_id, credit.currency
                    )));
                }
                credited = true;
            } else {
                debug!("Vault credit already recorded; skipping increment");
            }
        }

        let donation = sqlx::query_as::<_, Donation>(&format!(
            "SELECT {DONATION_COLUMNS} FROM donations WHERE id = ?1"
        ))
        .bind(&transition.donation_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CommittedTransition { donation, credited })
    }
}

/// `payment_intent_id` is the only unique column a donation update can collide on.
fn unique_payment_intent(err: sqlx::Error) -> AppError {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AppError::Conflict(
            "Payment intent id already belongs to another donation".to_string(),
        ),
        other => AppError::Database(other),
    }
}
