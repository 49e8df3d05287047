//! SQLite-backed subscription store.
//!
//! Owns the `subscriptions` table: creation, capacity and threshold-range
//! enforcement, soft deactivation, and the atomic `mark_triggered` update
//! the evaluator relies on. The WAL journal keeps the file copyable by an
//! external backup process while the service is live.

use chrono::{DateTime, Utc};
use pricewatch_core::{Direction, Subscription, DEFAULT_COOLDOWN_SECS};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Threshold {value} outside allowed range [{min}, {max}]")]
    InvalidThreshold { value: f64, min: f64, max: f64 },
    #[error("Chat {chat_id} already has {limit} active subscriptions")]
    CapacityExceeded { chat_id: i64, limit: i64 },
    #[error("No matching active subscription")]
    NotFound,
}

/// Validation limits enforced on `add`.
#[derive(Debug, Clone)]
pub struct StoreLimits {
    /// Maximum active subscriptions per chat.
    pub max_per_user: i64,
    /// Inclusive lower bound for thresholds.
    pub min_threshold: f64,
    /// Inclusive upper bound for thresholds.
    pub max_threshold: f64,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_per_user: 10,
            min_threshold: 0.000001,
            max_threshold: 1_000_000.0,
        }
    }
}

type SubscriptionRow = (
    i64,
    i64,
    String,
    f64,
    String,
    bool,
    i64,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
);

fn row_to_subscription(row: SubscriptionRow) -> Subscription {
    let (id, chat_id, asset, threshold, direction, active, cooldown_secs, last_triggered_at, created_at) =
        row;
    // Writes go through Direction::as_str, so anything else is corruption.
    let direction = match direction.parse() {
        Ok(d) => d,
        Err(_) => {
            warn!(id, direction = %direction, "Unknown direction stored, defaulting to above");
            Direction::Above
        }
    };
    Subscription {
        id,
        chat_id,
        asset: asset.into(),
        threshold,
        direction,
        active,
        cooldown_secs,
        last_triggered_at,
        created_at,
    }
}

const SELECT_COLUMNS: &str =
    "id, chat_id, asset, threshold, direction, active, cooldown_secs, last_triggered_at, created_at";

/// Durable subscription store backed by SQLite.
#[derive(Clone)]
pub struct SubscriptionStore {
    pool: SqlitePool,
    limits: StoreLimits,
}

impl SubscriptionStore {
    /// Connect to the database at the given URL, creating the file and
    /// schema if missing. Fails hard on an unreadable database: the process
    /// must not run without its persisted state.
    pub async fn connect(database_url: &str, limits: StoreLimits) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool, limits };
        store.run_migrations().await?;
        info!(url = database_url, "Subscription store ready");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                asset TEXT NOT NULL,
                threshold REAL NOT NULL,
                direction TEXT NOT NULL DEFAULT 'above',
                active INTEGER NOT NULL DEFAULT 1,
                cooldown_secs INTEGER NOT NULL DEFAULT 3600,
                last_triggered_at DATETIME,
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_subscriptions_active
            ON subscriptions(active, asset)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_subscriptions_chat
            ON subscriptions(chat_id, active)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create a new active subscription.
    ///
    /// The capacity check and the insert run in one transaction so two
    /// concurrent adds for the same chat cannot overshoot the cap.
    pub async fn add(
        &self,
        chat_id: i64,
        asset: &str,
        threshold: f64,
        direction: Direction,
    ) -> Result<Subscription, StoreError> {
        self.add_with_cooldown(chat_id, asset, threshold, direction, DEFAULT_COOLDOWN_SECS)
            .await
    }

    /// `add` with an explicit cooldown.
    pub async fn add_with_cooldown(
        &self,
        chat_id: i64,
        asset: &str,
        threshold: f64,
        direction: Direction,
        cooldown_secs: i64,
    ) -> Result<Subscription, StoreError> {
        if !threshold.is_finite()
            || threshold < self.limits.min_threshold
            || threshold > self.limits.max_threshold
        {
            return Err(StoreError::InvalidThreshold {
                value: threshold,
                min: self.limits.min_threshold,
                max: self.limits.max_threshold,
            });
        }

        let mut tx = self.pool.begin().await?;

        let active_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM subscriptions WHERE chat_id = ? AND active = 1",
        )
        .bind(chat_id)
        .fetch_one(&mut *tx)
        .await?;

        if active_count >= self.limits.max_per_user {
            return Err(StoreError::CapacityExceeded {
                chat_id,
                limit: self.limits.max_per_user,
            });
        }

        let created_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO subscriptions (chat_id, asset, threshold, direction, active, cooldown_secs, created_at)
            VALUES (?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(chat_id)
        .bind(asset)
        .bind(threshold)
        .bind(direction.as_str())
        .bind(cooldown_secs)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Subscription {
            id: result.last_insert_rowid(),
            chat_id,
            asset: asset.into(),
            threshold,
            direction,
            active: true,
            cooldown_secs,
            last_triggered_at: None,
            created_at,
        })
    }

    /// All active subscriptions for one chat, oldest first.
    pub async fn list_active_for_user(&self, chat_id: i64) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM subscriptions WHERE chat_id = ? AND active = 1 ORDER BY id",
        ))
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_subscription).collect())
    }

    /// All active subscriptions. Called once per evaluator tick.
    pub async fn list_all_active(&self) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM subscriptions WHERE active = 1 ORDER BY id",
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_subscription).collect())
    }

    /// Soft-deactivate one subscription owned by the given chat.
    pub async fn deactivate(&self, subscription_id: i64, chat_id: i64) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET active = 0 WHERE id = ? AND chat_id = ? AND active = 1",
        )
        .bind(subscription_id)
        .bind(chat_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Soft-deactivate every active subscription a chat holds on an asset.
    /// Returns the number of rows deactivated (0 is not an error here; the
    /// command surface reports it as "nothing to remove").
    pub async fn deactivate_by_asset(&self, chat_id: i64, asset: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET active = 0 WHERE chat_id = ? AND asset = ? AND active = 1",
        )
        .bind(chat_id)
        .bind(asset)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Deactivate regardless of owner. Used by the notifier when delivery
    /// permanently fails (e.g., the user blocked the bot).
    pub async fn deactivate_unowned(&self, subscription_id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE subscriptions SET active = 0 WHERE id = ? AND active = 1")
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Record that a subscription fired. Single guarded UPDATE: atomic with
    /// respect to a concurrent `deactivate`, and a no-op once deactivated.
    pub async fn mark_triggered(
        &self,
        subscription_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE subscriptions SET last_triggered_at = ? WHERE id = ? AND active = 1")
            .bind(at)
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Count of active subscriptions across all chats.
    pub async fn count_active(&self) -> Result<i64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE active = 1")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Count of distinct chats with at least one active subscription.
    pub async fn count_active_chats(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT chat_id) FROM subscriptions WHERE active = 1",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
