// src/db.rs
use crate::models::{DailyUsage, MonthlyUsage, Subscription, SubscriptionRow, SubscriptionStatus};
use crate::store::{EntitlementStore, StoreError};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

/// Postgres-backed store over `subscriptions`, `daily_usage` and `monthly_usage`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {}", e)))?;
        Ok(PgStore::new(pool))
    }
}

#[async_trait]
impl EntitlementStore for PgStore {
    async fn active_subscription(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT id, user_id, tier, status, billing_period, current_period_start, current_period_end FROM subscriptions WHERE user_id = $1 AND status = $2",
        )
        .bind(user_id)
        .bind(SubscriptionStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Subscription::from))
    }

    async fn upsert_active_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO subscriptions (id, user_id, tier, status, billing_period, current_period_start, current_period_end, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW()) \
             ON CONFLICT (user_id) WHERE status = 'active' DO UPDATE SET \
             tier = EXCLUDED.tier, billing_period = EXCLUDED.billing_period, \
             current_period_start = EXCLUDED.current_period_start, \
             current_period_end = EXCLUDED.current_period_end, updated_at = NOW()",
        )
        .bind(subscription.id)
        .bind(subscription.user_id)
        .bind(subscription.tier.as_str())
        .bind(SubscriptionStatus::Active.as_str())
        .bind(subscription.billing_period.as_str())
        .bind(subscription.current_period_start)
        .bind(subscription.current_period_end)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cancel_active_subscription(&self, user_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET status = $2, updated_at = NOW() WHERE user_id = $1 AND status = $3",
        )
        .bind(user_id)
        .bind(SubscriptionStatus::Canceled.as_str())
        .bind(SubscriptionStatus::Active.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn daily_usage(&self, user_id: Uuid, date: NaiveDate) -> Result<i64, StoreError> {
        let row = sqlx::query_as::<_, DailyUsage>(
            "SELECT user_id, usage_date, search_count FROM daily_usage WHERE user_id = $1 AND usage_date = $2",
        )
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map_or(0, |r| r.search_count))
    }

    async fn monthly_usage(&self, user_id: Uuid, month: NaiveDate) -> Result<i64, StoreError> {
        let row = sqlx::query_as::<_, MonthlyUsage>(
            "SELECT user_id, month, search_count FROM monthly_usage WHERE user_id = $1 AND month = $2",
        )
        .bind(user_id)
        .bind(month)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map_or(0, |r| r.search_count))
    }

    async fn increment_daily_usage(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<i64, StoreError> {
        // Single statement so concurrent searches cannot lose an increment.
        let row = sqlx::query_as::<_, DailyUsage>(
            "INSERT INTO daily_usage (user_id, usage_date, search_count) VALUES ($1, $2, 1) \
             ON CONFLICT (user_id, usage_date) \
             DO UPDATE SET search_count = daily_usage.search_count + 1 \
             RETURNING user_id, usage_date, search_count",
        )
        .bind(user_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.search_count)
    }

    async fn increment_monthly_usage(
        &self,
        user_id: Uuid,
        month: NaiveDate,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query_as::<_, MonthlyUsage>(
            "INSERT INTO monthly_usage (user_id, month, search_count) VALUES ($1, $2, 1) \
             ON CONFLICT (user_id, month) \
             DO UPDATE SET search_count = monthly_usage.search_count + 1 \
             RETURNING user_id, month, search_count",
        )
        .bind(user_id)
        .bind(month)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.search_count)
    }

    async fn release_daily_usage(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query_as::<_, DailyUsage>(
            "UPDATE daily_usage SET search_count = GREATEST(search_count - 1, 0) \
             WHERE user_id = $1 AND usage_date = $2 \
             RETURNING user_id, usage_date, search_count",
        )
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map_or(0, |r| r.search_count))
    }

    async fn release_monthly_usage(
        &self,
        user_id: Uuid,
        month: NaiveDate,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query_as::<_, MonthlyUsage>(
            "UPDATE monthly_usage SET search_count = GREATEST(search_count - 1, 0) \
             WHERE user_id = $1 AND month = $2 \
             RETURNING user_id, month, search_count",
        )
        .bind(user_id)
        .bind(month)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map_or(0, |r| r.search_count))
    }
}
