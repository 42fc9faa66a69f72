// src/store.rs
//! Persistence contract for subscriptions and usage counters, plus an
//! in-memory implementation used by tests and database-less runs.

use crate::models::{Subscription, SubscriptionStatus};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Counter increments must be atomic: concurrent searches by one user may
/// never lose an increment.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn active_subscription(&self, user_id: Uuid)
    -> Result<Option<Subscription>, StoreError>;

    /// Inserts or replaces the user's single active subscription. Replacing
    /// keeps the id of the row already active.
    async fn upsert_active_subscription(&self, subscription: &Subscription)
    -> Result<(), StoreError>;

    /// Marks the active subscription canceled. Returns whether a row changed.
    async fn cancel_active_subscription(&self, user_id: Uuid) -> Result<bool, StoreError>;

    async fn daily_usage(&self, user_id: Uuid, date: NaiveDate) -> Result<i64, StoreError>;

    async fn monthly_usage(&self, user_id: Uuid, month: NaiveDate) -> Result<i64, StoreError>;

    /// Adds one search to the day's counter, creating it at 1. Returns the new count.
    async fn increment_daily_usage(&self, user_id: Uuid, date: NaiveDate)
    -> Result<i64, StoreError>;

    /// Adds one search to the month's counter, creating it at 1. Returns the new count.
    async fn increment_monthly_usage(
        &self,
        user_id: Uuid,
        month: NaiveDate,
    ) -> Result<i64, StoreError>;

    /// Takes back one search from the day's counter, never below 0. Returns the new count.
    async fn release_daily_usage(&self, user_id: Uuid, date: NaiveDate)
    -> Result<i64, StoreError>;

    /// Takes back one search from the month's counter, never below 0. Returns the new count.
    async fn release_monthly_usage(
        &self,
        user_id: Uuid,
        month: NaiveDate,
    ) -> Result<i64, StoreError>;
}

#[derive(Default)]
struct MemoryTables {
    subscriptions: HashMap<Uuid, Subscription>,
    daily: HashMap<(Uuid, NaiveDate), i64>,
    monthly: HashMap<(Uuid, NaiveDate), i64>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tables<T>(&self, f: impl FnOnce(&mut MemoryTables) -> T) -> Result<T, StoreError> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(f(&mut tables))
    }

    /// Number of usage rows held, across both windows.
    pub fn usage_row_count(&self) -> usize {
        self.with_tables(|t| t.daily.len() + t.monthly.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl EntitlementStore for MemoryStore {
    async fn active_subscription(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Subscription>, StoreError> {
        self.with_tables(|t| {
            t.subscriptions
                .get(&user_id)
                .filter(|s| s.status == SubscriptionStatus::Active)
                .cloned()
        })
    }

    async fn upsert_active_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<(), StoreError> {
        let mut active = subscription.clone();
        active.status = SubscriptionStatus::Active;
        self.with_tables(|t| {
            if let Some(current) = t.subscriptions.get(&active.user_id) {
                if current.status == SubscriptionStatus::Active {
                    active.id = current.id;
                }
            }
            t.subscriptions.insert(active.user_id, active);
        })
    }

    async fn cancel_active_subscription(&self, user_id: Uuid) -> Result<bool, StoreError> {
        self.with_tables(|t| match t.subscriptions.get_mut(&user_id) {
            Some(s) if s.status == SubscriptionStatus::Active => {
                s.status = SubscriptionStatus::Canceled;
                true
            }
            _ => false,
        })
    }

    async fn daily_usage(&self, user_id: Uuid, date: NaiveDate) -> Result<i64, StoreError> {
        self.with_tables(|t| t.daily.get(&(user_id, date)).copied().unwrap_or(0))
    }

    async fn monthly_usage(&self, user_id: Uuid, month: NaiveDate) -> Result<i64, StoreError> {
        self.with_tables(|t| t.monthly.get(&(user_id, month)).copied().unwrap_or(0))
    }

    async fn increment_daily_usage(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<i64, StoreError> {
        self.with_tables(|t| {
            let count = t.daily.entry((user_id, date)).or_insert(0);
            *count += 1;
            *count
        })
    }

    async fn increment_monthly_usage(
        &self,
        user_id: Uuid,
        month: NaiveDate,
    ) -> Result<i64, StoreError> {
        self.with_tables(|t| {
            let count = t.monthly.entry((user_id, month)).or_insert(0);
            *count += 1;
            *count
        })
    }

    async fn release_daily_usage(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<i64, StoreError> {
        self.with_tables(|t| match t.daily.get_mut(&(user_id, date)) {
            Some(count) => {
                *count = (*count - 1).max(0);
                *count
            }
            None => 0,
        })
    }

    async fn release_monthly_usage(
        &self,
        user_id: Uuid,
        month: NaiveDate,
    ) -> Result<i64, StoreError> {
        self.with_tables(|t| match t.monthly.get_mut(&(user_id, month)) {
            Some(count) => {
                *count = (*count - 1).max(0);
                *count
            }
            None => 0,
        })
    }
}
