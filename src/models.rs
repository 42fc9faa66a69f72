// src/models.rs
use crate::tier::{BillingPeriod, Tier};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
        }
    }
}

/// A user's subscription as persisted after a payment-provider sync.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tier: Tier,
    pub status: SubscriptionStatus,
    pub billing_period: BillingPeriod,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
}

/// Raw `subscriptions` row. Text columns are decoded leniently so a bad value
/// in the table never fails a request.
#[derive(Clone, Debug, FromRow)]
pub struct SubscriptionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tier: String,
    pub status: String,
    pub billing_period: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        let status = if row.status == SubscriptionStatus::Active.as_str() {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Canceled
        };
        Subscription {
            id: row.id,
            user_id: row.user_id,
            tier: Tier::parse_or_free(&row.tier),
            status,
            billing_period: BillingPeriod::parse_or_monthly(&row.billing_period),
            current_period_start: row.current_period_start,
            current_period_end: row.current_period_end,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, FromRow)]
pub struct DailyUsage {
    pub user_id: Uuid,
    pub usage_date: NaiveDate,
    pub search_count: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, FromRow)]
pub struct MonthlyUsage {
    pub user_id: Uuid,
    /// First day of the counted month.
    pub month: NaiveDate,
    pub search_count: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Claims {
    pub sub: String, // user_id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}
