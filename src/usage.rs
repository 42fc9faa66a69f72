// src/usage.rs
//! Search counting per quota window and remaining-quota arithmetic.
//!
//! Free tiers count per UTC calendar day, lite tiers per UTC calendar month,
//! premium tiers are not counted at all. A search reserves its slot with
//! `reserve_search` before it runs, so concurrent requests cannot push the
//! counter past the limit. Reservations carry no idempotency key: a caller
//! that retries a search after a lost response counts it twice.

use crate::store::{EntitlementStore, StoreError};
use crate::tier::{Tier, TierClass};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "window", content = "key", rename_all = "snake_case")]
pub enum QuotaWindow {
    Daily(NaiveDate),
    /// Keyed by the first day of the month.
    Monthly(NaiveDate),
}

impl QuotaWindow {
    /// Counting window for `tier` on `today`, `None` for unmetered tiers.
    pub fn for_tier(tier: Tier, today: NaiveDate) -> Option<QuotaWindow> {
        match tier.class() {
            TierClass::Free => Some(QuotaWindow::Daily(today)),
            TierClass::Lite => Some(QuotaWindow::Monthly(first_of_month(today))),
            TierClass::Premium => None,
        }
    }
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Quota {
    Limited { limit: i64, used: i64, remaining: i64 },
    Unlimited,
}

impl Quota {
    pub fn can_search(&self) -> bool {
        match self {
            Quota::Limited { remaining, .. } => *remaining > 0,
            Quota::Unlimited => true,
        }
    }

    /// Remaining searches, `None` meaning unlimited.
    pub fn remaining(&self) -> Option<i64> {
        match self {
            Quota::Limited { remaining, .. } => Some(*remaining),
            Quota::Unlimited => None,
        }
    }

    fn limited(limit: i64, used: i64) -> Quota {
        Quota::Limited {
            limit,
            used,
            remaining: (limit - used).max(0),
        }
    }
}

/// Remaining quota for `tier` given both counters. Only the counter of the
/// tier's class is consulted.
pub fn remaining(tier: Tier, daily_count: i64, monthly_count: i64) -> Quota {
    match (tier.class(), tier.search_limit()) {
        (TierClass::Free, Some(limit)) => Quota::limited(limit, daily_count),
        (TierClass::Lite, Some(limit)) => Quota::limited(limit, monthly_count),
        _ => Quota::Unlimited,
    }
}

/// Reads the counter that applies to `tier` and turns it into a quota.
pub async fn current_quota(
    store: &dyn EntitlementStore,
    user_id: Uuid,
    tier: Tier,
    today: NaiveDate,
) -> Result<Quota, StoreError> {
    let quota = match QuotaWindow::for_tier(tier, today) {
        Some(QuotaWindow::Daily(date)) => {
            remaining(tier, store.daily_usage(user_id, date).await?, 0)
        }
        Some(QuotaWindow::Monthly(month)) => {
            remaining(tier, 0, store.monthly_usage(user_id, month).await?)
        }
        None => Quota::Unlimited,
    };
    Ok(quota)
}

/// Counts one search against the user's current window. Returns the new
/// counter value, or `None` for premium tiers where nothing is written.
pub async fn record_search(
    store: &dyn EntitlementStore,
    user_id: Uuid,
    tier: Tier,
    today: NaiveDate,
) -> Result<Option<i64>, StoreError> {
    let count = match QuotaWindow::for_tier(tier, today) {
        Some(QuotaWindow::Daily(date)) => Some(store.increment_daily_usage(user_id, date).await?),
        Some(QuotaWindow::Monthly(month)) => {
            Some(store.increment_monthly_usage(user_id, month).await?)
        }
        None => None,
    };
    tracing::debug!("Recorded search for user {} on {}: {:?}", user_id, tier, count);
    Ok(count)
}

/// Outcome of claiming one search slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reservation {
    /// The slot is held; `quota` reflects the counter including it.
    Granted(Quota),
    /// The window was already full. Nothing stays counted.
    Exhausted(Quota),
    Unmetered,
}

/// Claims one search slot for `tier`. The increment happens first and is
/// checked against the limit afterwards; an over-limit claim is given back.
pub async fn reserve_search(
    store: &dyn EntitlementStore,
    user_id: Uuid,
    tier: Tier,
    today: NaiveDate,
) -> Result<Reservation, StoreError> {
    let (Some(limit), Some(count)) = (
        tier.search_limit(),
        record_search(store, user_id, tier, today).await?,
    ) else {
        return Ok(Reservation::Unmetered);
    };
    if count <= limit {
        return Ok(Reservation::Granted(remaining(tier, count, count)));
    }
    let count = release_search(store, user_id, tier, today)
        .await?
        .unwrap_or(limit);
    Ok(Reservation::Exhausted(remaining(tier, count, count)))
}

/// Gives back one search slot. Returns the new counter value, or `None` for
/// premium tiers.
pub async fn release_search(
    store: &dyn EntitlementStore,
    user_id: Uuid,
    tier: Tier,
    today: NaiveDate,
) -> Result<Option<i64>, StoreError> {
    let count = match QuotaWindow::for_tier(tier, today) {
        Some(QuotaWindow::Daily(date)) => Some(store.release_daily_usage(user_id, date).await?),
        Some(QuotaWindow::Monthly(month)) => {
            Some(store.release_monthly_usage(user_id, month).await?)
        }
        None => None,
    };
    tracing::debug!("Released search for user {} on {}: {:?}", user_id, tier, count);
    Ok(count)
}
