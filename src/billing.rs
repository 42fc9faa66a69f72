// src/billing.rs
//! Pulls the active subscription for an email from the payment provider and
//! mirrors it into the store.

use crate::auth::AuthUser;
use crate::config::Config;
use crate::models::{Subscription, SubscriptionStatus};
use crate::store::{EntitlementStore, StoreError};
use crate::tier::{BillingPeriod, Tier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("payment provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("payment provider returned {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("payment provider is not configured")]
    NotConfigured,
    #[error("user has no email to look up")]
    MissingEmail,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What the payment provider knows about a customer's active subscription.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderSubscription {
    pub provider_id: String,
    pub tier: Tier,
    pub billing_period: BillingPeriod,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    /// Active subscription for the customer registered under `email`.
    async fn lookup(&self, email: &str) -> Result<Option<ProviderSubscription>, BillingError>;
}

#[derive(Deserialize)]
struct List<T> {
    data: Vec<T>,
}

#[derive(Deserialize)]
struct StripeCustomer {
    id: String,
}

#[derive(Deserialize)]
struct StripeSubscription {
    id: String,
    #[serde(default)]
    current_period_start: Option<i64>,
    #[serde(default)]
    current_period_end: Option<i64>,
    items: List<StripeItem>,
}

#[derive(Deserialize)]
struct StripeItem {
    price: StripePrice,
    // Newer API versions report the period per item.
    #[serde(default)]
    current_period_start: Option<i64>,
    #[serde(default)]
    current_period_end: Option<i64>,
}

#[derive(Deserialize)]
struct StripePrice {
    product: String,
    #[serde(default)]
    recurring: Option<StripeRecurring>,
}

#[derive(Deserialize)]
struct StripeRecurring {
    interval: String,
}

pub struct StripeClient {
    http: reqwest::Client,
    api_url: String,
    secret_key: String,
    product_tiers: Vec<(String, Tier)>,
}

impl StripeClient {
    pub fn from_config(config: &Config) -> Option<Self> {
        let secret_key = config.stripe_secret_key.clone()?;
        Some(StripeClient {
            http: reqwest::Client::new(),
            api_url: config.stripe_api_url.trim_end_matches('/').to_string(),
            secret_key,
            product_tiers: config.product_tiers(),
        })
    }

    fn tier_for_product(&self, product: &str) -> Tier {
        match self.product_tiers.iter().find(|(p, _)| p == product) {
            Some((_, tier)) => *tier,
            None => {
                tracing::warn!("Unmapped product {}, treating subscription as free", product);
                Tier::Free
            }
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, BillingError> {
        let response = self
            .http
            .get(format!("{}{}", self.api_url, path))
            .bearer_auth(&self.secret_key)
            .query(query)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BillingError::Provider {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }

    fn convert(&self, sub: StripeSubscription) -> Option<ProviderSubscription> {
        let item = sub.items.data.into_iter().next()?;
        let start = sub.current_period_start.or(item.current_period_start)?;
        let end = sub.current_period_end.or(item.current_period_end)?;
        let billing_period = item
            .price
            .recurring
            .as_ref()
            .map(|r| BillingPeriod::parse_or_monthly(&r.interval))
            .unwrap_or_default();
        Some(ProviderSubscription {
            provider_id: sub.id,
            tier: self.tier_for_product(&item.price.product),
            billing_period,
            period_start: DateTime::from_timestamp(start, 0)?,
            period_end: DateTime::from_timestamp(end, 0)?,
        })
    }
}

#[async_trait]
impl SubscriptionSource for StripeClient {
    async fn lookup(&self, email: &str) -> Result<Option<ProviderSubscription>, BillingError> {
        let customers: List<StripeCustomer> = self
            .get("/customers", &[("email", email), ("limit", "1")])
            .await?;
        let Some(customer) = customers.data.into_iter().next() else {
            tracing::debug!("No payment customer for {}", email);
            return Ok(None);
        };

        let subscriptions: List<StripeSubscription> = self
            .get(
                "/subscriptions",
                &[
                    ("customer", customer.id.as_str()),
                    ("status", "active"),
                    ("limit", "1"),
                ],
            )
            .await?;

        Ok(subscriptions
            .data
            .into_iter()
            .next()
            .and_then(|sub| self.convert(sub)))
    }
}

/// Provider lookups cached per email for a short TTL. Only found
/// subscriptions are cached, so a user who just paid is seen on the next sync.
pub struct SubscriptionSync {
    source: Option<Arc<dyn SubscriptionSource>>,
    cache: Cache<String, ProviderSubscription>,
}

impl SubscriptionSync {
    pub fn new(source: Option<Arc<dyn SubscriptionSource>>, ttl: Duration) -> Self {
        SubscriptionSync {
            source,
            cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let source = StripeClient::from_config(config)
            .map(|client| Arc::new(client) as Arc<dyn SubscriptionSource>);
        if source.is_none() {
            tracing::warn!("STRIPE_SECRET_KEY not set, subscription sync is disabled");
        }
        Self::new(source, Duration::from_secs(config.billing_cache_ttl_secs))
    }

    async fn lookup(&self, email: &str) -> Result<Option<ProviderSubscription>, BillingError> {
        let source = self.source.as_ref().ok_or(BillingError::NotConfigured)?;
        let key = email.trim().to_ascii_lowercase();
        if let Some(cached) = self.cache.get(&key).await {
            tracing::debug!("Billing cache hit for {}", key);
            return Ok(Some(cached));
        }
        let found = source.lookup(&key).await?;
        if let Some(found) = &found {
            self.cache.insert(key, found.clone()).await;
        }
        Ok(found)
    }

    /// Mirrors the provider's view of `user` into the store and returns the
    /// resulting active subscription.
    pub async fn sync(
        &self,
        store: &dyn EntitlementStore,
        user: &AuthUser,
    ) -> Result<Option<Subscription>, BillingError> {
        let email = user.email.as_deref().ok_or(BillingError::MissingEmail)?;

        match self.lookup(email).await? {
            Some(found) => {
                let subscription = Subscription {
                    id: Uuid::new_v4(),
                    user_id: user.id,
                    tier: found.tier,
                    status: SubscriptionStatus::Active,
                    billing_period: found.billing_period,
                    current_period_start: found.period_start,
                    current_period_end: found.period_end,
                };
                store.upsert_active_subscription(&subscription).await?;
                tracing::info!(
                    "Synced {} subscription {} for user {}",
                    subscription.tier,
                    found.provider_id,
                    user.id
                );
                // An existing active row keeps its id, so report what was stored.
                Ok(store.active_subscription(user.id).await?)
            }
            None => {
                if store.cancel_active_subscription(user.id).await? {
                    tracing::info!("Canceled stale subscription for user {}", user.id);
                }
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        answer: Option<ProviderSubscription>,
    }

    #[async_trait]
    impl SubscriptionSource for CountingSource {
        async fn lookup(&self, _: &str) -> Result<Option<ProviderSubscription>, BillingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.clone())
        }
    }

    fn provider_sub(tier: Tier) -> ProviderSubscription {
        ProviderSubscription {
            provider_id: "sub_123".into(),
            tier,
            billing_period: BillingPeriod::Annual,
            period_start: DateTime::from_timestamp(1_760_000_000, 0).unwrap(),
            period_end: DateTime::from_timestamp(1_791_536_000, 0).unwrap(),
        }
    }

    fn user() -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: Some("Chemist@Example.org".into()),
        }
    }

    #[tokio::test]
    async fn sync_persists_provider_subscription() {
        let store = MemoryStore::new();
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            answer: Some(provider_sub(Tier::ResearcherPremium)),
        });
        let sync = SubscriptionSync::new(Some(source), Duration::from_secs(60));
        let user = user();

        let synced = sync.sync(&store, &user).await.unwrap().unwrap();
        assert_eq!(synced.tier, Tier::ResearcherPremium);
        assert_eq!(synced.billing_period, BillingPeriod::Annual);

        let stored = store.active_subscription(user.id).await.unwrap().unwrap();
        assert_eq!(stored, synced);
    }

    #[tokio::test]
    async fn resync_reports_the_stored_row_id() {
        let store = MemoryStore::new();
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            answer: Some(provider_sub(Tier::IndustryLite)),
        });
        let sync = SubscriptionSync::new(Some(source), Duration::from_secs(60));
        let user = user();

        let first = sync.sync(&store, &user).await.unwrap().unwrap();
        let second = sync.sync(&store, &user).await.unwrap().unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn found_subscriptions_are_cached_per_email() {
        let store = MemoryStore::new();
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            answer: Some(provider_sub(Tier::ResearcherLite)),
        });
        let sync = SubscriptionSync::new(Some(source.clone()), Duration::from_secs(60));
        let user = user();

        sync.sync(&store, &user).await.unwrap();
        sync.sync(&store, &user).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_subscriptions_are_looked_up_again() {
        let store = MemoryStore::new();
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            answer: None,
        });
        let sync = SubscriptionSync::new(Some(source.clone()), Duration::from_secs(60));
        let user = user();

        sync.sync(&store, &user).await.unwrap();
        sync.sync(&store, &user).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_provider_subscription_cancels_stored_one() {
        let store = MemoryStore::new();
        let user = user();
        let active = Subscription {
            id: Uuid::new_v4(),
            user_id: user.id,
            tier: Tier::IndustryLite,
            status: SubscriptionStatus::Active,
            billing_period: BillingPeriod::Monthly,
            current_period_start: Utc::now(),
            current_period_end: Utc::now(),
        };
        store.upsert_active_subscription(&active).await.unwrap();

        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            answer: None,
        });
        let sync = SubscriptionSync::new(Some(source), Duration::from_secs(60));

        assert_eq!(sync.sync(&store, &user).await.unwrap(), None);
        assert!(store.active_subscription(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sync_without_provider_or_email_is_an_error() {
        let store = MemoryStore::new();
        let sync = SubscriptionSync::new(None, Duration::from_secs(60));
        assert!(matches!(
            sync.sync(&store, &user()).await,
            Err(BillingError::NotConfigured)
        ));

        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            answer: None,
        });
        let sync = SubscriptionSync::new(Some(source), Duration::from_secs(60));
        let anonymous_email = AuthUser {
            id: Uuid::new_v4(),
            email: None,
        };
        assert!(matches!(
            sync.sync(&store, &anonymous_email).await,
            Err(BillingError::MissingEmail)
        ));
    }

    #[test]
    fn stripe_payload_maps_product_and_interval() {
        let mut config = Config::with_secret("s");
        config.stripe_secret_key = Some("sk_test".into());
        config.stripe_product_industry_premium = Some("prod_ip".into());
        let client = StripeClient::from_config(&config).unwrap();

        let payload = r#"{
            "id": "sub_1",
            "items": {"data": [{
                "current_period_start": 1760000000,
                "current_period_end": 1791536000,
                "price": {"product": "prod_ip", "recurring": {"interval": "year"}}
            }]}
        }"#;
        let sub: StripeSubscription = serde_json::from_str(payload).unwrap();
        let converted = client.convert(sub).unwrap();

        assert_eq!(converted.tier, Tier::IndustryPremium);
        assert_eq!(converted.billing_period, BillingPeriod::Annual);
        assert_eq!(converted.period_end.timestamp(), 1_791_536_000);
    }

    #[test]
    fn unknown_product_maps_to_free() {
        let mut config = Config::with_secret("s");
        config.stripe_secret_key = Some("sk_test".into());
        let client = StripeClient::from_config(&config).unwrap();
        assert_eq!(client.tier_for_product("prod_unknown"), Tier::Free);
    }
}
