// src/entitlement.rs
use crate::auth::AuthUser;
use crate::models::{Subscription, SubscriptionStatus};
use crate::store::EntitlementStore;
use crate::tier::Tier;
use crate::usage::{self, Quota};
use chrono::NaiveDate;
use serde::Serialize;

/// Effective tier for a subscription snapshot. Pure: absent or inactive
/// subscriptions resolve to free.
pub fn resolve_tier(subscription: Option<&Subscription>) -> Tier {
    match subscription {
        Some(sub) if sub.status == SubscriptionStatus::Active => sub.tier,
        _ => Tier::Free,
    }
}

pub fn has_feature_access(user_tier: Tier, required: Tier) -> bool {
    user_tier.grants(required)
}

/// Per-request view of what the caller is entitled to. Built once when the
/// request arrives and handed to whatever needs it.
#[derive(Serialize, Clone, Debug)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntitlementContext {
    /// No session: there is no usage to report, the client should sign in.
    Anonymous,
    Authenticated {
        user: AuthUser,
        tier: Tier,
        subscription: Option<Subscription>,
        quota: Quota,
    },
}

impl EntitlementContext {
    /// Loads subscription and usage for `user`. Store failures are logged and
    /// answered with the best known state: free tier, zero usage.
    pub async fn load(
        store: &dyn EntitlementStore,
        user: Option<AuthUser>,
        today: NaiveDate,
    ) -> EntitlementContext {
        let Some(user) = user else {
            return EntitlementContext::Anonymous;
        };

        let subscription = match store.active_subscription(user.id).await {
            Ok(sub) => sub,
            Err(e) => {
                tracing::error!("Failed to read subscription for {}: {}", user.id, e);
                None
            }
        };
        let tier = resolve_tier(subscription.as_ref());

        let quota = match usage::current_quota(store, user.id, tier, today).await {
            Ok(quota) => quota,
            Err(e) => {
                tracing::error!("Failed to read usage for {}: {}", user.id, e);
                usage::remaining(tier, 0, 0)
            }
        };

        EntitlementContext::Authenticated {
            user,
            tier,
            subscription,
            quota,
        }
    }

    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            EntitlementContext::Authenticated { user, .. } => Some(user),
            EntitlementContext::Anonymous => None,
        }
    }

    pub fn tier(&self) -> Option<Tier> {
        match self {
            EntitlementContext::Authenticated { tier, .. } => Some(*tier),
            EntitlementContext::Anonymous => None,
        }
    }

    pub fn quota(&self) -> Option<&Quota> {
        match self {
            EntitlementContext::Authenticated { quota, .. } => Some(quota),
            EntitlementContext::Anonymous => None,
        }
    }

    /// Anonymous callers have no features, not even free ones.
    pub fn has_feature_access(&self, required: Tier) -> bool {
        self.tier()
            .is_some_and(|tier| has_feature_access(tier, required))
    }

    pub fn can_search(&self) -> bool {
        self.quota().is_some_and(Quota::can_search)
    }
}
