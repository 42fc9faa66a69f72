// src/gate.rs
use crate::entitlement::EntitlementContext;
use crate::tier::Tier;
use serde::Serialize;

/// Pricing and feature summary shown when a gate turns a user away.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct TierOffer {
    pub tier: Tier,
    pub name: &'static str,
    /// Prices in whole US cents.
    pub monthly_price_cents: u32,
    pub annual_price_cents: u32,
    pub search_allowance: &'static str,
    pub features: &'static [&'static str],
}

static CATALOG: [TierOffer; 5] = [
    TierOffer {
        tier: Tier::Free,
        name: "Free",
        monthly_price_cents: 0,
        annual_price_cents: 0,
        search_allowance: "5 searches per day",
        features: &["Materials database browsing", "Basic literature search"],
    },
    TierOffer {
        tier: Tier::ResearcherLite,
        name: "Researcher Lite",
        monthly_price_cents: 1_900,
        annual_price_cents: 19_000,
        search_allowance: "100 searches per month",
        features: &[
            "Everything in Free",
            "Property-categorized search results",
            "Saved lab recipes",
        ],
    },
    TierOffer {
        tier: Tier::ResearcherPremium,
        name: "Researcher Premium",
        monthly_price_cents: 4_900,
        annual_price_cents: 49_000,
        search_allowance: "Unlimited searches",
        features: &[
            "Everything in Researcher Lite",
            "AI-assisted synthesis suggestions",
            "Priority support",
        ],
    },
    TierOffer {
        tier: Tier::IndustryLite,
        name: "Industry Lite",
        monthly_price_cents: 9_900,
        annual_price_cents: 99_000,
        search_allowance: "100 searches per month",
        features: &[
            "Everything in Researcher Lite",
            "Supplier directory",
            "Commercial use license",
        ],
    },
    TierOffer {
        tier: Tier::IndustryPremium,
        name: "Industry Premium",
        monthly_price_cents: 29_900,
        annual_price_cents: 299_000,
        search_allowance: "Unlimited searches",
        features: &[
            "Everything in Industry Lite and Researcher Premium",
            "Team seats",
            "Dedicated account manager",
        ],
    },
];

pub fn catalog() -> &'static [TierOffer] {
    &CATALOG
}

pub fn offer_for(tier: Tier) -> &'static TierOffer {
    // CATALOG lists tiers in Tier::ALL order.
    let index = Tier::ALL.iter().position(|t| *t == tier).unwrap_or(0);
    &CATALOG[index]
}

/// Next tier up the user's own track, `None` once searches are unlimited.
pub fn upgrade_path(tier: Tier) -> Option<Tier> {
    match tier {
        Tier::Free => Some(Tier::ResearcherLite),
        Tier::ResearcherLite => Some(Tier::ResearcherPremium),
        Tier::IndustryLite => Some(Tier::IndustryPremium),
        Tier::ResearcherPremium | Tier::IndustryPremium => None,
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Allowed,
    SignInRequired { required: Tier },
    Upgrade {
        required: Tier,
        current: Tier,
        offer: &'static TierOffer,
    },
}

/// Decides whether protected content requiring `required` may be rendered.
pub fn gate(required: Tier, context: &EntitlementContext) -> GateDecision {
    match context.tier() {
        None => GateDecision::SignInRequired { required },
        Some(current) if current.grants(required) => GateDecision::Allowed,
        Some(current) => GateDecision::Upgrade {
            required,
            current,
            offer: offer_for(required),
        },
    }
}
