// src/tier.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Searches allowed per UTC calendar day on the free tier.
pub const FREE_DAILY_SEARCHES: i64 = 5;
/// Searches allowed per UTC calendar month on a lite tier.
pub const LITE_MONTHLY_SEARCHES: i64 = 100;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Free,
    ResearcherLite,
    ResearcherPremium,
    IndustryLite,
    IndustryPremium,
}

/// Which usage counter applies to a tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TierClass {
    Free,
    Lite,
    Premium,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    #[default]
    Monthly,
    Annual,
}

/// Bitset over `Tier::ALL`, indexed by `Tier::index`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TierSet(u8);

impl TierSet {
    const fn of(tiers: &[Tier]) -> Self {
        let mut bits = 0u8;
        let mut i = 0;
        while i < tiers.len() {
            bits |= 1 << tiers[i].index();
            i += 1;
        }
        TierSet(bits)
    }

    pub const fn contains(self, tier: Tier) -> bool {
        self.0 & (1 << tier.index()) != 0
    }
}

// Row `required.index()` lists the user tiers that satisfy `required`. The
// research and industry tracks are not nested: researcher_premium does not
// unlock industry_lite content and vice versa.
static REACHABLE: [TierSet; 5] = [
    TierSet::of(&Tier::ALL),
    TierSet::of(&[
        Tier::ResearcherLite,
        Tier::ResearcherPremium,
        Tier::IndustryLite,
        Tier::IndustryPremium,
    ]),
    TierSet::of(&[Tier::ResearcherPremium, Tier::IndustryPremium]),
    TierSet::of(&[Tier::IndustryLite, Tier::IndustryPremium]),
    TierSet::of(&[Tier::IndustryPremium]),
];

impl Tier {
    pub const ALL: [Tier; 5] = [
        Tier::Free,
        Tier::ResearcherLite,
        Tier::ResearcherPremium,
        Tier::IndustryLite,
        Tier::IndustryPremium,
    ];

    const fn index(self) -> usize {
        match self {
            Tier::Free => 0,
            Tier::ResearcherLite => 1,
            Tier::ResearcherPremium => 2,
            Tier::IndustryLite => 3,
            Tier::IndustryPremium => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::ResearcherLite => "researcher_lite",
            Tier::ResearcherPremium => "researcher_premium",
            Tier::IndustryLite => "industry_lite",
            Tier::IndustryPremium => "industry_premium",
        }
    }

    /// Parses a stored or provider-supplied tier name. Anything unrecognised
    /// is treated as the free tier.
    pub fn parse_or_free(value: &str) -> Tier {
        match value.trim().to_ascii_lowercase().as_str() {
            "researcher_lite" => Tier::ResearcherLite,
            "researcher_premium" => Tier::ResearcherPremium,
            "industry_lite" => Tier::IndustryLite,
            "industry_premium" => Tier::IndustryPremium,
            "free" => Tier::Free,
            other => {
                if !other.is_empty() {
                    tracing::warn!("Unknown tier value '{}', defaulting to free", other);
                }
                Tier::Free
            }
        }
    }

    pub fn class(self) -> TierClass {
        match self {
            Tier::Free => TierClass::Free,
            Tier::ResearcherLite | Tier::IndustryLite => TierClass::Lite,
            Tier::ResearcherPremium | Tier::IndustryPremium => TierClass::Premium,
        }
    }

    /// User tiers that satisfy a requirement of `self`.
    pub fn reachable_set(self) -> TierSet {
        REACHABLE[self.index()]
    }

    /// Whether a user on `self` may use a feature that requires `required`.
    pub fn grants(self, required: Tier) -> bool {
        required.reachable_set().contains(self)
    }

    /// Search allowance for the tier's window, `None` when unlimited.
    pub fn search_limit(self) -> Option<i64> {
        match self.class() {
            TierClass::Free => Some(FREE_DAILY_SEARCHES),
            TierClass::Lite => Some(LITE_MONTHLY_SEARCHES),
            TierClass::Premium => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown tier '{0}'")]
pub struct UnknownTier(pub String);

/// Strict parse for tier names supplied by callers.
impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTier(s.to_string()))
    }
}

impl BillingPeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            BillingPeriod::Monthly => "monthly",
            BillingPeriod::Annual => "annual",
        }
    }

    pub fn parse_or_monthly(value: &str) -> BillingPeriod {
        match value.trim().to_ascii_lowercase().as_str() {
            "annual" | "year" | "yearly" => BillingPeriod::Annual,
            _ => BillingPeriod::Monthly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_requirement_is_met_by_every_tier() {
        for tier in Tier::ALL {
            assert!(tier.grants(Tier::Free), "{} should reach free", tier);
        }
    }

    #[test]
    fn industry_premium_requirement_is_met_only_by_industry_premium() {
        for tier in Tier::ALL {
            assert_eq!(
                tier.grants(Tier::IndustryPremium),
                tier == Tier::IndustryPremium
            );
        }
    }

    #[test]
    fn research_and_industry_tracks_are_not_comparable() {
        assert!(!Tier::ResearcherPremium.grants(Tier::IndustryLite));
        assert!(!Tier::IndustryLite.grants(Tier::ResearcherPremium));
        assert!(Tier::IndustryPremium.grants(Tier::ResearcherPremium));
        assert!(Tier::IndustryLite.grants(Tier::ResearcherLite));
    }

    #[test]
    fn free_user_only_reaches_free() {
        let reachable: Vec<Tier> = Tier::ALL
            .into_iter()
            .filter(|required| Tier::Free.grants(*required))
            .collect();
        assert_eq!(reachable, vec![Tier::Free]);
    }

    #[test]
    fn unknown_tier_values_default_to_free() {
        assert_eq!(Tier::parse_or_free(""), Tier::Free);
        assert_eq!(Tier::parse_or_free("enterprise"), Tier::Free);
        assert_eq!(Tier::parse_or_free(" Industry_Lite "), Tier::IndustryLite);
    }

    #[test]
    fn strict_parse_rejects_unknown_names() {
        assert_eq!("industry_premium".parse::<Tier>().unwrap(), Tier::IndustryPremium);
        assert!("enterprise".parse::<Tier>().is_err());
    }

    #[test]
    fn classes_and_limits() {
        assert_eq!(Tier::Free.search_limit(), Some(5));
        assert_eq!(Tier::IndustryLite.search_limit(), Some(100));
        assert_eq!(Tier::ResearcherPremium.search_limit(), None);
        assert_eq!(Tier::ResearcherLite.class(), TierClass::Lite);
    }

    #[test]
    fn researcher_premium_is_reached_by_premium_tiers_only() {
        let reached: Vec<Tier> = Tier::ALL
            .into_iter()
            .filter(|t| Tier::ResearcherPremium.reachable_set().contains(*t))
            .collect();
        assert_eq!(reached, vec![Tier::ResearcherPremium, Tier::IndustryPremium]);
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&Tier::ResearcherPremium).unwrap();
        assert_eq!(json, "\"researcher_premium\"");
        assert_eq!(BillingPeriod::parse_or_monthly("year"), BillingPeriod::Annual);
    }
}
