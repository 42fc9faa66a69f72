// src/config.rs
use crate::tier::Tier;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Postgres connection string. Without it the service keeps usage in memory.
    #[serde(default)]
    pub database_url: Option<String>,
    pub jwt_secret: String,
    #[serde(default)]
    pub stripe_secret_key: Option<String>,
    #[serde(default = "default_stripe_api_url")]
    pub stripe_api_url: String,
    #[serde(default)]
    pub stripe_product_researcher_lite: Option<String>,
    #[serde(default)]
    pub stripe_product_researcher_premium: Option<String>,
    #[serde(default)]
    pub stripe_product_industry_lite: Option<String>,
    #[serde(default)]
    pub stripe_product_industry_premium: Option<String>,
    #[serde(default = "default_billing_cache_ttl_secs")]
    pub billing_cache_ttl_secs: u64,
    #[serde(default = "default_search_result_limit")]
    pub search_result_limit: usize,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_crossref_api_url")]
    pub crossref_api_url: String,
    #[serde(default = "default_openalex_api_url")]
    pub openalex_api_url: String,
    #[serde(default)]
    pub contact_email: Option<String>,
}

fn default_stripe_api_url() -> String {
    "https://api.stripe.com/v1".to_string()
}

fn default_billing_cache_ttl_secs() -> u64 {
    60
}

fn default_search_result_limit() -> usize {
    20
}

fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_crossref_api_url() -> String {
    "https://api.crossref.org".to_string()
}

fn default_openalex_api_url() -> String {
    "https://api.openalex.org".to_string()
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// Minimal configuration: no database, no payment provider.
    pub fn with_secret(jwt_secret: &str) -> Self {
        Config {
            database_url: None,
            jwt_secret: jwt_secret.to_string(),
            stripe_secret_key: None,
            stripe_api_url: default_stripe_api_url(),
            stripe_product_researcher_lite: None,
            stripe_product_researcher_premium: None,
            stripe_product_industry_lite: None,
            stripe_product_industry_premium: None,
            billing_cache_ttl_secs: default_billing_cache_ttl_secs(),
            search_result_limit: default_search_result_limit(),
            bind_address: default_bind_address(),
            crossref_api_url: default_crossref_api_url(),
            openalex_api_url: default_openalex_api_url(),
            contact_email: None,
        }
    }

    /// Configured payment-provider product ids and the tier each one sells.
    pub fn product_tiers(&self) -> Vec<(String, Tier)> {
        [
            (&self.stripe_product_researcher_lite, Tier::ResearcherLite),
            (&self.stripe_product_researcher_premium, Tier::ResearcherPremium),
            (&self.stripe_product_industry_lite, Tier::IndustryLite),
            (&self.stripe_product_industry_premium, Tier::IndustryPremium),
        ]
        .into_iter()
        .filter_map(|(product, tier)| product.clone().map(|p| (p, tier)))
        .collect()
    }
}
