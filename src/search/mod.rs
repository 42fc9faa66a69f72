// src/search/mod.rs
//! Metered literature search: fan out to bibliographic sources, merge and
//! deduplicate their results, then tag each paper with property categories.

pub mod categorize;
pub mod crossref;
pub mod openalex;

use crate::config::Config;
use async_trait::async_trait;
use categorize::PropertyCategory;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct Paper {
    pub title: String,
    pub doi: Option<String>,
    pub year: Option<i32>,
    pub authors: Vec<String>,
    pub venue: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub url: Option<String>,
    pub sources: Vec<String>,
    pub categories: Vec<PropertyCategory>,
}

#[async_trait]
pub trait SearchSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Paper>, SourceError>;
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct SearchOutcome {
    pub papers: Vec<Paper>,
    /// Sources that failed and contributed nothing.
    pub failed_sources: Vec<String>,
    #[serde(skip)]
    pub queried_sources: usize,
}

impl SearchOutcome {
    /// True when there were sources to ask and every one of them failed.
    pub fn all_failed(&self) -> bool {
        self.queried_sources > 0 && self.failed_sources.len() >= self.queried_sources
    }
}

#[derive(Clone)]
pub struct SearchService {
    sources: Vec<Arc<dyn SearchSource>>,
}

impl SearchService {
    pub fn new(sources: Vec<Arc<dyn SearchSource>>) -> Self {
        SearchService { sources }
    }

    pub fn from_config(config: &Config) -> Self {
        let http = reqwest::Client::new();
        SearchService::new(vec![
            Arc::new(crossref::Crossref::new(http.clone(), config)) as Arc<dyn SearchSource>,
            Arc::new(openalex::OpenAlex::new(http, config)),
        ])
    }

    /// Queries every source concurrently. A source that fails is logged and
    /// skipped, so total failure still yields an empty outcome.
    pub async fn search(&self, query: &str, limit: usize) -> SearchOutcome {
        let mut tasks = JoinSet::new();
        for (order, source) in self.sources.iter().enumerate() {
            let source = source.clone();
            let query = query.to_string();
            tasks.spawn(async move {
                let result = source.search(&query, limit).await;
                (order, source.name(), result)
            });
        }

        let mut batches = Vec::with_capacity(self.sources.len());
        let mut failed_sources = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((order, _, Ok(papers))) => batches.push((order, papers)),
                Ok((_, name, Err(e))) => {
                    tracing::warn!("Search source {} failed: {}", name, e);
                    failed_sources.push(name.to_string());
                }
                Err(e) => tracing::error!("Search task panicked: {}", e),
            }
        }
        // Merge in source order so results do not depend on which finished first.
        batches.sort_by_key(|(order, _)| *order);
        failed_sources.sort();

        let mut papers = merge_results(batches.into_iter().flat_map(|(_, papers)| papers));
        for paper in &mut papers {
            paper.categories = categorize::categorize(paper);
        }
        papers.truncate(limit);

        SearchOutcome {
            papers,
            failed_sources,
            queried_sources: self.sources.len(),
        }
    }
}

pub fn normalize_doi(doi: &str) -> Option<String> {
    let lower = doi.trim().to_ascii_lowercase();
    let bare = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "doi:"]
        .iter()
        .find_map(|prefix| lower.strip_prefix(prefix))
        .unwrap_or(&lower)
        .trim();
    (!bare.is_empty()).then(|| bare.to_string())
}

fn normalize_title(title: &str) -> String {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn dedup_key(paper: &Paper) -> Option<String> {
    if let Some(doi) = paper.doi.as_deref().and_then(normalize_doi) {
        return Some(format!("doi:{}", doi));
    }
    let title = normalize_title(&paper.title);
    (!title.is_empty()).then(|| format!("title:{}", title))
}

/// Collapses duplicates by DOI, falling back to title. The first record
/// seen wins; later duplicates only fill fields it lacks.
pub fn merge_results(papers: impl IntoIterator<Item = Paper>) -> Vec<Paper> {
    let mut merged: Vec<Paper> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for paper in papers {
        let Some(key) = dedup_key(&paper) else {
            continue;
        };
        // A DOI-less copy can still match a record we keyed by DOI.
        let title = normalize_title(&paper.title);
        let title_key = (!title.is_empty()).then(|| format!("title:{}", title));
        let found = index
            .get(&key)
            .or_else(|| title_key.as_ref().and_then(|k| index.get(k)))
            .copied();
        match found {
            Some(i) => {
                let existing = &mut merged[i];
                fill_gaps(existing, paper);
                if let Some(k) = dedup_key(existing) {
                    index.insert(k, i);
                }
            }
            None => {
                index.insert(key, merged.len());
                if let Some(title_key) = title_key {
                    index.insert(title_key, merged.len());
                }
                merged.push(paper);
            }
        }
    }
    merged
}

fn fill_gaps(existing: &mut Paper, other: Paper) {
    if existing.doi.is_none() {
        existing.doi = other.doi;
    }
    if existing.year.is_none() {
        existing.year = other.year;
    }
    if existing.authors.is_empty() {
        existing.authors = other.authors;
    }
    if existing.venue.is_none() {
        existing.venue = other.venue;
    }
    if existing.abstract_text.is_none() {
        existing.abstract_text = other.abstract_text;
    }
    if existing.url.is_none() {
        existing.url = other.url;
    }
    for source in other.sources {
        if !existing.sources.contains(&source) {
            existing.sources.push(source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(title: &str, doi: Option<&str>, source: &str) -> Paper {
        Paper {
            title: title.to_string(),
            doi: doi.map(str::to_string),
            sources: vec![source.to_string()],
            ..Paper::default()
        }
    }

    #[test]
    fn doi_normalization_strips_resolver_prefixes() {
        assert_eq!(
            normalize_doi("https://doi.org/10.1000/ABC"),
            Some("10.1000/abc".to_string())
        );
        assert_eq!(normalize_doi("10.1000/abc"), Some("10.1000/abc".to_string()));
        assert_eq!(normalize_doi("  "), None);
    }

    #[test]
    fn duplicates_by_doi_are_merged_and_sources_unioned() {
        let mut later = paper(
            "Graphene thermal conductivity",
            Some("https://doi.org/10.1/x"),
            "openalex",
        );
        later.year = Some(2019);
        let merged = merge_results(vec![
            paper("Graphene Thermal Conductivity", Some("10.1/X"), "crossref"),
            later,
        ]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "Graphene Thermal Conductivity");
        assert_eq!(merged[0].year, Some(2019));
        assert_eq!(merged[0].sources, vec!["crossref", "openalex"]);
    }

    #[test]
    fn doi_less_copy_matches_by_title() {
        let merged = merge_results(vec![
            paper("Perovskite band-gap tuning", Some("10.2/y"), "crossref"),
            paper("Perovskite Band Gap Tuning", None, "openalex"),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].sources.len(), 2);
    }

    #[test]
    fn distinct_papers_keep_first_seen_order() {
        let merged = merge_results(vec![
            paper("B", None, "crossref"),
            paper("A", None, "crossref"),
            paper("", None, "crossref"),
        ]);
        let titles: Vec<&str> = merged.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "A"]);
    }

    struct FixedSource(&'static str, Vec<Paper>);

    #[async_trait]
    impl SearchSource for FixedSource {
        fn name(&self) -> &'static str {
            self.0
        }
        async fn search(&self, _: &str, _: usize) -> Result<Vec<Paper>, SourceError> {
            Ok(self.1.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl SearchSource for FailingSource {
        fn name(&self) -> &'static str {
            "broken"
        }
        async fn search(&self, _: &str, _: usize) -> Result<Vec<Paper>, SourceError> {
            Err(SourceError::Status(503))
        }
    }

    #[tokio::test]
    async fn failing_sources_degrade_to_partial_results() {
        let service = SearchService::new(vec![
            Arc::new(FailingSource) as Arc<dyn SearchSource>,
            Arc::new(FixedSource(
                "fixed",
                vec![paper("Tensile strength of steel alloys", None, "fixed")],
            )),
        ]);

        let outcome = service.search("steel", 10).await;
        assert_eq!(outcome.papers.len(), 1);
        assert_eq!(outcome.failed_sources, vec!["broken"]);
        assert!(!outcome.all_failed());
        assert_eq!(
            outcome.papers[0].categories,
            vec![PropertyCategory::Mechanical]
        );
    }

    #[tokio::test]
    async fn total_failure_is_an_empty_outcome() {
        let sources: Vec<Arc<dyn SearchSource>> = vec![Arc::new(FailingSource)];
        let service = SearchService::new(sources);
        let outcome = service.search("anything", 10).await;
        assert!(outcome.papers.is_empty());
        assert!(outcome.all_failed());
    }

    #[tokio::test]
    async fn no_sources_is_not_a_failure() {
        let outcome = SearchService::new(Vec::new()).search("anything", 10).await;
        assert!(!outcome.all_failed());
    }

    #[tokio::test]
    async fn results_are_truncated_to_limit() {
        let papers = (0..8).map(|i| paper(&format!("Paper {}", i), None, "fixed")).collect();
        let sources: Vec<Arc<dyn SearchSource>> = vec![Arc::new(FixedSource("fixed", papers))];
        let service = SearchService::new(sources);
        assert_eq!(service.search("q", 3).await.papers.len(), 3);
    }
}
