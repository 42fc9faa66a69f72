// src/search/openalex.rs
use super::{Paper, SearchSource, SourceError};
use crate::config::Config;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

pub struct OpenAlex {
    http: reqwest::Client,
    api_url: String,
    mailto: Option<String>,
}

impl OpenAlex {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        OpenAlex {
            http,
            api_url: config.openalex_api_url.trim_end_matches('/').to_string(),
            mailto: config.contact_email.clone(),
        }
    }
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    results: Vec<Work>,
}

#[derive(Deserialize)]
struct Work {
    id: Option<String>,
    doi: Option<String>,
    title: Option<String>,
    display_name: Option<String>,
    publication_year: Option<i32>,
    #[serde(default)]
    authorships: Vec<Authorship>,
    primary_location: Option<Location>,
    abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
}

#[derive(Deserialize)]
struct Authorship {
    author: AuthorRef,
}

#[derive(Deserialize)]
struct AuthorRef {
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct Location {
    source: Option<SourceRef>,
    landing_page_url: Option<String>,
}

#[derive(Deserialize)]
struct SourceRef {
    display_name: Option<String>,
}

/// OpenAlex ships abstracts as word -> positions; lay the words back out.
fn rebuild_abstract(index: &HashMap<String, Vec<usize>>) -> Option<String> {
    let mut positioned: Vec<(usize, &str)> = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |p| (*p, word.as_str())))
        .collect();
    if positioned.is_empty() {
        return None;
    }
    positioned.sort_by_key(|(p, _)| *p);
    Some(
        positioned
            .into_iter()
            .map(|(_, word)| word)
            .collect::<Vec<_>>()
            .join(" "),
    )
}

impl From<Work> for Paper {
    fn from(work: Work) -> Self {
        let (venue, landing_page) = match work.primary_location {
            Some(location) => (
                location.source.and_then(|s| s.display_name),
                location.landing_page_url,
            ),
            None => (None, None),
        };

        Paper {
            title: work.title.or(work.display_name).unwrap_or_default(),
            doi: work.doi,
            year: work.publication_year,
            authors: work
                .authorships
                .into_iter()
                .filter_map(|a| a.author.display_name)
                .collect(),
            venue,
            abstract_text: work.abstract_inverted_index.as_ref().and_then(rebuild_abstract),
            url: landing_page.or(work.id),
            sources: vec!["openalex".to_string()],
            categories: Vec::new(),
        }
    }
}

#[async_trait]
impl SearchSource for OpenAlex {
    fn name(&self) -> &'static str {
        "openalex"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Paper>, SourceError> {
        // OpenAlex caps a page at 200 results.
        let per_page = limit.clamp(1, 200).to_string();
        let mut params = vec![("search", query), ("per-page", per_page.as_str())];
        if let Some(mailto) = &self.mailto {
            params.push(("mailto", mailto.as_str()));
        }

        let response = self
            .http
            .get(format!("{}/works", self.api_url))
            .query(&params)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SourceError::Status(response.status().as_u16()));
        }
        let body: Response = response.json().await?;
        Ok(body.results.into_iter().map(Paper::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_abstract_is_rebuilt_in_order() {
        let mut index = HashMap::new();
        index.insert("strength".to_string(), vec![2]);
        index.insert("High".to_string(), vec![0]);
        index.insert("tensile".to_string(), vec![1]);
        index.insert("alloys".to_string(), vec![4]);
        index.insert("in".to_string(), vec![3]);

        assert_eq!(
            rebuild_abstract(&index).as_deref(),
            Some("High tensile strength in alloys")
        );
        assert_eq!(rebuild_abstract(&HashMap::new()), None);
    }

    #[test]
    fn work_payload_maps_to_paper() {
        let payload = r#"{"results": [{
            "id": "https://openalex.org/W123",
            "doi": "https://doi.org/10.1038/nmat1849",
            "title": "The rise of graphene",
            "publication_year": 2007,
            "authorships": [{"author": {"display_name": "A. K. Geim"}}],
            "primary_location": {"source": {"display_name": "Nature Materials"}},
            "abstract_inverted_index": {"Graphene": [0], "is": [1], "thin": [2]}
        }]}"#;

        let response: Response = serde_json::from_str(payload).unwrap();
        let paper = Paper::from(response.results.into_iter().next().unwrap());

        assert_eq!(paper.title, "The rise of graphene");
        assert_eq!(paper.year, Some(2007));
        assert_eq!(paper.authors, vec!["A. K. Geim"]);
        assert_eq!(paper.venue.as_deref(), Some("Nature Materials"));
        assert_eq!(paper.abstract_text.as_deref(), Some("Graphene is thin"));
        assert_eq!(paper.url.as_deref(), Some("https://openalex.org/W123"));
    }
}
