// src/search/crossref.rs
use super::{Paper, SearchSource, SourceError};
use crate::config::Config;
use async_trait::async_trait;
use serde::Deserialize;

pub struct Crossref {
    http: reqwest::Client,
    api_url: String,
    mailto: Option<String>,
}

impl Crossref {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Crossref {
            http,
            api_url: config.crossref_api_url.trim_end_matches('/').to_string(),
            mailto: config.contact_email.clone(),
        }
    }
}

#[derive(Deserialize)]
struct Response {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    items: Vec<Work>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Work {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(default)]
    title: Vec<String>,
    #[serde(default)]
    author: Vec<Author>,
    issued: Option<DateParts>,
    #[serde(default)]
    container_title: Vec<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
}

#[derive(Deserialize)]
struct Author {
    given: Option<String>,
    family: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DateParts {
    #[serde(default)]
    date_parts: Vec<Vec<Option<i32>>>,
}

/// Crossref abstracts arrive as JATS XML; keep only the text.
fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl From<Work> for Paper {
    fn from(work: Work) -> Self {
        let authors = work
            .author
            .into_iter()
            .filter_map(|a| match (a.given, a.family, a.name) {
                (Some(given), Some(family), _) => Some(format!("{} {}", given, family)),
                (None, Some(family), _) => Some(family),
                (_, None, name) => name,
            })
            .collect();
        let year = work
            .issued
            .and_then(|d| d.date_parts.into_iter().next())
            .and_then(|parts| parts.into_iter().next().flatten());

        Paper {
            title: work.title.into_iter().next().unwrap_or_default(),
            doi: work.doi,
            year,
            authors,
            venue: work.container_title.into_iter().next(),
            abstract_text: work.abstract_text.as_deref().map(strip_markup),
            url: work.url,
            sources: vec!["crossref".to_string()],
            categories: Vec::new(),
        }
    }
}

#[async_trait]
impl SearchSource for Crossref {
    fn name(&self) -> &'static str {
        "crossref"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Paper>, SourceError> {
        let rows = limit.to_string();
        let mut params = vec![("query", query), ("rows", rows.as_str())];
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
        Ok(body.message.items.into_iter().map(Paper::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_payload_maps_to_paper() {
        let payload = r#"{"message": {"items": [{
            "DOI": "10.1016/j.actamat.2020.01.001",
            "title": ["High-entropy alloy creep"],
            "author": [{"given": "Ada", "family": "Lovelace"}, {"name": "Materials Consortium"}],
            "issued": {"date-parts": [[2020, 3]]},
            "container-title": ["Acta Materialia"],
            "abstract": "<jats:p>Creep at <jats:italic>high</jats:italic> temperature.</jats:p>",
            "URL": "http://dx.doi.org/10.1016/j.actamat.2020.01.001"
        }]}}"#;

        let response: Response = serde_json::from_str(payload).unwrap();
        let paper = Paper::from(response.message.items.into_iter().next().unwrap());

        assert_eq!(paper.title, "High-entropy alloy creep");
        assert_eq!(paper.year, Some(2020));
        assert_eq!(paper.authors, vec!["Ada Lovelace", "Materials Consortium"]);
        assert_eq!(paper.venue.as_deref(), Some("Acta Materialia"));
        assert_eq!(
            paper.abstract_text.as_deref(),
            Some("Creep at high temperature.")
        );
    }

    #[test]
    fn sparse_work_still_maps() {
        let work: Work = serde_json::from_str(r#"{"title": []}"#).unwrap();
        let paper = Paper::from(work);
        assert_eq!(paper.title, "");
        assert!(paper.doi.is_none());
        assert!(paper.year.is_none());
    }
}
