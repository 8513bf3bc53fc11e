use anyhow::Context;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::model::SearchResult;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search API error ({status}): {body}")]
    Status { status: StatusCode, body: String },
    #[error("Search API unreachable: {0:#}")]
    Transport(anyhow::Error),
}

/// Client for the procedure search service (`POST {base}/search`).
#[derive(Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    base_url: String,
}

impl SearchClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let url = format!("{}/search", self.base_url);
        tracing::info!("Executing search with query: {}", query);

        let resp = self
            .http
            .post(&url)
            .json(&SearchRequest { query })
            .send()
            .await
            .with_context(|| format!("POST {url}"))
            .map_err(SearchError::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Status { status, body });
        }

        let parsed: SearchResponse = resp
            .json()
            .await
            .context("decode search response")
            .map_err(SearchError::Transport)?;
        tracing::debug!("Search returned {} results", parsed.results.len());
        Ok(parsed.results)
    }
}
