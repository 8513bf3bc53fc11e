//! Chat relay: search service hits stitched into an LLM prompt.

use serde::{Deserialize, Serialize};

use crate::completion::{CompletionClient, CompletionMessage};
use crate::model::SearchResult;
use crate::search::{SearchClient, SearchError};

pub const SYSTEM_PROMPT: &str = "You are a Healthcare Price Transparency Assistant for California hospitals. Your task is to:
1. Analyze the provided procedure descriptions
2. Explain the matches in simple terms
3. Highlight the most relevant procedures
Make your responses concise and easy to understand.";

pub const NO_RESPONSE: &str = "No response generated";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub message: String,
    pub search_results: Vec<SearchResult>,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error("Completion failed: {0:#}")]
    Completion(anyhow::Error),
}

impl RelayError {
    /// Text for the `{error}` envelope returned to chat clients.
    pub fn client_message(&self) -> String {
        match self {
            RelayError::InvalidRequest(_) => "Failed to process chat request".to_string(),
            other => format!("Failed to fetch search results: {other}"),
        }
    }
}

pub struct ChatRelay {
    search: SearchClient,
    completion: CompletionClient,
}

impl ChatRelay {
    pub fn new(search: SearchClient, completion: CompletionClient) -> Self {
        Self { search, completion }
    }

    pub async fn relay(&self, history: &[ChatTurn]) -> Result<RelayResponse, RelayError> {
        let query = history
            .last()
            .map(|t| t.content.as_str())
            .ok_or_else(|| RelayError::InvalidRequest("conversation is empty".to_string()))?;

        let results = self.search.search(query).await?;

        let messages = [
            CompletionMessage::system(SYSTEM_PROMPT),
            CompletionMessage::user(user_prompt(query, &results)),
        ];
        let message = self
            .completion
            .complete(&messages)
            .await
            .map_err(RelayError::Completion)?
            .unwrap_or_else(|| NO_RESPONSE.to_string());

        Ok(RelayResponse {
            message,
            search_results: results,
        })
    }
}

/// One `text (Score: s)` line per hit, in the order the search service
/// returned them.
pub fn search_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|hit| format!("{} (Score: {})", hit.text, hit.score))
        .collect::<Vec<_>>()
        .join("\n")
}

fn user_prompt(query: &str, results: &[SearchResult]) -> String {
    format!(
        "Query: {query}\n\nRelevant procedures found:\n{}",
        search_context(results)
    )
}
