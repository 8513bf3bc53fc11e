use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Payer {
    pub id: String,
    pub name: String,
}

/// A procedure row. Many procedures may point at the same encounter.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Procedure {
    pub encounter: Option<String>,
    pub description: String,
}

/// One organization visit billed to one payer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Encounter {
    pub id: String,
    pub organization: Option<String>,
    pub payer: String,
    pub base_encounter_cost: f64,
    pub total_claim_cost: f64,
    pub payer_coverage: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Organization {
    pub id: String,
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub zip: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub phone: Option<String>,
}

/// Columns like `zip` are often imported as integers.
fn text_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Rendering-ready join of an encounter's costs, its organization's contact
/// details and the queried payer name. Contact fields are never empty; the
/// lookup substitutes placeholders instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderOffer {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub total_claim_cost: f64,
    pub payer_coverage: f64,
    pub out_of_pocket: f64,
    pub address: String,
    pub contact_number: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub payer: String,
}

/// Relevance score as the search service sent it. The service documents a
/// string, but some deployments emit a bare number; either is passed back
/// to callers untouched.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Score {
    Text(String),
    Number(serde_json::Number),
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Text(s) => f.write_str(s),
            Score::Number(n) => write!(f, "{n}"),
        }
    }
}

/// One search hit. Fields beyond `id`/`score`/`text` (such as `category`)
/// are kept verbatim in `extra` so results go back out exactly as received.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub score: Score,
    pub text: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SearchResult {
    pub fn category(&self) -> Option<&str> {
        self.extra.get("category").and_then(|v| v.as_str())
    }
}
