use anyhow::{Context, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::DataStore;
use crate::model::{Encounter, Organization, Payer, Procedure};

/// Data store speaking PostgREST to a Supabase project.
pub struct SupabaseStore {
    http: reqwest::Client,
    rest_url: String,
    key: String,
}

#[derive(Debug, Deserialize)]
struct NameRow {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DescriptionRow {
    description: Option<String>,
}

impl SupabaseStore {
    pub fn new(http: reqwest::Client, project_url: &str, key: &str) -> Self {
        Self {
            http,
            rest_url: format!("{}/rest/v1", project_url.trim_end_matches('/')),
            key: key.to_string(),
        }
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> anyhow::Result<Vec<T>> {
        let url = format!("{}/{table}", self.rest_url);
        let resp = self
            .http
            .get(&url)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("{table} query failed ({status}): {body}"));
        }
        resp.json::<Vec<T>>()
            .await
            .with_context(|| format!("decode {table} rows"))
    }
}

/// PostgREST `in.(...)` operand with every value double-quoted so commas
/// and parentheses inside ids survive.
pub fn in_list(values: &[String]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

#[async_trait]
impl DataStore for SupabaseStore {
    async fn procedures_matching(&self, pattern: &str) -> anyhow::Result<Vec<Procedure>> {
        self.select(
            "procedures",
            &[
                ("select", "encounter,description".to_string()),
                ("description", format!("ilike.{pattern}")),
            ],
        )
        .await
    }

    async fn payers_named(&self, name: &str) -> anyhow::Result<Vec<Payer>> {
        self.select(
            "payers",
            &[
                ("select", "id,name".to_string()),
                ("name", format!("eq.{name}")),
            ],
        )
        .await
    }

    async fn encounters_for_payer(
        &self,
        ids: &[String],
        payer_id: &str,
    ) -> anyhow::Result<Vec<Encounter>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(
            "encounters",
            &[
                (
                    "select",
                    "id,organization,payer,base_encounter_cost,total_claim_cost,payer_coverage"
                        .to_string(),
                ),
                ("id", in_list(ids)),
                ("payer", format!("eq.{payer_id}")),
                ("order", "base_encounter_cost.asc,id.asc".to_string()),
            ],
        )
        .await
    }

    async fn organizations_by_id(&self, ids: &[String]) -> anyhow::Result<Vec<Organization>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(
            "organizations",
            &[
                ("select", "id,name,address,city,state,zip,phone".to_string()),
                ("id", in_list(ids)),
            ],
        )
        .await
    }

    async fn payer_names(&self) -> anyhow::Result<Vec<String>> {
        let rows: Vec<NameRow> = self
            .select("payers", &[("select", "name".to_string())])
            .await?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }

    async fn procedure_descriptions(&self) -> anyhow::Result<Vec<String>> {
        let rows: Vec<DescriptionRow> = self
            .select("procedures", &[("select", "description".to_string())])
            .await?;
        Ok(rows.into_iter().filter_map(|r| r.description).collect())
    }
}
