use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::completion::{CompletionClient, DEFAULT_GROQ_BASE_URL, DEFAULT_GROQ_MODEL};
use crate::lookup::DEFAULT_ENCOUNTER_CAP;
use crate::relay::ChatRelay;
use crate::search::SearchClient;

#[derive(Parser, Debug)]
#[command(name = "care-compare")]
#[command(about = "Healthcare price comparison backend (lookup + chat relay)", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the HTTP API.
    Serve(ServeArgs),
    /// Run one procedure/insurance lookup and print the offers as JSON.
    Lookup(LookupArgs),
    /// Interactive chat with the relay on stdin/stdout.
    Chat(ChatArgs),
}

/// Where procedure, payer, encounter and organization rows come from.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// Supabase project URL.
    #[arg(long, env = "NEXT_PUBLIC_SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Supabase API key (anon or service role).
    #[arg(long, env = "NEXT_PUBLIC_SUPABASE_ANON_KEY", hide_env_values = true)]
    pub supabase_key: Option<String>,

    /// Use a local DuckDB database instead of Supabase (takes precedence).
    #[arg(long, env = "CARE_DUCKDB_PATH")]
    pub duckdb_path: Option<String>,

    /// Directory with payers/procedures/encounters/organizations .csv or
    /// .parquet files to expose as DuckDB views (e.g. a Synthea export).
    #[arg(long, requires = "duckdb_path")]
    pub source_dir: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RelayArgs {
    /// Base URL of the procedure search service.
    #[arg(long, env = "NEXT_PUBLIC_BACKEND_URL", default_value = "http://127.0.0.1:8000")]
    pub backend_url: String,

    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true, default_value = "")]
    pub groq_api_key: String,

    #[arg(long, env = "GROQ_BASE_URL", default_value = DEFAULT_GROQ_BASE_URL)]
    pub groq_base_url: String,

    #[arg(long, env = "GROQ_MODEL", default_value = DEFAULT_GROQ_MODEL)]
    pub groq_model: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct HttpArgs {
    /// Timeout applied to every outbound HTTP request.
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub relay: RelayArgs,

    #[command(flatten)]
    pub http: HttpArgs,

    /// Maximum distinct encounters considered per lookup.
    #[arg(long, env = "ENCOUNTER_CAP", default_value_t = DEFAULT_ENCOUNTER_CAP, value_parser = parse_positive)]
    pub encounter_cap: usize,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8787)]
    pub port: u16,
}

#[derive(clap::Args, Debug, Clone)]
pub struct LookupArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub http: HttpArgs,

    /// Procedure description (ILIKE pattern; % and _ are wildcards).
    #[arg(long)]
    pub procedure: String,

    /// Insurance plan name, matched exactly.
    #[arg(long)]
    pub payer: String,

    #[arg(long, env = "ENCOUNTER_CAP", default_value_t = DEFAULT_ENCOUNTER_CAP, value_parser = parse_positive)]
    pub encounter_cap: usize,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ChatArgs {
    #[command(flatten)]
    pub relay: RelayArgs,

    #[command(flatten)]
    pub http: HttpArgs,
}

impl HttpArgs {
    pub fn client(&self) -> anyhow::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.http_timeout_secs))
            .build()
            .context("build http client")
    }
}

impl RelayArgs {
    pub fn relay(&self, http: reqwest::Client) -> ChatRelay {
        if self.groq_api_key.is_empty() {
            tracing::warn!("GROQ_API_KEY is not set; completion requests will be rejected");
        }
        ChatRelay::new(
            SearchClient::new(http.clone(), &self.backend_url),
            CompletionClient::new(
                http,
                &self.groq_base_url,
                &self.groq_api_key,
                &self.groq_model,
            ),
        )
    }
}

fn parse_positive(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}
