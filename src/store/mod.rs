pub mod local;
pub mod supabase;

use std::sync::Arc;

use anyhow::{Context, anyhow};
use async_trait::async_trait;

use crate::cli::StoreArgs;
use crate::model::{Encounter, Organization, Payer, Procedure};

pub use local::DuckDbStore;
pub use supabase::SupabaseStore;

/// Read-only access to the `payers`, `procedures`, `encounters` and
/// `organizations` tables.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Procedures whose description matches `pattern` with ILIKE semantics.
    /// The pattern is passed through as-is, so `%` and `_` act as wildcards.
    async fn procedures_matching(&self, pattern: &str) -> anyhow::Result<Vec<Procedure>>;

    /// Every payer whose name equals `name` exactly.
    async fn payers_named(&self, name: &str) -> anyhow::Result<Vec<Payer>>;

    /// Encounters with an id in `ids` billed to `payer_id`, ordered ascending
    /// by `base_encounter_cost`.
    async fn encounters_for_payer(
        &self,
        ids: &[String],
        payer_id: &str,
    ) -> anyhow::Result<Vec<Encounter>>;

    async fn organizations_by_id(&self, ids: &[String]) -> anyhow::Result<Vec<Organization>>;

    async fn payer_names(&self) -> anyhow::Result<Vec<String>>;

    /// Every procedure description, duplicates included.
    async fn procedure_descriptions(&self) -> anyhow::Result<Vec<String>>;
}

pub fn open(args: &StoreArgs, http: reqwest::Client) -> anyhow::Result<Arc<dyn DataStore>> {
    if let Some(path) = args.duckdb_path.as_deref() {
        let store = DuckDbStore::open(path, args.source_dir.as_deref())
            .with_context(|| format!("open duckdb store at {path}"))?;
        tracing::info!("Using DuckDB data store at {}", path);
        return Ok(Arc::new(store));
    }

    let (Some(url), Some(key)) = (args.supabase_url.as_deref(), args.supabase_key.as_deref())
    else {
        return Err(anyhow!(
            "No data store configured: pass --duckdb-path, or both --supabase-url and --supabase-key"
        ));
    };
    tracing::info!("Using Supabase data store at {}", url);
    Ok(Arc::new(SupabaseStore::new(http, url, key)))
}
