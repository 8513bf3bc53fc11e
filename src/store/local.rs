use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use duckdb::{Connection, Row, params_from_iter};
use tokio::sync::Mutex;

use super::DataStore;
use crate::model::{Encounter, Organization, Payer, Procedure};
use crate::storage::{SourceFormat, source_files};

/// Data store backed by a DuckDB database holding the four tables (or views
/// over exported table files).
pub struct DuckDbStore {
    db: Mutex<Connection>,
}

impl DuckDbStore {
    pub fn open(path: &str, source_dir: Option<&str>) -> anyhow::Result<Self> {
        let mut conn = Connection::open(path).with_context(|| format!("open duckdb at {path}"))?;
        if let Some(dir) = source_dir {
            create_or_replace_views(&mut conn, Path::new(dir)).context("create source views")?;
        }
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }
}

/// Exposes `<table>.csv` / `<table>.parquet` files under `dir` as views named
/// after the tables, e.g. a Synthea CSV export.
pub fn create_or_replace_views(conn: &mut Connection, dir: &Path) -> anyhow::Result<()> {
    for file in source_files(dir)? {
        let path = sql_quote_path(&file.path);
        let reader = match file.format {
            SourceFormat::Csv => format!("read_csv_auto('{path}', header = true)"),
            SourceFormat::Parquet => format!("read_parquet('{path}')"),
        };
        conn.execute(
            &format!("CREATE OR REPLACE VIEW {} AS SELECT * FROM {reader}", file.table),
            [],
        )
        .with_context(|| format!("create view {}", file.table))?;
        tracing::debug!("View {} -> {}", file.table, file.path.display());
    }
    Ok(())
}

fn sql_quote_path(path: &Path) -> String {
    path.display().to_string().replace('\'', "''")
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

fn query_rows<T, F>(db: &Connection, sql: &str, params: &[&str], f: F) -> anyhow::Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> duckdb::Result<T>,
{
    let mut stmt = db.prepare(sql).with_context(|| format!("prepare: {sql}"))?;
    let rows = stmt.query_map(params_from_iter(params.iter()), f)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

#[async_trait]
impl DataStore for DuckDbStore {
    async fn procedures_matching(&self, pattern: &str) -> anyhow::Result<Vec<Procedure>> {
        let db = self.db.lock().await;
        query_rows(
            &db,
            r#"
            SELECT CAST(encounter AS VARCHAR), CAST(description AS VARCHAR)
            FROM procedures
            WHERE description ILIKE ?
            "#,
            &[pattern],
            |row| {
                Ok(Procedure {
                    encounter: row.get(0)?,
                    description: row.get(1)?,
                })
            },
        )
        .context("query procedures")
    }

    async fn payers_named(&self, name: &str) -> anyhow::Result<Vec<Payer>> {
        let db = self.db.lock().await;
        query_rows(
            &db,
            "SELECT CAST(id AS VARCHAR), CAST(name AS VARCHAR) FROM payers WHERE name = ?",
            &[name],
            |row| {
                Ok(Payer {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .context("query payers")
    }

    async fn encounters_for_payer(
        &self,
        ids: &[String],
        payer_id: &str,
    ) -> anyhow::Result<Vec<Encounter>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"
            SELECT
              CAST(id AS VARCHAR),
              CAST(organization AS VARCHAR),
              CAST(payer AS VARCHAR),
              CAST(base_encounter_cost AS DOUBLE),
              CAST(total_claim_cost AS DOUBLE),
              CAST(payer_coverage AS DOUBLE)
            FROM encounters
            WHERE CAST(id AS VARCHAR) IN ({})
              AND CAST(payer AS VARCHAR) = ?
            ORDER BY base_encounter_cost ASC, CAST(id AS VARCHAR) ASC
            "#,
            placeholders(ids.len())
        );
        let mut params: Vec<&str> = ids.iter().map(String::as_str).collect();
        params.push(payer_id);

        let db = self.db.lock().await;
        query_rows(&db, &sql, &params, |row| {
            Ok(Encounter {
                id: row.get(0)?,
                organization: row.get(1)?,
                payer: row.get(2)?,
                base_encounter_cost: row.get(3)?,
                total_claim_cost: row.get(4)?,
                payer_coverage: row.get(5)?,
            })
        })
        .context("query encounters")
    }

    async fn organizations_by_id(&self, ids: &[String]) -> anyhow::Result<Vec<Organization>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"
            SELECT
              CAST(id AS VARCHAR),
              CAST(name AS VARCHAR),
              CAST(address AS VARCHAR),
              CAST(city AS VARCHAR),
              CAST(state AS VARCHAR),
              CAST(zip AS VARCHAR),
              CAST(phone AS VARCHAR)
            FROM organizations
            WHERE CAST(id AS VARCHAR) IN ({})
            "#,
            placeholders(ids.len())
        );
        let params: Vec<&str> = ids.iter().map(String::as_str).collect();

        let db = self.db.lock().await;
        query_rows(&db, &sql, &params, |row| {
            Ok(Organization {
                id: row.get(0)?,
                name: row.get(1)?,
                address: row.get(2)?,
                city: row.get(3)?,
                state: row.get(4)?,
                zip: row.get(5)?,
                phone: row.get(6)?,
            })
        })
        .context("query organizations")
    }

    async fn payer_names(&self) -> anyhow::Result<Vec<String>> {
        let db = self.db.lock().await;
        query_rows(&db, "SELECT CAST(name AS VARCHAR) FROM payers", &[], |row| {
            row.get(0)
        })
        .context("query payer names")
    }

    async fn procedure_descriptions(&self) -> anyhow::Result<Vec<String>> {
        let db = self.db.lock().await;
        query_rows(
            &db,
            "SELECT CAST(description AS VARCHAR) FROM procedures WHERE description IS NOT NULL",
            &[],
            |row| row.get(0),
        )
        .context("query procedure descriptions")
    }
}
