use std::path::{Path, PathBuf};

use anyhow::anyhow;

pub const TABLES: [&str; 4] = ["payers", "procedures", "encounters", "organizations"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Parquet,
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub table: &'static str,
    pub path: PathBuf,
    pub format: SourceFormat,
}

/// Locates one exported file per table under `source_dir`, preferring
/// `<table>.parquet` over `<table>.csv` when both exist.
pub fn source_files(source_dir: &Path) -> anyhow::Result<Vec<SourceFile>> {
    let mut out = Vec::with_capacity(TABLES.len());
    for table in TABLES {
        let parquet = source_dir.join(format!("{table}.parquet"));
        let csv = source_dir.join(format!("{table}.csv"));
        let (path, format) = if file_present_nonempty(&parquet) {
            (parquet, SourceFormat::Parquet)
        } else if file_present_nonempty(&csv) {
            (csv, SourceFormat::Csv)
        } else {
            return Err(anyhow!(
                "Missing source for table {table}: expected {} or {}",
                parquet.display(),
                csv.display()
            ));
        };
        out.push(SourceFile {
            table,
            path,
            format,
        });
    }
    Ok(out)
}

pub fn file_present_nonempty(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(m) => m.is_file() && m.len() > 0,
        Err(_) => false,
    }
}
