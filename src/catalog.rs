use std::collections::HashSet;

use crate::store::DataStore;

pub async fn list_payers(store: &dyn DataStore) -> anyhow::Result<Vec<String>> {
    store.payer_names().await
}

/// Distinct procedure descriptions in first-seen order, optionally narrowed
/// to those containing `filter` (case-insensitive).
pub async fn list_procedures(
    store: &dyn DataStore,
    filter: Option<&str>,
) -> anyhow::Result<Vec<String>> {
    let needle = filter
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for desc in store.procedure_descriptions().await? {
        if let Some(n) = &needle {
            if !desc.to_lowercase().contains(n.as_str()) {
                continue;
            }
        }
        if seen.insert(desc.clone()) {
            out.push(desc);
        }
    }
    Ok(out)
}
