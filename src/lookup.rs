//! Procedure + insurance plan -> provider offers, cheapest first.
//!
//! The lookup is a chain of dependent store queries (procedures, payer,
//! encounters, organizations) joined in memory. Each stage fails fast; no
//! partial results are ever returned.

use std::collections::HashSet;

use serde::Serialize;

use crate::model::{Encounter, Organization, ProviderOffer};
use crate::store::DataStore;

pub const DEFAULT_ENCOUNTER_CAP: usize = 100;

const UNKNOWN_NAME: &str = "Unknown Hospital";
const UNKNOWN_ADDRESS: &str = "Address not available";
const UNKNOWN_PHONE: &str = "Contact not available";
const UNKNOWN_CITY: &str = "City not available";
const UNKNOWN_STATE: &str = "State not available";
const UNKNOWN_ZIP: &str = "Zip code not available";

#[derive(Debug, Clone, Copy)]
pub struct LookupOptions {
    /// Upper bound on distinct encounters fed into the encounter query.
    pub encounter_cap: usize,
}

impl Default for LookupOptions {
    fn default() -> Self {
        Self {
            encounter_cap: DEFAULT_ENCOUNTER_CAP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupOutcome {
    /// Ascending by base encounter cost.
    pub offers: Vec<ProviderOffer>,
    /// Distinct encounters referenced by the matching procedures.
    pub encounters_matched: usize,
    /// Encounters actually queried after the cap.
    pub encounters_considered: usize,
    pub truncated: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("data store error: {0:#}")]
    Upstream(anyhow::Error),
}

pub async fn lookup(
    store: &dyn DataStore,
    procedure: &str,
    payer_name: &str,
    opts: LookupOptions,
) -> Result<LookupOutcome, LookupError> {
    tracing::info!(procedure, payer = payer_name, "Lookup started");

    let procedures = store
        .procedures_matching(procedure)
        .await
        .map_err(LookupError::Upstream)?;
    if procedures.is_empty() {
        return Err(LookupError::NotFound(format!(
            "no procedures found with description {procedure:?}"
        )));
    }

    let encounter_ids = distinct_present(procedures.iter().map(|p| p.encounter.as_ref()));
    if encounter_ids.is_empty() {
        return Err(LookupError::NotFound(
            "matching procedures reference no encounters".to_string(),
        ));
    }

    let encounters_matched = encounter_ids.len();
    let capped = &encounter_ids[..encounters_matched.min(opts.encounter_cap)];
    let truncated = capped.len() < encounters_matched;
    if truncated {
        tracing::warn!(
            "Encounter set truncated: considering {} of {} distinct encounters",
            capped.len(),
            encounters_matched
        );
    } else {
        tracing::debug!("{} distinct encounters", encounters_matched);
    }

    let payers = store
        .payers_named(payer_name)
        .await
        .map_err(LookupError::Upstream)?;
    let payer = match payers.as_slice() {
        [only] => only,
        [] => {
            return Err(LookupError::NotFound(format!(
                "no payer named {payer_name:?}"
            )));
        }
        many => {
            return Err(LookupError::NotFound(format!(
                "payer name {payer_name:?} is ambiguous ({} rows)",
                many.len()
            )));
        }
    };

    let encounters = store
        .encounters_for_payer(capped, &payer.id)
        .await
        .map_err(LookupError::Upstream)?;
    if encounters.is_empty() {
        return Err(LookupError::NotFound(format!(
            "no encounters billed to {payer_name:?} for this procedure"
        )));
    }

    let organization_ids = distinct_present(encounters.iter().map(|e| e.organization.as_ref()));
    if organization_ids.is_empty() {
        return Err(LookupError::NotFound(
            "matching encounters reference no organizations".to_string(),
        ));
    }

    let organizations = store
        .organizations_by_id(&organization_ids)
        .await
        .map_err(LookupError::Upstream)?;

    let offers: Vec<ProviderOffer> = encounters
        .iter()
        .map(|enc| {
            let org = enc
                .organization
                .as_ref()
                .and_then(|id| organizations.iter().find(|o| &o.id == id));
            to_offer(enc, org, payer_name)
        })
        .collect();

    tracing::info!(offers = offers.len(), "Lookup completed");

    Ok(LookupOutcome {
        offers,
        encounters_matched,
        encounters_considered: capped.len(),
        truncated,
    })
}

/// Distinct non-null, non-empty values in first-seen order.
fn distinct_present<'a>(values: impl Iterator<Item = Option<&'a String>>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for v in values.flatten().filter(|v| !v.is_empty()) {
        if seen.insert(v.as_str()) {
            out.push(v.clone());
        }
    }
    out
}

fn to_offer(enc: &Encounter, org: Option<&Organization>, payer_name: &str) -> ProviderOffer {
    ProviderOffer {
        id: enc.id.clone(),
        name: or_placeholder(org.and_then(|o| o.name.as_ref()), UNKNOWN_NAME),
        price: enc.base_encounter_cost,
        total_claim_cost: enc.total_claim_cost,
        payer_coverage: enc.payer_coverage,
        out_of_pocket: enc.total_claim_cost - enc.payer_coverage,
        address: or_placeholder(org.and_then(|o| o.address.as_ref()), UNKNOWN_ADDRESS),
        contact_number: or_placeholder(org.and_then(|o| o.phone.as_ref()), UNKNOWN_PHONE),
        city: or_placeholder(org.and_then(|o| o.city.as_ref()), UNKNOWN_CITY),
        state: or_placeholder(org.and_then(|o| o.state.as_ref()), UNKNOWN_STATE),
        zip: or_placeholder(org.and_then(|o| o.zip.as_ref()), UNKNOWN_ZIP),
        payer: payer_name.to_string(),
    }
}

fn or_placeholder(value: Option<&String>, placeholder: &str) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v.clone(),
        _ => placeholder.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::anyhow;
    use async_trait::async_trait;

    use super::*;
    use crate::model::{Payer, Procedure};

    #[derive(Default)]
    struct FakeStore {
        payers: Vec<Payer>,
        procedures: Vec<Procedure>,
        encounters: Vec<Encounter>,
        organizations: Vec<Organization>,
        fail_on: Option<&'static str>,
        calls: Mutex<Vec<&'static str>>,
        encounter_ids_seen: Mutex<Vec<String>>,
    }

    impl FakeStore {
        fn record(&self, call: &'static str) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(call);
            if self.fail_on == Some(call) {
                return Err(anyhow!("connection reset during {call}"));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DataStore for FakeStore {
        async fn procedures_matching(&self, pattern: &str) -> anyhow::Result<Vec<Procedure>> {
            self.record("procedures")?;
            Ok(self
                .procedures
                .iter()
                .filter(|p| p.description.eq_ignore_ascii_case(pattern))
                .cloned()
                .collect())
        }

        async fn payers_named(&self, name: &str) -> anyhow::Result<Vec<Payer>> {
            self.record("payers")?;
            Ok(self
                .payers
                .iter()
                .filter(|p| p.name == name)
                .cloned()
                .collect())
        }

        async fn encounters_for_payer(
            &self,
            ids: &[String],
            payer_id: &str,
        ) -> anyhow::Result<Vec<Encounter>> {
            self.record("encounters")?;
            *self.encounter_ids_seen.lock().unwrap() = ids.to_vec();
            let mut rows: Vec<Encounter> = self
                .encounters
                .iter()
                .filter(|e| e.payer == payer_id && ids.contains(&e.id))
                .cloned()
                .collect();
            rows.sort_by(|a, b| {
                a.base_encounter_cost
                    .total_cmp(&b.base_encounter_cost)
                    .then_with(|| a.id.cmp(&b.id))
            });
            Ok(rows)
        }

        async fn organizations_by_id(&self, ids: &[String]) -> anyhow::Result<Vec<Organization>> {
            self.record("organizations")?;
            Ok(self
                .organizations
                .iter()
                .filter(|o| ids.contains(&o.id))
                .cloned()
                .collect())
        }

        async fn payer_names(&self) -> anyhow::Result<Vec<String>> {
            Ok(self.payers.iter().map(|p| p.name.clone()).collect())
        }

        async fn procedure_descriptions(&self) -> anyhow::Result<Vec<String>> {
            Ok(self
                .procedures
                .iter()
                .map(|p| p.description.clone())
                .collect())
        }
    }

    fn payer(id: &str, name: &str) -> Payer {
        Payer {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    fn procedure(encounter: Option<&str>, description: &str) -> Procedure {
        Procedure {
            encounter: encounter.map(String::from),
            description: description.to_string(),
        }
    }

    fn encounter(id: &str, org: Option<&str>, payer: &str, base: f64) -> Encounter {
        Encounter {
            id: id.to_string(),
            organization: org.map(String::from),
            payer: payer.to_string(),
            base_encounter_cost: base,
            total_claim_cost: base + 50.0,
            payer_coverage: base - 20.0,
        }
    }

    fn organization(id: &str, name: &str) -> Organization {
        Organization {
            id: id.to_string(),
            name: Some(name.to_string()),
            address: Some("1 Main St".to_string()),
            city: Some("Sacramento".to_string()),
            state: Some("CA".to_string()),
            zip: Some("95814".to_string()),
            phone: Some("555-0100".to_string()),
        }
    }

    fn annual_physical_store() -> FakeStore {
        FakeStore {
            payers: vec![payer("p1", "Acme Health"), payer("p2", "Medicare")],
            procedures: vec![
                procedure(Some("e1"), "Annual Physical"),
                procedure(Some("e2"), "Annual Physical"),
                procedure(Some("e1"), "Annual Physical"),
                procedure(None, "Annual Physical"),
                procedure(Some("e3"), "Annual Physical"),
                procedure(Some("e9"), "Colonoscopy"),
            ],
            encounters: vec![
                encounter("e1", Some("o1"), "p1", 200.0),
                encounter("e2", Some("o2"), "p1", 150.0),
                encounter("e3", Some("o1"), "p1", 300.0),
                encounter("e9", Some("o1"), "p1", 10.0),
            ],
            organizations: vec![organization("o1", "Mercy General"), organization("o2", "Valley")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn offers_are_sorted_cheapest_first() {
        let store = annual_physical_store();
        let out = lookup(&store, "Annual Physical", "Acme Health", LookupOptions::default())
            .await
            .unwrap();

        let prices: Vec<f64> = out.offers.iter().map(|o| o.price).collect();
        assert_eq!(prices, vec![150.0, 200.0, 300.0]);
        assert_eq!(out.offers[0].name, "Valley");
        assert_eq!(out.offers[1].name, "Mercy General");
        assert!(out.offers.iter().all(|o| o.payer == "Acme Health"));
        assert_eq!(out.offers[0].out_of_pocket, 70.0);
        assert_eq!(out.encounters_matched, 3);
        assert_eq!(out.encounters_considered, 3);
        assert!(!out.truncated);
        assert_eq!(
            store.calls(),
            vec!["procedures", "payers", "encounters", "organizations"]
        );
    }

    #[tokio::test]
    async fn no_matching_procedure_stops_before_encounters() {
        let store = annual_physical_store();
        let err = lookup(&store, "Heart Transplant", "Acme Health", LookupOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::NotFound(_)));
        assert_eq!(store.calls(), vec!["procedures"]);
    }

    #[tokio::test]
    async fn procedures_without_encounters_are_not_found() {
        let store = FakeStore {
            payers: vec![payer("p1", "Acme Health")],
            procedures: vec![procedure(None, "Annual Physical")],
            ..Default::default()
        };
        let err = lookup(&store, "annual physical", "Acme Health", LookupOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::NotFound(_)));
        assert_eq!(store.calls(), vec!["procedures"]);
    }

    #[tokio::test]
    async fn unknown_or_ambiguous_payer_is_not_found() {
        let store = annual_physical_store();
        let err = lookup(&store, "Annual Physical", "Nobody", LookupOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::NotFound(_)));

        let mut store = annual_physical_store();
        store.payers.push(payer("p3", "Acme Health"));
        let err = lookup(&store, "Annual Physical", "Acme Health", LookupOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ambiguous"), "{err}");
        assert_eq!(store.calls(), vec!["procedures", "payers"]);
    }

    #[tokio::test]
    async fn no_encounters_for_payer_is_not_found() {
        let store = annual_physical_store();
        let err = lookup(&store, "Annual Physical", "Medicare", LookupOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::NotFound(_)));
        assert_eq!(store.calls(), vec!["procedures", "payers", "encounters"]);
    }

    #[tokio::test]
    async fn encounters_without_organizations_are_not_found() {
        let store = FakeStore {
            payers: vec![payer("p1", "Acme Health")],
            procedures: vec![procedure(Some("e1"), "Annual Physical")],
            encounters: vec![encounter("e1", None, "p1", 100.0)],
            ..Default::default()
        };
        let err = lookup(&store, "Annual Physical", "Acme Health", LookupOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::NotFound(_)));
        assert_eq!(store.calls(), vec!["procedures", "payers", "encounters"]);
    }

    #[tokio::test]
    async fn empty_ids_are_skipped() {
        let store = FakeStore {
            payers: vec![payer("p1", "Acme Health")],
            procedures: vec![procedure(Some(""), "Annual Physical")],
            ..Default::default()
        };
        let err = lookup(&store, "Annual Physical", "Acme Health", LookupOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::NotFound(_)));
        assert_eq!(store.calls(), vec!["procedures"]);

        let store = FakeStore {
            payers: vec![payer("p1", "Acme Health")],
            procedures: vec![
                procedure(Some(""), "Annual Physical"),
                procedure(Some("e1"), "Annual Physical"),
            ],
            encounters: vec![encounter("e1", Some(""), "p1", 100.0)],
            ..Default::default()
        };
        let err = lookup(&store, "Annual Physical", "Acme Health", LookupOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::NotFound(_)));
        assert_eq!(store.calls(), vec!["procedures", "payers", "encounters"]);
        assert_eq!(*store.encounter_ids_seen.lock().unwrap(), vec!["e1".to_string()]);
    }

    #[tokio::test]
    async fn missing_organizations_get_placeholders() {
        let mut store = annual_physical_store();
        // e3 points at an organization that does not exist; e2's org has gaps.
        store.encounters[2].organization = Some("o404".to_string());
        store.organizations[1].address = None;
        store.organizations[1].phone = Some("  ".to_string());

        let out = lookup(&store, "Annual Physical", "Acme Health", LookupOptions::default())
            .await
            .unwrap();
        assert_eq!(out.offers.len(), 3);

        let orphan = out.offers.iter().find(|o| o.id == "e3").unwrap();
        assert_eq!(orphan.name, "Unknown Hospital");
        assert_eq!(orphan.address, "Address not available");
        assert_eq!(orphan.contact_number, "Contact not available");
        assert_eq!(orphan.city, "City not available");
        assert_eq!(orphan.state, "State not available");
        assert_eq!(orphan.zip, "Zip code not available");
        assert_eq!(orphan.price, 300.0);

        let gappy = out.offers.iter().find(|o| o.id == "e2").unwrap();
        assert_eq!(gappy.name, "Valley");
        assert_eq!(gappy.address, "Address not available");
        assert_eq!(gappy.contact_number, "Contact not available");
    }

    #[tokio::test]
    async fn cap_applies_after_dedup_and_is_reported() {
        let mut procedures = Vec::new();
        let mut encounters = Vec::new();
        for i in 0..150 {
            let id = format!("e{i:03}");
            procedures.push(procedure(Some(&id), "MRI"));
            procedures.push(procedure(Some(&id), "MRI"));
            encounters.push(encounter(&id, Some("o1"), "p1", 1000.0 - i as f64));
        }
        let store = FakeStore {
            payers: vec![payer("p1", "Acme Health")],
            procedures,
            encounters,
            organizations: vec![organization("o1", "Mercy General")],
            ..Default::default()
        };

        let out = lookup(&store, "MRI", "Acme Health", LookupOptions::default())
            .await
            .unwrap();
        assert_eq!(out.encounters_matched, 150);
        assert_eq!(out.encounters_considered, 100);
        assert!(out.truncated);
        assert_eq!(out.offers.len(), 100);

        let queried = store.encounter_ids_seen.lock().unwrap().clone();
        assert_eq!(queried.len(), 100);
        assert_eq!(queried.first().map(String::as_str), Some("e000"));
        assert_eq!(queried.last().map(String::as_str), Some("e099"));

        assert!(out.offers.windows(2).all(|w| w[0].price <= w[1].price));

        let small = lookup(&store, "MRI", "Acme Health", LookupOptions { encounter_cap: 5 })
            .await
            .unwrap();
        assert_eq!(small.offers.len(), 5);
        assert_eq!(small.encounters_considered, 5);
    }

    #[tokio::test]
    async fn store_failure_aborts_as_upstream() {
        let mut store = annual_physical_store();
        store.fail_on = Some("encounters");
        let err = lookup(&store, "Annual Physical", "Acme Health", LookupOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::Upstream(_)));
        assert!(err.to_string().contains("connection reset"), "{err}");
        assert_eq!(store.calls(), vec!["procedures", "payers", "encounters"]);
    }

    #[tokio::test]
    async fn repeated_lookups_are_identical() {
        let store = annual_physical_store();
        let a = lookup(&store, "Annual Physical", "Acme Health", LookupOptions::default())
            .await
            .unwrap();
        let b = lookup(&store, "Annual Physical", "Acme Health", LookupOptions::default())
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn runs_against_duckdb() {
        let store = crate::store::DuckDbStore::from_connection(
            crate::store::local::tests::fixture_connection(),
        );
        let out = lookup(&store, "annual physical", "Acme Health", LookupOptions::default())
            .await
            .unwrap();
        let prices: Vec<f64> = out.offers.iter().map(|o| o.price).collect();
        assert_eq!(prices, vec![150.0, 200.0, 300.0]);
        assert_eq!(out.offers[0].address, "Address not available");
        assert_eq!(out.offers[2].name, "Unknown Hospital");
    }
}
