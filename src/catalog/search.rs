use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use serde::Deserialize;

use super::entry::{CatalogEntry, VariantLabel};

/// Column constraints for a catalog search.
///
/// A row matches when its value for every constrained column is one of the
/// accepted values. When `require_all_on` is set, rows are grouped on those
/// columns and a group survives only if it covers every requested value of
/// every constrained column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub facets: BTreeMap<String, Vec<String>>,
    pub require_all_on: Vec<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<S: Into<String>>(
        mut self,
        column: &str,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        self.facets.insert(
            column.to_string(),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn require_all_on<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.require_all_on = columns.into_iter().map(Into::into).collect();
        self
    }

    fn matches(&self, entry: &CatalogEntry) -> bool {
        self.facets.iter().all(|(column, accepted)| {
            entry
                .field(column)
                .is_some_and(|v| accepted.iter().any(|a| a == v))
        })
    }

    fn group_key(&self, entry: &CatalogEntry) -> Vec<String> {
        self.require_all_on
            .iter()
            .map(|c| entry.field(c).unwrap_or("").to_string())
            .collect()
    }
}

pub fn search(entries: &[CatalogEntry], query: &Query) -> Vec<CatalogEntry> {
    let matching: Vec<&CatalogEntry> = entries.iter().filter(|e| query.matches(e)).collect();

    if query.require_all_on.is_empty() {
        return matching.into_iter().cloned().collect();
    }

    // Values seen per group, per constrained column
    let mut coverage: BTreeMap<Vec<String>, BTreeMap<&str, BTreeSet<&str>>> = BTreeMap::new();
    for entry in &matching {
        let seen = coverage.entry(query.group_key(entry)).or_default();
        for column in query.facets.keys() {
            if let Some(value) = entry.field(column) {
                seen.entry(column.as_str()).or_default().insert(value);
            }
        }
    }

    let complete: BTreeSet<&Vec<String>> = coverage
        .iter()
        .filter(|(_, seen)| {
            query.facets.iter().all(|(column, wanted)| {
                seen.get(column.as_str())
                    .is_some_and(|values| wanted.iter().all(|w| values.contains(w.as_str())))
            })
        })
        .map(|(key, _)| key)
        .collect();

    debug!(
        "{} of {} groups on {:?} satisfy every constraint",
        complete.len(),
        coverage.len(),
        query.require_all_on
    );

    matching
        .into_iter()
        .filter(|e| complete.contains(&query.group_key(e)))
        .cloned()
        .collect()
}

/// How to choose the ensemble member(s) kept for each dataset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum MemberPolicy {
    /// Keep every member whose identifier contains `marker`.
    Contains { marker: String },
    /// Keep, per source/experiment/variable/table/grid, the member with the
    /// lowest `r, i, p, f` indices among those with the given physics index.
    LowestRealization {
        #[serde(default = "default_physics")]
        physics: u32,
    },
}

fn default_physics() -> u32 {
    1
}

impl Default for MemberPolicy {
    fn default() -> Self {
        MemberPolicy::LowestRealization {
            physics: default_physics(),
        }
    }
}

/// Applies `policy`, keeping the catalog order of the surviving rows.
pub fn select_members(entries: &[CatalogEntry], policy: &MemberPolicy) -> Vec<CatalogEntry> {
    match policy {
        MemberPolicy::Contains { marker } => entries
            .iter()
            .filter(|e| e.member_id().contains(marker.as_str()))
            .cloned()
            .collect(),
        MemberPolicy::LowestRealization { physics } => lowest_realization(entries, *physics),
    }
}

fn lowest_realization(entries: &[CatalogEntry], physics: u32) -> Vec<CatalogEntry> {
    // dataset key -> (label, version, row index) of the best member so far
    let mut best: BTreeMap<[&str; 5], (VariantLabel, &str, usize)> = BTreeMap::new();

    for (idx, entry) in entries.iter().enumerate() {
        let Ok(label) = entry.member_id().parse::<VariantLabel>() else {
            debug!("Skipping unparseable member id '{}'", entry.member_id());
            continue;
        };
        if label.physics != physics {
            continue;
        }

        let key = [
            entry.source_id(),
            entry.experiment_id(),
            entry.variable_id(),
            entry.table_id(),
            entry.grid_label(),
        ];
        let candidate = (label, entry.version(), idx);

        best.entry(key)
            .and_modify(|current| {
                let better = candidate.0 < current.0
                    || (candidate.0 == current.0 && candidate.1 > current.1);
                if better {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }

    let keep: BTreeSet<usize> = best.values().map(|(_, _, idx)| *idx).collect();
    entries
        .iter()
        .enumerate()
        .filter(|(idx, _)| keep.contains(idx))
        .map(|(_, e)| e.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(
        source: &str,
        experiment: &str,
        variable: &str,
        member: &str,
        version: &str,
    ) -> CatalogEntry {
        let fields = BTreeMap::from([
            ("source_id".to_string(), source.to_string()),
            ("experiment_id".to_string(), experiment.to_string()),
            ("variable_id".to_string(), variable.to_string()),
            ("member_id".to_string(), member.to_string()),
            ("table_id".to_string(), "Omon".to_string()),
            ("grid_label".to_string(), "gn".to_string()),
            ("version".to_string(), version.to_string()),
        ]);
        let location = format!(
            "gs://cmip6/CMIP6/CMIP/{}/{}/{}/Omon/{}/gn/{}/",
            source, experiment, member, variable, version
        );
        CatalogEntry::new(fields, location)
    }

    fn catalog() -> Vec<CatalogEntry> {
        vec![
            entry("GFDL-CM4", "historical", "tos", "r1i1p1f1", "v20180701"),
            entry("GFDL-CM4", "historical", "areacello", "r1i1p1f1", "v20180701"),
            entry("CanESM5", "historical", "tos", "r2i1p1f1", "v20190429"),
            entry("CanESM5", "historical", "tos", "r1i1p2f1", "v20190429"),
            entry("CanESM5", "ssp585", "tos", "r1i1p1f1", "v20190429"),
            entry("MIROC6", "historical", "tos", "r1i1p1f1", "v20181212"),
            entry("MIROC6", "historical", "tos", "r1i1p1f1", "v20190311"),
        ]
    }

    #[test]
    fn test_search_matches_every_facet() {
        let query = Query::new()
            .with("experiment_id", ["historical"])
            .with("variable_id", ["tos"])
            .with("grid_label", ["gn"]);
        let found = search(&catalog(), &query);
        assert_eq!(found.len(), 5);
        assert!(found.iter().all(|e| e.experiment_id() == "historical"));
    }

    #[test]
    fn test_require_all_on_is_an_intersection() {
        let query = Query::new()
            .with("experiment_id", ["historical"])
            .with("variable_id", ["tos", "areacello"])
            .require_all_on(["source_id"]);
        let found = search(&catalog(), &query);

        // Only GFDL-CM4 provides both variables
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|e| e.source_id() == "GFDL-CM4"));
    }

    #[test]
    fn test_require_all_on_across_experiments() {
        let query = Query::new()
            .with("experiment_id", ["historical", "ssp585"])
            .with("variable_id", ["tos"])
            .require_all_on(["source_id"]);
        let found = search(&catalog(), &query);

        assert!(found.iter().all(|e| e.source_id() == "CanESM5"));
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_contains_policy() {
        let policy = MemberPolicy::Contains {
            marker: "p1".to_string(),
        };
        let kept = select_members(&catalog(), &policy);
        assert_eq!(kept.len(), 6);
        assert!(kept.iter().all(|e| e.member_id() != "r1i1p2f1"));
    }

    #[test]
    fn test_lowest_realization_policy() {
        let query = Query::new()
            .with("experiment_id", ["historical"])
            .with("variable_id", ["tos"]);
        let found = search(&catalog(), &query);
        let kept = select_members(&found, &MemberPolicy::default());

        assert_eq!(kept.len(), 3);
        // CanESM5: p2 is excluded, so r2i1p1f1 is the only candidate
        assert_eq!(kept[1].member_id(), "r2i1p1f1");
        // MIROC6: same member twice, the newest version wins
        assert_eq!(kept[2].version(), "v20190311");
        // Catalog order is kept
        assert_eq!(kept[0].source_id(), "GFDL-CM4");
    }

    #[test]
    fn test_lowest_realization_prefers_lowest_label() {
        let entries = vec![
            entry("A", "historical", "tos", "r3i1p1f1", "v1"),
            entry("A", "historical", "tos", "r1i1p1f2", "v1"),
            entry("A", "historical", "tos", "r1i1p1f1", "v1"),
            entry("A", "historical", "tos", "bogus", "v1"),
        ];
        let kept = select_members(&entries, &MemberPolicy::default());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].member_id(), "r1i1p1f1");
    }

    #[test]
    fn test_member_policy_from_json() {
        let policy: MemberPolicy =
            serde_json::from_str(r#"{"policy": "contains", "marker": "p1"}"#).unwrap();
        assert_eq!(
            policy,
            MemberPolicy::Contains {
                marker: "p1".to_string()
            }
        );

        let policy: MemberPolicy =
            serde_json::from_str(r#"{"policy": "lowest_realization"}"#).unwrap();
        assert_eq!(policy, MemberPolicy::default());
    }
}
