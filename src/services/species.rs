//! Distinct-species aggregation over visible records.

use crate::{models::species::SpeciesSummary, services::query::fold_case};
use std::collections::BTreeMap;

/// Fold `(scientific_name, common_name)` pairs, given oldest first, into
/// per-species counts.
///
/// Names are compared case-insensitively. The first spelling and the first
/// non-empty common name seen for a species are kept. Output is sorted by
/// the case-folded scientific name.
pub fn aggregate_species<I>(rows: I) -> Vec<SpeciesSummary>
where
    I: IntoIterator<Item = (String, Option<String>)>,
{
    let mut by_key: BTreeMap<String, SpeciesSummary> = BTreeMap::new();
    for (scientific, common) in rows {
        let scientific = scientific.trim();
        if scientific.is_empty() {
            continue;
        }
        let common = common
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let entry = by_key
            .entry(fold_case(scientific))
            .or_insert_with(|| SpeciesSummary {
                scientific_name: scientific.to_string(),
                common_name: None,
                observation_count: 0,
            });
        entry.observation_count += 1;
        if entry.common_name.is_none() {
            entry.common_name = common;
        }
    }
    by_key.into_values().collect()
}
