//! Pure aggregation of raw pet records into cached statistics rows.
//!
//! These functions are total and side-effect free: empty input yields empty
//! output, never an error. The caller supplies `now` so every row written
//! by one sync attempt carries the same timestamp.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{PetRecord, SpeciesCount, TreatmentCount, VaccineRank, Vaccination};

/// Label for records whose species id is missing. Malformed records
/// aggregate into this bucket instead of failing the sync.
const UNKNOWN_SPECIES_LABEL: &str = "Unknown Species";

/// Label for the treated partition.
const TREATED_LABEL: &str = "Treated";

/// Label for the untreated partition.
const UNTREATED_LABEL: &str = "Untreated";

/// Display label for a species bucket: the lookup's answer, a
/// `"Species {id}"` fallback for ids it does not know, or the unknown
/// bucket for records missing an id.
pub fn species_label(species_id: Option<i64>, label_of: impl Fn(i64) -> Option<String>) -> String {
    match species_id {
        Some(id) => label_of(id).unwrap_or_else(|| format!("Species {}", id)),
        None => UNKNOWN_SPECIES_LABEL.to_string(),
    }
}

/// Count records per species, most numerous first.
///
/// `label_of` maps a species id to a display label; ids it does not know
/// fall back to `"Species {id}"`. Ties keep input (arrival) order.
pub fn by_species(
    records: &[PetRecord],
    label_of: impl Fn(i64) -> Option<String>,
    now: DateTime<Utc>,
) -> Vec<SpeciesCount> {
    // First-seen order preserved so the later stable sort breaks ties by
    // arrival order.
    let mut order: Vec<Option<i64>> = Vec::new();
    let mut counts: HashMap<Option<i64>, u64> = HashMap::new();

    for record in records {
        let entry = counts.entry(record.species_id).or_insert_with(|| {
            order.push(record.species_id);
            0
        });
        *entry += 1;
    }

    let mut rows: Vec<SpeciesCount> = order
        .into_iter()
        .map(|key| SpeciesCount {
            label: species_label(key, &label_of),
            count: counts[&key],
            last_updated: now,
        })
        .collect();

    rows.sort_by(|a, b| b.count.cmp(&a.count));
    rows
}

/// Partition records by treatment state and count each side.
///
/// A partition with a zero count is omitted entirely rather than written
/// as a zero row.
pub fn by_treatment(records: &[PetRecord], now: DateTime<Utc>) -> Vec<TreatmentCount> {
    let treated = records.iter().filter(|r| r.treated).count() as u64;
    let untreated = records.len() as u64 - treated;

    let mut rows = Vec::with_capacity(2);
    if treated > 0 {
        rows.push(TreatmentCount {
            label: TREATED_LABEL.to_string(),
            count: treated,
            last_updated: now,
        });
    }
    if untreated > 0 {
        rows.push(TreatmentCount {
            label: UNTREATED_LABEL.to_string(),
            count: untreated,
            last_updated: now,
        });
    }
    rows
}

/// Rank vaccines within one group by how often they appear.
///
/// Ranks are 1-based and dense: equal counts share a rank, the next
/// distinct count takes the next rank number. Ties keep first-seen input
/// order, so reversing whole-record order never reshuffles equal-count
/// rows that arrive in the same relative order.
pub fn vaccine_ranking(
    events: &[Vaccination],
    group_id: &str,
    group_label: &str,
    now: DateTime<Utc>,
) -> Vec<VaccineRank> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, u64> = HashMap::new();

    for event in events {
        let entry = counts.entry(event.name.as_str()).or_insert_with(|| {
            order.push(event.name.as_str());
            0
        });
        *entry += 1;
    }

    let mut named: Vec<(&str, u64)> = order.into_iter().map(|name| (name, counts[name])).collect();
    named.sort_by(|a, b| b.1.cmp(&a.1));

    let mut rows = Vec::with_capacity(named.len());
    let mut rank = 0u32;
    let mut prev_count = None;
    for (name, count) in named {
        if prev_count != Some(count) {
            rank += 1;
            prev_count = Some(count);
        }
        rows.push(VaccineRank {
            id: VaccineRank::make_id(group_id, name),
            group_id: group_id.to_string(),
            group_label: group_label.to_string(),
            vaccine: name.to_string(),
            count,
            rank,
            last_updated: now,
        });
    }
    rows
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, species_id: Option<i64>, treated: bool) -> PetRecord {
        PetRecord {
            id,
            species_id,
            treated,
            vaccinations: Vec::new(),
        }
    }

    fn vaccination(name: &str) -> Vaccination {
        Vaccination {
            name: name.to_string(),
            administered_at: Utc::now(),
        }
    }

    fn label_of(id: i64) -> Option<String> {
        match id {
            1 => Some("Dog".to_string()),
            2 => Some("Cat".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_by_species_counts_and_order() {
        let mut records = Vec::new();
        for i in 0..6 {
            records.push(record(i, Some(1), true));
        }
        for i in 6..10 {
            records.push(record(i, Some(2), false));
        }

        let rows = by_species(&records, label_of, Utc::now());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].label, "Dog");
        assert_eq!(rows[0].count, 6);
        assert_eq!(rows[1].label, "Cat");
        assert_eq!(rows[1].count, 4);

        // Counts always sum to the number of input records
        let total: u64 = rows.iter().map(|r| r.count).sum();
        assert_eq!(total, records.len() as u64);
    }

    #[test]
    fn test_by_species_unknown_id_fallback_label() {
        let records = vec![record(1, Some(42), false)];
        let rows = by_species(&records, label_of, Utc::now());
        assert_eq!(rows[0].label, "Species 42");
    }

    #[test]
    fn test_by_species_missing_id_gets_own_bucket() {
        let records = vec![
            record(1, None, false),
            record(2, Some(1), false),
            record(3, None, false),
        ];
        let rows = by_species(&records, label_of, Utc::now());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].label, "Unknown Species");
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[1].label, "Dog");
        assert_eq!(rows[1].count, 1);
    }

    #[test]
    fn test_by_species_ties_keep_arrival_order() {
        let records = vec![record(1, Some(2), false), record(2, Some(1), false)];
        let rows = by_species(&records, label_of, Utc::now());
        // Both count 1; Cat arrived first
        assert_eq!(rows[0].label, "Cat");
        assert_eq!(rows[1].label, "Dog");
    }

    #[test]
    fn test_by_species_empty_input() {
        let rows = by_species(&[], label_of, Utc::now());
        assert!(rows.is_empty());
    }

    #[test]
    fn test_by_treatment_both_partitions() {
        let mut records = Vec::new();
        for i in 0..7 {
            records.push(record(i, Some(1), true));
        }
        for i in 7..10 {
            records.push(record(i, Some(1), false));
        }

        let rows = by_treatment(&records, Utc::now());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].label, "Treated");
        assert_eq!(rows[0].count, 7);
        assert_eq!(rows[1].label, "Untreated");
        assert_eq!(rows[1].count, 3);
    }

    #[test]
    fn test_by_treatment_omits_zero_partition() {
        let records = vec![record(1, Some(1), true), record(2, Some(1), true)];
        let rows = by_treatment(&records, Utc::now());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].label, "Treated");
        assert_eq!(rows[0].count, 2);
    }

    #[test]
    fn test_by_treatment_idempotent() {
        let records = vec![
            record(1, Some(1), true),
            record(2, Some(2), false),
            record(3, Some(1), true),
        ];
        let now = Utc::now();
        assert_eq!(by_treatment(&records, now), by_treatment(&records, now));
    }

    #[test]
    fn test_by_treatment_empty_input() {
        assert!(by_treatment(&[], Utc::now()).is_empty());
    }

    #[test]
    fn test_vaccine_ranking_dense_ranks_with_ties() {
        // Rabies x5, Parvo x3, Distemper x3, Parvo first seen before Distemper
        let mut events = Vec::new();
        for _ in 0..5 {
            events.push(vaccination("Rabies"));
        }
        events.push(vaccination("Parvo"));
        events.push(vaccination("Distemper"));
        for _ in 0..2 {
            events.push(vaccination("Parvo"));
            events.push(vaccination("Distemper"));
        }

        let rows = vaccine_ranking(&events, "species-1", "Dog", Utc::now());
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].vaccine, "Rabies");
        assert_eq!(rows[0].count, 5);
        assert_eq!(rows[0].rank, 1);

        // Tied counts share rank 2, first-seen first
        assert_eq!(rows[1].vaccine, "Parvo");
        assert_eq!(rows[1].rank, 2);
        assert_eq!(rows[2].vaccine, "Distemper");
        assert_eq!(rows[2].rank, 2);
    }

    #[test]
    fn test_vaccine_ranking_reversed_input_same_ranks() {
        let names = ["Rabies", "Rabies", "Rabies", "Parvo", "Lepto", "Parvo"];
        let forward: Vec<Vaccination> = names.iter().map(|n| vaccination(n)).collect();
        let reversed: Vec<Vaccination> = names.iter().rev().map(|n| vaccination(n)).collect();

        let now = Utc::now();
        let by_name = |rows: Vec<VaccineRank>| -> HashMap<String, u32> {
            rows.into_iter().map(|r| (r.vaccine, r.rank)).collect()
        };
        assert_eq!(
            by_name(vaccine_ranking(&forward, "g", "G", now)),
            by_name(vaccine_ranking(&reversed, "g", "G", now))
        );
    }

    #[test]
    fn test_vaccine_ranking_deterministic_ids() {
        let events = vec![vaccination("Rabies")];
        let rows = vaccine_ranking(&events, "species-1", "Dog", Utc::now());
        assert_eq!(rows[0].id, "species-1:Rabies");
        // Re-running yields the same id, independent of any prior snapshot
        let again = vaccine_ranking(&events, "species-1", "Dog", Utc::now());
        assert_eq!(rows[0].id, again[0].id);
    }

    #[test]
    fn test_vaccine_ranking_empty_input() {
        assert!(vaccine_ranking(&[], "g", "G", Utc::now()).is_empty());
    }
}
