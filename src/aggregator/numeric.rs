//! Grouping and the fixed numeric policy: counts are summed, travel time is
//! averaged, ratios are recomputed from the sums.

use crate::aggregator::types::MunicipalityAggregate;
use crate::aggregator::utility::mean;
use crate::metrics::DerivedMetrics;
use crate::model::{Counter, Counters, PostalAreaRecord};
use std::collections::{BTreeMap, HashMap};

/// Postcode rows sharing one municipality, in input order.
#[derive(Debug, Clone)]
pub struct Group<'a> {
    pub key: &'a str,
    pub members: Vec<&'a PostalAreaRecord>,
}

/// Groups records by municipality in order of first appearance.
///
/// Returns the groups and the number of records that had no municipality.
pub fn group_by_municipality(records: &[PostalAreaRecord]) -> (Vec<Group<'_>>, usize) {
    let mut groups: Vec<Group<'_>> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut without_key = 0;

    for record in records {
        let Some(key) = record.municipality() else {
            without_key += 1;
            continue;
        };
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Group {
                key,
                members: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].members.push(record);
    }

    (groups, without_key)
}

/// Folds one group into a municipality row, without geometry.
pub fn aggregate_group(group: &Group<'_>) -> MunicipalityAggregate {
    let mut counters = Counters::default();
    for counter in Counter::ALL {
        let values: Vec<f64> = group.members.iter().map(|r| r.counters.get(counter)).collect();
        let value = if counter.is_summed() {
            values.iter().sum::<f64>()
        } else {
            mean(&values)
        };
        counters.set(counter, value);
    }

    let mut extras: BTreeMap<String, f64> = BTreeMap::new();
    for member in &group.members {
        for (name, value) in &member.extras {
            *extras.entry(name.clone()).or_insert(0.0) += value;
        }
    }

    MunicipalityAggregate {
        municipality: group.key.to_string(),
        area_count: group.members.len(),
        derived: DerivedMetrics::from_counters(&counters),
        counters,
        extras,
        geometry: None,
    }
}
