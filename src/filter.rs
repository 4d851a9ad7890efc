//! Record filtering by multi-select dimensions and a market-share range.

use crate::model::{Attribute, Dataset, PostalAreaRecord};
use crate::schema::UNKNOWN_LABEL;
use anyhow::Result;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::debug;

/// A selectable filter dimension, in the order the filters cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Pc4,
    Attribute(Attribute),
}

impl Dimension {
    pub const ALL: [Dimension; 7] = [
        Dimension::Pc4,
        Dimension::Attribute(Attribute::Province),
        Dimension::Attribute(Attribute::Municipality),
        Dimension::Attribute(Attribute::Locality),
        Dimension::Attribute(Attribute::Cluster),
        Dimension::Attribute(Attribute::ProposedCompany),
        Dimension::Attribute(Attribute::ProposedBranch),
    ];

    pub fn column(self) -> &'static str {
        match self {
            Dimension::Pc4 => crate::schema::PC4,
            Dimension::Attribute(a) => a.column(),
        }
    }

    fn value(self, record: &PostalAreaRecord) -> &str {
        match self {
            Dimension::Pc4 => &record.pc4,
            Dimension::Attribute(a) => record.attribute(a).unwrap_or(UNKNOWN_LABEL),
        }
    }

    fn available(self, dataset: &Dataset) -> bool {
        match self {
            Dimension::Pc4 => true,
            Dimension::Attribute(a) => dataset.has_attribute(a),
        }
    }
}

/// Inclusive bounds on `berekend_marktaandeel_2023`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MarketShareRange {
    pub min: f64,
    pub max: f64,
}

impl MarketShareRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// The user's current filter choices. Empty sets do not filter.
///
/// Stored as JSON on disk, every field optional:
/// ```json
/// {
///   "province": ["Noord-Holland"],
///   "municipality": ["Amsterdam", "Zaanstad"],
///   "market_share": { "min": 10.0, "max": 40.0 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterSelection {
    pub pc4: BTreeSet<String>,
    pub province: BTreeSet<String>,
    pub municipality: BTreeSet<String>,
    pub locality: BTreeSet<String>,
    pub cluster: BTreeSet<String>,
    pub proposed_company: BTreeSet<String>,
    pub proposed_branch: BTreeSet<String>,
    pub market_share: Option<MarketShareRange>,
}

impl FilterSelection {
    /// Loads a selection from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let selection: FilterSelection = serde_json::from_str(&content)?;
        Ok(selection)
    }

    pub fn selected(&self, dimension: Dimension) -> &BTreeSet<String> {
        match dimension {
            Dimension::Pc4 => &self.pc4,
            Dimension::Attribute(Attribute::Province) => &self.province,
            Dimension::Attribute(Attribute::Municipality) => &self.municipality,
            Dimension::Attribute(Attribute::Locality) => &self.locality,
            Dimension::Attribute(Attribute::Cluster) => &self.cluster,
            Dimension::Attribute(Attribute::ProposedCompany) => &self.proposed_company,
            Dimension::Attribute(Attribute::ProposedBranch) => &self.proposed_branch,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.market_share.is_none() && Dimension::ALL.iter().all(|d| self.selected(*d).is_empty())
    }

    fn matches(&self, record: &PostalAreaRecord) -> bool {
        let in_sets = Dimension::ALL.iter().all(|d| {
            let selected = self.selected(*d);
            selected.is_empty() || selected.contains(d.value(record))
        });
        in_sets
            && self
                .market_share
                .is_none_or(|range| range.contains(record.derived.market_share_2023))
    }

    /// Records matching every active predicate, same schema. Input untouched.
    pub fn apply(&self, dataset: &Dataset) -> Dataset {
        let records: Vec<PostalAreaRecord> = dataset
            .records
            .iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect();
        debug!(before = dataset.len(), after = records.len(), "Applied filters");
        dataset.with_records(records)
    }

    /// Label for the filtered area, from the first non-empty geographic selection.
    pub fn area_label(&self) -> String {
        let labelled = [
            ("PC4", &self.pc4),
            ("Provincie(s)", &self.province),
            ("Gemeente(n)", &self.municipality),
            ("Woonplaats(en)", &self.locality),
        ];
        labelled
            .into_iter()
            .find(|(_, set)| !set.is_empty())
            .map(|(prefix, set)| {
                let values: Vec<&str> = set.iter().map(String::as_str).collect();
                format!("{}: {}", prefix, values.join(", "))
            })
            .unwrap_or_else(|| "Heel Nederland".to_string())
    }
}

/// Sorted distinct values for one dimension; missing values show as `Onbekend`.
pub fn options(dataset: &Dataset, dimension: Dimension) -> Vec<String> {
    if !dimension.available(dataset) {
        return Vec::new();
    }
    options_for(&dataset.records, dimension)
}

fn options_for(records: &[PostalAreaRecord], dimension: Dimension) -> Vec<String> {
    records
        .iter()
        .map(|r| dimension.value(r).to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Options per dimension, each narrowed by the selections before it.
pub fn cascading_options(dataset: &Dataset, selection: &FilterSelection) -> Vec<(Dimension, Vec<String>)> {
    let mut remaining: Vec<&PostalAreaRecord> = dataset.records.iter().collect();
    let mut out = Vec::new();

    for dimension in Dimension::ALL {
        if !dimension.available(dataset) {
            continue;
        }
        let values: BTreeSet<String> = remaining.iter().map(|r| dimension.value(r).to_string()).collect();
        out.push((dimension, values.into_iter().collect()));

        let selected = selection.selected(dimension);
        if !selected.is_empty() {
            remaining.retain(|r| selected.contains(dimension.value(r)));
        }
    }
    out
}

/// Slider bounds for market share. Equal bounds are widened to `min*0.9 .. max*1.1`.
pub fn market_share_bounds(records: &[PostalAreaRecord]) -> Option<MarketShareRange> {
    let mut values = records.iter().map(|r| r.derived.market_share_2023);
    let first = values.next()?;
    let (min, max) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if min == max {
        return Some(MarketShareRange {
            min: min * 0.9,
            max: max * 1.1,
        });
    }
    Some(MarketShareRange { min, max })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::with_derived_metrics;
    use crate::model::Counter;
    use geo::MultiPolygon;
    use std::env;
    use std::fs;

    fn record(pc4: &str, province: &str, municipality: &str, deaths: f64, services: f64) -> PostalAreaRecord {
        PostalAreaRecord::new(pc4, MultiPolygon::new(vec![]))
            .with_attribute(Attribute::Province, province)
            .with_attribute(Attribute::Municipality, municipality)
            .with_counter(Counter::Deaths2023, deaths)
            .with_counter(Counter::Services2023, services)
    }

    fn sample() -> Dataset {
        with_derived_metrics(Dataset {
            records: vec![
                record("1011", "Noord-Holland", "Amsterdam", 10.0, 2.0),
                record("1012", "Noord-Holland", "Amsterdam", 10.0, 5.0),
                record("1501", "Noord-Holland", "Zaanstad", 10.0, 1.0),
                record("3011", "Zuid-Holland", "Rotterdam", 0.0, 0.0),
            ],
            attributes: BTreeSet::from([Attribute::Province, Attribute::Municipality]),
            counters: BTreeSet::from([Counter::Deaths2023, Counter::Services2023]),
            extra_columns: Vec::new(),
        })
    }

    fn pc4s(dataset: &Dataset) -> Vec<&str> {
        dataset.records.iter().map(|r| r.pc4.as_str()).collect()
    }

    #[test]
    fn test_empty_selection_is_noop() {
        let data = sample();
        let selection = FilterSelection::default();
        assert!(selection.is_empty());
        assert_eq!(selection.apply(&data), data);
    }

    #[test]
    fn test_predicates_are_anded() {
        let selection = FilterSelection {
            province: BTreeSet::from(["Noord-Holland".to_string()]),
            municipality: BTreeSet::from(["Amsterdam".to_string(), "Rotterdam".to_string()]),
            ..Default::default()
        };
        assert_eq!(pc4s(&selection.apply(&sample())), vec!["1011", "1012"]);
    }

    #[test]
    fn test_market_share_range_is_inclusive() {
        let selection = FilterSelection {
            market_share: Some(MarketShareRange { min: 20.0, max: 50.0 }),
            ..Default::default()
        };
        assert_eq!(pc4s(&selection.apply(&sample())), vec!["1011", "1012"]);
    }

    #[test]
    fn test_options_sorted_and_unique() {
        let data = sample();
        assert_eq!(
            options(&data, Dimension::Attribute(Attribute::Municipality)),
            vec!["Amsterdam", "Rotterdam", "Zaanstad"]
        );
        assert!(options(&data, Dimension::Attribute(Attribute::Cluster)).is_empty());
    }

    #[test]
    fn test_options_show_missing_as_unknown() {
        let mut data = sample();
        data.attributes.insert(Attribute::Locality);
        data.records[0] = data.records[0].clone().with_attribute(Attribute::Locality, "Amsterdam");

        assert_eq!(
            options(&data, Dimension::Attribute(Attribute::Locality)),
            vec!["Amsterdam", "Onbekend"]
        );
    }

    #[test]
    fn test_cascading_options_narrow() {
        let selection = FilterSelection {
            province: BTreeSet::from(["Zuid-Holland".to_string()]),
            ..Default::default()
        };
        let cascaded = cascading_options(&sample(), &selection);

        let (dim, municipalities) = &cascaded[2];
        assert_eq!(*dim, Dimension::Attribute(Attribute::Municipality));
        assert_eq!(municipalities, &vec!["Rotterdam".to_string()]);
        // The province list itself is not narrowed by its own selection.
        assert_eq!(cascaded[1].1.len(), 2);
    }

    #[test]
    fn test_market_share_bounds() {
        let data = sample();
        let bounds = market_share_bounds(&data.records).unwrap();
        assert_eq!(bounds.min, 0.0);
        assert_eq!(bounds.max, 50.0);

        let single = &data.records[1..2];
        let widened = market_share_bounds(single).unwrap();
        assert!((widened.min - 45.0).abs() < 1e-9);
        assert!((widened.max - 55.0).abs() < 1e-9);

        assert!(market_share_bounds(&[]).is_none());
    }

    #[test]
    fn test_area_label_precedence() {
        assert_eq!(FilterSelection::default().area_label(), "Heel Nederland");

        let selection = FilterSelection {
            municipality: BTreeSet::from(["Amsterdam".to_string()]),
            locality: BTreeSet::from(["Zaandam".to_string()]),
            cluster: BTreeSet::from(["Noord".to_string()]),
            ..Default::default()
        };
        assert_eq!(selection.area_label(), "Gemeente(n): Amsterdam");

        let selection = FilterSelection {
            pc4: BTreeSet::from(["1012".to_string(), "1011".to_string()]),
            province: BTreeSet::from(["Noord-Holland".to_string()]),
            ..Default::default()
        };
        assert_eq!(selection.area_label(), "PC4: 1011, 1012");
    }

    #[test]
    fn test_load_selection_from_json() {
        let path = format!("{}/pc4_dashboard_test_filters.json", env::temp_dir().display());
        fs::write(
            &path,
            r#"{"province": ["Noord-Holland"], "market_share": {"min": 1.0, "max": 2.5}}"#,
        )
        .unwrap();

        let selection = FilterSelection::load(&path).unwrap();
        assert_eq!(selection.province.len(), 1);
        assert!(selection.municipality.is_empty());
        assert_eq!(selection.market_share, Some(MarketShareRange { min: 1.0, max: 2.5 }));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_rejects_unknown_fields() {
        let path = format!("{}/pc4_dashboard_test_filters_bad.json", env::temp_dir().display());
        fs::write(&path, r#"{"gemeente": ["Amsterdam"]}"#).unwrap();

        assert!(FilterSelection::load(&path).is_err());

        fs::remove_file(&path).unwrap();
    }
}
