//! Postcode to municipality aggregation.
//!
//! Numeric columns follow a fixed policy (see [`numeric`]). Geometry is
//! produced by the first strategy in the chain that succeeds, and the
//! resulting [`GeometryQuality`] tells the caller how much it degraded.

pub mod numeric;
pub mod strategy;
pub mod types;
pub mod utility;

pub use strategy::{BulkDissolve, CentroidFallback, GeometryStrategy, PerGroupUnion, default_chain};
pub use types::{AggregateGeometry, GeometryQuality, MunicipalityAggregate, MunicipalityView, StrategyOutcome};

use crate::error::AggregateError;
use crate::geometry::GeometrySettings;
use crate::model::{Attribute, Dataset};
use crate::schema;
use numeric::{aggregate_group, group_by_municipality};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// Aggregates a dataset to municipality level with the standard chain.
pub fn aggregate_to_municipality(
    dataset: &Dataset,
    settings: &GeometrySettings,
) -> Result<MunicipalityView, AggregateError> {
    aggregate_with(dataset, &default_chain(settings))
}

/// Aggregates with an explicit strategy chain. The input is not modified.
#[instrument(skip_all, fields(records = dataset.len()))]
pub fn aggregate_with(
    dataset: &Dataset,
    chain: &[Box<dyn GeometryStrategy>],
) -> Result<MunicipalityView, AggregateError> {
    if !dataset.has_attribute(Attribute::Municipality) {
        return Err(AggregateError::MissingGroupColumn(schema::categorical::MUNICIPALITY));
    }

    let (groups, without_key) = group_by_municipality(&dataset.records);
    if without_key > 0 {
        warn!(count = without_key, "Records without municipality left out of aggregation");
    }
    if groups.is_empty() {
        let quality = GeometryQuality::NoData;
        warn!("{}", quality.notice());
        return Ok(MunicipalityView {
            rows: Vec::new(),
            quality,
        });
    }

    let mut rows: Vec<MunicipalityAggregate> = groups.iter().map(aggregate_group).collect();
    let mut quality = None;
    let mut pending = groups;

    // The first strategy that succeeds sets the quality; later strategies
    // only fill in the groups it left without geometry.
    for strategy in chain {
        if pending.is_empty() {
            break;
        }
        let (outcome_quality, mut geometries) = match strategy.aggregate(&pending) {
            StrategyOutcome::Polygons { geometries, quality } => (
                quality,
                into_aggregate(geometries, AggregateGeometry::Polygon),
            ),
            StrategyOutcome::Points { geometries, quality } => (
                quality,
                into_aggregate(geometries, AggregateGeometry::Point),
            ),
            StrategyOutcome::Failed(err) => {
                warn!(strategy = strategy.name(), error = %err, "Geometry strategy failed");
                continue;
            }
        };

        pending.retain(|group| !geometries.contains_key(group.key));
        for row in rows.iter_mut().filter(|r| r.geometry.is_none()) {
            row.geometry = geometries.remove(&row.municipality);
        }

        match &quality {
            None => {
                if outcome_quality.is_degraded() {
                    warn!(strategy = strategy.name(), rows = rows.len(), "{}", outcome_quality.notice());
                } else {
                    info!(strategy = strategy.name(), rows = rows.len(), "{}", outcome_quality.notice());
                }
                quality = Some(outcome_quality);
            }
            Some(_) => {
                info!(strategy = strategy.name(), remaining = pending.len(), "Filled in skipped municipalities");
            }
        }
    }

    let quality = quality.unwrap_or_else(|| {
        let quality = GeometryQuality::Unavailable;
        warn!(rows = rows.len(), "{}", quality.notice());
        quality
    });
    let view = MunicipalityView { rows, quality };
    let missing = view.missing_geometry();
    if view.has_geometry() && !missing.is_empty() {
        warn!(count = missing.len(), municipalities = %missing.join(", "), "Municipalities kept without geometry");
    }
    Ok(view)
}

fn into_aggregate<G>(
    geometries: HashMap<String, G>,
    wrap: fn(G) -> AggregateGeometry,
) -> HashMap<String, AggregateGeometry> {
    debug!(groups = geometries.len(), "Attaching geometry");
    geometries.into_iter().map(|(key, g)| (key, wrap(g))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::tests::{sliver, square};
    use crate::model::{Counter, PostalAreaRecord};
    use geo::{Area, MultiPolygon};
    use std::collections::BTreeSet;

    fn dataset(records: Vec<PostalAreaRecord>) -> Dataset {
        Dataset {
            records,
            attributes: BTreeSet::from([Attribute::Municipality]),
            counters: Counter::ALL.into_iter().collect(),
            extra_columns: Vec::new(),
        }
    }

    fn record(pc4: &str, municipality: &str, geometry: MultiPolygon<f64>) -> PostalAreaRecord {
        PostalAreaRecord::new(pc4, geometry)
            .with_attribute(Attribute::Municipality, municipality)
            .with_counter(Counter::Deaths2023, 10.0)
            .with_counter(Counter::Services2023, 2.0)
    }

    fn alpha_beta() -> Dataset {
        dataset(vec![
            record("1011", "Alpha", square(5.0, 52.0, 0.1)),
            record("1012", "Alpha", square(5.1, 52.0, 0.1)),
            record("2011", "Beta", square(6.0, 52.0, 0.1)),
        ])
    }

    #[test]
    fn test_dissolve_one_row_per_municipality() {
        let view = aggregate_to_municipality(&alpha_beta(), &GeometrySettings::default()).unwrap();

        assert_eq!(view.quality, GeometryQuality::Dissolved);
        assert_eq!(view.rows.len(), 2);
        assert_eq!(view.rows[0].municipality, "Alpha");
        assert_eq!(view.rows[0].area_count, 2);
        assert_eq!(view.rows[0].counters.deaths_2023, 20.0);
        assert_eq!(view.rows[0].derived.market_share_2023, 20.0);
        match &view.rows[0].geometry {
            Some(AggregateGeometry::Polygon(mp)) => assert!((mp.unsigned_area() - 0.02).abs() < 1e-9),
            other => panic!("expected polygon, got {other:?}"),
        }
        assert!(view.has_geometry());
    }

    #[test]
    fn test_malformed_member_falls_back_to_per_group() {
        let data = dataset(vec![
            record("1011", "Alpha", square(5.0, 52.0, 0.1)),
            record("1012", "Alpha", sliver(5.1, 52.0)),
            record("2011", "Beta", square(6.0, 52.0, 0.1)),
        ]);
        let view = aggregate_to_municipality(&data, &GeometrySettings::default()).unwrap();

        assert_eq!(view.quality, GeometryQuality::PerGroup { skipped: vec![] });
        assert_eq!(view.rows.len(), 2);
        assert!(view.rows.iter().all(|r| matches!(r.geometry, Some(AggregateGeometry::Polygon(_)))));
    }

    #[test]
    fn test_group_without_valid_member_falls_back_to_centroid() {
        let data = dataset(vec![
            record("1011", "Alpha", square(5.0, 52.0, 0.1)),
            record("2011", "Beta", sliver(6.0, 52.0)),
        ]);
        let view = aggregate_to_municipality(&data, &GeometrySettings::default()).unwrap();

        assert_eq!(
            view.quality,
            GeometryQuality::PerGroup {
                skipped: vec!["Beta".to_string()]
            }
        );
        let names: Vec<_> = view.rows.iter().map(|r| r.municipality.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
        assert!(matches!(view.rows[0].geometry, Some(AggregateGeometry::Polygon(_))));
        assert!(view.rows[1].geometry.as_ref().is_some_and(|g| g.is_point()));
        assert!(view.missing_geometry().is_empty());
    }

    #[test]
    fn test_degenerate_group_keeps_its_numbers() {
        let data = dataset(vec![
            record("1011", "Alpha", square(5.0, 52.0, 0.1)).with_counter(Counter::Deaths2023, 10.0),
            record("1012", "Alpha", square(5.1, 52.0, 0.1)).with_counter(Counter::Deaths2023, 5.0),
            record("2011", "Beta", sliver(6.0, 52.0)).with_counter(Counter::Deaths2023, 20.0),
        ]);
        let view = aggregate_to_municipality(&data, &GeometrySettings::default()).unwrap();

        let postcode_deaths: f64 = data.records.iter().map(|r| r.counters.deaths_2023).sum();
        let municipality_deaths: f64 = view.rows.iter().map(|r| r.counters.deaths_2023).sum();
        assert_eq!(postcode_deaths, 35.0);
        assert_eq!(municipality_deaths, postcode_deaths);
        assert_eq!(view.rows.len(), 2);
        assert_eq!(view.rows[1].counters.deaths_2023, 20.0);
    }

    #[test]
    fn test_group_without_any_geometry_stays_in_table() {
        // Beta has neither a polygon nor a centroid.
        let data = dataset(vec![
            record("1011", "Alpha", square(5.0, 52.0, 0.1)),
            record("2011", "Beta", MultiPolygon::new(vec![])),
        ]);
        let view = aggregate_to_municipality(&data, &GeometrySettings::default()).unwrap();

        assert!(view.quality.is_degraded());
        assert_eq!(view.rows.len(), 2);
        assert!(view.has_geometry());
        assert_eq!(view.missing_geometry(), vec!["Beta"]);
    }

    #[test]
    fn test_empty_dataset_has_no_data() {
        let view = aggregate_to_municipality(&dataset(vec![]), &GeometrySettings::default()).unwrap();

        assert_eq!(view.quality, GeometryQuality::NoData);
        assert!(view.rows.is_empty());
        assert!(!view.has_geometry());
    }

    #[test]
    fn test_all_slivers_fall_back_to_centroids() {
        let data = dataset(vec![
            record("1011", "Alpha", sliver(5.0, 52.0)),
            record("2011", "Beta", sliver(6.0, 52.0)),
        ]);
        let view = aggregate_to_municipality(&data, &GeometrySettings::default()).unwrap();

        assert_eq!(view.quality, GeometryQuality::Centroids { omitted: vec![] });
        assert_eq!(view.rows.len(), 2);
        assert!(view.rows.iter().all(|r| r.geometry.as_ref().is_some_and(|g| g.is_point())));
    }

    #[test]
    fn test_no_geometry_at_all_keeps_table() {
        let data = dataset(vec![
            record("1011", "Alpha", MultiPolygon::new(vec![])),
            record("2011", "Beta", MultiPolygon::new(vec![])),
        ]);
        let view = aggregate_to_municipality(&data, &GeometrySettings::default()).unwrap();

        assert_eq!(view.quality, GeometryQuality::Unavailable);
        assert_eq!(view.rows.len(), 2);
        assert!(!view.has_geometry());
    }

    #[test]
    fn test_missing_municipality_column() {
        let mut data = alpha_beta();
        data.attributes.clear();

        let err = aggregate_to_municipality(&data, &GeometrySettings::default()).unwrap_err();
        assert_eq!(err, AggregateError::MissingGroupColumn("gemeente"));
    }

    #[test]
    fn test_input_untouched_and_repeatable() {
        let data = alpha_beta();
        let before = data.clone();

        let first = aggregate_to_municipality(&data, &GeometrySettings::default()).unwrap();
        let second = aggregate_to_municipality(&data, &GeometrySettings::default()).unwrap();

        assert_eq!(data, before);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_chain_is_unavailable() {
        let view = aggregate_with(&alpha_beta(), &[]).unwrap();
        assert_eq!(view.quality, GeometryQuality::Unavailable);
        assert_eq!(view.rows.len(), 2);
    }
}
