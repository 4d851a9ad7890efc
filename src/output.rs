//! Output formatting and persistence for dashboard views.
//!
//! Supports pretty-printing, JSON logging, CSV exports and the GeoJSON map
//! layer.

use anyhow::Result;
use chrono::Utc;
use csv::WriterBuilder;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::fs::File;
use std::io::Write;
use tracing::{debug, info};

use crate::aggregator::MunicipalityAggregate;
use crate::geometry;
use crate::metrics::{Metric, MetricSource};
use crate::model::{Attribute, Counter, Dataset, PostalAreaRecord};
use crate::schema::{PC4, derived, municipality};
use crate::stats::SummaryStats;

/// Logs a value using Rust's debug pretty-print format.
pub fn print_pretty<T: Debug>(value: &T) {
    debug!("{:#?}", value);
}

/// Logs a value as pretty-printed JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn number(value: f64) -> String {
    value.to_string()
}

/// Writes postcode records without geometry: key, attributes, counters,
/// derived ratios, then extras.
pub fn write_records<W: Write>(writer: W, dataset: &Dataset) -> Result<()> {
    let attributes: Vec<Attribute> = Attribute::ALL
        .into_iter()
        .filter(|a| dataset.has_attribute(*a))
        .collect();

    let mut header: Vec<&str> = vec![PC4];
    header.extend(attributes.iter().map(|a| a.column()));
    header.extend(Counter::ALL.iter().map(|c| c.column()));
    header.extend(derived::ALL);
    header.extend(dataset.extra_columns.iter().map(String::as_str));

    let mut writer = WriterBuilder::new().from_writer(writer);
    writer.write_record(&header)?;

    for record in &dataset.records {
        let mut row: Vec<String> = vec![record.pc4.clone()];
        row.extend(
            attributes
                .iter()
                .map(|a| record.attribute(*a).unwrap_or_default().to_string()),
        );
        row.extend(Counter::ALL.iter().map(|c| number(record.counters.get(*c))));
        row.push(number(record.derived.market_share_2023));
        row.push(number(record.derived.insured_percentage));
        row.extend(
            dataset
                .extra_columns
                .iter()
                .map(|name| record.extras.get(name).map(|v| number(*v)).unwrap_or_default()),
        );
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes the `Kenmerk,Waarde` summary table.
pub fn write_summary<W: Write>(writer: W, stats: &SummaryStats) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(writer);
    for line in stats.table() {
        writer.serialize(line)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes municipality rows as a table; the geometry is reduced to its kind.
pub fn write_municipalities<W: Write>(writer: W, rows: &[MunicipalityAggregate]) -> Result<()> {
    let extras: BTreeSet<&str> = rows
        .iter()
        .flat_map(|r| r.extras.keys().map(String::as_str))
        .collect();

    let mut header: Vec<&str> = vec![Attribute::Municipality.column(), municipality::AREA_COUNT];
    header.extend(Counter::ALL.iter().map(|c| c.column()));
    header.extend(derived::ALL);
    header.extend(extras.iter().copied());
    header.push(municipality::GEOMETRY_TYPE);

    let mut writer = WriterBuilder::new().from_writer(writer);
    writer.write_record(&header)?;

    for row in rows {
        let mut line: Vec<String> = vec![row.municipality.clone(), row.area_count.to_string()];
        line.extend(Counter::ALL.iter().map(|c| number(row.counters.get(*c))));
        line.push(number(row.derived.market_share_2023));
        line.push(number(row.derived.insured_percentage));
        line.extend(
            extras
                .iter()
                .map(|name| row.extras.get(*name).map(|v| number(*v)).unwrap_or_default()),
        );
        line.push(row.geometry.as_ref().map(|g| g.kind()).unwrap_or_default().to_string());
        writer.write_record(&line)?;
    }

    writer.flush()?;
    Ok(())
}

/// A row that can be drawn on the map.
pub trait MapFeature: MetricSource {
    fn properties(&self) -> Map<String, Value>;
    fn geometry_json(&self) -> Option<Value>;
}

fn counter_properties(props: &mut Map<String, Value>, source: &impl MetricSource) {
    for counter in Counter::ALL {
        props.insert(counter.column().to_string(), json!(source.counters().get(counter)));
    }
    let derived_values = source.derived();
    props.insert(derived::MARKET_SHARE_2023.to_string(), json!(derived_values.market_share_2023));
    props.insert(derived::INSURED_PERCENTAGE.to_string(), json!(derived_values.insured_percentage));
}

impl MapFeature for PostalAreaRecord {
    fn properties(&self) -> Map<String, Value> {
        let mut props = Map::new();
        props.insert(PC4.to_string(), json!(self.pc4));
        for (attribute, value) in &self.attributes {
            props.insert(attribute.column().to_string(), json!(value));
        }
        counter_properties(&mut props, self);
        for (name, value) in &self.extras {
            props.insert(name.clone(), json!(value));
        }
        props
    }

    fn geometry_json(&self) -> Option<Value> {
        (!self.geometry.0.is_empty()).then(|| geometry::multi_polygon_to_geojson(&self.geometry))
    }
}

impl MapFeature for MunicipalityAggregate {
    fn properties(&self) -> Map<String, Value> {
        let mut props = Map::new();
        props.insert(Attribute::Municipality.column().to_string(), json!(self.municipality));
        props.insert(municipality::AREA_COUNT.to_string(), json!(self.area_count));
        counter_properties(&mut props, self);
        for (name, value) in &self.extras {
            props.insert(name.clone(), json!(value));
        }
        props
    }

    fn geometry_json(&self) -> Option<Value> {
        self.geometry.as_ref().map(|g| g.to_geojson())
    }
}

/// Builds a GeoJSON FeatureCollection coloured by `metric` via the `value`
/// property. Rows without geometry are left out.
pub fn map_layer<T: MapFeature>(rows: &[T], metric: Metric) -> Value {
    let features: Vec<Value> = rows
        .iter()
        .filter_map(|row| {
            let geometry = row.geometry_json()?;
            let mut props = row.properties();
            props.insert("value".to_string(), json!(metric.value(row)));
            Some(json!({
                "type": "Feature",
                "geometry": geometry,
                "properties": props,
            }))
        })
        .collect();

    debug!(rows = rows.len(), features = features.len(), %metric, "Built map layer");

    json!({
        "type": "FeatureCollection",
        "metric": metric.column(),
        "metric_name": metric.display_name(),
        "generated_at": Utc::now().to_rfc3339(),
        "features": features,
    })
}

/// Writes a GeoJSON value to `path`, overwriting it.
pub fn write_geojson(path: &str, layer: &Value) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer(file, layer)?;
    info!(path, "Wrote map layer");
    Ok(())
}

pub fn export_records(path: &str, dataset: &Dataset) -> Result<()> {
    write_records(File::create(path)?, dataset)?;
    info!(path, rows = dataset.len(), "Exported records");
    Ok(())
}

pub fn export_summary(path: &str, stats: &SummaryStats) -> Result<()> {
    write_summary(File::create(path)?, stats)?;
    info!(path, area = %stats.area, "Exported summary");
    Ok(())
}

pub fn export_municipalities(path: &str, rows: &[MunicipalityAggregate]) -> Result<()> {
    write_municipalities(File::create(path)?, rows)?;
    info!(path, rows = rows.len(), "Exported municipalities");
    Ok(())
}

/// Default name for a record export of `count` areas.
pub fn records_file_name(count: usize) -> String {
    format!("pc4_data_export_{}_gebieden.csv", count)
}

/// Default name for a summary export of the area described by `label`.
pub fn summary_file_name(label: &str) -> String {
    format!("statistieken_{}.csv", label.replace(':', "").replace(',', "_"))
}
