//! Reads the PC4 statistics table and the PC4 boundary collection and joins
//! them on a normalized postcode key.

use crate::error::LoadError;
use crate::geometry::{self, GeometrySettings};
use crate::model::{Attribute, Counter, Counters, Dataset, PostalAreaRecord};
use crate::schema::{KEY_HINTS, PC4, derived};
use csv::{ReaderBuilder, StringRecord, Trim};
use geo::MultiPolygon;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

const TABLE: &str = "table";
const BOUNDARIES: &str = "boundaries";
const KEY_SAMPLE: usize = 10;

/// One row of the statistics table, before the join.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub pc4: String,
    pub attributes: BTreeMap<Attribute, String>,
    pub counters: Counters,
    pub extras: BTreeMap<String, f64>,
}

/// The parsed statistics table and the columns it carried.
#[derive(Debug, Clone, Default)]
pub struct TableSource {
    pub rows: Vec<TableRow>,
    pub attributes: BTreeSet<Attribute>,
    pub counters: BTreeSet<Counter>,
    pub extra_columns: Vec<String>,
}

/// One boundary feature with its normalized key and display geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryFeature {
    pub pc4: String,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Deserialize)]
struct RawCollection {
    #[serde(default)]
    features: Vec<RawFeature>,
}

#[derive(Debug, Deserialize)]
struct RawFeature {
    geometry: Option<RawGeometry>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RawGeometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

/// Parses both sources and inner-joins them.
#[tracing::instrument(skip_all, fields(table_bytes = table.len(), boundary_bytes = boundaries.len()))]
pub fn load(
    table: &[u8],
    boundaries: &[u8],
    settings: &GeometrySettings,
) -> Result<Dataset, LoadError> {
    let table = parse_table(table)?;
    let features = parse_boundaries(boundaries, settings.display_tolerance)?;
    join(table, features)
}

/// Trims a key and strips a `.0` suffix left behind by spreadsheet exports.
/// Leading zeros are kept.
pub fn normalize_key(raw: &str) -> String {
    let key = raw.trim();
    match key.split_once('.') {
        Some((int, frac))
            if !int.is_empty()
                && int.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b == b'0') =>
        {
            int.to_string()
        }
        _ => key.to_string(),
    }
}

fn parse_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn find_table_key(columns: &[String]) -> Option<usize> {
    columns
        .iter()
        .position(|c| c == PC4)
        .or_else(|| columns.iter().position(|c| c.eq_ignore_ascii_case(PC4)))
}

fn find_boundary_key(columns: &[String]) -> Option<&str> {
    if let Some(exact) = columns.iter().find(|c| c.as_str() == PC4) {
        return Some(exact.as_str());
    }
    columns
        .iter()
        .find(|c| {
            let lower = c.to_lowercase();
            KEY_HINTS.iter().any(|hint| lower.contains(hint))
        })
        .map(String::as_str)
}

fn malformed(input: &'static str, err: impl ToString) -> LoadError {
    LoadError::Malformed {
        input,
        message: err.to_string(),
    }
}

/// Parses the CSV statistics table.
///
/// Rows missing any of the categorical columns the table does carry are
/// dropped, as are rows without a key. Counter columns absent from the
/// header read as zero; non-numeric counter cells do too. Columns outside
/// the known schema whose values are all numeric become extras.
#[tracing::instrument(skip_all, fields(bytes = bytes.len()))]
pub fn parse_table(bytes: &[u8]) -> Result<TableSource, LoadError> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| malformed(TABLE, e))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();
    debug!(?columns, "Table columns");

    let key_idx = find_table_key(&columns).ok_or_else(|| LoadError::MissingKeyColumn {
        input: TABLE,
        column: PC4,
        available: columns.join(", "),
    })?;
    if columns[key_idx] != PC4 {
        info!(column = %columns[key_idx], "Using table column as PC4");
    }

    let records: Vec<StringRecord> = reader
        .records()
        .collect::<Result<_, _>>()
        .map_err(|e| malformed(TABLE, e))?;

    let mut attribute_cols = Vec::new();
    let mut counter_cols = Vec::new();
    let mut other_cols = Vec::new();
    for (idx, name) in columns.iter().enumerate() {
        if idx == key_idx || derived::ALL.contains(&name.as_str()) {
            continue;
        }
        if let Some(attribute) = Attribute::from_column(name) {
            attribute_cols.push((idx, attribute));
        } else if let Some(counter) = Counter::from_column(name) {
            counter_cols.push((idx, counter));
        } else {
            other_cols.push((idx, name.clone()));
        }
    }

    let extra_cols: Vec<(usize, String)> = other_cols
        .into_iter()
        .filter(|(idx, _)| {
            let mut cells = records
                .iter()
                .filter_map(|r| r.get(*idx))
                .filter(|c| !c.is_empty())
                .peekable();
            cells.peek().is_some() && cells.all(|c| parse_number(c).is_some())
        })
        .collect();

    let missing_attributes: Vec<_> = Attribute::ALL
        .iter()
        .filter(|a| !attribute_cols.iter().any(|(_, found)| found == *a))
        .map(|a| a.column())
        .collect();
    if !missing_attributes.is_empty() {
        warn!(missing = ?missing_attributes, "Expected columns missing from table");
    }
    for counter in Counter::ALL {
        if !counter_cols.iter().any(|(_, found)| *found == counter) {
            warn!(column = counter.column(), "Counter column missing, filled with 0");
        }
    }

    let mut rows = Vec::with_capacity(records.len());
    let mut seen = HashSet::new();
    let (mut without_key, mut incomplete, mut duplicates) = (0usize, 0usize, 0usize);

    for record in &records {
        let pc4 = normalize_key(record.get(key_idx).unwrap_or(""));
        if pc4.is_empty() {
            without_key += 1;
            continue;
        }

        let mut attributes = BTreeMap::new();
        for (idx, attribute) in &attribute_cols {
            match record.get(*idx).filter(|v| !v.is_empty()) {
                Some(value) => {
                    attributes.insert(*attribute, value.to_string());
                }
                None => break,
            }
        }
        if attributes.len() != attribute_cols.len() {
            incomplete += 1;
            continue;
        }

        if !seen.insert(pc4.clone()) {
            duplicates += 1;
            continue;
        }

        let mut counters = Counters::default();
        for (idx, counter) in &counter_cols {
            let cell = record.get(*idx).unwrap_or("");
            let value = parse_number(cell).unwrap_or_else(|| {
                if !cell.is_empty() {
                    debug!(pc4 = %pc4, column = counter.column(), cell, "Non-numeric counter read as 0");
                }
                0.0
            });
            counters.set(*counter, value);
        }

        let extras = extra_cols
            .iter()
            .filter_map(|(idx, name)| {
                record
                    .get(*idx)
                    .and_then(parse_number)
                    .map(|v| (name.clone(), v))
            })
            .collect();

        rows.push(TableRow {
            pc4,
            attributes,
            counters,
            extras,
        });
    }

    info!(
        rows = rows.len(),
        without_key, incomplete, duplicates, "Table parsed"
    );

    Ok(TableSource {
        rows,
        attributes: attribute_cols.iter().map(|(_, a)| *a).collect(),
        counters: counter_cols.iter().map(|(_, c)| *c).collect(),
        extra_columns: extra_cols.into_iter().map(|(_, name)| name).collect(),
    })
}

fn key_from_value(value: &Value) -> Option<String> {
    let key = match value {
        Value::String(s) => normalize_key(s),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => normalize_key(&n.to_string()),
        },
        _ => return None,
    };
    (!key.is_empty()).then_some(key)
}

/// Parses a GeoJSON feature collection of PC4 polygons and simplifies
/// them at `tolerance`.
///
/// The key is the `PC4` property, or else the first property whose name
/// mentions a postcode. Features without a key or usable polygon geometry
/// are skipped; repeated keys keep their first feature.
#[tracing::instrument(skip_all, fields(bytes = bytes.len(), tolerance = tolerance))]
pub fn parse_boundaries(bytes: &[u8], tolerance: f64) -> Result<Vec<BoundaryFeature>, LoadError> {
    let collection: RawCollection =
        serde_json::from_slice(bytes).map_err(|e| malformed(BOUNDARIES, e))?;

    let mut columns: Vec<String> = Vec::new();
    for feature in &collection.features {
        for name in feature.properties.iter().flat_map(|p| p.keys()) {
            if !columns.contains(name) {
                columns.push(name.clone());
            }
        }
    }
    debug!(?columns, "Boundary columns");

    let key_column = find_boundary_key(&columns)
        .ok_or_else(|| LoadError::MissingKeyColumn {
            input: BOUNDARIES,
            column: PC4,
            available: columns.join(", "),
        })?
        .to_string();
    if key_column != PC4 {
        info!(column = %key_column, "Renamed boundary column to PC4");
    }

    let total = collection.features.len();
    let mut features = Vec::with_capacity(total);
    let mut seen = HashSet::new();
    let (mut without_key, mut without_geometry, mut duplicates) = (0usize, 0usize, 0usize);

    for raw in collection.features {
        let Some(pc4) = raw
            .properties
            .as_ref()
            .and_then(|p| p.get(&key_column))
            .and_then(key_from_value)
        else {
            without_key += 1;
            continue;
        };

        let Some(raw_geometry) = raw.geometry else {
            without_geometry += 1;
            continue;
        };
        let geometry = match geometry::from_geojson(&raw_geometry.kind, &raw_geometry.coordinates) {
            Ok(g) => g,
            Err(reason) => {
                warn!(pc4 = %pc4, reason = %reason, "Skipping boundary feature");
                without_geometry += 1;
                continue;
            }
        };

        if !seen.insert(pc4.clone()) {
            duplicates += 1;
            continue;
        }

        features.push(BoundaryFeature {
            pc4,
            geometry: geometry::simplify(&geometry, tolerance),
        });
    }

    info!(
        total,
        kept = features.len(),
        without_key,
        without_geometry,
        duplicates,
        "Boundaries parsed"
    );
    Ok(features)
}

/// Inner join in boundary order. Zero overlap is [`LoadError::EmptyJoin`].
#[tracing::instrument(skip_all, fields(table_rows = table.rows.len(), boundary_rows = features.len()))]
pub fn join(table: TableSource, features: Vec<BoundaryFeature>) -> Result<Dataset, LoadError> {
    let table_rows = table.rows.len();
    let boundary_rows = features.len();
    let table_sample: Vec<String> = table
        .rows
        .iter()
        .take(KEY_SAMPLE)
        .map(|r| r.pc4.clone())
        .collect();

    let mut by_key: HashMap<String, TableRow> = table
        .rows
        .into_iter()
        .map(|row| (row.pc4.clone(), row))
        .collect();

    let mut records = Vec::new();
    let mut boundary_sample = Vec::new();
    for feature in features {
        if boundary_sample.len() < KEY_SAMPLE {
            boundary_sample.push(feature.pc4.clone());
        }
        if let Some(row) = by_key.remove(&feature.pc4) {
            records.push(PostalAreaRecord {
                pc4: row.pc4,
                attributes: row.attributes,
                counters: row.counters,
                extras: row.extras,
                derived: Default::default(),
                geometry: feature.geometry,
            });
        }
    }

    info!(
        table_rows,
        boundary_rows,
        joined = records.len(),
        "Merged datasets"
    );

    if records.is_empty() {
        return Err(LoadError::EmptyJoin {
            table_rows,
            boundary_rows,
            table_sample,
            boundary_sample,
        });
    }

    Ok(Dataset {
        records,
        attributes: table.attributes,
        counters: table.counters,
        extra_columns: table.extra_columns,
    })
}
