//! Data types produced by the municipality aggregation.

use crate::error::GeometryError;
use crate::geometry;
use crate::metrics::{DerivedMetrics, MetricSource};
use crate::model::Counters;
use geo::{MultiPolygon, Point};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Geometry attached to a municipality row.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateGeometry {
    Polygon(MultiPolygon<f64>),
    /// Representative point used when polygons could not be merged.
    Point(Point<f64>),
}

impl AggregateGeometry {
    pub fn is_point(&self) -> bool {
        matches!(self, AggregateGeometry::Point(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AggregateGeometry::Polygon(_) => "MultiPolygon",
            AggregateGeometry::Point(_) => "Point",
        }
    }

    pub fn to_geojson(&self) -> Value {
        match self {
            AggregateGeometry::Polygon(mp) => geometry::multi_polygon_to_geojson(mp),
            AggregateGeometry::Point(p) => geometry::point_to_geojson(p),
        }
    }
}

/// One municipality built from its postcode rows.
#[derive(Debug, Clone, PartialEq)]
pub struct MunicipalityAggregate {
    pub municipality: String,
    /// Number of postcode rows folded into this one.
    pub area_count: usize,
    /// Summed counters; `travel_time_minutes` holds the member mean.
    pub counters: Counters,
    /// Summed extras, only for columns some member actually carried.
    pub extras: BTreeMap<String, f64>,
    pub derived: DerivedMetrics,
    pub geometry: Option<AggregateGeometry>,
}

impl MetricSource for MunicipalityAggregate {
    fn area_label(&self) -> &str {
        &self.municipality
    }

    fn counters(&self) -> &Counters {
        &self.counters
    }

    fn derived(&self) -> DerivedMetrics {
        self.derived
    }

    fn municipality(&self) -> Option<&str> {
        Some(&self.municipality)
    }

    fn locality(&self) -> Option<&str> {
        None
    }
}

/// How well the geometry survived aggregation. Surfaced to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryQuality {
    /// Every municipality dissolved in one pass.
    Dissolved,
    /// Unions ran per municipality; `skipped` had no usable member polygon.
    /// Their rows are kept and retried with the later strategies.
    PerGroup { skipped: Vec<String> },
    /// Polygons were replaced by mean member centroids.
    Centroids { omitted: Vec<String> },
    /// No geometry at all; only the numeric table is usable.
    Unavailable,
    /// Nothing to aggregate, e.g. every record was filtered out.
    NoData,
}

impl GeometryQuality {
    pub fn is_degraded(&self) -> bool {
        !matches!(self, GeometryQuality::Dissolved)
    }

    pub fn notice(&self) -> String {
        match self {
            GeometryQuality::Dissolved => {
                "Municipality map built from dissolved postcode polygons.".to_string()
            }
            GeometryQuality::PerGroup { skipped } if skipped.is_empty() => {
                "Municipality map built with per-municipality unions.".to_string()
            }
            GeometryQuality::PerGroup { skipped } => format!(
                "Municipality map built with per-municipality unions; {} municipalities without a usable polygon shown as centroids or in the table only: {}",
                skipped.len(),
                skipped.join(", ")
            ),
            GeometryQuality::Centroids { omitted } if omitted.is_empty() => {
                "Municipality map shows centroids (points) instead of polygons.".to_string()
            }
            GeometryQuality::Centroids { omitted } => format!(
                "Municipality map shows centroids (points) instead of polygons; {} municipalities in the table only: {}",
                omitted.len(),
                omitted.join(", ")
            ),
            GeometryQuality::Unavailable => {
                "All methods for municipality geometry failed; showing the table only.".to_string()
            }
            GeometryQuality::NoData => "No data: there are no postcode areas to aggregate.".to_string(),
        }
    }
}

/// Tagged result of one geometry strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    Polygons {
        geometries: HashMap<String, MultiPolygon<f64>>,
        quality: GeometryQuality,
    },
    Points {
        geometries: HashMap<String, Point<f64>>,
        quality: GeometryQuality,
    },
    Failed(GeometryError),
}

/// Municipality-level rows plus the geometry quality they were built with.
#[derive(Debug, Clone, PartialEq)]
pub struct MunicipalityView {
    pub rows: Vec<MunicipalityAggregate>,
    pub quality: GeometryQuality,
}

impl MunicipalityView {
    /// False when every strategy failed and the caller should show a table.
    pub fn has_geometry(&self) -> bool {
        self.rows.iter().any(|r| r.geometry.is_some())
    }

    /// Municipalities that are in the table but not on the map.
    pub fn missing_geometry(&self) -> Vec<&str> {
        self.rows
            .iter()
            .filter(|r| r.geometry.is_none())
            .map(|r| r.municipality.as_str())
            .collect()
    }
}
