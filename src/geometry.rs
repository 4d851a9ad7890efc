//! Polygon helpers on top of `geo`: simplification, healing, guarded union,
//! centroids and GeoJSON conversion.

use crate::error::GeometryError;
use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{
    Area, BooleanOps, Centroid, Coord, Line, LineString, MultiPolygon, Point, Polygon, Simplify,
};
use serde_json::{Value, json};
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Tolerance applied once at load time, for rendering.
pub const DISPLAY_TOLERANCE: f64 = 0.001;
/// Coarser tolerance applied before dissolving postcodes into municipalities.
pub const DISSOLVE_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometrySettings {
    pub display_tolerance: f64,
    pub dissolve_tolerance: f64,
}

impl Default for GeometrySettings {
    fn default() -> Self {
        Self {
            display_tolerance: DISPLAY_TOLERANCE,
            dissolve_tolerance: DISSOLVE_TOLERANCE,
        }
    }
}

/// Douglas-Peucker simplification that never collapses a ring and never
/// makes edges cross.
///
/// A ring that would drop below four coordinates or cross itself keeps its
/// original coordinates; holes that collapse are removed. A polygon whose
/// simplified rings cross each other is kept unsimplified.
pub fn simplify(geometry: &MultiPolygon<f64>, tolerance: f64) -> MultiPolygon<f64> {
    if tolerance <= 0.0 {
        return geometry.clone();
    }

    let polygons = geometry
        .0
        .iter()
        .map(|polygon| simplify_polygon(polygon, tolerance))
        .collect();

    MultiPolygon::new(polygons)
}

fn simplify_polygon(polygon: &Polygon<f64>, tolerance: f64) -> Polygon<f64> {
    let exterior =
        simplify_ring(polygon.exterior(), tolerance).unwrap_or_else(|| polygon.exterior().clone());
    let interiors: Vec<LineString<f64>> = polygon
        .interiors()
        .iter()
        .filter_map(|ring| simplify_ring(ring, tolerance))
        .collect();

    let rings: Vec<&LineString<f64>> = std::iter::once(&exterior).chain(&interiors).collect();
    let crossing = rings
        .iter()
        .enumerate()
        .any(|(i, a)| rings[i + 1..].iter().any(|b| rings_cross(a, b)));
    if crossing {
        return polygon.clone();
    }
    Polygon::new(exterior, interiors)
}

fn simplify_ring(ring: &LineString<f64>, tolerance: f64) -> Option<LineString<f64>> {
    let simplified = ring.simplify(&tolerance);
    if simplified.0.len() < 4 {
        return None;
    }
    if ring_self_intersects(&simplified) {
        return Some(ring.clone());
    }
    Some(simplified)
}

fn edges(ring: &LineString<f64>) -> Vec<Line<f64>> {
    ring.lines().filter(|l| l.start != l.end).collect()
}

/// True when two non-neighbouring edges of a closed ring meet, or two
/// neighbouring edges overlap.
fn ring_self_intersects(ring: &LineString<f64>) -> bool {
    let edges = edges(ring);
    let n = edges.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let neighbours = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(edges[i], edges[j]) {
                None => {}
                Some(LineIntersection::SinglePoint { .. }) if neighbours => {}
                Some(_) => return true,
            }
        }
    }
    false
}

fn rings_cross(a: &LineString<f64>, b: &LineString<f64>) -> bool {
    let b_edges = edges(b);
    edges(a)
        .into_iter()
        .any(|ea| b_edges.iter().any(|eb| line_intersection(ea, *eb).is_some()))
}

/// Repairs the small defects a zero-width buffer would: repeated vertices,
/// non-finite coordinates, collapsed rings and zero-area parts.
///
/// Fails when nothing with a positive area survives.
pub fn heal(pc4: &str, geometry: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, GeometryError> {
    if geometry.0.is_empty() {
        return Err(malformed(pc4, "empty geometry"));
    }

    let mut polygons = Vec::with_capacity(geometry.0.len());
    for polygon in &geometry.0 {
        let Some(exterior) = clean_ring(polygon.exterior()) else {
            continue;
        };
        let interiors = polygon.interiors().iter().filter_map(clean_ring).collect();
        let healed = Polygon::new(exterior, interiors);
        if healed.unsigned_area() > 0.0 {
            polygons.push(healed);
        }
    }

    if polygons.is_empty() {
        return Err(malformed(pc4, "no part with a positive area"));
    }
    Ok(MultiPolygon::new(polygons))
}

fn clean_ring(ring: &LineString<f64>) -> Option<LineString<f64>> {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len());
    for c in &ring.0 {
        if !c.x.is_finite() || !c.y.is_finite() {
            return None;
        }
        if coords.last() != Some(c) {
            coords.push(*c);
        }
    }
    if let (Some(first), Some(last)) = (coords.first().copied(), coords.last().copied()) {
        if first != last {
            coords.push(first);
        }
    }
    (coords.len() >= 4).then(|| LineString::new(coords))
}

fn malformed(pc4: &str, reason: &str) -> GeometryError {
    GeometryError::Malformed {
        pc4: pc4.to_string(),
        reason: reason.to_string(),
    }
}

/// Unions all parts into one multipolygon.
///
/// The boolean-ops backend can panic on degenerate input; that, like an
/// empty result, is reported as [`GeometryError::UnionFailed`].
pub fn union_all(group: &str, parts: &[&MultiPolygon<f64>]) -> Result<MultiPolygon<f64>, GeometryError> {
    let union = catch_unwind(AssertUnwindSafe(|| {
        parts
            .iter()
            .fold(MultiPolygon::new(vec![]), |acc, part| acc.union(*part))
    }));

    match union {
        Ok(merged) if !merged.0.is_empty() => Ok(merged),
        _ => Err(GeometryError::UnionFailed {
            group: group.to_string(),
        }),
    }
}

/// Area-weighted centroid, or `None` for empty or non-finite geometry.
pub fn centroid(geometry: &MultiPolygon<f64>) -> Option<Point<f64>> {
    geometry
        .centroid()
        .filter(|p| p.x().is_finite() && p.y().is_finite())
}

/// Arithmetic mean of points; `None` for an empty slice.
pub fn mean_point(points: &[Point<f64>]) -> Option<Point<f64>> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x(), sy + p.y()));
    Some(Point::new(sx / n, sy / n))
}

/// Builds a multipolygon from GeoJSON `Polygon` or `MultiPolygon` coordinates.
pub fn from_geojson(kind: &str, coordinates: &Value) -> Result<MultiPolygon<f64>, String> {
    match kind {
        "Polygon" => {
            let rings: Vec<Vec<Vec<f64>>> =
                serde_json::from_value(coordinates.clone()).map_err(|e| e.to_string())?;
            Ok(MultiPolygon::new(vec![polygon_from_rings(rings)?]))
        }
        "MultiPolygon" => {
            let polygons: Vec<Vec<Vec<Vec<f64>>>> =
                serde_json::from_value(coordinates.clone()).map_err(|e| e.to_string())?;
            let polygons = polygons
                .into_iter()
                .map(polygon_from_rings)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(MultiPolygon::new(polygons))
        }
        other => Err(format!("unsupported geometry type '{}'", other)),
    }
}

fn polygon_from_rings(rings: Vec<Vec<Vec<f64>>>) -> Result<Polygon<f64>, String> {
    let mut rings = rings.into_iter().map(ring_from_positions);
    let exterior = rings.next().ok_or("polygon without rings")??;
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn ring_from_positions(positions: Vec<Vec<f64>>) -> Result<LineString<f64>, String> {
    positions
        .into_iter()
        .map(|p| match p.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err("position with fewer than two coordinates".to_string()),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::new)
}

pub fn multi_polygon_to_geojson(geometry: &MultiPolygon<f64>) -> Value {
    let polygons: Vec<Vec<Vec<[f64; 2]>>> = geometry
        .0
        .iter()
        .map(|polygon| {
            std::iter::once(polygon.exterior())
                .chain(polygon.interiors())
                .map(|ring| ring.0.iter().map(|c| [c.x, c.y]).collect())
                .collect()
        })
        .collect();
    json!({ "type": "MultiPolygon", "coordinates": polygons })
}

pub fn point_to_geojson(point: &Point<f64>) -> Value {
    json!({ "type": "Point", "coordinates": [point.x(), point.y()] })
}
