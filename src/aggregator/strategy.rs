//! Geometry strategies for municipality aggregation, tried in order until
//! one produces geometry.

use crate::aggregator::numeric::Group;
use crate::aggregator::types::{GeometryQuality, StrategyOutcome};
use crate::error::GeometryError;
use crate::geometry::{self, GeometrySettings};
use crate::model::PostalAreaRecord;
use geo::MultiPolygon;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Signature of the polygon union used by the polygon strategies.
pub type UnionFn = fn(&str, &[&MultiPolygon<f64>]) -> Result<MultiPolygon<f64>, GeometryError>;

pub trait GeometryStrategy {
    fn name(&self) -> &'static str;

    /// Produces geometry per group key, or fails as a whole.
    fn aggregate(&self, groups: &[Group<'_>]) -> StrategyOutcome;
}

/// The standard chain: bulk dissolve, per-group union, centroids.
pub fn default_chain(settings: &GeometrySettings) -> Vec<Box<dyn GeometryStrategy>> {
    vec![
        Box::new(BulkDissolve::new(settings.dissolve_tolerance)),
        Box::new(PerGroupUnion::new(settings.dissolve_tolerance)),
        Box::new(CentroidFallback),
    ]
}

/// Simplified and healed copy of a record's polygon.
fn prepare(record: &PostalAreaRecord, tolerance: f64) -> Result<MultiPolygon<f64>, GeometryError> {
    geometry::heal(&record.pc4, &geometry::simplify(&record.geometry, tolerance))
}

/// Simplify, heal and dissolve every group in one pass.
///
/// A single malformed member anywhere fails the whole pass.
pub struct BulkDissolve {
    pub tolerance: f64,
    pub union: UnionFn,
}

impl BulkDissolve {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            union: geometry::union_all,
        }
    }
}

impl GeometryStrategy for BulkDissolve {
    fn name(&self) -> &'static str {
        "bulk_dissolve"
    }

    fn aggregate(&self, groups: &[Group<'_>]) -> StrategyOutcome {
        let mut prepared = Vec::with_capacity(groups.len());
        for group in groups {
            let mut parts = Vec::with_capacity(group.members.len());
            for member in &group.members {
                match prepare(member, self.tolerance) {
                    Ok(part) => parts.push(part),
                    Err(err) => return StrategyOutcome::Failed(err),
                }
            }
            prepared.push((group.key, parts));
        }

        let mut geometries = HashMap::with_capacity(prepared.len());
        for (key, parts) in &prepared {
            let refs: Vec<&MultiPolygon<f64>> = parts.iter().collect();
            match (self.union)(key, &refs) {
                Ok(merged) => {
                    geometries.insert(key.to_string(), merged);
                }
                Err(err) => return StrategyOutcome::Failed(err),
            }
        }

        StrategyOutcome::Polygons {
            geometries,
            quality: GeometryQuality::Dissolved,
        }
    }
}

/// Union each group on its own so one bad group cannot sink the rest.
///
/// When a group's union fails its first usable member polygon is taken
/// unchanged. Groups with no usable member are skipped and listed in the
/// resulting quality.
pub struct PerGroupUnion {
    pub tolerance: f64,
    pub union: UnionFn,
}

impl PerGroupUnion {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            union: geometry::union_all,
        }
    }
}

impl GeometryStrategy for PerGroupUnion {
    fn name(&self) -> &'static str {
        "per_group_union"
    }

    fn aggregate(&self, groups: &[Group<'_>]) -> StrategyOutcome {
        let mut geometries = HashMap::with_capacity(groups.len());
        let mut skipped = Vec::new();

        for group in groups {
            let valid: Vec<(&PostalAreaRecord, MultiPolygon<f64>)> = group
                .members
                .iter()
                .filter_map(|member| match prepare(member, self.tolerance) {
                    Ok(part) => Some((*member, part)),
                    Err(err) => {
                        debug!(group = group.key, error = %err, "Dropping member geometry");
                        None
                    }
                })
                .collect();

            let Some((first, _)) = valid.first() else {
                warn!(group = group.key, "No usable member geometry, skipping group");
                skipped.push(group.key.to_string());
                continue;
            };

            let refs: Vec<&MultiPolygon<f64>> = valid.iter().map(|(_, part)| part).collect();
            let merged = match (self.union)(group.key, &refs) {
                Ok(merged) => merged,
                Err(err) => {
                    warn!(group = group.key, error = %err, pc4 = %first.pc4, "Union failed, using first member polygon");
                    first.geometry.clone()
                }
            };
            geometries.insert(group.key.to_string(), merged);
        }

        if geometries.is_empty() && !groups.is_empty() {
            return StrategyOutcome::Failed(GeometryError::Exhausted);
        }

        StrategyOutcome::Polygons {
            geometries,
            quality: GeometryQuality::PerGroup { skipped },
        }
    }
}

/// Mean of member centroids per group, as a point.
pub struct CentroidFallback;

impl GeometryStrategy for CentroidFallback {
    fn name(&self) -> &'static str {
        "centroid_fallback"
    }

    fn aggregate(&self, groups: &[Group<'_>]) -> StrategyOutcome {
        let mut geometries = HashMap::with_capacity(groups.len());
        let mut omitted = Vec::new();

        for group in groups {
            let centroids: Vec<_> = group
                .members
                .iter()
                .filter_map(|member| geometry::centroid(&member.geometry))
                .collect();

            match geometry::mean_point(&centroids) {
                Some(point) => {
                    geometries.insert(group.key.to_string(), point);
                }
                None => {
                    warn!(group = group.key, "No member centroid, omitting group");
                    omitted.push(group.key.to_string());
                }
            }
        }

        if geometries.is_empty() && !groups.is_empty() {
            return StrategyOutcome::Failed(GeometryError::Exhausted);
        }

        StrategyOutcome::Points {
            geometries,
            quality: GeometryQuality::Centroids { omitted },
        }
    }
}
