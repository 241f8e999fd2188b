// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Spatial Market Integration Engine - Geometry Merger

//! Joins boundary polygons with per-region attribute records on canonical id.
//!
//! Geometry only ever comes from the boundary collection, or from the
//! documented fallback centroid table when that is switched on. An attribute
//! record with no boundary is reported, never given an invented shape.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::config::UtmZone;
use crate::normalizer::RegionNormalizer;
use crate::projection::{self, ReprojectionStats};
use crate::types::{Geometry, Properties, Region, RegionId};

/// Property set on regions whose geometry came from [`FALLBACK_CENTROIDS`].
pub const GEOMETRY_SOURCE_KEY: &str = "geometrySource";
pub const FALLBACK_SOURCE: &str = "fallback-centroid";

/// Approximate `(lon, lat)` centroids for markets that have historically been
/// delivered without a polygon. Keyed by canonical id.
pub const FALLBACK_CENTROIDS: &[(&str, f64, f64)] = &[
    ("al_mukalla", 49.124, 14.542),
    ("al_mukha", 43.250, 13.320),
    ("seiyun", 48.790, 15.943),
    ("al_ghaydah", 52.176, 16.207),
    ("ataq", 46.831, 14.538),
    ("zinjibar", 45.381, 13.129),
    ("rada", 44.838, 14.415),
    ("bajil", 43.285, 15.058),
    ("al_khawkhah", 43.400, 13.800),
    ("al_turbah", 43.993, 13.213),
];

fn fallback_centroid(id: &str) -> Option<Geometry> {
    FALLBACK_CENTROIDS
        .iter()
        .find(|(name, _, _)| *name == id)
        .map(|(_, lon, lat)| Geometry::Point(vec![*lon, *lat]))
}

// ─── Inputs / outputs ────────────────────────────────────────────────────────

/// A feature as it arrives, before its name is canonicalized.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub name: String,
    pub geometry: Option<Geometry>,
    pub properties: Properties,
}

impl Feature {
    pub fn new(name: impl Into<String>, geometry: Option<Geometry>) -> Self {
        Self {
            name: name.into(),
            geometry,
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureSource {
    Boundary,
    Attribute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UnmatchedReason {
    /// Attribute record whose region has no boundary.
    NotInBoundaries,
    /// Region is in the exclusion set.
    Excluded,
    /// Name folds to nothing.
    Unnormalizable,
    /// A second boundary with an id already taken.
    DuplicateBoundary,
}

/// One diagnostic entry for a feature that did not make it into the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmatchedRegion {
    pub original_id: String,
    pub id: Option<RegionId>,
    pub source: FeatureSource,
    pub reason: UnmatchedReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOutcome {
    pub regions: BTreeMap<RegionId, Region>,
    pub unmatched: Vec<UnmatchedRegion>,
    pub reprojection: ReprojectionStats,
}

impl MergeOutcome {
    pub fn contains(&self, id: &str) -> bool {
        self.regions.contains_key(id)
    }
}

// ─── GeometryMerger ──────────────────────────────────────────────────────────

pub struct GeometryMerger<'a> {
    normalizer: &'a RegionNormalizer,
    zone: UtmZone,
    use_fallback_centroids: bool,
}

impl<'a> GeometryMerger<'a> {
    pub fn new(normalizer: &'a RegionNormalizer, zone: UtmZone) -> Self {
        Self {
            normalizer,
            zone,
            use_fallback_centroids: false,
        }
    }

    pub fn with_fallback_centroids(mut self, enabled: bool) -> Self {
        self.use_fallback_centroids = enabled;
        self
    }

    /// Build the canonical region map. Attribute properties overwrite boundary
    /// properties on key collision; geometry is never altered by attributes.
    pub fn merge(&self, boundaries: &[Feature], attributes: &[Feature]) -> MergeOutcome {
        let mut out = MergeOutcome::default();

        for feature in boundaries {
            let Some(id) = self.resolve(feature, FeatureSource::Boundary, &mut out.unmatched) else {
                continue;
            };
            if out.regions.contains_key(&id) {
                log::warn!("duplicate boundary `{}` for region {id}, keeping the first", feature.name);
                out.unmatched.push(UnmatchedRegion {
                    original_id: feature.name.clone(),
                    id: Some(id),
                    source: FeatureSource::Boundary,
                    reason: UnmatchedReason::DuplicateBoundary,
                });
                continue;
            }
            let mut geometry = feature.geometry.clone();
            if let Some(g) = geometry.as_mut() {
                out.reprojection.merge(projection::reproject(g, self.zone));
            }
            out.regions.insert(
                id.clone(),
                Region {
                    id,
                    original_id: feature.name.clone(),
                    geometry,
                    properties: feature.properties.clone(),
                },
            );
        }

        for feature in attributes {
            let Some(id) = self.resolve(feature, FeatureSource::Attribute, &mut out.unmatched) else {
                continue;
            };
            if let Some(region) = out.regions.get_mut(&id) {
                overlay(&mut region.properties, &feature.properties);
                continue;
            }
            match self.fallback_region(&id, feature) {
                Some(region) => {
                    log::debug!("region {id} placed at its fallback centroid");
                    out.regions.insert(id, region);
                }
                None => {
                    log::warn!("attribute region `{}` ({id}) has no boundary, skipped", feature.name);
                    out.unmatched.push(UnmatchedRegion {
                        original_id: feature.name.clone(),
                        id: Some(id),
                        source: FeatureSource::Attribute,
                        reason: UnmatchedReason::NotInBoundaries,
                    });
                }
            }
        }

        log::debug!(
            "merged {} regions, {} unmatched, {} positions reprojected",
            out.regions.len(),
            out.unmatched.len(),
            out.reprojection.projected
        );
        out
    }

    /// Canonical id for a feature, or `None` after recording why it is dropped.
    fn resolve(
        &self,
        feature: &Feature,
        source: FeatureSource,
        unmatched: &mut Vec<UnmatchedRegion>,
    ) -> Option<RegionId> {
        let Some(id) = self.normalizer.normalize(&feature.name) else {
            log::warn!("{source:?} feature name `{}` does not normalize", feature.name);
            unmatched.push(UnmatchedRegion {
                original_id: feature.name.clone(),
                id: None,
                source,
                reason: UnmatchedReason::Unnormalizable,
            });
            return None;
        };
        if self.normalizer.is_excluded(&id) {
            log::debug!("{source:?} feature `{}` is excluded", feature.name);
            unmatched.push(UnmatchedRegion {
                original_id: feature.name.clone(),
                id: Some(id),
                source,
                reason: UnmatchedReason::Excluded,
            });
            return None;
        }
        Some(id)
    }

    fn fallback_region(&self, id: &str, feature: &Feature) -> Option<Region> {
        if !self.use_fallback_centroids {
            return None;
        }
        let geometry = fallback_centroid(id)?;
        let mut properties = feature.properties.clone();
        properties.insert(GEOMETRY_SOURCE_KEY.to_string(), Value::from(FALLBACK_SOURCE));
        Some(Region {
            id: id.to_string(),
            original_id: feature.name.clone(),
            geometry: Some(geometry),
            properties,
        })
    }
}

fn overlay(target: &mut Properties, source: &Properties) {
    for (k, v) in source {
        target.insert(k.clone(), v.clone());
    }
}

// ===========================================================================
// Tests
// ===========================================================================
