// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Spatial Market Integration Engine - Type Definitions

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::PriceBasis;

/// Canonical region identifier produced by the normalizer.
pub type RegionId = String;

/// Scalar attribute bag carried by a region. Ordered for deterministic output.
pub type Properties = BTreeMap<String, Value>;

// ─── Geometry ────────────────────────────────────────────────────────────────

/// A GeoJSON position: `[x, y]` or `[x, y, z]`.
pub type Position = Vec<f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    /// Apply `f` to every position in place.
    pub fn map_positions(&mut self, f: &mut impl FnMut(&mut Position)) {
        match self {
            Self::Point(p) => f(p),
            Self::MultiPoint(ps) | Self::LineString(ps) => ps.iter_mut().for_each(f),
            Self::MultiLineString(rings) | Self::Polygon(rings) => {
                rings.iter_mut().flatten().for_each(f)
            }
            Self::MultiPolygon(polys) => polys.iter_mut().flatten().flatten().for_each(f),
        }
    }

    pub fn position_count(&self) -> usize {
        match self {
            Self::Point(_) => 1,
            Self::MultiPoint(ps) | Self::LineString(ps) => ps.len(),
            Self::MultiLineString(rings) | Self::Polygon(rings) => rings.iter().map(Vec::len).sum(),
            Self::MultiPolygon(polys) => polys.iter().flatten().map(Vec::len).sum(),
        }
    }
}

// ─── Region ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    /// Canonical id, unique within a merged map.
    pub id: RegionId,
    /// The name as it appeared in the source collection.
    pub original_id: String,
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: Properties,
}

// ─── MarketCluster ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketCluster {
    pub cluster_id: String,
    pub main_market: RegionId,
    pub connected_markets: BTreeSet<RegionId>,
    /// Always `connected_markets.len()` once ingested.
    pub market_count: usize,
}

impl MarketCluster {
    pub fn new(
        cluster_id: impl Into<String>,
        main_market: impl Into<RegionId>,
        connected_markets: impl IntoIterator<Item = RegionId>,
    ) -> Self {
        let connected_markets: BTreeSet<RegionId> = connected_markets.into_iter().collect();
        Self {
            cluster_id: cluster_id.into(),
            main_market: main_market.into(),
            market_count: connected_markets.len(),
            connected_markets,
        }
    }
}

// ─── FlowEdge ────────────────────────────────────────────────────────────────

/// Directed trade flow between two distinct regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    pub source: RegionId,
    pub target: RegionId,
    pub total_flow: f64,
    pub avg_flow: f64,
    pub flow_count: u64,
    pub price_differential: f64,
}

// ─── TimeSeriesEntry ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesEntry {
    pub region: RegionId,
    /// `YYYY-MM` or `YYYY-MM-DD`; lexicographic order is chronological.
    pub period: String,
    pub price: f64,
    pub usd_price: f64,
    pub conflict_intensity: f64,
    #[serde(default)]
    pub volatility: f64,
}

impl TimeSeriesEntry {
    pub fn price_in(&self, basis: PriceBasis) -> f64 {
        match basis {
            PriceBasis::Local => self.price,
            PriceBasis::Usd => self.usd_price,
        }
    }

    /// Finite and strictly positive.
    pub fn has_valid_price(&self, basis: PriceBasis) -> bool {
        let p = self.price_in(basis);
        p.is_finite() && p > 0.0
    }
}

// ─── MarketShock ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketShock {
    pub region: RegionId,
    pub date: String,
    pub magnitude: f64,
    pub shock_type: String,
}

// ─── EfficiencyMetrics ───────────────────────────────────────────────────────

/// Per-cluster efficiency. Every field lies in `[0, 1]` except
/// `price_volatility`, which is only floored at zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EfficiencyMetrics {
    pub internal_connectivity: f64,
    pub market_coverage: f64,
    pub price_convergence: f64,
    pub price_volatility: f64,
    pub stability: f64,
    pub flow_stability: f64,
    pub price_stability: f64,
    pub efficiency_score: f64,
}

// ─── Spatial autocorrelation ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum ClusterType {
    #[serde(rename = "high-high")]
    HighHigh,
    #[serde(rename = "low-low")]
    LowLow,
    #[serde(rename = "high-low")]
    HighLow,
    #[serde(rename = "low-high")]
    LowHigh,
    #[default]
    #[serde(rename = "not-significant")]
    NotSignificant,
}

impl ClusterType {
    pub const ALL: [ClusterType; 5] = [
        Self::HighHigh,
        Self::LowLow,
        Self::HighLow,
        Self::LowHigh,
        Self::NotSignificant,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::HighHigh => "high-high",
            Self::LowLow => "low-low",
            Self::HighLow => "high-low",
            Self::LowHigh => "low-high",
            Self::NotSignificant => "not-significant",
        }
    }

    /// Parse the upstream pipeline's label. Accepts `high-high`, `High_High`,
    /// `HH` and similar spellings; anything else is `NotSignificant`.
    pub fn from_label(label: &str) -> Self {
        let compact: String = label
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_lowercase();
        match compact.as_str() {
            "highhigh" | "hh" => Self::HighHigh,
            "lowlow" | "ll" => Self::LowLow,
            "highlow" | "hl" => Self::HighLow,
            "lowhigh" | "lh" => Self::LowHigh,
            _ => Self::NotSignificant,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalAutocorrelation {
    pub moran_i: f64,
    pub p_value: f64,
    pub z_score: f64,
    pub significant: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalAutocorrelation {
    pub local_i: f64,
    pub p_value: f64,
    pub cluster_type: ClusterType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutocorrelationResult {
    pub global: GlobalAutocorrelation,
    pub local: BTreeMap<RegionId, LocalAutocorrelation>,
}

// ─── Market health ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HealthClass {
    Healthy,
    Vulnerable,
    Stressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl HealthClass {
    pub fn risk_level(&self) -> RiskLevel {
        match self {
            Self::Healthy => RiskLevel::Low,
            Self::Vulnerable => RiskLevel::Medium,
            Self::Stressed => RiskLevel::High,
        }
    }
}

/// The four health components, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthComponents {
    pub price_stability: f64,
    pub shock_resilience: f64,
    pub flow_integration: f64,
    pub conflict_impact: f64,
}

/// Raw observations a health score was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthInputs {
    pub volatility: f64,
    pub shock_count: usize,
    pub flow_count: usize,
    pub conflict_intensity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketHealth {
    pub health_score: f64,
    pub classification: HealthClass,
    pub risk_level: RiskLevel,
    pub components: HealthComponents,
    pub inputs: HealthInputs,
}

// ─── Section ─────────────────────────────────────────────────────────────────

/// One section of the consolidated output. A component that cannot run
/// yields `Unavailable` with a reason so the rest of the analysis still
/// renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Section<T> {
    Available { data: T },
    Unavailable { reason: String },
}

impl<T> Section<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable { reason: reason.into() }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Available { data } => Some(data),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Available { .. } => None,
            Self::Unavailable { reason } => Some(reason),
        }
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for Section<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::Available { data },
            Err(e) => Self::unavailable(e.to_string()),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_uses_geojson_shape() {
        let json = r#"{"type":"Polygon","coordinates":[[[44.0,15.0],[45.0,15.0],[45.0,16.0],[44.0,15.0]]]}"#;
        let geom: Geometry = serde_json::from_str(json).expect("test: parse polygon");
        assert_eq!(geom.position_count(), 4);
        let back = serde_json::to_value(&geom).expect("test: serialize");
        assert_eq!(back["type"], "Polygon");
    }

    #[test]
    fn map_positions_touches_every_vertex() {
        let mut geom = Geometry::MultiPolygon(vec![
            vec![vec![vec![1.0, 1.0], vec![2.0, 2.0]]],
            vec![vec![vec![3.0, 3.0]]],
        ]);
        let mut seen = 0;
        geom.map_positions(&mut |p| {
            p[0] += 10.0;
            seen += 1;
        });
        assert_eq!(seen, 3);
        if let Geometry::MultiPolygon(polys) = &geom {
            assert_eq!(polys[1][0][0][0], 13.0);
        }
    }

    #[test]
    fn cluster_type_label_parsing() {
        assert_eq!(ClusterType::from_label("high-high"), ClusterType::HighHigh);
        assert_eq!(ClusterType::from_label("Low_Low"), ClusterType::LowLow);
        assert_eq!(ClusterType::from_label("HL"), ClusterType::HighLow);
        assert_eq!(ClusterType::from_label("low-high"), ClusterType::LowHigh);
        assert_eq!(ClusterType::from_label("ns"), ClusterType::NotSignificant);
        assert_eq!(ClusterType::from_label(""), ClusterType::NotSignificant);
        for t in ClusterType::ALL {
            assert_eq!(ClusterType::from_label(t.label()), t);
        }
    }

    #[test]
    fn cluster_constructor_keeps_count_in_sync() {
        let c = MarketCluster::new("c1", "aden", vec!["aden".into(), "lahj".into(), "aden".into()]);
        assert_eq!(c.market_count, 2);
        assert_eq!(c.market_count, c.connected_markets.len());
    }

    #[test]
    fn section_serializes_with_status_tag() {
        let ok: Section<u32> = Section::Available { data: 3 };
        let json = serde_json::to_value(&ok).expect("test: serialize");
        assert_eq!(json["status"], "available");
        assert_eq!(json["data"], 3);

        let missing: Section<u32> = Section::unavailable("no flows");
        let json = serde_json::to_value(&missing).expect("test: serialize");
        assert_eq!(json["status"], "unavailable");
        assert_eq!(missing.reason(), Some("no flows"));
    }

    #[test]
    fn risk_follows_classification() {
        assert_eq!(HealthClass::Healthy.risk_level(), RiskLevel::Low);
        assert_eq!(HealthClass::Vulnerable.risk_level(), RiskLevel::Medium);
        assert_eq!(HealthClass::Stressed.risk_level(), RiskLevel::High);
    }
}
