// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Spatial Market Integration Engine - Configuration

//! Named parameters for every weight, threshold and field name the engine
//! uses. None of the weight sets derive from a documented model; they are
//! defaults, not truths, and callers may override any of them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};
use crate::normalizer::RegionNormalizer;

// ─── Defaults ───────────────────────────────────────────────────────────────

const DEFAULT_SIGNIFICANCE: f64 = 0.05;
const DEFAULT_UTM_ZONE: u8 = 38;
const DEFAULT_CACHE_CAPACITY: usize = 16;
const DEFAULT_SATURATION: f64 = 10.0;

// ─── EngineConfig ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub efficiency: EfficiencyWeights,
    pub stability: StabilityWeights,
    pub health: HealthWeights,
    pub health_thresholds: HealthThresholds,
    pub saturation: Saturation,
    /// p-value below which a local statistic counts as significant.
    pub significance_level: f64,
    pub projection: UtmZone,
    /// Property holding the human-readable name on boundary features.
    pub boundary_name_field: String,
    /// Property holding the region identifier on attribute features.
    pub attribute_id_field: String,
    pub price_basis: PriceBasis,
    pub use_fallback_centroids: bool,
    /// Count only shocks dated in the selected month.
    pub shocks_in_selected_month: bool,
    pub cache_capacity: usize,
    /// Extra `alternate spelling -> canonical name` pairs for the normalizer.
    pub region_aliases: BTreeMap<String, String>,
    /// Extra region names dropped at the merge step.
    pub excluded_regions: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            efficiency: EfficiencyWeights::default(),
            stability: StabilityWeights::default(),
            health: HealthWeights::default(),
            health_thresholds: HealthThresholds::default(),
            saturation: Saturation::default(),
            significance_level: DEFAULT_SIGNIFICANCE,
            projection: UtmZone::default(),
            boundary_name_field: "shapeName".to_string(),
            attribute_id_field: "region_id".to_string(),
            price_basis: PriceBasis::Local,
            use_fallback_centroids: false,
            shocks_in_selected_month: false,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            region_aliases: BTreeMap::new(),
            excluded_regions: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON config; absent keys take defaults.
    pub fn from_json(json: &str) -> AnalysisResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        check_weights(
            "efficiency",
            &[
                self.efficiency.internal_connectivity,
                self.efficiency.market_coverage,
                self.efficiency.price_convergence,
                self.efficiency.stability,
            ],
        )?;
        check_weights("stability", &[self.stability.price, self.stability.flow])?;
        check_weights(
            "health",
            &[
                self.health.price_stability,
                self.health.shock_resilience,
                self.health.flow_integration,
                self.health.conflict_impact,
            ],
        )?;

        let t = &self.health_thresholds;
        if !(0.0 <= t.vulnerable && t.vulnerable <= t.healthy && t.healthy <= 1.0) {
            return Err(AnalysisError::invalid_config(
                "healthThresholds",
                format!("must satisfy 0 <= vulnerable ({}) <= healthy ({}) <= 1", t.vulnerable, t.healthy),
            ));
        }

        let s = &self.saturation;
        for (name, v) in [("shocks", s.shocks), ("flows", s.flows), ("conflict", s.conflict)] {
            if !(v.is_finite() && v > 0.0) {
                return Err(AnalysisError::invalid_config(
                    "saturation",
                    format!("{name} must be a positive number, got {v}"),
                ));
            }
        }

        if !(self.significance_level > 0.0 && self.significance_level < 1.0) {
            return Err(AnalysisError::invalid_config(
                "significanceLevel",
                format!("must lie in (0, 1), got {}", self.significance_level),
            ));
        }
        if !(1..=60).contains(&self.projection.zone) {
            return Err(AnalysisError::invalid_config(
                "projection.zone",
                format!("must be 1..=60, got {}", self.projection.zone),
            ));
        }
        if self.boundary_name_field.is_empty() || self.attribute_id_field.is_empty() {
            return Err(AnalysisError::invalid_config("fieldNames", "must not be empty"));
        }
        if self.cache_capacity == 0 {
            return Err(AnalysisError::invalid_config("cacheCapacity", "must be at least 1"));
        }
        Ok(())
    }

    /// Region normalizer carrying the built-in tables plus any configured
    /// aliases and exclusions.
    pub fn normalizer(&self) -> RegionNormalizer {
        RegionNormalizer::new()
            .with_aliases(self.region_aliases.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .with_exclusions(self.excluded_regions.iter().map(String::as_str))
    }
}

fn check_weights(parameter: &'static str, weights: &[f64]) -> AnalysisResult<()> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(AnalysisError::invalid_config(
            parameter,
            format!("weights must be finite and non-negative: {weights:?}"),
        ));
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        return Err(AnalysisError::invalid_config(parameter, "weights must not all be zero"));
    }
    Ok(())
}

// ─── Weight sets ────────────────────────────────────────────────────────────

/// Composite cluster efficiency weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EfficiencyWeights {
    pub internal_connectivity: f64,
    pub market_coverage: f64,
    pub price_convergence: f64,
    pub stability: f64,
}

impl Default for EfficiencyWeights {
    fn default() -> Self {
        Self {
            internal_connectivity: 0.3,
            market_coverage: 0.2,
            price_convergence: 0.3,
            stability: 0.2,
        }
    }
}

/// Split of overall cluster stability between price and flow stability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StabilityWeights {
    pub price: f64,
    pub flow: f64,
}

impl Default for StabilityWeights {
    fn default() -> Self {
        Self { price: 0.6, flow: 0.4 }
    }
}

/// Market health weights. 40% price, 30% shocks, 20% flows, 10% conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HealthWeights {
    pub price_stability: f64,
    pub shock_resilience: f64,
    pub flow_integration: f64,
    pub conflict_impact: f64,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            price_stability: 0.4,
            shock_resilience: 0.3,
            flow_integration: 0.2,
            conflict_impact: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HealthThresholds {
    pub healthy: f64,
    pub vulnerable: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self { healthy: 0.7, vulnerable: 0.4 }
    }
}

/// Counts at which a health component saturates (`min(x / s, 1)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Saturation {
    pub shocks: f64,
    pub flows: f64,
    pub conflict: f64,
}

impl Default for Saturation {
    fn default() -> Self {
        Self {
            shocks: DEFAULT_SATURATION,
            flows: DEFAULT_SATURATION,
            conflict: DEFAULT_SATURATION,
        }
    }
}

// ─── Projection / price basis ───────────────────────────────────────────────

/// Source UTM zone of projected boundary coordinates (WGS84 ellipsoid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UtmZone {
    pub zone: u8,
    pub northern: bool,
}

impl Default for UtmZone {
    fn default() -> Self {
        Self { zone: DEFAULT_UTM_ZONE, northern: true }
    }
}

impl UtmZone {
    /// Longitude of the zone's central meridian, in degrees.
    pub fn central_meridian(&self) -> f64 {
        (self.zone as f64 - 1.0) * 6.0 - 180.0 + 3.0
    }
}

/// Which price column feeds price-derived metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PriceBasis {
    #[default]
    Local,
    Usd,
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        config.validate().expect("test: defaults must validate");
        assert_eq!(config.efficiency.internal_connectivity, 0.3);
        assert_eq!(config.stability.price, 0.6);
        assert_eq!(config.health.price_stability, 0.4);
        assert_eq!(config.projection.zone, 38);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{"efficiency": {"stability": 0.5}, "priceBasis": "usd"}"#)
            .expect("test: partial config parses");
        assert_eq!(config.efficiency.stability, 0.5);
        assert_eq!(config.efficiency.market_coverage, 0.2);
        assert_eq!(config.price_basis, PriceBasis::Usd);
        assert_eq!(config.boundary_name_field, "shapeName");
    }

    #[test]
    fn negative_weight_rejected() {
        let mut config = EngineConfig::default();
        config.health.conflict_impact = -0.1;
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::InvalidConfig { parameter: "health", .. })
        ));
    }

    #[test]
    fn all_zero_weights_rejected() {
        let mut config = EngineConfig::default();
        config.stability = StabilityWeights { price: 0.0, flow: 0.0 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let mut config = EngineConfig::default();
        config.health_thresholds = HealthThresholds { healthy: 0.3, vulnerable: 0.5 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_zone_rejected() {
        let config = EngineConfig::from_json(r#"{"projection": {"zone": 0}}"#);
        assert!(config.is_err());
    }

    #[test]
    fn central_meridian_of_zone_38() {
        assert_eq!(UtmZone::default().central_meridian(), 45.0);
        assert_eq!(UtmZone { zone: 1, northern: true }.central_meridian(), -177.0);
    }
}
