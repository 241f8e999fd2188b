// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Spatial Market Integration Engine - Market Health Scorer

//! Composite per-region health and the system-wide indices built on it.
//!
//! `health = w_p·priceStability + w_s·shockResilience + w_f·flowIntegration
//! + w_c·conflictImpact`, divided by the weight sum so custom weights that do
//! not add up to one still yield a score in `[0, 1]`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{EngineConfig, HealthThresholds, HealthWeights, PriceBasis, Saturation};
use crate::context::par_map;
use crate::error::{AnalysisError, AnalysisResult};
use crate::numeric::{
    self, log_return_volatility, renormalized_weighted_sum, safe_div, sanitize_non_negative, sanitize_unit,
    SCORE_DEFAULT, VOLATILITY_DEFAULT,
};
use crate::types::{
    FlowEdge, HealthClass, HealthComponents, HealthInputs, MarketHealth, MarketShock, RegionId, TimeSeriesEntry,
};

const COMPONENT: &str = "market health";

// ─── Single region ───────────────────────────────────────────────────────────

/// `min(x / saturation, 1)`, clamped into `[0, 1]`.
fn saturating(value: f64, saturation: f64) -> f64 {
    sanitize_unit(safe_div(value, saturation, 1.0).min(1.0), 1.0)
}

pub fn classify(score: f64, thresholds: &HealthThresholds) -> HealthClass {
    if score >= thresholds.healthy {
        HealthClass::Healthy
    } else if score >= thresholds.vulnerable {
        HealthClass::Vulnerable
    } else {
        HealthClass::Stressed
    }
}

/// Score one region from its raw observations.
pub fn score(
    inputs: HealthInputs,
    weights: &HealthWeights,
    saturation: &Saturation,
    thresholds: &HealthThresholds,
) -> MarketHealth {
    let volatility = sanitize_non_negative(inputs.volatility, VOLATILITY_DEFAULT);
    let conflict = sanitize_non_negative(inputs.conflict_intensity, 0.0);

    let components = HealthComponents {
        price_stability: sanitize_unit(1.0 - volatility, SCORE_DEFAULT),
        shock_resilience: 1.0 - saturating(inputs.shock_count as f64, saturation.shocks),
        flow_integration: saturating(inputs.flow_count as f64, saturation.flows),
        conflict_impact: 1.0 - saturating(conflict, saturation.conflict),
    };
    let health_score = sanitize_unit(
        renormalized_weighted_sum(&[
            (weights.price_stability, Some(components.price_stability)),
            (weights.shock_resilience, Some(components.shock_resilience)),
            (weights.flow_integration, Some(components.flow_integration)),
            (weights.conflict_impact, Some(components.conflict_impact)),
        ]),
        SCORE_DEFAULT,
    );
    let classification = classify(health_score, thresholds);

    MarketHealth {
        health_score,
        classification,
        risk_level: classification.risk_level(),
        components,
        inputs: HealthInputs {
            volatility,
            conflict_intensity: conflict,
            ..inputs
        },
    }
}

// ─── Shock summary ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShockSummary {
    pub count: usize,
    pub mean_magnitude: f64,
    pub by_type: BTreeMap<String, usize>,
}

pub fn summarize_shocks<'a>(shocks: impl IntoIterator<Item = &'a MarketShock>) -> BTreeMap<RegionId, ShockSummary> {
    let mut magnitudes: BTreeMap<RegionId, Vec<f64>> = BTreeMap::new();
    let mut out: BTreeMap<RegionId, ShockSummary> = BTreeMap::new();
    for shock in shocks {
        let summary = out.entry(shock.region.clone()).or_default();
        summary.count += 1;
        *summary.by_type.entry(shock.shock_type.clone()).or_default() += 1;
        magnitudes.entry(shock.region.clone()).or_default().push(shock.magnitude);
    }
    for (region, summary) in out.iter_mut() {
        let m = magnitudes.get(region).and_then(|v| numeric::mean(v)).unwrap_or(0.0);
        summary.mean_magnitude = numeric::sanitize(m, 0.0);
    }
    out
}

// ─── System ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    pub region_count: usize,
    pub healthy: usize,
    pub vulnerable: usize,
    pub stressed: usize,
    pub mean_health: f64,
    pub mean_flow_integration: f64,
    /// Lag-1 autocorrelation of health scores in region-id order, in `[0, 1]`.
    pub health_correlation: f64,
    /// `(1 - meanHealth) · healthCorrelation`.
    pub systemic_risk: f64,
    /// `fractionHealthy · meanFlowIntegration`.
    pub resilience: f64,
}

pub fn system_health(regions: &BTreeMap<RegionId, MarketHealth>) -> SystemHealth {
    let count = |class: HealthClass| regions.values().filter(|h| h.classification == class).count();
    let scores: Vec<f64> = regions.values().map(|h| h.health_score).collect();
    let flow: Vec<f64> = regions.values().map(|h| h.components.flow_integration).collect();

    let healthy = count(HealthClass::Healthy);
    let mean_health = numeric::mean(&scores).map_or(SCORE_DEFAULT, |m| sanitize_unit(m, SCORE_DEFAULT));
    let mean_flow_integration = numeric::mean(&flow).map_or(SCORE_DEFAULT, |m| sanitize_unit(m, SCORE_DEFAULT));
    let health_correlation = numeric::lag1_autocorrelation(&scores).map_or(0.0, |r| sanitize_unit(r, 0.0));
    let fraction_healthy = safe_div(healthy as f64, regions.len() as f64, 0.0);

    SystemHealth {
        region_count: regions.len(),
        healthy,
        vulnerable: count(HealthClass::Vulnerable),
        stressed: count(HealthClass::Stressed),
        mean_health,
        mean_flow_integration,
        health_correlation,
        systemic_risk: sanitize_unit((1.0 - mean_health) * health_correlation, 0.0),
        resilience: sanitize_unit(fraction_healthy * mean_flow_integration, 0.0),
    }
}

// ─── Scorer ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub regions: BTreeMap<RegionId, MarketHealth>,
    pub system: SystemHealth,
    pub shocks: BTreeMap<RegionId, ShockSummary>,
}

/// Indexes one snapshot's observations by region.
pub struct HealthScorer<'a> {
    series: BTreeMap<&'a str, Vec<&'a TimeSeriesEntry>>,
    shocks: BTreeMap<&'a str, usize>,
    flow_counts: BTreeMap<&'a str, usize>,
    basis: PriceBasis,
    weights: HealthWeights,
    saturation: Saturation,
    thresholds: HealthThresholds,
}

impl<'a> HealthScorer<'a> {
    /// `time_series` must be sorted by period within each region, as
    /// ingestion leaves it.
    pub fn new(
        time_series: &'a [TimeSeriesEntry],
        shocks: &[&'a MarketShock],
        flows: &'a [FlowEdge],
        config: &EngineConfig,
    ) -> Self {
        let mut series: BTreeMap<&str, Vec<&TimeSeriesEntry>> = BTreeMap::new();
        for entry in time_series {
            series.entry(entry.region.as_str()).or_default().push(entry);
        }
        let mut shock_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for &shock in shocks {
            *shock_counts.entry(shock.region.as_str()).or_default() += 1;
        }
        let mut flow_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for f in flows {
            *flow_counts.entry(f.source.as_str()).or_default() += 1;
            *flow_counts.entry(f.target.as_str()).or_default() += 1;
        }
        Self {
            series,
            shocks: shock_counts,
            flow_counts,
            basis: config.price_basis,
            weights: config.health.clone(),
            saturation: config.saturation.clone(),
            thresholds: config.health_thresholds.clone(),
        }
    }

    pub fn inputs(&self, region: &str) -> HealthInputs {
        let entries = self.series.get(region).map(Vec::as_slice).unwrap_or_default();
        let prices: Vec<f64> = entries.iter().map(|e| e.price_in(self.basis)).collect();
        let conflict: Vec<f64> = entries.iter().map(|e| e.conflict_intensity).collect();
        HealthInputs {
            volatility: log_return_volatility(&prices).unwrap_or(VOLATILITY_DEFAULT),
            shock_count: self.shocks.get(region).copied().unwrap_or(0),
            flow_count: self.flow_counts.get(region).copied().unwrap_or(0),
            conflict_intensity: numeric::mean(&conflict).unwrap_or(0.0),
        }
    }

    pub fn score(&self, region: &str) -> MarketHealth {
        score(self.inputs(region), &self.weights, &self.saturation, &self.thresholds)
    }
}

/// Score every region in `regions` in parallel.
///
/// Fails only when the snapshot has no time series at all; a region without
/// entries of its own is scored with the volatility sentinel.
pub fn assess(
    regions: &[RegionId],
    time_series: &[TimeSeriesEntry],
    shocks: &[&MarketShock],
    flows: &[FlowEdge],
    config: &EngineConfig,
) -> AnalysisResult<HealthReport> {
    if time_series.is_empty() {
        return Err(AnalysisError::insufficient(COMPONENT, "no time series for the selected commodity"));
    }
    if regions.is_empty() {
        return Err(AnalysisError::insufficient(COMPONENT, "no regions to score"));
    }

    let scorer = HealthScorer::new(time_series, shocks, flows, config);
    let scored = par_map(regions, |id| scorer.score(id));
    let regions: BTreeMap<RegionId, MarketHealth> = regions.iter().cloned().zip(scored).collect();
    let system = system_health(&regions);

    log::debug!(
        "health: {} regions, {} healthy, mean {:.3}",
        system.region_count,
        system.healthy,
        system.mean_health
    );
    Ok(HealthReport {
        regions,
        system,
        shocks: summarize_shocks(shocks.iter().copied()),
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    fn defaults() -> EngineConfig {
        EngineConfig::default()
    }

    fn score_default(inputs: HealthInputs) -> MarketHealth {
        let c = defaults();
        score(inputs, &c.health, &c.saturation, &c.health_thresholds)
    }

    fn entry(region: &str, period: &str, price: f64, conflict: f64) -> TimeSeriesEntry {
        TimeSeriesEntry {
            region: region.into(),
            period: period.into(),
            price,
            usd_price: 0.0,
            conflict_intensity: conflict,
            volatility: 0.0,
        }
    }

    fn shock(region: &str, kind: &str, magnitude: f64) -> MarketShock {
        MarketShock {
            region: region.into(),
            date: "2023-01".into(),
            magnitude,
            shock_type: kind.into(),
        }
    }

    #[test]
    fn perfect_region_scores_one() {
        let h = score_default(HealthInputs {
            volatility: 0.0,
            shock_count: 0,
            flow_count: 10,
            conflict_intensity: 0.0,
        });
        assert_eq!(h.health_score, 1.0);
        assert_eq!(h.classification, HealthClass::Healthy);
        assert_eq!(h.risk_level, crate::types::RiskLevel::Low);
    }

    #[test]
    fn components_saturate() {
        let h = score_default(HealthInputs {
            volatility: 2.5,
            shock_count: 25,
            flow_count: 3,
            conflict_intensity: 5.0,
        });
        assert_eq!(h.components.price_stability, 0.0);
        assert_eq!(h.components.shock_resilience, 0.0);
        assert!((h.components.flow_integration - 0.3).abs() < EPS);
        assert!((h.components.conflict_impact - 0.5).abs() < EPS);
        // 0.2 * 0.3 + 0.1 * 0.5
        assert!((h.health_score - 0.11).abs() < 1e-9);
        assert_eq!(h.classification, HealthClass::Stressed);
    }

    #[test]
    fn classification_thresholds() {
        let t = HealthThresholds::default();
        assert_eq!(classify(0.7, &t), HealthClass::Healthy);
        assert_eq!(classify(0.69, &t), HealthClass::Vulnerable);
        assert_eq!(classify(0.4, &t), HealthClass::Vulnerable);
        assert_eq!(classify(0.39, &t), HealthClass::Stressed);
    }

    #[test]
    fn non_finite_inputs_use_defaults() {
        let h = score_default(HealthInputs {
            volatility: f64::NAN,
            shock_count: 0,
            flow_count: 0,
            conflict_intensity: f64::INFINITY,
        });
        assert!(h.health_score.is_finite());
        assert_eq!(h.inputs.volatility, VOLATILITY_DEFAULT);
        assert_eq!(h.components.conflict_impact, 1.0);
    }

    #[test]
    fn scorer_gathers_inputs() {
        let ts = vec![
            entry("aden", "2023-01", 10.0, 2.0),
            entry("aden", "2023-02", 20.0, 4.0),
            entry("aden", "2023-03", 10.0, 0.0),
        ];
        let shocks = [shock("aden", "price_spike", 3.0)];
        let shock_refs: Vec<&MarketShock> = shocks.iter().collect();
        let flows = vec![FlowEdge {
            source: "aden".into(),
            target: "lahj".into(),
            total_flow: 1.0,
            avg_flow: 1.0,
            flow_count: 1,
            price_differential: 0.0,
        }];
        let config = defaults();
        let scorer = HealthScorer::new(&ts, &shock_refs, &flows, &config);
        let inputs = scorer.inputs("aden");
        assert!((inputs.volatility - std::f64::consts::LN_2).abs() < 1e-9);
        assert_eq!(inputs.shock_count, 1);
        assert_eq!(inputs.flow_count, 1);
        assert!((inputs.conflict_intensity - 2.0).abs() < EPS);

        let lahj = scorer.inputs("lahj");
        assert_eq!(lahj.volatility, VOLATILITY_DEFAULT);
        assert_eq!(lahj.flow_count, 1);
    }

    #[test]
    fn assess_requires_time_series() {
        let err = assess(&["aden".into()], &[], &[], &[], &defaults()).expect_err("test: no series");
        assert!(matches!(err, AnalysisError::InsufficientData { .. }));
    }

    #[test]
    fn system_indices() {
        let mut regions = BTreeMap::new();
        for (id, flows) in [("a", 10), ("b", 10), ("c", 0), ("d", 0)] {
            regions.insert(
                id.to_string(),
                score_default(HealthInputs {
                    volatility: 0.0,
                    shock_count: 0,
                    flow_count: flows,
                    conflict_intensity: 0.0,
                }),
            );
        }
        let s = system_health(&regions);
        assert_eq!(s.region_count, 4);
        assert_eq!(s.healthy, 4, "0.8 still clears the healthy threshold");
        assert!((s.mean_flow_integration - 0.5).abs() < EPS);
        assert!((s.resilience - 0.5).abs() < EPS);
        // scores [1, 1, 0.8, 0.8]: positive lag-1 autocorrelation
        assert!(s.health_correlation > 0.0);
        assert!((s.systemic_risk - (1.0 - s.mean_health) * s.health_correlation).abs() < EPS);
    }

    #[test]
    fn correlation_needs_three_regions() {
        let mut regions = BTreeMap::new();
        regions.insert("a".to_string(), score_default(HealthInputs::default()));
        regions.insert("b".to_string(), score_default(HealthInputs::default()));
        let s = system_health(&regions);
        assert_eq!(s.health_correlation, 0.0);
        assert_eq!(s.systemic_risk, 0.0);
    }

    #[test]
    fn shock_summary_by_region_and_type() {
        let shocks = [
            shock("aden", "price_spike", 2.0),
            shock("aden", "price_drop", 4.0),
            shock("aden", "price_spike", 6.0),
            shock("ibb", "supply", 1.0),
        ];
        let summary = summarize_shocks(shocks.iter());
        assert_eq!(summary["aden"].count, 3);
        assert!((summary["aden"].mean_magnitude - 4.0).abs() < EPS);
        assert_eq!(summary["aden"].by_type["price_spike"], 2);
        assert_eq!(summary["ibb"].count, 1);
    }
}
