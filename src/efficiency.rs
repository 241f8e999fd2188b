// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Spatial Market Integration Engine - Cluster Efficiency Calculator

//! One calculator for cluster efficiency.
//!
//! Components are first computed as `Option<f64>`; `None` means the cluster
//! lacks the data for it. Before aggregation every component takes its
//! documented default (0 for scores, 1 for volatility), and both the stored
//! metrics and the composite are built from those resolved values, so the
//! score can always be recomputed from what is displayed.
//!
//! Choices where the historical calculators disagreed:
//! - connectivity counts distinct unordered internal pairs over `n(n-1)/2`;
//! - the cluster price series is the per-period mean of valid prices;
//! - a cluster with no markets reports all-zero metrics, volatility included.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::config::{EfficiencyWeights, EngineConfig, PriceBasis, StabilityWeights};
use crate::context::par_map;
use crate::ingest::MarketCountMismatch;
use crate::numeric::{
    self, coefficient_of_variation, log_return_volatility, renormalized_weighted_sum, safe_div,
    sanitize_non_negative, sanitize_unit, SCORE_DEFAULT, VOLATILITY_DEFAULT,
};
use crate::types::{EfficiencyMetrics, FlowEdge, MarketCluster, TimeSeriesEntry};

// ─── Component breakdown ─────────────────────────────────────────────────────

/// Raw components before defaults are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Components {
    pub internal_connectivity: Option<f64>,
    pub market_coverage: Option<f64>,
    pub price_convergence: Option<f64>,
    pub price_volatility: Option<f64>,
    pub flow_stability: Option<f64>,
}

fn unit(value: Option<f64>) -> f64 {
    sanitize_unit(value.unwrap_or(SCORE_DEFAULT), SCORE_DEFAULT)
}

/// Weighted mean over finite values; the denominator is the weight total.
fn weighted(parts: &[(f64, f64)]) -> f64 {
    let parts: Vec<(f64, Option<f64>)> = parts.iter().map(|&(w, v)| (w, Some(v))).collect();
    renormalized_weighted_sum(&parts)
}

impl Components {
    /// Volatility with the "maximally volatile" sentinel when absent.
    pub fn volatility(&self) -> f64 {
        sanitize_non_negative(self.price_volatility.unwrap_or(VOLATILITY_DEFAULT), VOLATILITY_DEFAULT)
    }

    /// `1 - volatility`, clamped into `[0, 1]`.
    pub fn price_stability(&self) -> f64 {
        sanitize_unit(1.0 - self.volatility(), SCORE_DEFAULT)
    }

    /// `price·priceStability + flow·flowStability`.
    pub fn stability(&self, weights: &StabilityWeights) -> f64 {
        sanitize_unit(
            weighted(&[(weights.price, self.price_stability()), (weights.flow, unit(self.flow_stability))]),
            SCORE_DEFAULT,
        )
    }

    pub fn efficiency(&self, stability: &StabilityWeights, weights: &EfficiencyWeights) -> f64 {
        sanitize_unit(
            weighted(&[
                (weights.internal_connectivity, unit(self.internal_connectivity)),
                (weights.market_coverage, unit(self.market_coverage)),
                (weights.price_convergence, unit(self.price_convergence)),
                (weights.stability, self.stability(stability)),
            ]),
            SCORE_DEFAULT,
        )
    }

    /// Apply defaults and bounds at the metric boundary.
    pub fn into_metrics(self, stability: &StabilityWeights, weights: &EfficiencyWeights) -> EfficiencyMetrics {
        EfficiencyMetrics {
            internal_connectivity: unit(self.internal_connectivity),
            market_coverage: unit(self.market_coverage),
            price_convergence: unit(self.price_convergence),
            price_volatility: self.volatility(),
            stability: self.stability(stability),
            flow_stability: unit(self.flow_stability),
            price_stability: self.price_stability(),
            efficiency_score: self.efficiency(stability, weights),
        }
    }
}

// ─── Calculator ──────────────────────────────────────────────────────────────

/// Shared, read-only inputs for every cluster of one snapshot.
pub struct EfficiencyCalculator<'a> {
    flows: &'a [FlowEdge],
    series: BTreeMap<&'a str, Vec<&'a TimeSeriesEntry>>,
    total_markets: usize,
    basis: PriceBasis,
    efficiency_weights: EfficiencyWeights,
    stability_weights: StabilityWeights,
}

impl<'a> EfficiencyCalculator<'a> {
    pub fn new(flows: &'a [FlowEdge], time_series: &'a [TimeSeriesEntry], config: &EngineConfig) -> Self {
        let mut series: BTreeMap<&str, Vec<&TimeSeriesEntry>> = BTreeMap::new();
        for entry in time_series {
            series.entry(entry.region.as_str()).or_default().push(entry);
        }
        let total_markets = flows
            .iter()
            .flat_map(|f| [f.source.as_str(), f.target.as_str()])
            .collect::<BTreeSet<_>>()
            .len();
        Self {
            flows,
            series,
            total_markets,
            basis: config.price_basis,
            efficiency_weights: config.efficiency.clone(),
            stability_weights: config.stability.clone(),
        }
    }

    pub fn compute(&self, cluster: &MarketCluster) -> EfficiencyMetrics {
        if cluster.connected_markets.is_empty() {
            return EfficiencyMetrics::default();
        }
        self.components(cluster)
            .into_metrics(&self.stability_weights, &self.efficiency_weights)
    }

    pub fn components(&self, cluster: &MarketCluster) -> Components {
        let markets = &cluster.connected_markets;
        let internal: Vec<&FlowEdge> = self
            .flows
            .iter()
            .filter(|f| markets.contains(&f.source) && markets.contains(&f.target))
            .collect();
        let prices = self.prices_by_period(markets);

        Components {
            internal_connectivity: internal_connectivity(markets.len(), &internal),
            market_coverage: self.market_coverage(markets.len()),
            price_convergence: price_convergence(&prices),
            price_volatility: log_return_volatility(&period_means(&prices)),
            flow_stability: flow_stability(&internal),
        }
    }

    fn market_coverage(&self, market_count: usize) -> Option<f64> {
        if self.total_markets == 0 {
            return None;
        }
        Some(safe_div(market_count as f64, self.total_markets as f64, SCORE_DEFAULT).min(1.0))
    }

    /// Valid prices of the cluster's markets, grouped by period in
    /// chronological order.
    fn prices_by_period(&self, markets: &BTreeSet<String>) -> BTreeMap<&'a str, Vec<f64>> {
        let mut by_period: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for market in markets {
            let Some(entries) = self.series.get(market.as_str()) else {
                continue;
            };
            for entry in entries.iter().copied().filter(|e| e.has_valid_price(self.basis)) {
                by_period
                    .entry(entry.period.as_str())
                    .or_default()
                    .push(entry.price_in(self.basis));
            }
        }
        by_period
    }
}

/// Distinct internal pairs linked by at least one edge, over `n(n-1)/2`.
fn internal_connectivity(market_count: usize, internal: &[&FlowEdge]) -> Option<f64> {
    if market_count < 2 {
        return None;
    }
    let pairs: BTreeSet<(&str, &str)> = internal
        .iter()
        .map(|f| {
            let (a, b) = (f.source.as_str(), f.target.as_str());
            if a <= b {
                (a, b)
            } else {
                (b, a)
            }
        })
        .collect();
    let n = market_count as f64;
    Some(safe_div(pairs.len() as f64, n * (n - 1.0) / 2.0, SCORE_DEFAULT))
}

/// `1 / (1 + mean cv)` over periods with at least two prices.
fn price_convergence(prices: &BTreeMap<&str, Vec<f64>>) -> Option<f64> {
    let cvs: Vec<f64> = prices
        .values()
        .filter(|p| p.len() >= 2)
        .filter_map(|p| coefficient_of_variation(p))
        .collect();
    let avg_cv = numeric::mean(&cvs)?;
    numeric::finite(Some(1.0 / (1.0 + avg_cv.abs())))
}

fn period_means(prices: &BTreeMap<&str, Vec<f64>>) -> Vec<f64> {
    prices.values().filter_map(|p| numeric::mean(p)).collect()
}

/// `1 / (1 + sd/mean)` of internal edge flow counts; 0 without internal flows.
fn flow_stability(internal: &[&FlowEdge]) -> Option<f64> {
    if internal.is_empty() {
        return Some(0.0);
    }
    let counts: Vec<f64> = internal.iter().map(|f| f.flow_count as f64).collect();
    let mean = numeric::mean(&counts)?;
    if mean == 0.0 {
        return Some(0.0);
    }
    let cv = numeric::std_dev(&counts)? / mean;
    numeric::finite(Some(1.0 / (1.0 + cv)))
}

/// Efficiency of one cluster against the whole snapshot.
pub fn compute_efficiency(
    cluster: &MarketCluster,
    flows: &[FlowEdge],
    time_series: &[TimeSeriesEntry],
    config: &EngineConfig,
) -> EfficiencyMetrics {
    EfficiencyCalculator::new(flows, time_series, config).compute(cluster)
}

// ─── Overview ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterEfficiency {
    #[serde(flatten)]
    pub cluster: MarketCluster,
    pub metrics: EfficiencyMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOverview {
    pub clusters: Vec<ClusterEfficiency>,
    pub cluster_count: usize,
    pub mean_efficiency: f64,
    pub most_efficient: Option<String>,
    pub least_efficient: Option<String>,
    pub market_count_mismatches: Vec<MarketCountMismatch>,
}

/// Efficiency for every cluster, computed in parallel. Output order follows
/// `clusters`.
pub fn compute_all(
    clusters: &[MarketCluster],
    flows: &[FlowEdge],
    time_series: &[TimeSeriesEntry],
    config: &EngineConfig,
    mismatches: Vec<MarketCountMismatch>,
) -> ClusterOverview {
    let calculator = EfficiencyCalculator::new(flows, time_series, config);
    let clusters: Vec<ClusterEfficiency> = par_map(clusters, |cluster| ClusterEfficiency {
        cluster: cluster.clone(),
        metrics: calculator.compute(cluster),
    });

    let scores: Vec<f64> = clusters.iter().map(|c| c.metrics.efficiency_score).collect();
    let ranked = |better: fn(f64, f64) -> bool| {
        clusters
            .iter()
            .fold(None::<&ClusterEfficiency>, |best, c| match best {
                Some(b) if !better(c.metrics.efficiency_score, b.metrics.efficiency_score) => Some(b),
                _ => Some(c),
            })
            .map(|c| c.cluster.cluster_id.clone())
    };
    let most_efficient = ranked(|a, b| a > b);
    let least_efficient = ranked(|a, b| a < b);

    log::debug!("efficiency computed for {} clusters", clusters.len());
    ClusterOverview {
        cluster_count: clusters.len(),
        mean_efficiency: numeric::mean(&scores).map_or(SCORE_DEFAULT, |m| sanitize_unit(m, SCORE_DEFAULT)),
        most_efficient,
        least_efficient,
        market_count_mismatches: mismatches,
        clusters,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
