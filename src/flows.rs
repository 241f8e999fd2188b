// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Spatial Market Integration Engine - Flow Network Analyzer

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::adapter::{self, DecimalTotal};
use crate::error::{AnalysisError, AnalysisResult};
use crate::numeric::{safe_div, sanitize_non_negative, sanitize_unit, SCORE_DEFAULT};
use crate::types::{FlowEdge, RegionId};

const COMPONENT: &str = "flow network";

/// Number of edges listed in [`FlowSummary::top_flows`].
pub const TOP_FLOW_COUNT: usize = 10;

// ─── Output types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedFlowEdge {
    #[serde(flatten)]
    pub edge: FlowEdge,
    /// `totalFlow / maxFlow`, 0 when the maximum is 0.
    pub normalized_value: f64,
    /// `avgFlow / mean(avgFlow)`, 0 when the mean is 0.
    pub intensity: f64,
}

/// Per-region network statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStats {
    pub in_degree: usize,
    pub out_degree: usize,
    /// Distinct regions this one trades with in either direction.
    pub neighbours: usize,
    pub in_strength: f64,
    pub out_strength: f64,
    pub strength: f64,
    /// `strength / max strength` over all nodes.
    pub normalized_strength: f64,
}

impl NodeStats {
    /// Edges touching the region, counted once per direction.
    pub fn edge_count(&self) -> usize {
        self.in_degree + self.out_degree
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSummary {
    pub total_flows: usize,
    pub max_flow: f64,
    pub total_volume: f64,
    /// Mean `totalFlow` over retained edges.
    pub average_flow_strength: f64,
    /// `totalFlows / (n(n-1))` over the regions of the merged map.
    pub flow_density: f64,
    pub unique_markets: usize,
    /// Mean absolute price differential.
    pub mean_price_differential: f64,
    pub top_flows: Vec<FlowEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNetwork {
    pub edges: Vec<EnrichedFlowEdge>,
    pub nodes: BTreeMap<RegionId, NodeStats>,
    pub summary: FlowSummary,
}

impl FlowNetwork {
    /// Every region appearing as a flow endpoint.
    pub fn markets(&self) -> impl Iterator<Item = &RegionId> {
        self.nodes.keys()
    }

    pub fn edge_count_for(&self, region: &str) -> usize {
        self.nodes.get(region).map_or(0, NodeStats::edge_count)
    }
}

// ─── analyze ─────────────────────────────────────────────────────────────────

/// Enrich retained edges and summarize the network. `known_regions` is the
/// size of the merged region map.
pub fn analyze(flows: &[FlowEdge], known_regions: usize) -> AnalysisResult<FlowNetwork> {
    if flows.is_empty() {
        return Err(AnalysisError::insufficient(COMPONENT, "no flow data"));
    }

    let max_flow = flows
        .iter()
        .map(|f| sanitize_non_negative(f.total_flow, 0.0))
        .fold(0.0, f64::max);
    let total_volume = adapter::exact_sum(flows.iter().map(|f| f.total_flow));
    let avg_flow_sum = adapter::exact_sum(flows.iter().map(|f| f.avg_flow));
    let mean_avg_flow = safe_div(avg_flow_sum, flows.len() as f64, 0.0);

    let edges: Vec<EnrichedFlowEdge> = flows
        .iter()
        .map(|f| EnrichedFlowEdge {
            edge: f.clone(),
            normalized_value: sanitize_unit(safe_div(f.total_flow, max_flow, SCORE_DEFAULT), SCORE_DEFAULT),
            intensity: sanitize_non_negative(safe_div(f.avg_flow, mean_avg_flow, SCORE_DEFAULT), SCORE_DEFAULT),
        })
        .collect();

    let nodes = node_stats(flows);
    let unique_markets = nodes.len();
    let n = known_regions as f64;
    let possible_edges = n * (n - 1.0);
    let flow_density = if known_regions < 2 {
        SCORE_DEFAULT
    } else {
        sanitize_non_negative(flows.len() as f64 / possible_edges, SCORE_DEFAULT)
    };

    let summary = FlowSummary {
        total_flows: flows.len(),
        max_flow,
        total_volume: sanitize_non_negative(total_volume, 0.0),
        average_flow_strength: sanitize_non_negative(safe_div(total_volume, flows.len() as f64, 0.0), 0.0),
        flow_density,
        unique_markets,
        mean_price_differential: sanitize_non_negative(
            safe_div(
                adapter::exact_sum(flows.iter().map(|f| f.price_differential.abs())),
                flows.len() as f64,
                0.0,
            ),
            0.0,
        ),
        top_flows: top_flows(flows, TOP_FLOW_COUNT),
    };

    log::debug!(
        "flow network: {} edges over {} markets, max flow {}",
        summary.total_flows,
        unique_markets,
        max_flow
    );
    Ok(FlowNetwork { edges, nodes, summary })
}

fn node_stats(flows: &[FlowEdge]) -> BTreeMap<RegionId, NodeStats> {
    #[derive(Default)]
    struct Acc {
        in_degree: usize,
        out_degree: usize,
        neighbours: BTreeSet<RegionId>,
        inflow: DecimalTotal,
        outflow: DecimalTotal,
    }

    let mut acc: BTreeMap<RegionId, Acc> = BTreeMap::new();
    for f in flows {
        let src = acc.entry(f.source.clone()).or_default();
        src.out_degree += 1;
        src.outflow.add(f.total_flow);
        src.neighbours.insert(f.target.clone());

        let dst = acc.entry(f.target.clone()).or_default();
        dst.in_degree += 1;
        dst.inflow.add(f.total_flow);
        dst.neighbours.insert(f.source.clone());
    }

    let mut nodes: BTreeMap<RegionId, NodeStats> = acc
        .into_iter()
        .map(|(id, a)| {
            let in_strength = sanitize_non_negative(a.inflow.value(), 0.0);
            let out_strength = sanitize_non_negative(a.outflow.value(), 0.0);
            let stats = NodeStats {
                in_degree: a.in_degree,
                out_degree: a.out_degree,
                neighbours: a.neighbours.len(),
                in_strength,
                out_strength,
                strength: in_strength + out_strength,
                normalized_strength: 0.0,
            };
            (id, stats)
        })
        .collect();

    let max_strength = nodes.values().map(|s| s.strength).fold(0.0, f64::max);
    for stats in nodes.values_mut() {
        stats.normalized_strength = sanitize_unit(safe_div(stats.strength, max_strength, 0.0), 0.0);
    }
    nodes
}

/// Largest edges by total flow; ties broken by `(source, target)`.
fn top_flows(flows: &[FlowEdge], limit: usize) -> Vec<FlowEdge> {
    let mut sorted: Vec<&FlowEdge> = flows.iter().collect();
    sorted.sort_by(|a, b| {
        b.total_flow
            .total_cmp(&a.total_flow)
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.target.cmp(&b.target))
    });
    sorted.into_iter().take(limit).cloned().collect()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    fn edge(source: &str, target: &str, total: f64, avg: f64, count: u64) -> FlowEdge {
        FlowEdge {
            source: source.into(),
            target: target.into(),
            total_flow: total,
            avg_flow: avg,
            flow_count: count,
            price_differential: 0.0,
        }
    }

    #[test]
    fn zero_edges_is_no_data() {
        let err = analyze(&[], 5).expect_err("test: no edges");
        assert!(matches!(err, AnalysisError::InsufficientData { component: "flow network", .. }));
    }

    #[test]
    fn all_zero_flows_give_zero_normalization() {
        let flows = vec![edge("aden", "lahj", 0.0, 0.0, 0), edge("lahj", "abyan", 0.0, 0.0, 0)];
        let net = analyze(&flows, 3).expect("test: edges present");
        assert_eq!(net.summary.max_flow, 0.0);
        assert_eq!(net.summary.average_flow_strength, 0.0);
        assert!(net.edges.iter().all(|e| e.normalized_value == 0.0 && e.intensity == 0.0));
        assert!(net.nodes.values().all(|n| n.normalized_strength == 0.0));
    }

    #[test]
    fn normalization_and_intensity() {
        let flows = vec![
            edge("aden", "lahj", 100.0, 10.0, 10),
            edge("lahj", "aden", 50.0, 30.0, 2),
            edge("aden", "abyan", 25.0, 20.0, 1),
        ];
        let net = analyze(&flows, 4).expect("test: edges present");
        assert_eq!(net.summary.max_flow, 100.0);
        assert!((net.edges[1].normalized_value - 0.5).abs() < EPS);
        // mean avgFlow = 20
        assert!((net.edges[0].intensity - 0.5).abs() < EPS);
        assert!((net.edges[1].intensity - 1.5).abs() < EPS);
        assert!((net.summary.average_flow_strength - 175.0 / 3.0).abs() < 1e-9);
        // 3 / (4 * 3)
        assert!((net.summary.flow_density - 0.25).abs() < EPS);
        assert_eq!(net.summary.unique_markets, 3);
    }

    #[test]
    fn node_stats_accumulate_per_endpoint() {
        let flows = vec![
            edge("aden", "lahj", 100.0, 10.0, 10),
            edge("lahj", "aden", 50.0, 30.0, 2),
            edge("aden", "abyan", 25.0, 20.0, 1),
        ];
        let net = analyze(&flows, 4).expect("test: edges present");
        let aden = net.nodes["aden"];
        assert_eq!(aden.out_degree, 2);
        assert_eq!(aden.in_degree, 1);
        assert_eq!(aden.neighbours, 2);
        assert_eq!(aden.strength, 175.0);
        assert_eq!(aden.normalized_strength, 1.0);
        assert_eq!(net.edge_count_for("abyan"), 1);
        assert_eq!(net.edge_count_for("marib"), 0);
    }

    #[test]
    fn density_needs_two_regions() {
        let net = analyze(&[edge("a", "b", 1.0, 1.0, 1)], 1).expect("test: edges present");
        assert_eq!(net.summary.flow_density, 0.0);
    }

    #[test]
    fn top_flows_break_ties_by_endpoints() {
        let flows = vec![
            edge("lahj", "aden", 5.0, 1.0, 1),
            edge("abyan", "aden", 5.0, 1.0, 1),
            edge("aden", "lahj", 9.0, 1.0, 1),
        ];
        let top = top_flows(&flows, 2);
        assert_eq!(top[0].source, "aden");
        assert_eq!(top[1].source, "abyan");
    }

    #[test]
    fn results_do_not_depend_on_edge_order() {
        let mut flows = vec![
            edge("aden", "lahj", 0.1, 0.3, 1),
            edge("lahj", "abyan", 0.2, 0.7, 1),
            edge("abyan", "aden", 0.3, 1.1, 1),
        ];
        let forward = analyze(&flows, 3).expect("test: edges present");
        flows.reverse();
        let backward = analyze(&flows, 3).expect("test: edges present");
        assert_eq!(forward.summary, backward.summary);
        assert_eq!(forward.nodes, backward.nodes);
    }
}
