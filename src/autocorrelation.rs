// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Spatial Market Integration Engine - Spatial Autocorrelation Summarizer

//! Reshapes precomputed Moran's I statistics. No statistic is estimated here.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::numeric::{safe_div, sanitize, sanitize_unit};
use crate::types::{AutocorrelationResult, ClusterType, GlobalAutocorrelation, RegionId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutocorrelationSummary {
    #[serde(flatten)]
    pub result: AutocorrelationResult,
    pub total_regions: usize,
    pub significant_regions: usize,
    pub significance_rate: f64,
    /// Every category is present, zero counts included.
    pub category_counts: BTreeMap<ClusterType, usize>,
    /// Significant high-high regions, sorted by id.
    pub hotspots: Vec<RegionId>,
    /// Significant low-low regions, sorted by id.
    pub coldspots: Vec<RegionId>,
}

pub fn summarize(result: &AutocorrelationResult, significance_level: f64) -> AutocorrelationSummary {
    let mut result = result.clone();
    result.global = GlobalAutocorrelation {
        moran_i: sanitize(result.global.moran_i, 0.0).clamp(-1.0, 1.0),
        p_value: sanitize_unit(result.global.p_value, 1.0),
        z_score: sanitize(result.global.z_score, 0.0),
        ..result.global
    };

    let mut category_counts: BTreeMap<ClusterType, usize> = ClusterType::ALL.iter().map(|t| (*t, 0)).collect();
    let mut significant_regions = 0;
    let mut hotspots = Vec::new();
    let mut coldspots = Vec::new();

    // BTreeMap iteration keeps the spot lists sorted.
    for (id, local) in &mut result.local {
        local.local_i = sanitize(local.local_i, 0.0);
        local.p_value = sanitize_unit(local.p_value, 1.0);
        *category_counts.entry(local.cluster_type).or_default() += 1;

        let significant = local.p_value < significance_level;
        if !significant {
            continue;
        }
        significant_regions += 1;
        match local.cluster_type {
            ClusterType::HighHigh => hotspots.push(id.clone()),
            ClusterType::LowLow => coldspots.push(id.clone()),
            _ => {}
        }
    }

    let total_regions = result.local.len();
    log::debug!("autocorrelation: {significant_regions} of {total_regions} local statistics significant");
    AutocorrelationSummary {
        total_regions,
        significant_regions,
        significance_rate: safe_div(significant_regions as f64, total_regions as f64, 0.0),
        category_counts,
        hotspots,
        coldspots,
        result,
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LocalAutocorrelation;

    fn stat(i: f64, p: f64, t: ClusterType) -> LocalAutocorrelation {
        LocalAutocorrelation {
            local_i: i,
            p_value: p,
            cluster_type: t,
        }
    }

    fn sample() -> AutocorrelationResult {
        let mut local = BTreeMap::new();
        local.insert("taizz".to_string(), stat(0.8, 0.01, ClusterType::HighHigh));
        local.insert("aden".to_string(), stat(0.6, 0.03, ClusterType::HighHigh));
        local.insert("marib".to_string(), stat(0.5, 0.04, ClusterType::LowLow));
        local.insert("ibb".to_string(), stat(-0.2, 0.20, ClusterType::LowHigh));
        local.insert("lahj".to_string(), stat(f64::NAN, f64::NAN, ClusterType::NotSignificant));
        AutocorrelationResult {
            global: GlobalAutocorrelation {
                moran_i: 0.31,
                p_value: 0.002,
                z_score: 3.1,
                significant: true,
            },
            local,
        }
    }

    #[test]
    fn counts_and_rate() {
        let s = summarize(&sample(), 0.05);
        assert_eq!(s.total_regions, 5);
        assert_eq!(s.significant_regions, 3);
        assert!((s.significance_rate - 0.6).abs() < 1e-12);
        assert_eq!(s.category_counts[&ClusterType::HighHigh], 2);
        assert_eq!(s.category_counts[&ClusterType::HighLow], 0);
        assert_eq!(s.category_counts.len(), 5);
    }

    #[test]
    fn spots_are_sorted_and_significant() {
        let s = summarize(&sample(), 0.05);
        assert_eq!(s.hotspots, vec!["aden".to_string(), "taizz".to_string()]);
        assert_eq!(s.coldspots, vec!["marib".to_string()]);
        let strict = summarize(&sample(), 0.02);
        assert_eq!(strict.hotspots, vec!["taizz".to_string()]);
        assert!(strict.coldspots.is_empty());
    }

    #[test]
    fn non_finite_values_are_sanitized() {
        let s = summarize(&sample(), 0.05);
        let lahj = s.result.local["lahj"];
        assert_eq!(lahj.local_i, 0.0);
        assert_eq!(lahj.p_value, 1.0);
    }

    #[test]
    fn moran_passthrough_stays_in_range() {
        let mut r = sample();
        r.global.moran_i = 0.31;
        assert_eq!(summarize(&r, 0.05).result.global.moran_i, 0.31);
        r.global.moran_i = -4.0;
        assert_eq!(summarize(&r, 0.05).result.global.moran_i, -1.0);
    }

    #[test]
    fn empty_local_set() {
        let r = AutocorrelationResult {
            global: sample().global,
            local: BTreeMap::new(),
        };
        let s = summarize(&r, 0.05);
        assert_eq!(s.total_regions, 0);
        assert_eq!(s.significance_rate, 0.0);
        assert!(s.category_counts.values().all(|c| *c == 0));
    }

    #[test]
    fn category_keys_serialize_as_labels() {
        let json = serde_json::to_value(summarize(&sample(), 0.05)).expect("test: serialize");
        assert_eq!(json["categoryCounts"]["high-high"], 2);
        assert_eq!(json["global"]["moranI"], 0.31);
    }
}
