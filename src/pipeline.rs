// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Spatial Market Integration Engine - Computation Pass

//! One pass over an immutable snapshot: ingest, merge, then every analysis
//! component. A component that cannot run leaves its section unavailable and
//! the others continue.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::autocorrelation::{self, AutocorrelationSummary};
use crate::config::EngineConfig;
use crate::context::SnapshotKey;
use crate::efficiency::{self, ClusterOverview};
use crate::error::{AnalysisError, AnalysisResult, RejectedRecord};
use crate::flows::{self, FlowNetwork};
use crate::geometry::{Feature, GeometryMerger, MergeOutcome};
use crate::health::{self, HealthReport};
use crate::ingest::{self, AttributeRow, Parsed, RawDataset, Resolver};
use crate::normalizer::RegionNormalizer;
use crate::types::{FlowEdge, MarketShock, RegionId, Section, TimeSeriesEntry};

// ─── Request / result ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub key: SnapshotKey,
    #[serde(default)]
    pub dataset: RawDataset,
    /// Echoed into the result untouched.
    #[serde(default)]
    pub processed_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub rejected: Vec<RejectedRecord>,
    pub unmatched_regions: usize,
    pub time_series_entries: usize,
    /// Names of the sections that came back unavailable.
    pub unavailable_sections: Vec<&'static str>,
}

/// The consolidated output handed to the presentation layer. Every map is
/// keyed by canonical region id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketAnalysis {
    pub key: SnapshotKey,
    pub processed_at: Option<String>,
    /// `YYYY-MM` whose attributes were overlaid onto the geometry.
    pub selected_month: Option<String>,
    pub geometry: Section<MergeOutcome>,
    pub flows: Section<FlowNetwork>,
    pub clusters: Section<ClusterOverview>,
    pub autocorrelation: Section<AutocorrelationSummary>,
    pub health: Section<HealthReport>,
    pub diagnostics: Diagnostics,
}

// ─── Pass ────────────────────────────────────────────────────────────────────

/// Run every component over `request.dataset`. Never fails; problems surface
/// as unavailable sections and rejected records.
pub fn run(request: &AnalysisRequest, config: &EngineConfig, normalizer: &RegionNormalizer) -> MarketAnalysis {
    let dataset = &request.dataset;
    let key = &request.key;
    let mut rejected = Vec::new();

    // Attributes for the commodity, across all dates.
    let attributes = ingest::parse_attributes(&dataset.attributes, &config.attribute_id_field, config.price_basis)
        .map(|parsed| records(parsed, &mut rejected));
    let rows: Vec<&AttributeRow> = match &attributes {
        Ok(rows) => rows.iter().filter(|row| row.matches_commodity(&key.commodity)).collect(),
        Err(e) => {
            log::warn!("attributes unavailable: {e}");
            Vec::new()
        }
    };
    let selected_month = select_month(&key.date, &rows);
    let overlay = month_features(&rows, selected_month.as_deref());

    let geometry: AnalysisResult<MergeOutcome> =
        ingest::parse_boundaries(&dataset.boundaries, &config.boundary_name_field).map(|parsed| {
            let features = records(parsed, &mut rejected);
            GeometryMerger::new(normalizer, config.projection)
                .with_fallback_centroids(config.use_fallback_centroids)
                .merge(&features, &overlay)
        });

    let (geometry, flows, clusters, health, time_series_entries) = match &geometry {
        Ok(merged) => {
            let resolver = Resolver::new(normalizer, &merged.regions);
            let dependent = Dependent::compute(
                &resolver,
                merged,
                &rows,
                &attributes,
                dataset,
                config,
                selected_month.as_deref(),
            );
            rejected.extend(dependent.rejected);
            (
                Section::Available { data: merged.clone() },
                dependent.flows,
                dependent.clusters,
                dependent.health,
                dependent.time_series_entries,
            )
        }
        Err(e) => {
            log::warn!("region geometry unavailable: {e}");
            let reason = format!("region geometry unavailable: {e}");
            (
                Section::unavailable(e.to_string()),
                Section::unavailable(reason.clone()),
                Section::unavailable(reason.clone()),
                Section::unavailable(reason),
                0,
            )
        }
    };

    let autocorrelation: Section<AutocorrelationSummary> =
        ingest::parse_autocorrelation(&dataset.autocorrelation, normalizer, config.significance_level)
            .and_then(|parsed| {
                records(parsed, &mut rejected)
                    .into_iter()
                    .next()
                    .ok_or_else(|| AnalysisError::insufficient(ingest::AUTOCORRELATION, "no statistics"))
            })
            .map(|result| autocorrelation::summarize(&result, config.significance_level))
            .into();

    let mut unavailable_sections = Vec::new();
    for (name, available) in [
        ("geometry", geometry.is_available()),
        ("flows", flows.is_available()),
        ("clusters", clusters.is_available()),
        ("autocorrelation", autocorrelation.is_available()),
        ("health", health.is_available()),
    ] {
        if !available {
            unavailable_sections.push(name);
        }
    }
    let unmatched_regions = geometry.data().map_or(0, |g| g.unmatched.len());

    log::info!(
        "analysis {}/{}/{}: month {}, {} regions, {} unmatched, {} rejected, {} sections unavailable",
        key.commodity,
        key.date,
        key.dataset_version,
        selected_month.as_deref().unwrap_or("-"),
        geometry.data().map_or(0, |g| g.regions.len()),
        unmatched_regions,
        rejected.len(),
        unavailable_sections.len()
    );

    MarketAnalysis {
        key: key.clone(),
        processed_at: request.processed_at.clone(),
        selected_month,
        geometry,
        flows,
        clusters,
        autocorrelation,
        health,
        diagnostics: Diagnostics {
            rejected,
            unmatched_regions,
            time_series_entries,
            unavailable_sections,
        },
    }
}

/// Sections that need the merged region map.
struct Dependent {
    flows: Section<FlowNetwork>,
    clusters: Section<ClusterOverview>,
    health: Section<HealthReport>,
    time_series_entries: usize,
    rejected: Vec<RejectedRecord>,
}

impl Dependent {
    fn compute(
        resolver: &Resolver<'_>,
        merged: &MergeOutcome,
        rows: &[&AttributeRow],
        attributes: &AnalysisResult<Vec<AttributeRow>>,
        dataset: &RawDataset,
        config: &EngineConfig,
        selected_month: Option<&str>,
    ) -> Self {
        let mut rejected = Vec::new();

        let series: AnalysisResult<Vec<TimeSeriesEntry>> = match attributes {
            Ok(_) => {
                let parsed = ingest::time_series(rows, resolver);
                rejected.extend(parsed.rejected);
                Ok(parsed.records)
            }
            Err(e) => Err(e.clone()),
        };
        let series_slice: &[TimeSeriesEntry] = series.as_deref().unwrap_or_default();

        let edges: AnalysisResult<Vec<FlowEdge>> =
            ingest::parse_flows(&dataset.flows, resolver).map(|parsed| records(parsed, &mut rejected));
        let edge_slice: &[FlowEdge] = edges.as_deref().unwrap_or_default();
        let flows: Section<FlowNetwork> = edges
            .as_ref()
            .map_err(Clone::clone)
            .and_then(|edges| flows::analyze(edges, merged.regions.len()))
            .into();

        let clusters: Section<ClusterOverview> = ingest::parse_clusters(&dataset.clusters, resolver)
            .map(|parsed| {
                rejected.extend(parsed.clusters.rejected);
                efficiency::compute_all(
                    &parsed.clusters.records,
                    edge_slice,
                    series_slice,
                    config,
                    parsed.mismatches,
                )
            })
            .into();

        let shocks: Vec<MarketShock> = match ingest::parse_shocks(&dataset.shocks, resolver) {
            Ok(parsed) => records(parsed, &mut rejected),
            Err(e) => {
                log::debug!("no shocks for this snapshot: {e}");
                Vec::new()
            }
        };
        let shock_refs: Vec<&MarketShock> = shocks
            .iter()
            .filter(|s| match (config.shocks_in_selected_month, selected_month) {
                (true, Some(month)) => ingest::month_of(&s.date) == month,
                _ => true,
            })
            .collect();

        let region_ids: Vec<RegionId> = merged.regions.keys().cloned().collect();
        let health: Section<HealthReport> = series
            .as_ref()
            .map_err(Clone::clone)
            .and_then(|series| health::assess(&region_ids, series, &shock_refs, edge_slice, config))
            .into();

        Self {
            flows,
            clusters,
            health,
            time_series_entries: series_slice.len(),
            rejected,
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Accepted records; rejections move to `sink`.
fn records<T>(parsed: Parsed<T>, sink: &mut Vec<RejectedRecord>) -> Vec<T> {
    sink.extend(parsed.rejected);
    parsed.records
}

/// The requested month, or the latest month present when the request names
/// none (or an invalid one).
fn select_month(date: &str, rows: &[&AttributeRow]) -> Option<String> {
    if !date.trim().is_empty() {
        match ingest::parse_period(date) {
            Ok(period) => return Some(ingest::month_of(&period).to_string()),
            Err(e) => log::warn!("requested date unusable ({e}), using the latest month"),
        }
    }
    rows.iter()
        .map(|row| ingest::month_of(&row.period))
        .max()
        .map(str::to_string)
}

/// One overlay feature per region name for `month`; the latest period wins.
fn month_features(rows: &[&AttributeRow], month: Option<&str>) -> Vec<Feature> {
    let Some(month) = month else {
        return Vec::new();
    };
    let mut latest: BTreeMap<&str, &AttributeRow> = BTreeMap::new();
    for &row in rows.iter().filter(|row| row.in_month(month)) {
        match latest.get(row.name.as_str()) {
            Some(kept) if kept.period > row.period => {}
            _ => {
                latest.insert(row.name.as_str(), row);
            }
        }
    }
    latest.values().map(|row| row.to_feature()).collect()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn square(lon: f64, lat: f64) -> Value {
        json!({
            "type": "Polygon",
            "coordinates": [[[lon, lat], [lon + 0.5, lat], [lon + 0.5, lat + 0.5], [lon, lat + 0.5], [lon, lat]]]
        })
    }

    fn dataset() -> RawDataset {
        RawDataset {
            boundaries: json!({
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "properties": {"shapeName": "Ta'izz Governorate"}, "geometry": square(44.0, 13.5)},
                    {"type": "Feature", "properties": {"shapeName": "Aden"}, "geometry": square(45.0, 12.8)},
                    {"type": "Feature", "properties": {"shapeName": "Lahj"}, "geometry": square(44.8, 13.1)},
                ]
            }),
            attributes: json!([
                {"region_id": "taizz", "commodity": "Wheat", "date": "2023-01-01", "price": 10.0, "conflictIntensity": 2.0},
                {"region_id": "taizz", "commodity": "Wheat", "date": "2023-02-01", "price": 11.0},
                {"region_id": "aden", "commodity": "Wheat", "date": "2023-02-01", "price": 12.0},
                {"region_id": "lahj", "commodity": "Rice", "date": "2023-02-01", "price": 30.0},
                {"region_id": "Hadramaut", "commodity": "Wheat", "date": "2023-02-01", "price": 9.0},
            ]),
            clusters: json!([
                {"clusterId": "c1", "mainMarket": "Aden", "connectedMarkets": ["Aden", "Taizz", "Lahj"], "marketCount": 3}
            ]),
            flows: json!([
                {"source": "aden", "target": "taizz", "totalFlow": 40.0, "flowCount": 4},
                {"source": "lahj", "target": "aden", "totalFlow": 10.0, "flowCount": 2},
                {"source": "aden", "target": "atlantis", "totalFlow": 5.0, "flowCount": 1},
            ]),
            shocks: json!([
                {"region": "taizz", "date": "2023-01-15", "magnitude": 0.2, "shockType": "price_spike"},
                {"region": "aden", "date": "2023-02-10", "magnitude": 0.4, "shockType": "supply"},
            ]),
            autocorrelation: json!({
                "global": {"moranI": 0.4, "pValue": 0.01, "zScore": 2.7},
                "local": {"taizz": {"localI": 0.5, "pValue": 0.02, "clusterType": "high-high"}}
            }),
        }
    }

    fn request(date: &str) -> AnalysisRequest {
        AnalysisRequest {
            key: SnapshotKey::new("wheat", date, "v1"),
            dataset: dataset(),
            processed_at: Some("2023-03-01T00:00:00Z".to_string()),
        }
    }

    fn run_default(request: &AnalysisRequest) -> MarketAnalysis {
        let config = EngineConfig::default();
        run(request, &config, &config.normalizer())
    }

    #[test]
    fn full_pass_fills_every_section() {
        let a = run_default(&request("2023-02"));
        assert!(a.diagnostics.unavailable_sections.is_empty(), "{:?}", a.diagnostics);
        let geometry = a.geometry.data().expect("test: geometry");
        assert_eq!(geometry.regions.keys().collect::<Vec<_>>(), vec!["aden", "lahj", "taizz"]);
        assert_eq!(a.selected_month.as_deref(), Some("2023-02"));
        assert_eq!(a.processed_at.as_deref(), Some("2023-03-01T00:00:00Z"));
    }

    #[test]
    fn attribute_only_region_is_unmatched() {
        let a = run_default(&request("2023-02"));
        let geometry = a.geometry.data().expect("test: geometry");
        assert!(!geometry.contains("hadramaut"));
        assert!(geometry.unmatched.iter().any(|u| u.original_id == "Hadramaut"));
        assert_eq!(a.diagnostics.unmatched_regions, geometry.unmatched.len());
    }

    #[test]
    fn unknown_flow_endpoint_is_rejected() {
        let a = run_default(&request("2023-02"));
        let flows = a.flows.data().expect("test: flows");
        assert_eq!(flows.summary.total_flows, 2);
        assert!(a.diagnostics.rejected.iter().any(|r| r.collection == ingest::FLOWS));
    }

    #[test]
    fn time_series_filters_commodity() {
        let a = run_default(&request("2023-02"));
        // Two taizz rows and one aden row; rice and the unmatched region drop out.
        assert_eq!(a.diagnostics.time_series_entries, 3);
        let health = a.health.data().expect("test: health");
        assert_eq!(health.regions.len(), 3);
    }

    #[test]
    fn empty_date_selects_latest_month() {
        let a = run_default(&request(""));
        assert_eq!(a.selected_month.as_deref(), Some("2023-02"));
        let b = run_default(&request("not-a-date"));
        assert_eq!(b.selected_month.as_deref(), Some("2023-02"));
    }

    #[test]
    fn selected_month_overlays_its_attributes() {
        let a = run_default(&request("2023-01"));
        let taizz = &a.geometry.data().expect("test: geometry").regions["taizz"];
        assert_eq!(taizz.properties["price"], json!(10.0));
        assert!(!a.geometry.data().expect("test: geometry").regions["aden"]
            .properties
            .contains_key("price"));
    }

    #[test]
    fn shocks_can_be_restricted_to_the_month() {
        let mut config = EngineConfig::default();
        config.shocks_in_selected_month = true;
        let a = run(&request("2023-02"), &config, &config.normalizer());
        let shocks = &a.health.data().expect("test: health").shocks;
        assert!(shocks.contains_key("aden"));
        assert!(!shocks.contains_key("taizz"));

        let all = run_default(&request("2023-02"));
        assert_eq!(all.health.data().expect("test: health").shocks.len(), 2);
    }

    #[test]
    fn missing_boundaries_leave_autocorrelation_running() {
        let mut req = request("2023-02");
        req.dataset.boundaries = Value::Null;
        let a = run_default(&req);
        assert!(!a.geometry.is_available());
        assert!(!a.flows.is_available());
        assert!(!a.clusters.is_available());
        assert!(!a.health.is_available());
        assert!(a.autocorrelation.is_available());
        assert_eq!(a.diagnostics.unavailable_sections.len(), 4);
    }

    #[test]
    fn malformed_flows_only_affect_flows() {
        let mut req = request("2023-02");
        req.dataset.flows = json!("not a list");
        let a = run_default(&req);
        assert!(!a.flows.is_available());
        assert!(a.clusters.is_available());
        assert!(a.health.is_available());
    }

    #[test]
    fn missing_attributes_make_health_unavailable() {
        let mut req = request("2023-02");
        req.dataset.attributes = Value::Null;
        let a = run_default(&req);
        assert!(a.geometry.is_available());
        assert!(!a.health.is_available());
        assert_eq!(a.selected_month.as_deref(), Some("2023-02"));
    }

    #[test]
    fn output_serializes_with_status_tags() {
        let a = run_default(&request("2023-02"));
        let json = serde_json::to_value(&a).expect("test: serialize");
        assert_eq!(json["flows"]["status"], "available");
        assert_eq!(json["key"]["commodity"], "wheat");
        assert!(json["health"]["data"]["regions"]["taizz"].is_object());
    }
}
