// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Spatial Market Integration Engine - Ingestion Boundary

//! Raw JSON collections in, validated typed records out.
//!
//! A collection that is missing yields [`AnalysisError::InsufficientData`]; one
//! of the wrong shape yields [`AnalysisError::MalformedInput`]. Individual bad
//! records never fail a collection: they are dropped and listed as
//! [`RejectedRecord`]s.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::PriceBasis;
use crate::error::{AnalysisError, AnalysisResult, RecordError, RejectedRecord};
use crate::geometry::Feature;
use crate::normalizer::RegionNormalizer;
use crate::numeric;
use crate::types::{
    AutocorrelationResult, ClusterType, FlowEdge, Geometry, GlobalAutocorrelation, LocalAutocorrelation,
    MarketCluster, MarketShock, Properties, Region, RegionId, TimeSeriesEntry,
};

pub const BOUNDARIES: &str = "boundaries";
pub const ATTRIBUTES: &str = "attributes";
pub const CLUSTERS: &str = "clusters";
pub const FLOWS: &str = "flows";
pub const SHOCKS: &str = "shocks";
pub const AUTOCORRELATION: &str = "autocorrelation";

/// Every input collection exactly as delivered by the upstream pipeline.
/// Absent collections deserialize as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawDataset {
    pub boundaries: Value,
    pub attributes: Value,
    pub clusters: Value,
    pub flows: Value,
    pub shocks: Value,
    pub autocorrelation: Value,
}

/// Records that passed validation plus the ones that did not.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub records: Vec<T>,
    pub rejected: Vec<RejectedRecord>,
}

impl<T> Parsed<T> {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            rejected: Vec::new(),
        }
    }

    fn push(&mut self, collection: &'static str, index: usize, result: Result<T, RecordError>) {
        match result {
            Ok(record) => self.records.push(record),
            Err(error) => self.reject(collection, index, error),
        }
    }

    fn reject(&mut self, collection: &'static str, index: usize, error: RecordError) {
        log::warn!("{collection}[{index}] rejected: {error}");
        self.rejected.push(RejectedRecord {
            collection,
            index,
            error,
        });
    }
}

// ─── Collection access ───────────────────────────────────────────────────────

/// The items of an array or of a GeoJSON `FeatureCollection`.
pub fn collection<'v>(value: &'v Value, name: &'static str) -> AnalysisResult<&'v [Value]> {
    let malformed = AnalysisError::MalformedInput {
        collection: name,
        expected: "an array or a FeatureCollection",
    };
    match value {
        Value::Array(items) => Ok(items.as_slice()),
        Value::Object(map) => match map.get("features") {
            Some(Value::Array(items)) => Ok(items.as_slice()),
            _ => Err(malformed),
        },
        Value::Null => Err(AnalysisError::insufficient(name, "collection is missing")),
        _ => Err(malformed),
    }
}

// ─── Field helpers ───────────────────────────────────────────────────────────

fn object(value: &Value) -> Result<&Map<String, Value>, RecordError> {
    value.as_object().ok_or(RecordError::NotAnObject)
}

/// A GeoJSON feature's `properties`, or the record itself when flat.
fn feature_parts(value: &Value) -> Result<(&Map<String, Value>, Option<&Value>), RecordError> {
    let obj = object(value)?;
    match obj.get("properties") {
        Some(Value::Object(props)) => Ok((props, obj.get("geometry"))),
        _ => Ok((obj, obj.get("geometry"))),
    }
}

/// First key present with a non-null value.
fn lookup<'m>(obj: &'m Map<String, Value>, keys: &[&str]) -> Option<&'m Value> {
    keys.iter().filter_map(|k| obj.get(*k)).find(|v| !v.is_null())
}

fn optional_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    match lookup(obj, keys)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required_str(obj: &Map<String, Value>, keys: &[&str]) -> Result<String, RecordError> {
    optional_str(obj, keys).ok_or_else(|| RecordError::MissingField {
        field: keys[0].to_string(),
    })
}

/// A finite number, accepting numeric strings.
fn optional_number(obj: &Map<String, Value>, keys: &[&str]) -> Result<Option<f64>, RecordError> {
    let Some(value) = lookup(obj, keys) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(RecordError::InvalidNumber {
            field: keys[0].to_string(),
        }),
    }
}

fn required_number(obj: &Map<String, Value>, keys: &[&str]) -> Result<f64, RecordError> {
    optional_number(obj, keys)?.ok_or_else(|| RecordError::MissingField {
        field: keys[0].to_string(),
    })
}

fn non_negative(field: &str, value: f64) -> Result<f64, RecordError> {
    if value < 0.0 {
        return Err(RecordError::NegativeValue {
            field: field.to_string(),
        });
    }
    Ok(value)
}

/// Validate `YYYY-MM` or `YYYY-MM-DD` (a time part is dropped) and return
/// the date portion.
pub fn parse_period(raw: &str) -> Result<String, RecordError> {
    let trimmed = raw.trim();
    let date = trimmed.split(|c| c == 'T' || c == ' ').next().unwrap_or(trimmed);
    let b = date.as_bytes();
    let digits = |range: std::ops::Range<usize>| b[range].iter().all(u8::is_ascii_digit);
    let two = |i: usize| (b[i] - b'0') as u32 * 10 + (b[i + 1] - b'0') as u32;

    let year_month_ok =
        b.len() >= 7 && digits(0..4) && b[4] == b'-' && digits(5..7) && (1..=12).contains(&two(5));
    let valid = match b.len() {
        7 => year_month_ok,
        10 => year_month_ok && b[7] == b'-' && digits(8..10) && (1..=31).contains(&two(8)),
        _ => false,
    };
    if valid {
        Ok(date.to_string())
    } else {
        Err(RecordError::InvalidPeriod {
            value: raw.to_string(),
        })
    }
}

/// `YYYY-MM` portion of a validated period.
pub fn month_of(period: &str) -> &str {
    period.get(..7).unwrap_or(period)
}

fn properties_of(obj: &Map<String, Value>) -> Properties {
    obj.iter()
        .filter(|(k, _)| k.as_str() != "geometry")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

// ─── Identity resolution ─────────────────────────────────────────────────────

/// Maps a free-text region name to a canonical id present in the merged map.
pub struct Resolver<'a> {
    normalizer: &'a RegionNormalizer,
    known: &'a BTreeMap<RegionId, Region>,
}

impl<'a> Resolver<'a> {
    pub fn new(normalizer: &'a RegionNormalizer, known: &'a BTreeMap<RegionId, Region>) -> Self {
        Self { normalizer, known }
    }

    pub fn resolve(&self, name: &str) -> Result<RegionId, RecordError> {
        let id = self
            .normalizer
            .normalize(name)
            .ok_or_else(|| RecordError::UnnormalizableRegion { name: name.to_string() })?;
        if self.normalizer.is_excluded(&id) {
            return Err(RecordError::ExcludedRegion { region: id });
        }
        if !self.known.contains_key(&id) {
            return Err(RecordError::UnknownRegion { region: id });
        }
        Ok(id)
    }

    pub fn normalizer(&self) -> &RegionNormalizer {
        self.normalizer
    }
}

// ─── Boundaries ──────────────────────────────────────────────────────────────

pub fn parse_boundaries(value: &Value, name_field: &str) -> AnalysisResult<Parsed<Feature>> {
    let mut out = Parsed::new();
    for (index, item) in collection(value, BOUNDARIES)?.iter().enumerate() {
        out.push(BOUNDARIES, index, boundary(item, name_field));
    }
    Ok(out)
}

fn boundary(item: &Value, name_field: &str) -> Result<Feature, RecordError> {
    let (props, geometry) = feature_parts(item)?;
    let name = required_str(props, &[name_field])?;
    let geometry = match geometry {
        None | Some(Value::Null) => None,
        Some(g) => Some(
            serde_json::from_value::<Geometry>(g.clone())
                .map_err(|e| RecordError::InvalidGeometry { reason: e.to_string() })?,
        ),
    };
    Ok(Feature {
        name,
        geometry,
        properties: properties_of(props),
    })
}

// ─── Attributes ──────────────────────────────────────────────────────────────

/// One per-region, per-commodity, per-date attribute record.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeRow {
    /// Position in the attribute collection.
    pub index: usize,
    pub name: String,
    pub commodity: Option<String>,
    pub period: String,
    pub price: f64,
    pub usd_price: f64,
    pub conflict_intensity: f64,
    pub volatility: f64,
    pub properties: Properties,
}

impl AttributeRow {
    /// Rows without a commodity column belong to every commodity.
    pub fn matches_commodity(&self, commodity: &str) -> bool {
        self.commodity
            .as_deref()
            .map_or(true, |c| c.trim().eq_ignore_ascii_case(commodity.trim()))
    }

    pub fn in_month(&self, month: &str) -> bool {
        month_of(&self.period) == month
    }

    pub fn to_feature(&self) -> Feature {
        Feature {
            name: self.name.clone(),
            geometry: None,
            properties: self.properties.clone(),
        }
    }

    pub fn to_entry(&self, region: RegionId) -> TimeSeriesEntry {
        TimeSeriesEntry {
            region,
            period: self.period.clone(),
            price: self.price,
            usd_price: self.usd_price,
            conflict_intensity: self.conflict_intensity,
            volatility: self.volatility,
        }
    }
}

const PRICE_KEYS: &[&str] = &["price"];
const USD_PRICE_KEYS: &[&str] = &["usdPrice", "usdprice", "usd_price"];

/// The column selected by `basis` is required; the other defaults to 0,
/// which every price metric treats as not a valid price.
pub fn parse_attributes(value: &Value, id_field: &str, basis: PriceBasis) -> AnalysisResult<Parsed<AttributeRow>> {
    let mut out = Parsed::new();
    for (index, item) in collection(value, ATTRIBUTES)?.iter().enumerate() {
        out.push(ATTRIBUTES, index, attribute(index, item, id_field, basis));
    }
    Ok(out)
}

fn attribute(index: usize, item: &Value, id_field: &str, basis: PriceBasis) -> Result<AttributeRow, RecordError> {
    let (props, _) = feature_parts(item)?;
    let name = required_str(props, &[id_field])?;
    let period = parse_period(&required_str(props, &["date", "period"])?)?;

    let (price, usd_price) = match basis {
        PriceBasis::Local => (
            required_number(props, PRICE_KEYS)?,
            optional_number(props, USD_PRICE_KEYS)?.unwrap_or(0.0),
        ),
        PriceBasis::Usd => (
            optional_number(props, PRICE_KEYS)?.unwrap_or(0.0),
            required_number(props, USD_PRICE_KEYS)?,
        ),
    };
    let conflict_intensity = optional_number(props, &["conflictIntensity", "conflict_intensity"])?.unwrap_or(0.0);
    let volatility = optional_number(props, &["volatility"])?.unwrap_or(0.0);

    Ok(AttributeRow {
        index,
        name,
        commodity: optional_str(props, &["commodity"]),
        period,
        price,
        usd_price,
        conflict_intensity: non_negative("conflictIntensity", conflict_intensity)?,
        volatility: non_negative("volatility", volatility)?,
        properties: properties_of(props),
    })
}

/// Resolve attribute rows into time-series entries. Rows for unknown regions
/// are rejected; entries come back sorted by `(region, period)`.
pub fn time_series(rows: &[&AttributeRow], resolver: &Resolver<'_>) -> Parsed<TimeSeriesEntry> {
    let mut out = Parsed::new();
    for row in rows {
        out.push(ATTRIBUTES, row.index, resolver.resolve(&row.name).map(|id| row.to_entry(id)));
    }
    out.records
        .sort_by(|a, b| a.region.cmp(&b.region).then_with(|| a.period.cmp(&b.period)));
    out
}

// ─── Flows ───────────────────────────────────────────────────────────────────

pub fn parse_flows(value: &Value, resolver: &Resolver<'_>) -> AnalysisResult<Parsed<FlowEdge>> {
    let mut out = Parsed::new();
    for (index, item) in collection(value, FLOWS)?.iter().enumerate() {
        out.push(FLOWS, index, flow(item, resolver));
    }
    Ok(out)
}

fn flow(item: &Value, resolver: &Resolver<'_>) -> Result<FlowEdge, RecordError> {
    let obj = object(item)?;
    let source = resolver.resolve(&required_str(obj, &["source", "from", "sourceRegion"])?)?;
    let target = resolver.resolve(&required_str(obj, &["target", "to", "targetRegion"])?)?;
    if source == target {
        return Err(RecordError::SelfLoop { region: source });
    }

    let total_flow = non_negative("totalFlow", required_number(obj, &["totalFlow", "total_flow"])?)?;
    let flow_count = non_negative("flowCount", optional_number(obj, &["flowCount", "flow_count"])?.unwrap_or(0.0))?;
    let flow_count = flow_count.floor() as u64;
    let avg_flow = match optional_number(obj, &["avgFlow", "avg_flow"])? {
        Some(v) => non_negative("avgFlow", v)?,
        None => numeric::safe_div(total_flow, flow_count as f64, total_flow),
    };
    let price_differential = optional_number(
        obj,
        &["avgPriceDifferential", "priceDifferential", "avg_price_differential", "price_differential"],
    )?
    .unwrap_or(0.0);

    Ok(FlowEdge {
        source,
        target,
        total_flow,
        avg_flow,
        flow_count,
        price_differential,
    })
}

// ─── Clusters ────────────────────────────────────────────────────────────────

/// A cluster record whose declared `marketCount` disagreed with its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketCountMismatch {
    pub cluster_id: String,
    pub declared: usize,
    pub actual: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedClusters {
    pub clusters: Parsed<MarketCluster>,
    pub mismatches: Vec<MarketCountMismatch>,
}

/// Member names are resolved individually; an unknown member is dropped from
/// its cluster and reported. An unknown main market is reported but the
/// cluster is kept. `marketCount` is always recomputed.
pub fn parse_clusters(value: &Value, resolver: &Resolver<'_>) -> AnalysisResult<ParsedClusters> {
    let mut clusters = Parsed::new();
    let mut mismatches = Vec::new();

    for (index, item) in collection(value, CLUSTERS)?.iter().enumerate() {
        let result = cluster(item, resolver.normalizer());
        let (record, declared, members) = match result {
            Ok(parts) => parts,
            Err(e) => {
                clusters.reject(CLUSTERS, index, e);
                continue;
            }
        };
        if let Err(e) = resolver.resolve(&record.1) {
            clusters.reject(CLUSTERS, index, e);
        }

        let mut connected = Vec::with_capacity(members.len());
        for name in members {
            match resolver.resolve(&name) {
                Ok(id) => connected.push(id),
                Err(e) => clusters.reject(CLUSTERS, index, e),
            }
        }
        let cluster = MarketCluster::new(record.0, record.1, connected);
        if let Some(declared) = declared {
            if declared != cluster.market_count {
                log::debug!(
                    "cluster {} declares {declared} markets, has {}",
                    cluster.cluster_id,
                    cluster.market_count
                );
                mismatches.push(MarketCountMismatch {
                    cluster_id: cluster.cluster_id.clone(),
                    declared,
                    actual: cluster.market_count,
                });
            }
        }
        clusters.records.push(cluster);
    }

    Ok(ParsedClusters { clusters, mismatches })
}

type ClusterParts = ((String, RegionId), Option<usize>, Vec<String>);

fn cluster(item: &Value, normalizer: &RegionNormalizer) -> Result<ClusterParts, RecordError> {
    let obj = object(item)?;
    let cluster_id = required_str(obj, &["clusterId", "cluster_id", "id"])?;
    let main_name = required_str(obj, &["mainMarket", "main_market"])?;
    let main_market = normalizer
        .normalize(&main_name)
        .ok_or(RecordError::UnnormalizableRegion { name: main_name })?;

    let members = match lookup(obj, &["connectedMarkets", "connected_markets"]) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(_) => {
            return Err(RecordError::MissingField {
                field: "connectedMarkets".to_string(),
            })
        }
        None => Vec::new(),
    };
    let declared = optional_number(obj, &["marketCount", "market_count"])?
        .filter(|n| *n >= 0.0)
        .map(|n| n as usize);

    Ok(((cluster_id, main_market), declared, members))
}

// ─── Shocks ──────────────────────────────────────────────────────────────────

pub fn parse_shocks(value: &Value, resolver: &Resolver<'_>) -> AnalysisResult<Parsed<MarketShock>> {
    let mut out = Parsed::new();
    for (index, item) in collection(value, SHOCKS)?.iter().enumerate() {
        out.push(SHOCKS, index, shock(item, resolver));
    }
    Ok(out)
}

fn shock(item: &Value, resolver: &Resolver<'_>) -> Result<MarketShock, RecordError> {
    let obj = object(item)?;
    let region = resolver.resolve(&required_str(obj, &["region", "region_id"])?)?;
    let date = parse_period(&required_str(obj, &["date", "period"])?)?;
    let magnitude = optional_number(obj, &["magnitude"])?.unwrap_or(0.0);
    let shock_type = optional_str(obj, &["shockType", "shock_type", "type"]).unwrap_or_else(|| "unknown".to_string());
    Ok(MarketShock {
        region,
        date,
        magnitude,
        shock_type,
    })
}

// ─── Autocorrelation ─────────────────────────────────────────────────────────

/// Precomputed global and local statistics. Local entries may be an object
/// keyed by region name or an array of records carrying a `region` field.
pub fn parse_autocorrelation(
    value: &Value,
    normalizer: &RegionNormalizer,
    significance_level: f64,
) -> AnalysisResult<Parsed<AutocorrelationResult>> {
    let obj = match value {
        Value::Object(obj) => obj,
        Value::Null => return Err(AnalysisError::insufficient(AUTOCORRELATION, "collection is missing")),
        _ => {
            return Err(AnalysisError::MalformedInput {
                collection: AUTOCORRELATION,
                expected: "an object with `global` and `local`",
            })
        }
    };
    let global = match obj.get("global") {
        Some(Value::Object(g)) => g,
        _ => {
            return Err(AnalysisError::insufficient(
                AUTOCORRELATION,
                "global statistics are missing",
            ))
        }
    };
    let global = global_stats(global, significance_level).map_err(|e| AnalysisError::insufficient(
        AUTOCORRELATION,
        format!("global statistics unusable: {e}"),
    ))?;

    let entries: Vec<(String, &Value)> = match obj.get("local") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                let name = v
                    .as_object()
                    .and_then(|o| optional_str(o, &["region", "region_id", "id"]))
                    .unwrap_or_default();
                (name, v)
            })
            .collect(),
        Some(_) => {
            return Err(AnalysisError::MalformedInput {
                collection: AUTOCORRELATION,
                expected: "`local` to be an object or an array",
            })
        }
    };

    let mut out = Parsed::new();
    let mut local = BTreeMap::new();
    for (index, (name, item)) in entries.into_iter().enumerate() {
        let parsed = normalizer
            .normalize(&name)
            .ok_or(RecordError::UnnormalizableRegion { name })
            .and_then(|id| {
                if normalizer.is_excluded(&id) {
                    Err(RecordError::ExcludedRegion { region: id })
                } else {
                    Ok(id)
                }
            })
            .and_then(|id| local_stats(item).map(|stats| (id, stats)));
        match parsed {
            Ok((id, stats)) => {
                if local.contains_key(&id) {
                    log::debug!("duplicate local statistic for {id}, keeping the first");
                    continue;
                }
                local.insert(id, stats);
            }
            Err(e) => out.reject(AUTOCORRELATION, index, e),
        }
    }

    out.records.push(AutocorrelationResult { global, local });
    Ok(out)
}

fn global_stats(obj: &Map<String, Value>, significance_level: f64) -> Result<GlobalAutocorrelation, RecordError> {
    let moran_i = required_number(obj, &["moranI", "moran_i", "I"])?.clamp(-1.0, 1.0);
    let p_value = numeric::sanitize_unit(optional_number(obj, &["pValue", "p_value"])?.unwrap_or(1.0), 1.0);
    let z_score = optional_number(obj, &["zScore", "z_score"])?.unwrap_or(0.0);
    let significant = obj
        .get("significant")
        .and_then(Value::as_bool)
        .unwrap_or(p_value < significance_level);
    Ok(GlobalAutocorrelation {
        moran_i,
        p_value,
        z_score,
        significant,
    })
}

fn local_stats(item: &Value) -> Result<LocalAutocorrelation, RecordError> {
    let obj = object(item)?;
    let local_i = optional_number(obj, &["localI", "local_i", "Ii"])?.unwrap_or(0.0);
    let p_value = numeric::sanitize_unit(optional_number(obj, &["pValue", "p_value"])?.unwrap_or(1.0), 1.0);
    let cluster_type = optional_str(obj, &["clusterType", "cluster_type"])
        .map(|label| ClusterType::from_label(&label))
        .unwrap_or(ClusterType::NotSignificant);
    Ok(LocalAutocorrelation {
        local_i,
        p_value,
        cluster_type,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
