// Synthetic Snapshot Generator: seedable, shaped like the upstream pipeline output
// Boundaries in UTM, noisy monthly prices, random flows, clusters, shocks and LISA labels

use market_integration_engine::projection::geographic_to_utm;
use market_integration_engine::{RawDataset, UtmZone};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};

pub const COMMODITY: &str = "Wheat";

/// Share of attribute rows written with an unparsable price.
const CORRUPT_PRICE_RATE: f64 = 0.02;
/// Share of region-months carrying a market shock.
const SHOCK_RATE: f64 = 0.08;
const CLUSTER_SIZE: usize = 5;
const GRID_STEP_DEG: f64 = 0.4;
const ORIGIN: (f64, f64) = (42.6, 12.6);

const LISA_LABELS: [&str; 5] = ["high-high", "low-low", "high-low", "low-high", "not significant"];
const SHOCK_TYPES: [&str; 3] = ["price_spike", "supply_disruption", "currency"];

pub struct SyntheticSnapshot {
    pub dataset: RawDataset,
    /// Latest `YYYY-MM` in the attribute data.
    pub latest_month: String,
}

pub fn region_name(i: usize) -> String {
    format!("Market {i:03} Governorate")
}

fn month(p: usize) -> String {
    format!("{}-{:02}", 2020 + p / 12, p % 12 + 1)
}

pub fn generate(rng: &mut ChaCha8Rng, regions: usize, periods: usize) -> SyntheticSnapshot {
    let regions = regions.max(1);
    let periods = periods.max(1);
    let zone = UtmZone::default();
    let side = (regions as f64).sqrt().ceil() as usize;

    let mut boundaries = Vec::with_capacity(regions);
    for i in 0..regions {
        let lon = ORIGIN.0 + (i % side) as f64 * GRID_STEP_DEG;
        let lat = ORIGIN.1 + (i / side) as f64 * GRID_STEP_DEG;
        let corners = [
            (lon, lat),
            (lon + GRID_STEP_DEG, lat),
            (lon + GRID_STEP_DEG, lat + GRID_STEP_DEG),
            (lon, lat + GRID_STEP_DEG),
            (lon, lat),
        ];
        let ring: Vec<[f64; 2]> = corners
            .iter()
            .map(|&(x, y)| {
                let (e, n) = geographic_to_utm(x, y, zone);
                [e, n]
            })
            .collect();
        boundaries.push(json!({
            "type": "Feature",
            "properties": {"shapeName": region_name(i)},
            "geometry": {"type": "Polygon", "coordinates": [ring]}
        }));
    }

    let mut attributes = Vec::with_capacity(regions * periods);
    let mut shocks = Vec::new();
    for i in 0..regions {
        let mut price: f64 = rng.gen_range(200.0..600.0);
        let drift = rng.gen_range(-0.01..0.03);
        for p in 0..periods {
            price *= 1.0 + drift + rng.gen_range(-0.08..0.08);
            let price_value = if rng.gen::<f64>() < CORRUPT_PRICE_RATE {
                json!("n/a")
            } else {
                json!(price)
            };
            attributes.push(json!({
                "region_id": region_name(i).to_lowercase().replace(' ', "_"),
                "commodity": COMMODITY,
                "date": format!("{}-01", month(p)),
                "price": price_value,
                "usdPrice": price / 530.0,
                "conflictIntensity": rng.gen_range(0.0..15.0),
            }));
            if rng.gen::<f64>() < SHOCK_RATE {
                shocks.push(json!({
                    "region": region_name(i),
                    "date": format!("{}-{:02}", month(p), rng.gen_range(1..=28)),
                    "magnitude": rng.gen_range(0.05..0.6),
                    "shockType": SHOCK_TYPES[rng.gen_range(0..SHOCK_TYPES.len())],
                }));
            }
        }
    }

    let mut flows = Vec::new();
    for i in 0..regions {
        let partners = rng.gen_range(0..4usize);
        for _ in 0..partners {
            let j = rng.gen_range(0..regions);
            if j == i {
                continue;
            }
            let count = rng.gen_range(1..20u32);
            let total = rng.gen_range(0.0..500.0);
            flows.push(json!({
                "source": region_name(i),
                "target": region_name(j),
                "totalFlow": total,
                "avgFlow": total / count as f64,
                "flowCount": count,
                "avgPriceDifferential": rng.gen_range(-40.0..40.0),
            }));
        }
    }

    let mut order: Vec<usize> = (0..regions).collect();
    order.shuffle(rng);
    let clusters: Vec<Value> = order
        .chunks(CLUSTER_SIZE)
        .enumerate()
        .map(|(c, members)| {
            let names: Vec<String> = members.iter().map(|&m| region_name(m)).collect();
            json!({
                "clusterId": format!("cluster_{c}"),
                "mainMarket": names[0],
                "connectedMarkets": names,
                "marketCount": members.len(),
            })
        })
        .collect();

    let local: serde_json::Map<String, Value> = (0..regions)
        .map(|i| {
            (
                region_name(i),
                json!({
                    "localI": rng.gen_range(-1.0..1.5),
                    "pValue": rng.gen_range(0.0..1.0),
                    "clusterType": LISA_LABELS[rng.gen_range(0..LISA_LABELS.len())],
                }),
            )
        })
        .collect();
    let autocorrelation = json!({
        "global": {
            "moranI": rng.gen_range(-0.2..0.8),
            "pValue": rng.gen_range(0.0..0.2),
            "zScore": rng.gen_range(-1.0..4.0),
        },
        "local": local,
    });

    SyntheticSnapshot {
        dataset: RawDataset {
            boundaries: json!({"type": "FeatureCollection", "features": boundaries}),
            attributes: Value::Array(attributes),
            clusters: Value::Array(clusters),
            flows: Value::Array(flows),
            shocks: Value::Array(shocks),
            autocorrelation,
        },
        latest_month: month(periods - 1),
    }
}
