// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Spatial Market Integration Engine

pub mod types;
pub mod error;
pub mod config;
pub mod numeric;
pub mod adapter;

// Analysis components
pub mod normalizer;
pub mod projection;
pub mod geometry;
pub mod ingest;
pub mod flows;
pub mod efficiency;
pub mod autocorrelation;
pub mod health;

pub mod context;
pub mod pipeline;

pub use types::*;
pub use config::{EngineConfig, PriceBasis, UtmZone};
pub use context::{AnalysisContext, MetricsSnapshot, SnapshotKey};
pub use error::{AnalysisError, AnalysisResult, RecordError, RejectedRecord};
pub use ingest::RawDataset;
pub use normalizer::RegionNormalizer;
pub use pipeline::{AnalysisRequest, MarketAnalysis};

use serde::Serialize;
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console, js_name = log)]
    fn console_log(s: &str);
}

// ─── WASM Interface ──────────────────────────────────────────────────────────

/// Browser-facing handle. Owns one [`AnalysisContext`]; every method is a
/// thin translation between JS values and the Rust API.
#[wasm_bindgen]
pub struct MarketIntegrationEngine {
    context: AnalysisContext,
}

impl MarketIntegrationEngine {
    pub fn with_config(config: EngineConfig) -> AnalysisResult<Self> {
        Ok(Self {
            context: AnalysisContext::new(config)?,
        })
    }

    pub fn context(&self) -> &AnalysisContext {
        &self.context
    }
}

#[wasm_bindgen]
impl MarketIntegrationEngine {
    /// `config_json` may be partial; absent keys take their defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<MarketIntegrationEngine, JsValue> {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        let config = match config_json.as_deref() {
            Some(json) if !json.trim().is_empty() => EngineConfig::from_json(json),
            _ => Ok(EngineConfig::default()),
        };
        config
            .and_then(Self::with_config)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Run (or fetch from cache) the analysis for an `AnalysisRequest`.
    /// Returns `null` when the request cannot be decoded.
    pub fn analyze(&self, request: JsValue) -> JsValue {
        let request: AnalysisRequest = match serde_wasm_bindgen::from_value(request) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("analysis request rejected: {e}");
                return JsValue::NULL;
            }
        };
        let analysis = self.context.analyze(&request);
        report(&analysis);
        to_js(&*analysis)
    }

    /// JSON-in, JSON-out variant of [`Self::analyze`].
    #[wasm_bindgen(js_name = analyzeJson)]
    pub fn analyze_json(&self, request_json: &str) -> Option<String> {
        let request: AnalysisRequest = match serde_json::from_str(request_json) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("analysis request rejected: {e}");
                return None;
            }
        };
        let analysis = self.context.analyze(&request);
        report(&analysis);
        serde_json::to_string(&*analysis).ok()
    }

    #[wasm_bindgen(js_name = normalizeRegion)]
    pub fn normalize_region(&self, name: &str) -> Option<String> {
        self.context.normalizer().normalize(name)
    }

    #[wasm_bindgen(js_name = getMetrics)]
    pub fn get_metrics(&self) -> JsValue {
        to_js(&self.context.metrics())
    }

    #[wasm_bindgen(js_name = clearCache)]
    pub fn clear_cache(&self) {
        self.context.clear_cache();
    }
}

/// Plain JS objects rather than `Map`s so the UI can index by region id.
fn to_js<T: Serialize + ?Sized>(value: &T) -> JsValue {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .unwrap_or(JsValue::NULL)
}

fn report(analysis: &MarketAnalysis) {
    let line = format!(
        "[market-integration] {} {}: {} rejected, unavailable {:?}",
        analysis.key.commodity,
        analysis.selected_month.as_deref().unwrap_or("-"),
        analysis.diagnostics.rejected.len(),
        analysis.diagnostics.unavailable_sections
    );
    #[cfg(target_arch = "wasm32")]
    console_log(&line);
    #[cfg(not(target_arch = "wasm32"))]
    log::debug!("{line}");
}
