#![cfg(target_arch = "wasm32")]

use market_integration_engine::MarketIntegrationEngine;
use serde::Serialize;
use serde_json::json;
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

fn request() -> JsValue {
    let request = json!({
        "key": {"commodity": "wheat", "date": "2023-02", "datasetVersion": "wasm"},
        "dataset": {
            "boundaries": [
                {"properties": {"shapeName": "Aden"}, "geometry": {"type": "Point", "coordinates": [45.03, 12.78]}},
                {"properties": {"shapeName": "Ta'izz"}, "geometry": {"type": "Point", "coordinates": [44.02, 13.58]}}
            ],
            "attributes": [
                {"region_id": "aden", "date": "2023-01-01", "price": 10.0},
                {"region_id": "aden", "date": "2023-02-01", "price": 11.0}
            ],
            "flows": [{"source": "Aden", "target": "Taizz", "totalFlow": 5.0, "flowCount": 1}]
        }
    });
    request
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .unwrap_or(JsValue::NULL)
}

#[wasm_bindgen_test]
fn constructor_accepts_partial_config() {
    let engine = MarketIntegrationEngine::new(Some(r#"{"cacheCapacity": 2}"#.to_string()));
    assert!(engine.is_ok());
    assert!(MarketIntegrationEngine::new(Some(r#"{"cacheCapacity": 0}"#.to_string())).is_err());
}

#[wasm_bindgen_test]
fn analyze_returns_plain_objects() {
    let engine = MarketIntegrationEngine::new(None).expect("default config");
    let out = engine.analyze(request());
    assert!(!out.is_null());
    let value: serde_json::Value = serde_wasm_bindgen::from_value(out).expect("decodes");
    assert_eq!(value["flows"]["status"], "available");
    assert_eq!(value["geometry"]["data"]["regions"]["taizz"]["id"], "taizz");
}

#[wasm_bindgen_test]
fn analyze_rejects_garbage() {
    let engine = MarketIntegrationEngine::new(None).expect("default config");
    assert!(engine.analyze(JsValue::from_str("nope")).is_null());
}

#[wasm_bindgen_test]
fn metrics_track_cache_hits() {
    let engine = MarketIntegrationEngine::new(None).expect("default config");
    engine.analyze(request());
    engine.analyze(request());
    let metrics: serde_json::Value = serde_wasm_bindgen::from_value(engine.get_metrics()).expect("decodes");
    assert_eq!(metrics["passes"], 1);
    assert_eq!(metrics["cacheHits"], 1);
    engine.clear_cache();
    assert_eq!(engine.normalize_region("Ta'izz Governorate").as_deref(), Some("taizz"));
}
