//! Browser-side checks for the exported API. Run with `wasm-pack test --headless --chrome`.

#![cfg(target_arch = "wasm32")]

use twin_core::{AgentStatus, Twin, score_feature_layers};
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn twin_ticks_in_browser() {
    let mut twin = Twin::new();
    twin.start(20_000.0);

    assert_eq!(twin.tick(), AgentStatus::Cycling);
    assert_eq!(twin.budget(), 5_000.0);
    assert!(twin.total_carbon() < 9_200.0);
}

#[wasm_bindgen_test]
fn malformed_block_is_a_js_error() {
    assert!(Twin::from_json("{not json").is_err());
    assert!(Twin::from_json(r#"{"city_block_id": "X", "elements": []}"#).is_ok());
}

#[wasm_bindgen_test]
fn feature_layers_sum_from_js() {
    let layers = serde_wasm_bindgen::to_value(&serde_json::json!({
        "buildings": {"features": [{"properties": {"co2e_tpy": 10.5}}, {"properties": {}}]},
        "roads": {"features": [{"properties": {"co2e_tpy": 4}}]}
    }))
    .unwrap();

    assert_eq!(score_feature_layers(layers).unwrap(), 14.5);
    assert_eq!(score_feature_layers(JsValue::NULL).unwrap(), 0.0);
}
