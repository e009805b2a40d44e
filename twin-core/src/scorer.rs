use serde::{Deserialize, Serialize};
use serde_json::Value;
use tsify_next::Tsify;

use crate::types::CityState;

/// Per-feature emission property used by the map layers (tons CO2e per year).
pub const EMISSION_PROPERTY: &str = "co2e_tpy";

/// Total annual emission of a city state.
pub fn score(state: &CityState) -> f64 {
    state.elements.iter().map(|e| e.carbon_output).sum()
}

/// Total emission over GeoJSON-like feature collections.
///
/// Layers without `features`, features without `properties`, and non-numeric
/// emission values all contribute zero.
pub fn score_layers<'a>(layers: impl IntoIterator<Item = &'a Value>) -> f64 {
    layers
        .into_iter()
        .filter_map(|layer| layer.get("features")?.as_array())
        .flatten()
        .filter_map(|feature| feature.get("properties")?.get(EMISSION_PROPERTY)?.as_f64())
        .sum()
}

/// Whether a block emits more than it absorbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum CarbonBalance {
    NetEmitter,
    NetSink,
}

impl CarbonBalance {
    pub fn of(total: f64) -> Self {
        if total > 0.0 {
            CarbonBalance::NetEmitter
        } else {
            CarbonBalance::NetSink
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CarbonBalance::NetEmitter => "Net Emitter",
            CarbonBalance::NetSink => "Net Carbon Sink",
        }
    }
}
