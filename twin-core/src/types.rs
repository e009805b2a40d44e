use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tsify_next::Tsify;

// ============================================================================
// IDs - Opaque element identifiers
// ============================================================================

/// Stable identifier of a city element.
///
/// Data sources hand out either strings ("KP-BLDG-01") or numeric feature ids,
/// so both are accepted on the way in and normalized to text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Tsify)]
pub struct ElementId(pub String);

impl ElementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ElementId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ElementId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl<'de> Deserialize<'de> for ElementId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Text(text) => ElementId(text),
            Repr::Number(n) => ElementId(n.to_string()),
        })
    }
}

// ============================================================================
// City Elements - Buildings, roads and green space
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Building,
    Road,
    GreenSpace,
}

/// Kind-specific flags and counters. Only the field relevant to the element's
/// kind is normally present; absent fields read as false / zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct Attributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_solar: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_bike_lane: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_count: Option<u32>,
}

impl Attributes {
    pub fn building(has_solar: bool) -> Self {
        Self {
            has_solar: Some(has_solar),
            ..Self::default()
        }
    }

    pub fn road(is_bike_lane: bool) -> Self {
        Self {
            is_bike_lane: Some(is_bike_lane),
            ..Self::default()
        }
    }

    pub fn green_space(tree_count: u32) -> Self {
        Self {
            tree_count: Some(tree_count),
            ..Self::default()
        }
    }

    pub fn has_solar(&self) -> bool {
        self.has_solar.unwrap_or(false)
    }

    pub fn is_bike_lane(&self) -> bool {
        self.is_bike_lane.unwrap_or(false)
    }

    pub fn tree_count(&self) -> u32 {
        self.tree_count.unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct CityElement {
    pub id: ElementId,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    /// Annual emission in tons CO2e. Negative for net sinks.
    pub carbon_output: f64,
    #[serde(default)]
    pub attributes: Attributes,
}

impl CityElement {
    pub fn building(id: impl Into<String>, carbon_output: f64, has_solar: bool) -> Self {
        Self {
            id: ElementId::new(id),
            kind: ElementKind::Building,
            carbon_output,
            attributes: Attributes::building(has_solar),
        }
    }

    pub fn road(id: impl Into<String>, carbon_output: f64, is_bike_lane: bool) -> Self {
        Self {
            id: ElementId::new(id),
            kind: ElementKind::Road,
            carbon_output,
            attributes: Attributes::road(is_bike_lane),
        }
    }

    pub fn green_space(id: impl Into<String>, carbon_output: f64, tree_count: u32) -> Self {
        Self {
            id: ElementId::new(id),
            kind: ElementKind::GreenSpace,
            carbon_output,
            attributes: Attributes::green_space(tree_count),
        }
    }

    /// Building with solar or road already converted to a bike lane.
    pub fn is_converted(&self) -> bool {
        match self.kind {
            ElementKind::Building => self.attributes.has_solar(),
            ElementKind::Road => self.attributes.is_bike_lane(),
            ElementKind::GreenSpace => false,
        }
    }
}

// ============================================================================
// City State - One snapshot of the modeled block
// ============================================================================

#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid city state JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate element id {0}")]
    DuplicateId(ElementId),
}

/// Snapshot of a city block.
///
/// `total_carbon` always equals the sum of `carbon_output` over `elements`
/// once a transition has returned.
#[derive(Debug, Clone, PartialEq, Serialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct CityState {
    #[serde(rename = "city_block_id")]
    pub block_id: String,
    #[serde(rename = "current_total_carbon")]
    pub total_carbon: f64,
    pub elements: Vec<CityElement>,
}

/// Wire shape of a city state as supplied by data sources. The total is
/// optional and never trusted over the elements.
#[derive(Debug, Clone, Deserialize, Tsify)]
#[tsify(from_wasm_abi)]
pub struct CityStateRecord {
    #[serde(rename = "city_block_id", default)]
    pub block_id: String,
    #[serde(rename = "current_total_carbon", default)]
    pub total_carbon: Option<f64>,
    #[serde(default)]
    pub elements: Vec<CityElement>,
}

/// Empty, unnamed block.
impl Default for CityState {
    fn default() -> Self {
        Self {
            block_id: String::new(),
            total_carbon: 0.0,
            elements: Vec::new(),
        }
    }
}

impl CityState {
    /// Build a state from elements, computing the total. Fails on duplicate ids.
    pub fn new(block_id: impl Into<String>, elements: Vec<CityElement>) -> Result<Self, StateError> {
        let mut seen = HashSet::with_capacity(elements.len());
        for element in &elements {
            if !seen.insert(&element.id) {
                return Err(StateError::DuplicateId(element.id.clone()));
            }
        }

        let total_carbon = elements.iter().map(|e| e.carbon_output).sum();
        Ok(Self {
            block_id: block_id.into(),
            total_carbon,
            elements,
        })
    }

    pub fn from_record(record: CityStateRecord) -> Result<Self, StateError> {
        let declared = record.total_carbon;
        let state = Self::new(record.block_id, record.elements)?;

        if let Some(declared) = declared {
            if (declared - state.total_carbon).abs() > 1e-6 {
                #[cfg(feature = "instrument")]
                tracing::warn!(
                    target: "anomaly",
                    kind = "total_mismatch",
                    declared = declared,
                    computed = state.total_carbon,
                );
            }
        }
        Ok(state)
    }

    pub fn from_json(text: &str) -> Result<Self, StateError> {
        let record: CityStateRecord = serde_json::from_str(text)?;
        Self::from_record(record)
    }

    pub fn element(&self, id: &ElementId) -> Option<&CityElement> {
        self.elements.iter().find(|e| &e.id == id)
    }

    /// Recompute the total from the elements.
    pub fn recomputed_total(&self) -> f64 {
        self.elements.iter().map(|e| e.carbon_output).sum()
    }
}
