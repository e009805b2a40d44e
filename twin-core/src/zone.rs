use geo::{Coord, Intersects, LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tsify_next::Tsify;

use crate::types::{CityElement, CityState, ElementId, StateError};

/// Half the side of the square selected by a map click, in degrees.
pub const CLICK_HALF_SIZE: f64 = 0.0005;

/// Height assumed for buildings without `render_height`, in meters.
pub const DEFAULT_BUILDING_HEIGHT: f64 = 20.0;

/// Annual emission per meter of building height.
pub const CARBON_PER_METER: f64 = 50.0;

/// Analysis area in lng/lat degrees: the square around a click or the
/// polygon the user drew. Stored as a closed outer ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct AnalysisZone {
    pub ring: Vec<[f64; 2]>,
}

impl AnalysisZone {
    /// Square zone around a clicked point.
    pub fn around(lng: f64, lat: f64) -> Self {
        let d = CLICK_HALF_SIZE;
        Self {
            ring: vec![
                [lng - d, lat - d],
                [lng + d, lat - d],
                [lng + d, lat + d],
                [lng - d, lat + d],
                [lng - d, lat - d],
            ],
        }
    }

    /// Zone from a drawn ring. Non-finite points are dropped; `None` when
    /// fewer than three distinct points remain. The ring is closed if open.
    pub fn from_ring(points: &[[f64; 2]]) -> Option<Self> {
        let mut ring: Vec<[f64; 2]> = points
            .iter()
            .copied()
            .filter(|p| p[0].is_finite() && p[1].is_finite())
            .collect();
        ring.dedup();
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        if ring.len() < 3 {
            return None;
        }
        ring.push(ring[0]);
        Some(Self { ring })
    }

    pub fn polygon(&self) -> Polygon<f64> {
        Polygon::new(LineString::from(self.ring.clone()), vec![])
    }

    pub fn to_geojson(&self) -> Value {
        json!({
            "type": "Feature",
            "properties": {},
            "geometry": {
                "type": "Polygon",
                "coordinates": [self.ring],
            }
        })
    }

    /// Whether a footprint shares any point with this zone.
    pub fn intersects(&self, footprint: &MultiPolygon<f64>) -> bool {
        self.polygon().intersects(footprint)
    }
}

fn coords(ring: &Value) -> Option<Vec<Coord<f64>>> {
    ring.as_array()?
        .iter()
        .map(|p| {
            let (x, y) = (p.get(0)?.as_f64()?, p.get(1)?.as_f64()?);
            (x.is_finite() && y.is_finite()).then_some(Coord { x, y })
        })
        .collect()
}

fn polygon(rings: &Value) -> Option<Polygon<f64>> {
    let mut rings = rings
        .as_array()?
        .iter()
        .map(|r| coords(r).map(LineString::new));
    let exterior = rings.next()??;
    if exterior.0.len() < 3 {
        return None;
    }
    let interiors = rings.collect::<Option<Vec<_>>>()?;
    Some(Polygon::new(exterior, interiors))
}

/// Footprint of a GeoJSON `Polygon` or `MultiPolygon` feature.
pub fn footprint(feature: &Value) -> Option<MultiPolygon<f64>> {
    let geometry = feature.get("geometry")?;
    let coordinates = geometry.get("coordinates")?;
    match geometry.get("type")?.as_str()? {
        "Polygon" => Some(MultiPolygon::new(vec![polygon(coordinates)?])),
        "MultiPolygon" => coordinates
            .as_array()?
            .iter()
            .map(polygon)
            .collect::<Option<Vec<_>>>()
            .map(MultiPolygon::new),
        _ => None,
    }
}

fn feature_id(feature: &Value, index: usize) -> ElementId {
    match feature.get("properties").and_then(|p| p.get("id")) {
        Some(Value::String(s)) => ElementId::new(s.clone()),
        Some(Value::Number(n)) => ElementId::new(n.to_string()),
        _ => ElementId::new((index + 1).to_string()),
    }
}

/// Estimate a building's emission from its rendered height.
pub fn building_carbon(feature: &Value) -> f64 {
    let height = feature
        .get("properties")
        .and_then(|p| p.get("render_height"))
        .and_then(Value::as_f64)
        .filter(|h| *h > 0.0)
        .unwrap_or(DEFAULT_BUILDING_HEIGHT);
    height * CARBON_PER_METER
}

/// Turn the map's building features that intersect `zone` into a city state.
///
/// Features without a polygon footprint are skipped. Ids come from
/// `properties.id`, falling back to the 1-based position among all features.
pub fn buildings_to_state(
    block_id: impl Into<String>,
    features: &[Value],
    zone: &AnalysisZone,
) -> Result<CityState, StateError> {
    let area = zone.polygon();
    let elements = features
        .iter()
        .enumerate()
        .filter(|(_, f)| footprint(f).is_some_and(|shape| area.intersects(&shape)))
        .map(|(index, f)| CityElement {
            id: feature_id(f, index),
            ..CityElement::building("", building_carbon(f), false)
        })
        .collect();

    CityState::new(block_id, elements)
}
