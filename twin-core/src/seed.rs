use crate::types::{CityElement, CityState};

pub const KOREGAON_PARK: &str = "Koregaon Park, Pune";

/// Map center for the demo block (lng, lat).
pub const KOREGAON_PARK_CENTER: (f64, f64) = (73.885, 18.536);

/// Demo block: three buildings (one with solar), a road and a small park.
pub fn koregaon_park() -> CityState {
    let elements = vec![
        CityElement::building("KP-BLDG-01", 2800.0, false),
        CityElement::building("KP-BLDG-02", 1200.0, true),
        CityElement::road("KP-ROAD-01", 4000.0, false),
        CityElement::green_space("KP-PARK-01", -300.0, 50),
        CityElement::building("KP-BLDG-03", 1500.0, false),
    ];
    let total_carbon = elements.iter().map(|e| e.carbon_output).sum();
    CityState {
        block_id: KOREGAON_PARK.to_string(),
        total_carbon,
        elements,
    }
}
