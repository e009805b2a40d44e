use serde::{Deserialize, Serialize};
use thiserror::Error;
use tsify_next::Tsify;

use crate::applier::{Action, Applied, Decision, apply};
use crate::types::{CityElement, CityState, ElementId, ElementKind};

// ============================================================================
// Catalog entries
// ============================================================================

/// One purchasable intervention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct InterventionEntry {
    pub name: String,
    pub cost: f64,
    pub action: Action,
}

impl InterventionEntry {
    pub fn new(name: impl Into<String>, cost: f64, action: Action) -> Self {
        Self {
            name: name.into(),
            cost,
            action,
        }
    }

    /// Element this entry would act on, if any is eligible.
    pub fn select_target(&self, state: &CityState) -> Option<ElementId> {
        select_target(self.action, state)
    }

    /// Simulate this entry against `state`. `None` when nothing is eligible.
    pub fn simulate(&self, state: &CityState) -> Option<(Decision, Applied)> {
        let target = self.select_target(state)?;
        let decision = Decision::new(self.action, target);
        let applied = apply(state, &decision);
        Some((decision, applied))
    }
}

/// Pick the element an action should target.
///
/// - solar: unconverted building with the largest output
/// - bike lane: unconverted road with the largest output (highest traffic)
/// - trees: green space with the most trees already planted
///
/// Ties go to the element listed first.
pub fn select_target(action: Action, state: &CityState) -> Option<ElementId> {
    let eligible = state
        .elements
        .iter()
        .filter(|e| e.kind == action.target_kind() && !e.is_converted());

    let rank = |e: &CityElement| match e.kind {
        ElementKind::GreenSpace => e.attributes.tree_count() as f64,
        ElementKind::Building | ElementKind::Road => e.carbon_output,
    };

    let mut best: Option<&CityElement> = None;
    for element in eligible {
        if best.is_none_or(|b| rank(element) > rank(b)) {
            best = Some(element);
        }
    }
    best.map(|e| e.id.clone())
}

// ============================================================================
// Catalog - validated, ordered, read-only
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("catalog must contain at least one intervention")]
    Empty,
    #[error("intervention {index} has a blank name")]
    BlankName { index: usize },
    #[error("intervention {name:?} has invalid cost {cost}; costs must be positive")]
    InvalidCost { name: String, cost: f64 },
    #[error("invalid catalog JSON: {0}")]
    Json(String),
}

/// Ordered intervention catalog. Declaration order breaks benefit ties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Catalog {
    entries: Vec<InterventionEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<InterventionEntry>) -> Result<Self, CatalogError> {
        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }
        for (index, entry) in entries.iter().enumerate() {
            if entry.name.trim().is_empty() {
                return Err(CatalogError::BlankName { index });
            }
            if !entry.cost.is_finite() || entry.cost <= 0.0 {
                return Err(CatalogError::InvalidCost {
                    name: entry.name.clone(),
                    cost: entry.cost,
                });
            }
        }
        Ok(Self { entries })
    }

    /// Solar panels (15000), tree planting (5000), bike lane conversion (20000).
    pub fn standard() -> Self {
        Self {
            entries: vec![
                InterventionEntry::new("Add Solar Panels", 15_000.0, Action::AddSolarPanel),
                InterventionEntry::new("Plant Trees", 5_000.0, Action::PlantTrees),
                InterventionEntry::new("Convert Road to Bike Lane", 20_000.0, Action::AddBikeLane),
            ],
        }
    }

    /// Load a catalog from a JSON array of `{name, cost, action}` objects.
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let entries: Vec<InterventionEntry> =
            serde_json::from_str(text).map_err(|e| CatalogError::Json(e.to_string()))?;
        Self::new(entries)
    }

    pub fn entries(&self) -> &[InterventionEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&InterventionEntry> {
        self.entries.get(index)
    }

    /// First entry implementing `action`.
    pub fn position_of(&self, action: Action) -> Option<usize> {
        self.entries.iter().position(|e| e.action == action)
    }

    /// Cheapest entry cost; nothing is affordable below it.
    pub fn min_cost(&self) -> f64 {
        self.entries
            .iter()
            .map(|e| e.cost)
            .fold(f64::INFINITY, f64::min)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_order_and_costs() {
        let catalog = Catalog::standard();
        let names: Vec<_> = catalog.entries().iter().map(|e| e.name.as_str()).collect();

        assert_eq!(
            names,
            vec!["Add Solar Panels", "Plant Trees", "Convert Road to Bike Lane"]
        );
        assert_eq!(catalog.min_cost(), 5_000.0);
        assert_eq!(Catalog::new(catalog.entries().to_vec()), Ok(catalog));
    }

    #[test]
    fn test_rejects_non_positive_costs() {
        let zero = Catalog::new(vec![InterventionEntry::new("Free", 0.0, Action::PlantTrees)]);
        assert!(matches!(zero, Err(CatalogError::InvalidCost { .. })));

        let negative = Catalog::new(vec![InterventionEntry::new("Refund", -5.0, Action::PlantTrees)]);
        assert!(matches!(negative, Err(CatalogError::InvalidCost { .. })));

        let nan = Catalog::new(vec![InterventionEntry::new("Nan", f64::NAN, Action::PlantTrees)]);
        assert!(matches!(nan, Err(CatalogError::InvalidCost { .. })));
    }

    #[test]
    fn test_rejects_empty_and_blank() {
        assert_eq!(Catalog::new(vec![]), Err(CatalogError::Empty));
        assert_eq!(
            Catalog::new(vec![InterventionEntry::new("  ", 10.0, Action::AddBikeLane)]),
            Err(CatalogError::BlankName { index: 0 })
        );
    }

    #[test]
    fn test_from_json() {
        let catalog = Catalog::from_json(
            r#"[{"name": "Bike", "cost": 100, "action": "add_bike_lane"}]"#,
        )
        .unwrap();
        assert_eq!(catalog.entries()[0].action, Action::AddBikeLane);

        let bad = Catalog::from_json(r#"[{"name": "Bike", "cost": 100, "action": "teleport"}]"#);
        assert!(matches!(bad, Err(CatalogError::Json(_))));
    }

    #[test]
    fn test_target_selection() {
        let state = CityState::new(
            "T",
            vec![
                CityElement::building("small", 500.0, false),
                CityElement::building("solar", 9000.0, true),
                CityElement::building("big", 2000.0, false),
                CityElement::building("big-twin", 2000.0, false),
                CityElement::road("quiet", 100.0, false),
                CityElement::road("busy", 4000.0, false),
                CityElement::green_space("park", -300.0, 50),
                CityElement::green_space("grove", -900.0, 120),
            ],
        )
        .unwrap();

        assert_eq!(select_target(Action::AddSolarPanel, &state), Some("big".into()));
        assert_eq!(select_target(Action::AddBikeLane, &state), Some("busy".into()));
        assert_eq!(select_target(Action::PlantTrees, &state), Some("grove".into()));
    }

    #[test]
    fn test_no_eligible_target() {
        let state = CityState::new("T", vec![CityElement::road("lane", 10.0, true)]).unwrap();

        assert_eq!(select_target(Action::AddBikeLane, &state), None);
        assert_eq!(select_target(Action::PlantTrees, &state), None);
    }
}
