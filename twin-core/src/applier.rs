use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::types::{CityState, ElementId, ElementKind};

// ============================================================================
// Constants for intervention effects
// ============================================================================

/// Fraction of a building's emission kept after adding solar panels.
pub const SOLAR_RETAINED_FRACTION: f64 = 0.2;

/// Fraction of a road's emission kept after conversion to a bike lane.
pub const BIKE_LANE_RETAINED_FRACTION: f64 = 0.6;

/// Flat reduction from one batch of trees (tons CO2e per year).
pub const TREE_BATCH_REDUCTION: f64 = 200.0;

/// Trees planted per batch.
pub const TREE_BATCH_SIZE: u32 = 50;

// ============================================================================
// Actions and decisions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    AddSolarPanel,
    AddBikeLane,
    PlantTrees,
}

impl Action {
    pub fn all() -> impl Iterator<Item = Action> {
        [Action::AddSolarPanel, Action::AddBikeLane, Action::PlantTrees].into_iter()
    }

    /// Wire name used in decisions and catalog config.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::AddSolarPanel => "add_solar_panel",
            Action::AddBikeLane => "add_bike_lane",
            Action::PlantTrees => "plant_trees",
        }
    }

    /// Element kind this action can target.
    pub fn target_kind(&self) -> ElementKind {
        match self {
            Action::AddSolarPanel => ElementKind::Building,
            Action::AddBikeLane => ElementKind::Road,
            Action::PlantTrees => ElementKind::GreenSpace,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::all()
            .find(|a| a.as_str() == s.trim())
            .ok_or_else(|| s.to_string())
    }
}

/// A single intervention to apply: what to do, and where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct Decision {
    pub action: Action,
    pub target_id: ElementId,
}

impl Decision {
    pub fn new(action: Action, target_id: impl Into<ElementId>) -> Self {
        Self {
            action,
            target_id: target_id.into(),
        }
    }
}

// ============================================================================
// Apply
// ============================================================================

/// Result of applying one decision. Every variant other than `Applied`
/// leaves the state untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied { reduction: f64 },
    MissingTarget,
    InapplicableAction,
    AlreadyConverted,
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub state: CityState,
    pub outcome: ApplyOutcome,
}

/// Apply a decision to a copy of `state`. Also used to simulate candidates;
/// committed interventions are logged by the optimizer.
///
/// Never fails: a missing target, a kind mismatch or an already converted
/// element all return the input unchanged along with the reason.
pub fn apply(state: &CityState, decision: &Decision) -> Applied {
    let unchanged = |outcome| Applied {
        state: state.clone(),
        outcome,
    };

    let Some(index) = state.elements.iter().position(|e| e.id == decision.target_id) else {
        #[cfg(feature = "instrument")]
        tracing::warn!(
            target: "anomaly",
            kind = "missing_target",
            action = decision.action.as_str(),
            target_id = decision.target_id.as_str(),
        );
        return unchanged(ApplyOutcome::MissingTarget);
    };

    let target = &state.elements[index];
    if target.kind != decision.action.target_kind() {
        return unchanged(ApplyOutcome::InapplicableAction);
    }
    if target.is_converted() {
        return unchanged(ApplyOutcome::AlreadyConverted);
    }

    let mut next = state.clone();
    let element = &mut next.elements[index];
    let before = element.carbon_output;

    match decision.action {
        Action::AddSolarPanel => {
            element.carbon_output *= SOLAR_RETAINED_FRACTION;
            element.attributes.has_solar = Some(true);
        }
        Action::AddBikeLane => {
            element.carbon_output *= BIKE_LANE_RETAINED_FRACTION;
            element.attributes.is_bike_lane = Some(true);
        }
        Action::PlantTrees => {
            element.carbon_output -= TREE_BATCH_REDUCTION;
            element.attributes.tree_count =
                Some(element.attributes.tree_count().saturating_add(TREE_BATCH_SIZE));
        }
    }

    let reduction = before - element.carbon_output;
    next.total_carbon -= reduction;

    Applied {
        state: next,
        outcome: ApplyOutcome::Applied { reduction },
    }
}
