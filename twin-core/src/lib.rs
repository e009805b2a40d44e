use serde::Serialize;
use serde_json::Value;
use tsify_next::Tsify;
use wasm_bindgen::prelude::*;

mod agent;
mod applier;
mod camera;
mod catalog;
mod decision;
mod optimizer;
mod scorer;
mod seed;
mod types;
mod zone;

pub use agent::*;
pub use applier::*;
pub use camera::*;
pub use catalog::*;
pub use decision::*;
pub use optimizer::*;
pub use scorer::*;
pub use seed::*;
pub use types::*;
pub use zone::*;

#[cfg(feature = "instrument")]
pub use instrument;

// ============================================================================
// WASM API - Twin
// ============================================================================

/// Everything the browser host needs between frames: the agent with its
/// block and budget, the selected analysis zone, and any camera flight in
/// progress. The host owns exactly one of these per map.
#[wasm_bindgen]
pub struct Twin {
    agent: Agent,
    zone: Option<AnalysisZone>,
    flight: Option<FlyTo>,
}

#[wasm_bindgen]
impl Twin {
    /// Twin of the demo block with the standard catalog.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        // Better panic messages in browser console
        console_error_panic_hook::set_once();

        Self::with_state(koregaon_park())
    }

    /// Twin of a block supplied by the host's data source.
    #[wasm_bindgen]
    pub fn from_json(block: &str) -> Result<Twin, JsError> {
        Ok(Self::with_state(CityState::from_json(block)?))
    }

    /// Replace the intervention catalog. Fails on malformed entries.
    #[wasm_bindgen]
    pub fn set_catalog_json(&mut self, catalog: &str) -> Result<(), JsError> {
        self.replace_catalog(Catalog::from_json(catalog)?);
        Ok(())
    }

    /// Start (or restart) the agent with a fresh budget.
    #[wasm_bindgen]
    pub fn start(&mut self, budget: f64) {
        self.agent.start(budget);
    }

    #[wasm_bindgen]
    pub fn stop(&mut self) {
        self.agent.stop();
    }

    /// Run one greedy cycle. Call from the host's timer.
    #[wasm_bindgen]
    pub fn tick(&mut self) -> AgentStatus {
        self.agent.tick()
    }

    #[wasm_bindgen]
    pub fn status(&self) -> AgentStatus {
        self.agent.status()
    }

    #[wasm_bindgen]
    pub fn budget(&self) -> f64 {
        self.agent.budget()
    }

    #[wasm_bindgen]
    pub fn total_carbon(&self) -> f64 {
        self.agent.state().total_carbon
    }

    #[wasm_bindgen]
    pub fn plan(&self) -> String {
        self.agent.plan().to_string()
    }

    /// Get a snapshot of the current state for rendering
    #[wasm_bindgen]
    pub fn snapshot(&self) -> TwinSnapshot {
        let state = self.agent.state().clone();
        TwinSnapshot {
            total_carbon: state.total_carbon,
            balance: CarbonBalance::of(state.total_carbon),
            budget: self.agent.budget(),
            plan: self.agent.plan().to_string(),
            status: self.agent.status(),
            cycles: self.agent.cycles(),
            last_outcome: self.agent.last_outcome().cloned(),
            catalog: self.agent.catalog().entries().to_vec(),
            zone: self.zone.clone(),
            state,
        }
    }

    // === Hosted model ===

    /// Prompt for the hosted model, built from the current block and budget.
    #[wasm_bindgen]
    pub fn model_prompt(&self) -> String {
        planner_prompt(self.agent.state(), self.agent.budget(), self.agent.catalog())
    }

    /// Run one cycle using a reply the host fetched from the hosted model.
    #[wasm_bindgen]
    pub fn apply_model_reply(&mut self, reply: &str) -> AgentStatus {
        let mut strategy = ModelStrategy::new(PrefetchedReply(reply.to_string()));
        self.agent.tick_with(&mut strategy)
    }

    // === Analysis zone ===

    /// Select the square zone around a map click.
    #[wasm_bindgen]
    pub fn select_zone(&mut self, lng: f64, lat: f64) -> AnalysisZone {
        let zone = AnalysisZone::around(lng, lat);
        self.zone = Some(zone.clone());
        zone
    }

    /// Select a zone drawn by the user. `ring` is a flat `[lng, lat, ...]` list.
    #[wasm_bindgen]
    pub fn select_drawn_zone(&mut self, ring: &[f64]) -> Option<AnalysisZone> {
        let points: Vec<[f64; 2]> = ring.chunks_exact(2).map(|p| [p[0], p[1]]).collect();
        self.zone = AnalysisZone::from_ring(&points);
        self.zone.clone()
    }

    #[wasm_bindgen]
    pub fn clear_zone(&mut self) {
        self.zone = None;
    }

    /// Load the map's building features inside the selected zone as the new block.
    #[wasm_bindgen]
    pub fn load_buildings(&mut self, block_id: &str, features: JsValue) -> Result<usize, JsError> {
        let features: Vec<Value> = serde_wasm_bindgen::from_value(features)?;
        Ok(self.load_building_features(block_id, &features)?)
    }

    // === Camera ===

    /// Begin the three-stage flight to a location and return its first move.
    #[wasm_bindgen]
    pub fn fly_to(&mut self, lng: f64, lat: f64) -> CameraMove {
        let (flight, first) = FlyTo::start(lng, lat);
        self.flight = Some(flight);
        first
    }

    /// Report that the map finished a move. Returns the next move, if any.
    #[wasm_bindgen]
    pub fn camera_move_end(&mut self) -> Option<CameraMove> {
        let flight = self.flight.as_mut()?;
        let next = flight.on_move_end();
        if flight.is_done() {
            self.flight = None;
        }
        next
    }
}

impl Twin {
    pub fn with_state(state: CityState) -> Self {
        Self {
            agent: Agent::new(state, Catalog::standard(), AgentConfig::default()),
            zone: None,
            flight: None,
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn zone(&self) -> Option<&AnalysisZone> {
        self.zone.as_ref()
    }

    pub fn flight(&self) -> Option<&FlyTo> {
        self.flight.as_ref()
    }

    /// Swap the catalog, keeping block and budget. A cycling agent keeps
    /// cycling; otherwise it comes back Idle.
    pub fn replace_catalog(&mut self, catalog: Catalog) {
        let budget = self.agent.budget();
        let mut agent = Agent::new(self.agent.state().clone(), catalog, AgentConfig { budget });
        if self.agent.status() == AgentStatus::Cycling {
            agent.start(budget);
        }
        self.agent = agent;
    }

    /// Replace the block with the buildings inside the selected zone.
    pub fn load_building_features(
        &mut self,
        block_id: &str,
        features: &[Value],
    ) -> Result<usize, TwinError> {
        let zone = self.zone.as_ref().ok_or(TwinError::NoZone)?;
        let state = buildings_to_state(block_id, features, zone)?;
        if state.elements.is_empty() {
            return Err(TwinError::NoBuildings);
        }

        let count = state.elements.len();
        self.agent.load(state);
        Ok(count)
    }
}

impl Default for Twin {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TwinError {
    #[error("select an area first")]
    NoZone,
    #[error("no buildings found in the selected zone")]
    NoBuildings,
    #[error(transparent)]
    State(#[from] StateError),
}

/// Serializable view of the twin for rendering.
#[derive(Debug, Clone, Serialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct TwinSnapshot {
    pub state: CityState,
    pub total_carbon: f64,
    pub balance: CarbonBalance,
    pub budget: f64,
    pub plan: String,
    pub status: AgentStatus,
    pub cycles: u64,
    pub last_outcome: Option<CycleOutcome>,
    pub catalog: Vec<InterventionEntry>,
    pub zone: Option<AnalysisZone>,
}

/// Sum `co2e_tpy` over the host's named feature collections.
#[wasm_bindgen]
pub fn score_feature_layers(layers: JsValue) -> Result<f64, JsError> {
    let layers: Value = serde_wasm_bindgen::from_value(layers)?;
    let total = match &layers {
        Value::Object(named) => score_layers(named.values()),
        Value::Array(list) => score_layers(list.iter()),
        _ => 0.0,
    };
    Ok(total)
}

/// Camera move for entering area selection mode.
#[wasm_bindgen]
pub fn selection_camera(current_zoom: f64) -> CameraMove {
    selection_view(current_zoom)
}
