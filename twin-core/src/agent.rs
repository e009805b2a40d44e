use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::catalog::Catalog;
use crate::decision::{DecisionStrategy, Greedy};
use crate::optimizer::{CycleOutcome, CycleReport, run_cycle_with};
use crate::types::CityState;

/// Budget the agent starts with when the host does not provide one.
pub const DEFAULT_BUDGET: f64 = 100_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Cycling,
    Halted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub budget: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            budget: DEFAULT_BUDGET,
        }
    }
}

/// Owns the city state and budget between cycles and tracks whether cycling
/// should continue.
///
/// Idle --start--> Cycling --tick--> Cycling | Halted. Halted is terminal until
/// the next `start` with a fresh budget.
#[derive(Debug, Clone)]
pub struct Agent {
    state: CityState,
    budget: f64,
    status: AgentStatus,
    plan: String,
    last_outcome: Option<CycleOutcome>,
    cycles: u64,
    catalog: Catalog,
    greedy: Greedy,
}

impl Agent {
    pub fn new(state: CityState, catalog: Catalog, config: AgentConfig) -> Self {
        Self {
            state,
            budget: config.budget.max(0.0),
            status: AgentStatus::Idle,
            plan: String::new(),
            last_outcome: None,
            cycles: 0,
            catalog,
            greedy: Greedy::new(),
        }
    }

    pub fn with_greedy(mut self, greedy: Greedy) -> Self {
        self.greedy = greedy;
        self
    }

    pub fn state(&self) -> &CityState {
        &self.state
    }

    pub fn budget(&self) -> f64 {
        self.budget
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn plan(&self) -> &str {
        &self.plan
    }

    pub fn last_outcome(&self) -> Option<&CycleOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Begin cycling with a fresh budget.
    pub fn start(&mut self, budget: f64) {
        self.budget = budget.max(0.0);
        self.status = AgentStatus::Cycling;
        self.plan.clear();
    }

    /// Stop scheduling cycles. State and budget are kept.
    pub fn stop(&mut self) {
        if self.status == AgentStatus::Cycling {
            self.status = AgentStatus::Idle;
        }
    }

    /// Replace the modeled block. The agent returns to Idle.
    pub fn load(&mut self, state: CityState) {
        self.state = state;
        self.status = AgentStatus::Idle;
        self.plan.clear();
        self.last_outcome = None;
        self.cycles = 0;
    }

    /// Run one greedy cycle. No-op unless cycling.
    pub fn tick(&mut self) -> AgentStatus {
        let mut greedy = self.greedy;
        self.tick_with(&mut greedy)
    }

    /// Run one cycle with an external strategy. No-op unless cycling.
    pub fn tick_with(&mut self, strategy: &mut dyn DecisionStrategy) -> AgentStatus {
        if self.status != AgentStatus::Cycling {
            return self.status;
        }

        let state = std::mem::take(&mut self.state);
        let report = run_cycle_with(strategy, &self.catalog, state, self.budget);
        self.absorb(report);
        self.status
    }

    /// Run greedy cycles until the agent halts or `max_cycles` is reached.
    pub fn run_to_completion(&mut self, max_cycles: u64) -> u64 {
        let mut ran = 0;
        while self.status == AgentStatus::Cycling && ran < max_cycles {
            self.tick();
            ran += 1;
        }
        ran
    }

    fn absorb(&mut self, report: CycleReport) {
        let CycleReport {
            state,
            budget,
            plan,
            outcome,
        } = report;

        debug_assert!(budget <= self.budget, "budget must never grow");

        self.state = state;
        self.budget = budget;
        self.plan = plan;
        self.cycles += 1;
        if outcome.is_terminal() {
            self.status = AgentStatus::Halted;
        }
        self.last_outcome = Some(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{ModelStrategy, PrefetchedReply};
    use crate::types::CityElement;

    fn agent(budget: f64) -> Agent {
        let state = CityState::new(
            "Agent",
            vec![
                CityElement::building("b1", 1500.0, false),
                CityElement::road("r1", 3000.0, false),
                CityElement::green_space("g1", -100.0, 10),
            ],
        )
        .unwrap();
        Agent::new(state, Catalog::standard(), AgentConfig { budget })
    }

    #[test]
    fn test_tick_is_noop_when_idle() {
        let mut agent = agent(50_000.0);
        let before = agent.state().clone();

        assert_eq!(agent.tick(), AgentStatus::Idle);
        assert_eq!(agent.state(), &before);
        assert_eq!(agent.cycles(), 0);
    }

    #[test]
    fn test_runs_until_halted() {
        let mut agent = agent(0.0);
        // solar, then bike lane, then trees leaves 2000: below every cost
        agent.start(42_000.0);
        agent.run_to_completion(100);

        assert_eq!(agent.status(), AgentStatus::Halted);
        assert_eq!(agent.budget(), 2_000.0);
        assert_eq!(agent.cycles(), 4);
        assert_eq!(agent.plan(), "no affordable actions");

        // Halted stays halted.
        let cycles = agent.cycles();
        assert_eq!(agent.tick(), AgentStatus::Halted);
        assert_eq!(agent.cycles(), cycles);
    }

    #[test]
    fn test_restart_with_fresh_budget() {
        let mut agent = agent(0.0);
        agent.start(0.0);
        assert_eq!(agent.tick(), AgentStatus::Halted);
        assert_eq!(agent.plan(), "budget depleted");

        agent.start(15_000.0);
        assert_eq!(agent.status(), AgentStatus::Cycling);
        agent.tick();
        assert!(matches!(agent.last_outcome(), Some(CycleOutcome::Applied { .. })));
    }

    #[test]
    fn test_stop_keeps_state() {
        let mut agent = agent(0.0);
        agent.start(20_000.0);
        agent.tick();
        let budget = agent.budget();
        agent.stop();

        assert_eq!(agent.status(), AgentStatus::Idle);
        assert_eq!(agent.budget(), budget);
        assert_eq!(agent.tick(), AgentStatus::Idle);
    }

    #[test]
    fn test_model_rejection_keeps_cycling() {
        let mut agent = agent(0.0);
        agent.start(50_000.0);
        let mut strategy = ModelStrategy::new(PrefetchedReply(
            r#"{"action": "plant_trees", "target_id": "b1"}"#.to_string(),
        ));

        assert_eq!(agent.tick_with(&mut strategy), AgentStatus::Cycling);
        assert_eq!(agent.budget(), 50_000.0);
        assert!(agent.plan().starts_with("rejected plant_trees on b1"));
    }
}
