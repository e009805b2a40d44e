//! Decision strategies: who picks the next intervention.
//!
//! The optimizer only sees a [`Choice`]; whether it came from the local greedy
//! scan or from a hosted language model is hidden behind [`DecisionStrategy`].

use serde::Deserialize;
use thiserror::Error;

use crate::applier::{Action, Decision};
use crate::catalog::Catalog;
use crate::scorer;
use crate::types::{CityState, ElementId};

/// Scoring function used to evaluate candidate states.
pub type Scorer = fn(&CityState) -> f64;

/// A catalog entry picked for one cycle, with the element it should act on.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    /// Index into the catalog.
    pub entry: usize,
    pub decision: Decision,
    /// Carbon reduction per unit cost, when the strategy computed one.
    pub benefit: Option<f64>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DecisionError {
    #[error("decision service unavailable: {0}")]
    Transport(String),
    #[error("reply contains no JSON object")]
    NoJsonObject,
    #[error("reply JSON is malformed: {0}")]
    MalformedReply(String),
    #[error("unknown action {0:?}")]
    UnknownAction(String),
    #[error("action {0} is not in the catalog")]
    NotInCatalog(Action),
}

pub trait DecisionStrategy {
    /// Pick at most one intervention for `state` given the remaining budget.
    ///
    /// `Ok(None)` means nothing in the catalog is affordable and applicable.
    fn decide(
        &mut self,
        state: &CityState,
        budget: f64,
        catalog: &Catalog,
    ) -> Result<Option<Choice>, DecisionError>;
}

// ============================================================================
// Greedy - local arg-max over benefit per unit cost
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Greedy {
    scorer: Scorer,
}

impl Greedy {
    pub fn new() -> Self {
        Self {
            scorer: scorer::score,
        }
    }

    pub fn with_scorer(scorer: Scorer) -> Self {
        Self { scorer }
    }
}

impl Default for Greedy {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionStrategy for Greedy {
    fn decide(
        &mut self,
        state: &CityState,
        budget: f64,
        catalog: &Catalog,
    ) -> Result<Option<Choice>, DecisionError> {
        let baseline = (self.scorer)(state);
        let mut best: Option<Choice> = None;

        for (index, entry) in catalog.entries().iter().enumerate() {
            // Never partially fund an action
            if entry.cost > budget {
                continue;
            }
            let Some((decision, applied)) = entry.simulate(state) else {
                continue;
            };

            let benefit = (baseline - (self.scorer)(&applied.state)) / entry.cost;

            // Strictly greater: the first-declared entry keeps ties
            let better = match &best {
                None => true,
                Some(current) => benefit > current.benefit.unwrap_or(f64::NEG_INFINITY),
            };
            if better {
                best = Some(Choice {
                    entry: index,
                    decision,
                    benefit: Some(benefit),
                });
            }
        }

        Ok(best)
    }
}

// ============================================================================
// Hosted model
// ============================================================================

/// Text completion backend. Hosts implement this over whatever transport
/// they have; the core never performs I/O itself.
pub trait TextGenerator {
    fn generate(&mut self, prompt: &str) -> Result<String, DecisionError>;
}

/// A reply the host already fetched, handed back for parsing.
#[derive(Debug, Clone)]
pub struct PrefetchedReply(pub String);

impl TextGenerator for PrefetchedReply {
    fn generate(&mut self, _prompt: &str) -> Result<String, DecisionError> {
        Ok(self.0.clone())
    }
}

/// Strategy that delegates the choice to a language model.
pub struct ModelStrategy<G> {
    generator: G,
}

impl<G: TextGenerator> ModelStrategy<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    pub fn into_inner(self) -> G {
        self.generator
    }
}

impl<G: TextGenerator> DecisionStrategy for ModelStrategy<G> {
    fn decide(
        &mut self,
        state: &CityState,
        budget: f64,
        catalog: &Catalog,
    ) -> Result<Option<Choice>, DecisionError> {
        let prompt = planner_prompt(state, budget, catalog);
        let reply = self.generator.generate(&prompt)?;
        let decision = parse_reply(&reply)?;
        let entry = catalog
            .position_of(decision.action)
            .ok_or(DecisionError::NotInCatalog(decision.action))?;

        Ok(Some(Choice {
            entry,
            decision,
            benefit: None,
        }))
    }
}

/// Prompt asking the model for a single intervention as bare JSON.
pub fn planner_prompt(state: &CityState, budget: f64, catalog: &Catalog) -> String {
    let data = serde_json::to_string(state).unwrap_or_else(|_| "{}".to_string());
    let actions: Vec<String> = catalog
        .entries()
        .iter()
        .map(|e| format!("- {} ({}), cost {}", e.action, e.name, e.cost))
        .collect();

    format!(
        "You are an expert urban sustainability planner. Your goal is to analyze the state of a city block \
and choose the single most impactful intervention. Your response MUST be a single, clean JSON object \
in the following format and nothing else.\n\
{{\"action\": \"action_name\", \"target_id\": \"id_of_element\"}}\n\
Available actions (remaining budget {budget}):\n{}\n\
Here is the city block data:\n{data}\n",
        actions.join("\n"),
    )
}

#[derive(Deserialize)]
struct ModelReply {
    action: String,
    target_id: ElementId,
}

/// Extract the decision from a model reply.
///
/// Models like to wrap JSON in prose or markdown fences, so everything outside
/// the first `{` and the last `}` is discarded before parsing.
pub fn parse_reply(reply: &str) -> Result<Decision, DecisionError> {
    let (Some(start), Some(end)) = (reply.find('{'), reply.rfind('}')) else {
        return Err(DecisionError::NoJsonObject);
    };
    if end < start {
        return Err(DecisionError::NoJsonObject);
    }

    let parsed: ModelReply = serde_json::from_str(&reply[start..=end])
        .map_err(|e| DecisionError::MalformedReply(e.to_string()))?;
    let action = parsed
        .action
        .parse::<Action>()
        .map_err(DecisionError::UnknownAction)?;

    Ok(Decision::new(action, parsed.target_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InterventionEntry;
    use crate::types::CityElement;

    fn two_element_block() -> CityState {
        CityState::new(
            "Scenario",
            vec![
                CityElement::building("b1", 1500.0, false),
                CityElement::road("r1", 3000.0, false),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_greedy_prefers_best_ratio() {
        let choice = Greedy::new()
            .decide(&two_element_block(), 20_000.0, &Catalog::standard())
            .unwrap()
            .unwrap();

        assert_eq!(choice.entry, 0);
        assert_eq!(choice.decision, Decision::new(Action::AddSolarPanel, "b1"));
        assert!((choice.benefit.unwrap() - 0.08).abs() < 1e-12);
    }

    #[test]
    fn test_greedy_ties_go_to_first_declared() {
        // Same action twice at the same cost: identical benefit.
        let catalog = Catalog::new(vec![
            InterventionEntry::new("First", 100.0, Action::AddBikeLane),
            InterventionEntry::new("Second", 100.0, Action::AddBikeLane),
        ])
        .unwrap();

        let choice = Greedy::new()
            .decide(&two_element_block(), 1_000.0, &catalog)
            .unwrap()
            .unwrap();
        assert_eq!(choice.entry, 0);
    }

    #[test]
    fn test_greedy_uses_injected_scorer() {
        // A scorer that ignores roads makes bike lanes worthless.
        fn buildings_only(state: &CityState) -> f64 {
            state
                .elements
                .iter()
                .filter(|e| e.kind == crate::types::ElementKind::Building)
                .map(|e| e.carbon_output)
                .sum()
        }
        let catalog = Catalog::new(vec![
            InterventionEntry::new("Bike", 1.0, Action::AddBikeLane),
            InterventionEntry::new("Solar", 1_000.0, Action::AddSolarPanel),
        ])
        .unwrap();

        let choice = Greedy::with_scorer(buildings_only)
            .decide(&two_element_block(), 5_000.0, &catalog)
            .unwrap()
            .unwrap();
        assert_eq!(choice.decision.action, Action::AddSolarPanel);
    }

    #[test]
    fn test_parse_reply_strips_markdown() {
        let reply = "Sure! Here you go:\n```json\n{\"action\": \"add_bike_lane\", \"target_id\": \"KP-ROAD-01\"}\n```";
        assert_eq!(
            parse_reply(reply),
            Ok(Decision::new(Action::AddBikeLane, "KP-ROAD-01"))
        );
    }

    #[test]
    fn test_parse_reply_numeric_target() {
        let reply = r#"{"action": "add_solar_panel", "target_id": 42}"#;
        assert_eq!(
            parse_reply(reply).unwrap().target_id,
            ElementId::from("42")
        );
    }

    #[test]
    fn test_parse_reply_errors() {
        assert_eq!(parse_reply("no json"), Err(DecisionError::NoJsonObject));
        assert_eq!(parse_reply("} backwards {"), Err(DecisionError::NoJsonObject));
        assert!(matches!(
            parse_reply("{\"action\": 3}"),
            Err(DecisionError::MalformedReply(_))
        ));
        assert_eq!(
            parse_reply(r#"{"action": "demolish", "target_id": "x"}"#),
            Err(DecisionError::UnknownAction("demolish".to_string()))
        );
    }

    #[test]
    fn test_model_strategy_maps_onto_catalog() {
        let mut strategy = ModelStrategy::new(PrefetchedReply(
            r#"{"action": "add_bike_lane", "target_id": "r1"}"#.to_string(),
        ));
        let choice = strategy
            .decide(&two_element_block(), 50_000.0, &Catalog::standard())
            .unwrap()
            .unwrap();

        assert_eq!(choice.entry, 2);
        assert_eq!(choice.benefit, None);

        let solar_only = Catalog::new(vec![InterventionEntry::new(
            "Solar",
            10.0,
            Action::AddSolarPanel,
        )])
        .unwrap();
        let mut strategy = ModelStrategy::new(PrefetchedReply(
            r#"{"action": "plant_trees", "target_id": "g"}"#.to_string(),
        ));
        assert_eq!(
            strategy.decide(&two_element_block(), 50.0, &solar_only),
            Err(DecisionError::NotInCatalog(Action::PlantTrees))
        );
    }

    #[test]
    fn test_prompt_contains_state_and_actions() {
        let prompt = planner_prompt(&two_element_block(), 20_000.0, &Catalog::standard());

        assert!(prompt.contains("\"city_block_id\":\"Scenario\""));
        assert!(prompt.contains("add_bike_lane"));
        assert!(prompt.contains("{\"action\": \"action_name\", \"target_id\": \"id_of_element\"}"));
    }
}
