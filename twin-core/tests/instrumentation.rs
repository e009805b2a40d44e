#![cfg(feature = "instrument")]

use polars::prelude::*;
use twin_core::instrument::{self, ANOMALY_TARGET, CYCLE_TARGET, INTERVENTION_TARGET};
use twin_core::{
    Action, Agent, AgentConfig, AgentStatus, Catalog, CityElement, CityState, CycleOutcome,
    Decision, ModelStrategy, PrefetchedReply, apply, koregaon_park, run_cycle, score,
};

fn text_column(df: &DataFrame, name: &str) -> Vec<String> {
    df.column(name)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect()
}

#[test]
fn test_every_cycle_is_recorded() {
    let (agent, recorded) = instrument::capture(|| {
        let mut agent = Agent::new(koregaon_park(), Catalog::standard(), AgentConfig::default());
        agent.start(60_000.0);
        agent.run_to_completion(50);
        agent
    });

    assert_eq!(agent.status(), AgentStatus::Halted);
    let cycles = recorded.table(CYCLE_TARGET).expect("cycle table");
    assert_eq!(cycles.rows as u64, agent.cycles());

    let frames = recorded.to_dataframes();
    let trajectory = instrument::carbon_trajectory(&frames).unwrap();
    assert_eq!(trajectory.height() as u64, agent.cycles());

    let carbon: Vec<f64> = trajectory
        .column("total_carbon")
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .flatten()
        .collect();
    assert!(carbon.windows(2).all(|w| w[1] <= w[0]), "carbon should only fall: {carbon:?}");
    assert_eq!(*carbon.last().unwrap(), agent.state().total_carbon);

    let outcomes = text_column(&trajectory, "outcome");
    assert_eq!(outcomes.last().map(String::as_str), Some("budget_exhausted"));
}

#[test]
fn test_interventions_grouped_by_action() {
    let (_, recorded) = instrument::capture(|| {
        let mut agent = Agent::new(koregaon_park(), Catalog::standard(), AgentConfig::default());
        agent.start(60_000.0);
        agent.run_to_completion(50);
    });

    let frames = recorded.to_dataframes();
    assert!(frames.contains_key(INTERVENTION_TARGET));

    let by_action = instrument::interventions_by_action(&frames).unwrap();
    let actions = text_column(&by_action, "action");
    assert_eq!(actions, vec!["add_bike_lane", "add_solar_panel", "plant_trees"]);

    // 60000: solar on two buildings, the road, then two tree batches
    let counts: Vec<Option<i64>> = by_action
        .column("count")
        .unwrap()
        .cast(&DataType::Int64)
        .unwrap()
        .i64()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(counts, vec![Some(1), Some(2), Some(2)]);

    let applied_cycles = text_column(&frames[CYCLE_TARGET], "outcome")
        .iter()
        .filter(|o| o.as_str() == "applied")
        .count();
    assert_eq!(recorded_rows(&frames, INTERVENTION_TARGET), applied_cycles);

    let reduction: f64 = by_action
        .column("reduction")
        .unwrap()
        .f64()
        .unwrap()
        .sum()
        .unwrap();
    assert!((reduction - (9200.0 - recorded_final_total(&frames))).abs() < 1e-6);
}

fn recorded_rows(frames: &std::collections::HashMap<String, DataFrame>, target: &str) -> usize {
    frames.get(target).map_or(0, DataFrame::height)
}

fn recorded_final_total(frames: &std::collections::HashMap<String, DataFrame>) -> f64 {
    let trajectory = instrument::carbon_trajectory(frames).unwrap();
    trajectory
        .column("total_carbon")
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .flatten()
        .last()
        .unwrap()
}

#[test]
fn test_simulated_candidates_are_not_recorded_as_interventions() {
    let state = CityState::new(
        "Candidates",
        vec![
            CityElement::building("b1", 1500.0, false),
            CityElement::road("r1", 3000.0, false),
            CityElement::green_space("g1", -100.0, 5),
        ],
    )
    .unwrap();

    // Greedy simulates all three entries but commits only solar
    let (report, recorded) =
        instrument::capture(|| run_cycle(state, 20_000.0, &Catalog::standard(), score));

    assert!(matches!(report.outcome, CycleOutcome::Applied { action: Action::AddSolarPanel, .. }));
    let interventions = recorded.table(INTERVENTION_TARGET).expect("intervention table");
    assert_eq!(interventions.rows, 1);
    assert_eq!(
        interventions.column("target_id").unwrap().as_text().unwrap(),
        &["b1".to_string()]
    );
    assert_eq!(interventions.column("reduction").unwrap().as_f64(), Some(&[1200.0][..]));
}

#[test]
fn test_rejected_pick_is_not_an_intervention() {
    let state = CityState::new("Reject", vec![CityElement::road("r1", 3000.0, false)]).unwrap();
    let mut agent = Agent::new(state, Catalog::standard(), AgentConfig::default());
    agent.start(50_000.0);

    let (_, recorded) = instrument::capture(|| {
        let mut strategy = ModelStrategy::new(PrefetchedReply(
            r#"{"action": "add_solar_panel", "target_id": "r1"}"#.to_string(),
        ));
        agent.tick_with(&mut strategy)
    });

    assert!(recorded.table(INTERVENTION_TARGET).is_none());
    assert_eq!(recorded.table(CYCLE_TARGET).unwrap().rows, 1);
}

#[test]
fn test_missing_target_is_an_anomaly() {
    let state = CityState::new("Anomaly", vec![CityElement::building("b1", 100.0, false)]).unwrap();

    let (applied, recorded) =
        instrument::capture(|| apply(&state, &Decision::new(Action::AddSolarPanel, "ghost")));

    assert_eq!(applied.state, state);
    let anomalies = recorded.table(ANOMALY_TARGET).expect("anomaly table").to_dataframe().unwrap();
    assert_eq!(text_column(&anomalies, "kind"), vec!["missing_target"]);
    assert_eq!(text_column(&anomalies, "target_id"), vec!["ghost"]);
    assert!(recorded.table(INTERVENTION_TARGET).is_none());
}
