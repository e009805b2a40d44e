use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::applier::{Action, ApplyOutcome, apply};
use crate::catalog::Catalog;
use crate::decision::{DecisionStrategy, Greedy, Scorer};
use crate::types::{CityState, ElementId};

pub const PLAN_BUDGET_DEPLETED: &str = "budget depleted";
pub const PLAN_NO_AFFORDABLE: &str = "no affordable actions";

/// Why a strategy's pick was not committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    MissingTarget,
    InapplicableAction,
    AlreadyConverted,
    OverBudget,
}

impl Rejection {
    pub fn describe(&self) -> &'static str {
        match self {
            Rejection::MissingTarget => "target not found",
            Rejection::InapplicableAction => "action does not apply to target",
            Rejection::AlreadyConverted => "target already converted",
            Rejection::OverBudget => "over budget",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CycleOutcome {
    Applied {
        name: String,
        action: Action,
        target_id: ElementId,
        cost: f64,
        reduction: f64,
    },
    BudgetExhausted,
    Unaffordable,
    Rejected {
        action: Action,
        target_id: ElementId,
        reason: Rejection,
    },
    NoDecision {
        message: String,
    },
}

impl CycleOutcome {
    /// Outcomes after which no further cycle can make progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CycleOutcome::BudgetExhausted | CycleOutcome::Unaffordable)
    }
}

/// Result of one optimizer cycle. The state is handed back by value.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub state: CityState,
    pub budget: f64,
    pub plan: String,
    pub outcome: CycleOutcome,
}

/// One greedy cycle with the given scorer.
pub fn run_cycle(state: CityState, budget: f64, catalog: &Catalog, scorer: Scorer) -> CycleReport {
    run_cycle_with(&mut Greedy::with_scorer(scorer), catalog, state, budget)
}

/// One cycle with an arbitrary decision strategy.
pub fn run_cycle_with<S: DecisionStrategy + ?Sized>(
    strategy: &mut S,
    catalog: &Catalog,
    state: CityState,
    budget: f64,
) -> CycleReport {
    // NaN compares false against every cost, so it counts as depleted
    if budget.is_nan() || budget <= 0.0 {
        return finish(state, 0.0, PLAN_BUDGET_DEPLETED.to_string(), CycleOutcome::BudgetExhausted);
    }

    let choice = match strategy.decide(&state, budget, catalog) {
        Ok(Some(choice)) => choice,
        Ok(None) => {
            return finish(state, budget, PLAN_NO_AFFORDABLE.to_string(), CycleOutcome::Unaffordable);
        }
        Err(err) => {
            #[cfg(feature = "instrument")]
            tracing::warn!(target: "anomaly", kind = "no_decision", error = %err);
            let message = err.to_string();
            return finish(
                state,
                budget,
                format!("no decision: {message}"),
                CycleOutcome::NoDecision { message },
            );
        }
    };

    let Some(entry) = catalog.get(choice.entry) else {
        let message = format!("catalog entry {} does not exist", choice.entry);
        return finish(
            state,
            budget,
            format!("no decision: {message}"),
            CycleOutcome::NoDecision { message },
        );
    };

    let decision = choice.decision;
    let reject = |state: CityState, reason: Rejection| {
        let plan = format!(
            "rejected {} on {}: {}",
            decision.action,
            decision.target_id,
            reason.describe()
        );
        let outcome = CycleOutcome::Rejected {
            action: decision.action,
            target_id: decision.target_id.clone(),
            reason,
        };
        finish(state, budget, plan, outcome)
    };

    if entry.cost > budget {
        return reject(state, Rejection::OverBudget);
    }

    let applied = apply(&state, &decision);
    let reduction = match applied.outcome {
        ApplyOutcome::Applied { reduction } => reduction,
        ApplyOutcome::MissingTarget => return reject(state, Rejection::MissingTarget),
        ApplyOutcome::InapplicableAction => return reject(state, Rejection::InapplicableAction),
        ApplyOutcome::AlreadyConverted => return reject(state, Rejection::AlreadyConverted),
    };

    let remaining = budget - entry.cost;

    #[cfg(feature = "instrument")]
    tracing::info!(
        target: "intervention",
        name = entry.name.as_str(),
        action = decision.action.as_str(),
        target_id = decision.target_id.as_str(),
        cost = entry.cost,
        reduction = reduction,
        total_carbon = applied.state.total_carbon,
    );

    let plan = format!("{}, remaining budget {}", entry.name, format_amount(remaining));
    let outcome = CycleOutcome::Applied {
        name: entry.name.clone(),
        action: decision.action,
        target_id: decision.target_id.clone(),
        cost: entry.cost,
        reduction,
    };
    finish(applied.state, remaining, plan, outcome)
}

fn finish(state: CityState, budget: f64, plan: String, outcome: CycleOutcome) -> CycleReport {
    #[cfg(feature = "instrument")]
    tracing::info!(
        target: "cycle",
        outcome = outcome_label(&outcome),
        budget = budget,
        total_carbon = state.total_carbon,
        plan = plan.as_str(),
    );

    CycleReport {
        state,
        budget,
        plan,
        outcome,
    }
}

#[cfg(feature = "instrument")]
fn outcome_label(outcome: &CycleOutcome) -> &'static str {
    match outcome {
        CycleOutcome::Applied { .. } => "applied",
        CycleOutcome::BudgetExhausted => "budget_exhausted",
        CycleOutcome::Unaffordable => "unaffordable",
        CycleOutcome::Rejected { .. } => "rejected",
        CycleOutcome::NoDecision { .. } => "no_decision",
    }
}

/// Whole amounts print without decimals, everything else with two.
pub fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{amount:.0}")
    } else {
        format!("{amount:.2}")
    }
}
