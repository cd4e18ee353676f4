//! Builds the structured `DecisionExplanation` record kept alongside a
//! decision (`spec.md` §4.4: "a short structured record (per-factor
//! contribution + guardrail list)"). Grounded on the teacher's per-factor
//! `DecisionFactor` records in `amas/decision/ensemble.rs`.

use crate::learning::ensemble::ScorerKind;
use crate::types::{DecisionExplanation, DecisionFactor, GuardrailAdjustment, RewardBreakdown, UserState};

fn scorer_name(kind: ScorerKind) -> &'static str {
    match kind {
        ScorerKind::LinUcb => "linucb",
        ScorerKind::Thompson => "thompson",
        ScorerKind::ColdStart => "cold_start",
        ScorerKind::ActR => "actr",
    }
}

/// One factor per latent state component, weighted equally for display
/// purposes; `value` is the component's current reading and `contribution`
/// the (value - neutral) term so a reader can see which components pushed
/// the decision off its defaults.
fn state_factors(state: &UserState) -> Vec<DecisionFactor> {
    vec![
        DecisionFactor {
            name: "attention".to_string(),
            value: state.attention,
            weight: 0.25,
            contribution: 0.25 * (state.attention - 0.7),
        },
        DecisionFactor {
            name: "fatigue".to_string(),
            value: state.fatigue,
            weight: 0.25,
            contribution: 0.25 * (state.fatigue - 0.0),
        },
        DecisionFactor {
            name: "motivation".to_string(),
            value: state.motivation,
            weight: 0.25,
            contribution: 0.25 * state.motivation,
        },
        DecisionFactor {
            name: "cognitive_mem".to_string(),
            value: state.cognitive.mem,
            weight: 0.25,
            contribution: 0.25 * (state.cognitive.mem - 0.5),
        },
    ]
}

pub fn build(
    state: &UserState,
    ensemble_weights: [(ScorerKind, f64); 4],
    guardrails_fired: Vec<GuardrailAdjustment>,
    used_cold_start: bool,
    reward_breakdown: Option<RewardBreakdown>,
) -> DecisionExplanation {
    let factors = state_factors(state);
    let weights: Vec<(String, f64)> =
        ensemble_weights.iter().map(|(kind, w)| (scorer_name(*kind).to_string(), *w)).collect();

    let mut text = if used_cold_start {
        "cold-start probe sequence active; ensemble bypassed".to_string()
    } else {
        format!(
            "A={:.2} F={:.2} M={:.2}; ensemble weights {}",
            state.attention,
            state.fatigue,
            state.motivation,
            weights.iter().map(|(n, w)| format!("{n}={w:.2}")).collect::<Vec<_>>().join(", ")
        )
    };
    if !guardrails_fired.is_empty() {
        text.push_str(&format!("; {} guardrail(s) fired", guardrails_fired.len()));
    }

    DecisionExplanation {
        factors,
        guardrails_fired,
        ensemble_weights: weights,
        reward_breakdown,
        text,
    }
}
