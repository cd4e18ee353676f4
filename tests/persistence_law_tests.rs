//! Round-trip laws for the persisted bandit formats (`spec.md` §8): a model
//! that goes through the wire encoding must come back scoring identically to
//! the model that went in, and a corrupted or partial ensemble snapshot must
//! restore into something usable rather than panicking.

use danci_engine::learning::ensemble::{EnsembleWeights, PersistedEnsemble};
use danci_engine::learning::linucb::LinUcbModel;
use danci_engine::persistence::blob::{decode_linucb, encode_linucb, ArmBlob};
use proptest::prelude::*;

const DIM: usize = 4;

fn context_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-5.0f64..5.0, DIM)
}

fn reward_strategy() -> impl Strategy<Value = f64> {
    -1.0f64..1.0
}

proptest! {
    /// Persist -> load a LinUCB model trained on an arbitrary sequence of
    /// (context, reward) updates: the reloaded model scores every probe
    /// context identically to the original, up to floating point round-off.
    #[test]
    fn linucb_round_trip_preserves_ucb_scores(
        updates in prop::collection::vec((0u32..3, context_strategy(), reward_strategy()), 0..20),
        probe in context_strategy(),
    ) {
        let mut original = LinUcbModel::new(DIM, 1.0, 0.5);
        for (action_index, x, reward) in &updates {
            original.update(*action_index, x, *reward);
        }

        let arms: Vec<ArmBlob> = original
            .export_arms()
            .into_iter()
            .map(|(action_index, a, b)| ArmBlob { action_index, a, b })
            .collect();
        let bytes = encode_linucb(DIM, &arms);
        let (decoded_dim, decoded_arms) = decode_linucb(&bytes).unwrap();
        prop_assert_eq!(decoded_dim, DIM);

        let mut restored = LinUcbModel::new(DIM, 1.0, 0.5);
        for arm in decoded_arms {
            restored.import_arm(arm.action_index, arm.a, arm.b);
        }

        for action_index in 0u32..3 {
            let before = original.score(action_index, &probe);
            let after = restored.score(action_index, &probe);
            prop_assert!((before.exploitation - after.exploitation).abs() < 1e-9);
            prop_assert!((before.confidence - after.confidence).abs() < 1e-9);
            prop_assert!((before.ucb - after.ucb).abs() < 1e-9);
        }
    }

    /// A persisted ensemble snapshot with arbitrary (possibly non-finite,
    /// possibly negative) weights and reward histories never panics on load,
    /// and the restored weights always form a usable probability-like
    /// distribution: finite, non-negative, summing to ~1.
    #[test]
    fn ensemble_restore_is_defensive_against_corrupt_snapshots(
        weights in proptest::array::uniform4(prop_oneof![
            -10.0f64..10.0,
            Just(f64::NAN),
            Just(f64::INFINITY),
            Just(f64::NEG_INFINITY),
        ]),
        reward_history in proptest::array::uniform4(
            prop::collection::vec(prop_oneof![-5.0f64..5.0, Just(f64::NAN), Just(f64::INFINITY)], 0..10),
        ),
    ) {
        let persisted = PersistedEnsemble { weights, reward_history };
        let restored = EnsembleWeights::from_persisted(&persisted, 0.1, 50);

        let snapshot = restored.to_persisted();
        prop_assert!(snapshot.weights.iter().all(|w| w.is_finite() && *w >= 0.0));
        let sum: f64 = snapshot.weights.iter().sum();
        prop_assert!((sum - 1.0).abs() < 1e-6);
        for history in &snapshot.reward_history {
            prop_assert!(history.iter().all(|r| r.is_finite()));
        }
    }
}
