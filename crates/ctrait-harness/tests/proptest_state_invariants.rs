//! Property-based invariant tests for descriptor state.
//!
//! 1. getstate → from_state → getstate is the identity
//! 2. The 15-tuple form round-trips
//! 3. The portable JSON form round-trips with an empty registry
//! 4. Tuples of any other length are rejected
//! 5. Out-of-range table indices are rejected and leave state unchanged
//! 6. Comparison-mode indices map 0..=2 and reject everything else

use ctrait_core::descriptor::RangeExclusion;
use ctrait_core::{
    ComparisonMode, DefaultValueKind, StateRegistry, TraitDescriptor, TraitState, Validator, Value,
};
use proptest::prelude::*;

// ── Helpers ──────────────────────────────────────────────────────────

fn arb_validator() -> impl Strategy<Value = Option<Validator>> {
    prop_oneof![
        Just(None),
        (proptest::option::of(-100i64..0), proptest::option::of(0i64..100))
            .prop_map(|(low, high)| Some(Validator::int_range(low, high))),
        (-1.0e6f64..0.0, 0.0f64..1.0e6, 0u8..4).prop_map(|(low, high, bits)| {
            Some(Validator::float_range(
                Some(low),
                Some(high),
                RangeExclusion::from_bits_truncate(bits),
            ))
        }),
        proptest::collection::vec(any::<i64>(), 1..6)
            .prop_map(|items| Some(Validator::enumeration(items.into_iter().map(Value::Int)))),
        Just(Some(Validator::Int)),
        Just(Some(Validator::Float)),
    ]
}

fn arb_descriptor() -> impl Strategy<Value = TraitDescriptor> {
    (0i64..9, any::<i64>(), arb_validator(), 0i64..3, any::<[bool; 3]>()).prop_map(
        |(kind, default, validator, mode, [original, post_original, mapped])| {
            let t = TraitDescriptor::from_kind_index(kind).unwrap();
            t.set_default(DefaultValueKind::Constant, Value::Int(default));
            t.set_validator(validator);
            t.set_comparison_mode_index(mode).unwrap();
            t.set_setattr_original_value(original)
                .set_post_setattr_original_value(post_original)
                .set_is_mapped(mapped);
            t
        },
    )
}

// ═════════════════════════════════════════════════════════════════════════
// 1–3. Round trips
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn state_round_trips(t in arb_descriptor()) {
        let state = t.getstate();
        let restored = TraitDescriptor::from_state(&state).unwrap();
        prop_assert_eq!(restored.getstate(), state.clone());
        prop_assert_eq!(restored.comparison_mode(), t.comparison_mode());
        prop_assert_eq!(restored.flags(), t.flags());
    }

    #[test]
    fn tuple_form_round_trips(t in arb_descriptor()) {
        let state = t.getstate();
        prop_assert_eq!(TraitState::from_tuple(&state.to_tuple()).unwrap(), state);
    }

    #[test]
    fn json_form_round_trips(t in arb_descriptor()) {
        let registry = StateRegistry::new();
        let json = registry.save(&t).unwrap();
        let loaded = registry.load(&json).unwrap();
        prop_assert_eq!(loaded.getstate(), t.getstate());
        prop_assert_eq!(registry.save(&loaded).unwrap(), json);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Tuple length
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn other_lengths_are_rejected(len in 0usize..30) {
        prop_assume!(len != 15);
        let tuple = Value::tuple(std::iter::repeat_n(Value::Int(0), len));
        let err = TraitState::from_tuple(&tuple).unwrap_err();
        prop_assert_eq!(err.to_string(), "state must be a 15-tuple");
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Table indices
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn out_of_range_indices_are_rejected(
        t in arb_descriptor(),
        field in 0usize..5,
        offset in 0i64..1000,
    ) {
        let before = t.getstate();
        let mut state = before.clone();
        match field {
            0 => state.getattr = 13 + offset,
            1 => state.setattr = 14 + offset,
            2 => state.post_setattr = 6 + offset,
            3 => state.default_kind = 11 + offset,
            _ => state.delegate_attr_name = -1 - offset,
        }
        prop_assert!(t.setstate(&state).is_err());
        prop_assert_eq!(t.getstate(), before);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Comparison-mode indices
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn comparison_mode_indices(index in -10i64..10) {
        match ComparisonMode::from_index(index) {
            Ok(mode) => {
                prop_assert!((0..=2).contains(&index));
                prop_assert_eq!(mode.index(), index);
            }
            Err(err) => {
                prop_assert!(!(0..=2).contains(&index));
                prop_assert!(err.to_string().contains("must be 0..2"));
            }
        }
    }
}
