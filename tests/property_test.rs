use paydesk::domain::money::MoneyAmount;
use paydesk::domain::payment::PaymentStatus;
use proptest::prelude::*;

fn arb_status() -> impl Strategy<Value = PaymentStatus> {
    prop_oneof![
        Just(PaymentStatus::Pending),
        Just(PaymentStatus::Completed),
        Just(PaymentStatus::Failed),
        Just(PaymentStatus::Refunded),
    ]
}

proptest! {
    /// Failed and Refunded accept no outgoing transitions at all.
    #[test]
    fn dead_end_states_reject_all_transitions(target in arb_status()) {
        prop_assert!(!PaymentStatus::Failed.can_transition_to(&target));
        prop_assert!(!PaymentStatus::Refunded.can_transition_to(&target));
    }

    /// Pending never follows a terminal state: no valid transition ever
    /// lands on Pending.
    #[test]
    fn nothing_transitions_back_to_pending(from in arb_status()) {
        prop_assert!(!from.can_transition_to(&PaymentStatus::Pending));
    }

    /// Any random walk from Pending takes at most two valid steps
    /// (pending -> completed -> refunded is the longest path), and once a
    /// dead end is reached the status never changes again.
    #[test]
    fn random_walk_is_bounded_by_longest_path(
        steps in prop::collection::vec(arb_status(), 1..30)
    ) {
        let mut current = PaymentStatus::Pending;
        let mut transitions = 0u32;
        for next in &steps {
            if current.can_transition_to(next) {
                current = *next;
                transitions += 1;
            }
        }
        prop_assert!(transitions <= 2, "got {transitions} transitions in walk: {steps:?}");
    }

    /// as_str -> try_from roundtrip is identity for any status.
    #[test]
    fn status_string_roundtrip(status in arb_status()) {
        let roundtripped = PaymentStatus::try_from(status.as_str()).unwrap();
        prop_assert_eq!(roundtripped, status);
    }

    /// Cents -> decimal string -> cents is identity for any valid amount.
    #[test]
    fn usd_string_roundtrip(cents in 0i64..=i64::MAX / 100) {
        let amount = MoneyAmount::new(cents).unwrap();
        let parsed = MoneyAmount::from_usd_str(&amount.to_usd_string()).unwrap();
        prop_assert_eq!(parsed, amount);
    }

    /// checked_add mirrors i64::checked_add and never silently wraps.
    #[test]
    fn money_add_never_silently_overflows(a in 0i64..=i64::MAX, b in 0i64..=i64::MAX) {
        let result = MoneyAmount::new(a).unwrap().checked_add(MoneyAmount::new(b).unwrap());
        match a.checked_add(b) {
            Some(sum) => prop_assert_eq!(result.map(|m| m.cents()), Some(sum)),
            None => prop_assert!(result.is_none()),
        }
    }

    /// Subtraction refuses to go below zero.
    #[test]
    fn money_sub_never_goes_negative(a in 0i64..=i64::MAX, b in 0i64..=i64::MAX) {
        let result = MoneyAmount::new(a).unwrap().checked_sub(MoneyAmount::new(b).unwrap());
        if b > a {
            prop_assert!(result.is_none());
        } else {
            prop_assert_eq!(result.map(|m| m.cents()), Some(a - b));
        }
    }
}
