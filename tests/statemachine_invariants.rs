//! Invariant 2: every transition that occurs satisfies
//! `S2.label ∈ S1.ALLOWED`, checked both as unit cases and as a property
//! over arbitrary label pairs.

#[macro_use]
extern crate proptest;

use proptest::prelude::{Just, Strategy};
use workloom::process::StateLabel;
use workloom::statemachine::check_allowed;

fn all_labels() -> Vec<StateLabel> {
    vec![
        StateLabel::Created,
        StateLabel::Running,
        StateLabel::Waiting,
        StateLabel::Finished,
        StateLabel::Excepted,
        StateLabel::Killed,
    ]
}

fn label_strategy() -> impl Strategy<Value = StateLabel> {
    prop_oneof![
        Just(StateLabel::Created),
        Just(StateLabel::Running),
        Just(StateLabel::Waiting),
        Just(StateLabel::Finished),
        Just(StateLabel::Excepted),
        Just(StateLabel::Killed),
    ]
}

#[test]
fn every_label_pair_agrees_with_its_own_allowed_set() {
    for from in all_labels() {
        for to in all_labels() {
            let result = check_allowed(from, to);
            assert_eq!(result.is_ok(), from.allowed().contains(&to), "from={from} to={to}");
        }
    }
}

#[test]
fn terminal_labels_reject_every_successor() {
    for terminal in [StateLabel::Finished, StateLabel::Excepted, StateLabel::Killed] {
        for to in all_labels() {
            assert!(check_allowed(terminal, to).is_err());
        }
    }
}

proptest! {
    #[test]
    fn check_allowed_always_agrees_with_the_label_s_own_allowed_set(
        from in label_strategy(),
        to in label_strategy(),
    ) {
        let allowed = from.allowed().contains(&to);
        prop_assert_eq!(check_allowed(from, to).is_ok(), allowed);
    }

    #[test]
    fn check_allowed_never_permits_a_transition_out_of_a_terminal_label(
        from in prop_oneof![Just(StateLabel::Finished), Just(StateLabel::Excepted), Just(StateLabel::Killed)],
        to in label_strategy(),
    ) {
        prop_assert!(check_allowed(from, to).is_err());
    }
}
