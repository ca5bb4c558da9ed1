//! Generic state-machine core: transition legality, entry/exit ordering,
//! and failure routing. This crate instantiates the engine exactly once,
//! for [`crate::process::Process`], so the "abstract base" the original
//! design describes collapses into a free function plus the label/ALLOWED
//! contract every `Transitionable` state already carries.

use miette::Diagnostic;
use thiserror::Error;

use crate::process::state::StateLabel;

#[derive(Debug, Error, Diagnostic)]
pub enum TransitionError {
    #[error("transition from `{from}` to `{to}` is not allowed")]
    #[diagnostic(
        code(workloom::statemachine::not_allowed),
        help("Check the state's ALLOWED set; `{to}` must be reachable in one hop from `{from}`.")
    )]
    NotAllowed { from: StateLabel, to: StateLabel },

    #[error("re-entrant transition_to call while a transition is already in progress")]
    #[diagnostic(
        code(workloom::statemachine::reentrant),
        help("This is an engine bug: transition_to must never be called from inside enter()/exit().")
    )]
    Reentrant,
}

/// Minimal contract the transition algorithm needs: a label and the set of
/// labels reachable from it. `ProcessState` is the only implementor in this
/// crate.
pub trait Transitionable {
    fn label(&self) -> StateLabel;
}

impl Transitionable for crate::process::state::ProcessState {
    fn label(&self) -> StateLabel {
        crate::process::state::ProcessState::label(self)
    }
}

/// Checks whether `from -> to` is a legal one-hop transition. The caller
/// (here, always [`crate::process::Process::transition_to`]) is responsible
/// for the entry/exit/on_entered/on_terminated ordering and for failure
/// routing through `transition_excepted`; this function only encodes the
/// ALLOWED-set invariant that every transition must satisfy.
pub fn check_allowed(from: StateLabel, to: StateLabel) -> Result<(), TransitionError> {
    if from.allowed().contains(&to) {
        Ok(())
    } else {
        Err(TransitionError::NotAllowed { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_to_waiting_is_allowed() {
        assert!(check_allowed(StateLabel::Running, StateLabel::Waiting).is_ok());
    }

    #[test]
    fn finished_to_anything_is_rejected() {
        assert!(check_allowed(StateLabel::Finished, StateLabel::Running).is_err());
    }

    #[test]
    fn created_to_waiting_is_rejected() {
        assert!(check_allowed(StateLabel::Created, StateLabel::Waiting).is_err());
    }
}
