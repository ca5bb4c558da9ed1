use miette::Diagnostic;
use thiserror::Error;

use crate::savable::SavableError;
use crate::statemachine::TransitionError;

/// Errors surfaced synchronously from a Process's control surface.
#[derive(Debug, Error, Diagnostic)]
pub enum ProcessError {
    #[error("process {pid} is closed")]
    #[diagnostic(
        code(workloom::process::closed),
        help("Create a new process or load a fresh one from a checkpoint; a terminated process cannot be stepped again.")
    )]
    Closed { pid: uuid::Uuid },

    #[error("operation invalid in state `{state}`: {what}")]
    #[diagnostic(code(workloom::process::invalid_state))]
    InvalidState { state: &'static str, what: &'static str },

    #[error(transparent)]
    #[diagnostic(code(workloom::process::transition))]
    Transition(#[from] TransitionError),

    #[error("no step function registered under name `{name}`")]
    #[diagnostic(
        code(workloom::process::unknown_step),
        help("Register the step with Process::register_step before start()/resume().")
    )]
    UnknownStep { name: String },

    #[error("output port validation failed for `{port}`: {reason}")]
    #[diagnostic(code(workloom::process::output_validation))]
    OutputValidation { port: String, reason: String },

    #[error("input validation failed: {reason}")]
    #[diagnostic(code(workloom::process::input_validation))]
    InputValidation { reason: String },

    #[error(transparent)]
    #[diagnostic(code(workloom::process::savable))]
    Savable(#[from] SavableError),

    #[error("step function panicked or returned a user error: {message}")]
    #[diagnostic(code(workloom::process::run_error))]
    RunError { message: String },

    #[error("process was killed: {}", .0.text.as_deref().unwrap_or("no reason given"))]
    #[diagnostic(code(workloom::process::killed))]
    Killed(#[source] KilledSource),
}

/// Wraps a kill message so it can sit behind `#[source]` with a useful
/// `Display` without requiring `KillMessage` itself to implement
/// `std::error::Error`.
#[derive(Debug)]
pub struct KilledSource(pub super::state::KillMessage);

impl std::fmt::Display for KilledSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.text.as_deref().unwrap_or("killed"))
    }
}

impl std::error::Error for KilledSource {}
