//! Process lifecycle: the state machine itself, its closed-sum command and
//! state types, the listener capability, and the error taxonomy.

pub mod command;
pub mod error;
pub mod listener;
#[allow(clippy::module_inception)]
pub mod process;
pub mod state;

pub use command::{Command, IntoCommand, UnsuccessfulResult};
pub use error::ProcessError;
pub use listener::{ChannelListener, ProcessEvent, ProcessListener};
pub use process::{BoxFuture, Process, ProcessBuilder, ProcessOutcome, StepFn, StepTable};
pub use state::{
    CreatedState, ExceptedState, FinishedState, KillMessage, KilledState, ProcessState, ResumeSlot,
    RunningState, StateLabel, WaitingState,
};
