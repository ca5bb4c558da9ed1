//! The six Process state classes and the label/ALLOWED machinery the
//! generic state machine core checks every transition against.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value as Json;
use tokio::sync::Notify;

use crate::process::command::Command;
use crate::savable::{Bundle, BundleValue, FieldKind, LoadContext, SaveContext, Savable, SavableError};

/// Fixed label enum every `ProcessState` variant maps to one-for-one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum StateLabel {
    Created,
    Running,
    Waiting,
    Finished,
    Excepted,
    Killed,
}

impl StateLabel {
    /// Labels reachable in one transition from this label.
    pub fn allowed(self) -> &'static [StateLabel] {
        use StateLabel::*;
        match self {
            Created => &[Running, Killed, Excepted],
            Running => &[Running, Waiting, Finished, Killed, Excepted],
            Waiting => &[Running, Waiting, Killed, Excepted, Finished],
            Finished | Excepted | Killed => &[],
        }
    }

    pub fn is_terminal(self) -> bool {
        self.allowed().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StateLabel::Created => "created",
            StateLabel::Running => "running",
            StateLabel::Waiting => "waiting",
            StateLabel::Finished => "finished",
            StateLabel::Excepted => "excepted",
            StateLabel::Killed => "killed",
        }
    }
}

impl fmt::Display for StateLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A kill notice: sender, free-text reason, and when it was raised.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct KillMessage {
    pub sender: Option<String>,
    pub text: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl KillMessage {
    pub fn new(text: Option<String>) -> Self {
        Self {
            sender: None,
            text,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct CreatedState {
    pub run_step: String,
    pub args: Json,
}

#[derive(Clone)]
pub struct RunningState {
    pub run_step: String,
    pub args: Json,
    pub pending_command: Option<Command>,
    /// Set for the duration of the step function's invocation; a concurrent
    /// `kill()` checks this to know whether to raise a `KillInterruption`
    /// rather than transition immediately.
    pub running: Arc<std::sync::atomic::AtomicBool>,
}

/// A resume handle a host calls once the awaited external event occurs.
/// Re-created fresh on load (see `DESIGN.md`, open question 3): a resumed
/// `Waiting` state is armed for a new `resume()` call, not a preserved
/// in-flight await.
#[derive(Clone)]
pub struct ResumeSlot {
    pub notify: Arc<Notify>,
    pub value: Arc<Mutex<Option<Json>>>,
}

impl ResumeSlot {
    pub fn new() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
            value: Arc::new(Mutex::new(None)),
        }
    }

    pub fn resume(&self, value: Json) {
        *self.value.lock() = Some(value);
        self.notify.notify_waiters();
    }

    pub async fn wait(&self) -> Json {
        loop {
            if let Some(v) = self.value.lock().take() {
                return v;
            }
            self.notify.notified().await;
        }
    }
}

impl Default for ResumeSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct WaitingState {
    pub continue_step: String,
    pub msg: Option<String>,
    pub data: Json,
    pub resume: ResumeSlot,
}

#[derive(Clone)]
pub struct FinishedState {
    pub result: Json,
    pub successful: bool,
}

#[derive(Clone)]
pub struct ExceptedState {
    pub exception: String,
    pub traceback: String,
}

#[derive(Clone)]
pub struct KilledState {
    pub message: KillMessage,
}

/// A Savable State with a fixed label and ALLOWED successor set.
///
/// Represented as a closed sum (per the recommended redesign in `DESIGN.md`)
/// rather than an open class hierarchy: dispatch on variant replaces
/// `isinstance` chains with an exhaustive match.
#[derive(Clone)]
pub enum ProcessState {
    Created(CreatedState),
    Running(RunningState),
    Waiting(WaitingState),
    Finished(FinishedState),
    Excepted(ExceptedState),
    Killed(KilledState),
}

impl ProcessState {
    pub fn label(&self) -> StateLabel {
        match self {
            ProcessState::Created(_) => StateLabel::Created,
            ProcessState::Running(_) => StateLabel::Running,
            ProcessState::Waiting(_) => StateLabel::Waiting,
            ProcessState::Finished(_) => StateLabel::Finished,
            ProcessState::Excepted(_) => StateLabel::Excepted,
            ProcessState::Killed(_) => StateLabel::Killed,
        }
    }

    pub fn allowed(&self) -> &'static [StateLabel] {
        self.label().allowed()
    }
}

const CLASS_CREATED: &str = "workloom.process.state.created";
const CLASS_RUNNING: &str = "workloom.process.state.running";
const CLASS_WAITING: &str = "workloom.process.state.waiting";
const CLASS_FINISHED: &str = "workloom.process.state.finished";
const CLASS_EXCEPTED: &str = "workloom.process.state.excepted";
const CLASS_KILLED: &str = "workloom.process.state.killed";

impl Savable for ProcessState {
    fn save(&self, ctx: &SaveContext) -> Bundle {
        let mut bundle = Bundle::new();
        match self {
            ProcessState::Created(s) => {
                bundle = bundle.with_class_name(CLASS_CREATED);
                bundle.insert_typed("run_step", Json::String(s.run_step.clone()), FieldKind::Method);
                bundle.insert("args", s.args.clone());
            }
            ProcessState::Running(s) => {
                bundle = bundle.with_class_name(CLASS_RUNNING);
                bundle.insert_typed("run_step", Json::String(s.run_step.clone()), FieldKind::Method);
                bundle.insert("args", s.args.clone());
                if let Some(cmd) = &s.pending_command {
                    bundle.insert_typed("pending_command", cmd.save(ctx), FieldKind::Savable);
                }
            }
            ProcessState::Waiting(s) => {
                bundle = bundle.with_class_name(CLASS_WAITING);
                bundle.insert_typed(
                    "continue_step",
                    Json::String(s.continue_step.clone()),
                    FieldKind::Method,
                );
                bundle.insert("msg", s.msg.clone().map(Json::String).unwrap_or(Json::Null));
                bundle.insert("data", s.data.clone());
            }
            ProcessState::Finished(s) => {
                bundle = bundle.with_class_name(CLASS_FINISHED);
                bundle.insert("result", s.result.clone());
                bundle.insert("successful", Json::Bool(s.successful));
            }
            ProcessState::Excepted(s) => {
                bundle = bundle.with_class_name(CLASS_EXCEPTED);
                bundle.insert("exception", Json::String(s.exception.clone()));
                bundle.insert("traceback", Json::String(s.traceback.clone()));
            }
            ProcessState::Killed(s) => {
                bundle = bundle.with_class_name(CLASS_KILLED);
                bundle.insert(
                    "message",
                    serde_json::to_value(&s.message).expect("KillMessage always serialises"),
                );
            }
        }
        bundle
    }

    fn recreate_from(bundle: &Bundle, ctx: &LoadContext) -> Result<Self, SavableError> {
        let class_name = bundle
            .meta()
            .class_name
            .as_deref()
            .ok_or(SavableError::MissingClassName)?;
        let get_str = |field: &'static str| -> Result<String, SavableError> {
            bundle
                .get(field)
                .and_then(BundleValue::as_scalar)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or(SavableError::MissingField { field })
        };
        let get_json = |field: &'static str| -> Json {
            bundle
                .get(field)
                .and_then(BundleValue::as_scalar)
                .cloned()
                .unwrap_or(Json::Null)
        };
        match class_name {
            CLASS_CREATED => Ok(ProcessState::Created(CreatedState {
                run_step: get_str("run_step")?,
                args: get_json("args"),
            })),
            CLASS_RUNNING => {
                let pending_command = match bundle.get("pending_command") {
                    Some(BundleValue::Bundle(b)) => Some(Command::recreate_from(b, ctx)?),
                    _ => None,
                };
                Ok(ProcessState::Running(RunningState {
                    run_step: get_str("run_step")?,
                    args: get_json("args"),
                    pending_command,
                    running: Arc::new(std::sync::atomic::AtomicBool::new(false)),
                }))
            }
            CLASS_WAITING => Ok(ProcessState::Waiting(WaitingState {
                continue_step: get_str("continue_step")?,
                msg: match bundle.get("msg").and_then(BundleValue::as_scalar) {
                    Some(Json::String(s)) => Some(s.clone()),
                    _ => None,
                },
                data: get_json("data"),
                resume: ResumeSlot::new(),
            })),
            CLASS_FINISHED => Ok(ProcessState::Finished(FinishedState {
                result: get_json("result"),
                successful: bundle
                    .get("successful")
                    .and_then(BundleValue::as_scalar)
                    .and_then(Json::as_bool)
                    .unwrap_or(true),
            })),
            CLASS_EXCEPTED => Ok(ProcessState::Excepted(ExceptedState {
                exception: get_str("exception")?,
                traceback: get_str("traceback")?,
            })),
            CLASS_KILLED => {
                let raw = bundle
                    .get("message")
                    .and_then(BundleValue::as_scalar)
                    .cloned()
                    .ok_or(SavableError::MissingField { field: "message" })?;
                let message: KillMessage =
                    serde_json::from_value(raw).map_err(|source| SavableError::Decode {
                        field: "message",
                        source,
                    })?;
                Ok(ProcessState::Killed(KilledState { message }))
            }
            other => Err(SavableError::UnknownClass {
                class_id: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_allows_running_killed_excepted_only() {
        let allowed = StateLabel::Created.allowed();
        assert_eq!(allowed, &[StateLabel::Running, StateLabel::Killed, StateLabel::Excepted]);
    }

    #[test]
    fn terminal_states_have_no_successors() {
        for label in [StateLabel::Finished, StateLabel::Excepted, StateLabel::Killed] {
            assert!(label.is_terminal());
        }
    }

    #[test]
    fn created_state_round_trips() {
        let state = ProcessState::Created(CreatedState {
            run_step: "entry".to_string(),
            args: serde_json::json!({"n": 3}),
        });
        let bundle = state.save(&SaveContext::default());
        let restored = ProcessState::recreate_from(&bundle, &LoadContext::default()).unwrap();
        assert_eq!(restored.label(), StateLabel::Created);
    }

    #[test]
    fn running_state_preserves_pending_command() {
        let state = ProcessState::Running(RunningState {
            run_step: "entry".to_string(),
            args: Json::Null,
            pending_command: Some(Command::Stop {
                result: Json::Null,
                successful: true,
            }),
            running: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        });
        let bundle = state.save(&SaveContext::default());
        let restored = ProcessState::recreate_from(&bundle, &LoadContext::default()).unwrap();
        match restored {
            ProcessState::Running(s) => assert!(s.pending_command.is_some()),
            other => panic!("expected Running, got {:?}", other.label()),
        }
    }
}
