//! The Process state machine: lifecycle, pause/play, kill, interrupts,
//! outcome future, listener fan-out, coordinator hooks, and the step loop.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex as SyncMutex, MutexGuard};
use rustc_hash::FxHashMap;
use serde_json::Value as Json;
use tokio::sync::Notify;
use tracing::instrument;
use uuid::Uuid;

use crate::controllers::messages::{state_changed_subject, ControlMessage};
use crate::controllers::{Coordinator, RpcHandler};
use crate::event_helper::EventHelper;
use crate::object_loader::{DefaultLoader, ObjectLoader};
use crate::ports::PortNamespace;
use crate::savable::{Bundle, BundleValue, FieldKind, LoadContext, SaveContext, Savable, SavableError};
use crate::statemachine::check_allowed;

use super::command::Command;
use super::error::ProcessError;
use super::listener::ProcessListener;
use super::state::{
    CreatedState, ExceptedState, FinishedState, KillMessage, KilledState, ProcessState, ResumeSlot,
    RunningState, StateLabel, WaitingState,
};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A registered step function: takes the owning process and the current
/// state's argument payload, returns the next `Command`. This replaces
/// "save this callable by name if it is a method of self": the process
/// holds a step-function table resolved at registration time, and only
/// the name is ever persisted.
pub type StepFn = dyn Fn(Arc<Process>, Json) -> BoxFuture<Result<Command, ProcessError>> + Send + Sync;

#[derive(Clone, Default)]
pub struct StepTable(Arc<SyncMutex<FxHashMap<String, Arc<StepFn>>>>);

impl StepTable {
    pub fn register(&self, name: impl Into<String>, f: Arc<StepFn>) {
        self.0.lock().insert(name.into(), f);
    }

    fn get(&self, name: &str) -> Option<Arc<StepFn>> {
        self.0.lock().get(name).cloned()
    }
}

tokio::task_local! {
    static CURRENT_PROCESS: Arc<Process>;
}

/// Terminal outcome reported through [`Process::outcome`].
#[derive(Clone, Debug)]
pub enum ProcessOutcome {
    Finished { result: Json, successful: bool },
    Excepted { exception: String, traceback: String },
    Killed { message: KillMessage },
}

#[derive(Default)]
struct OutcomeCell {
    notify: Notify,
    value: SyncMutex<Option<ProcessOutcome>>,
}

impl OutcomeCell {
    fn resolve(&self, outcome: ProcessOutcome) {
        *self.value.lock() = Some(outcome);
        self.notify.notify_waiters();
    }

    async fn wait(&self) -> ProcessOutcome {
        loop {
            if let Some(v) = self.value.lock().clone() {
                return v;
            }
            self.notify.notified().await;
        }
    }

    fn peek(&self) -> Option<ProcessOutcome> {
        self.value.lock().clone()
    }
}

/// The Process state machine and Savable: a unique pid, creation time,
/// raw/parsed inputs, outputs, paused flag, outcome future, listener set,
/// optional coordinator handle, cleanup thunks, and a status string with a
/// saved pre-pause copy.
///
/// `state` is a plain `parking_lot` mutex, never held across an `.await` —
/// every branch that needs to suspend (a `run_fn` call, a `Waiting` state's
/// resume future) drops the guard first and reacquires it afterwards.
pub struct Process {
    pid: Uuid,
    class_id: Option<String>,
    creation_time: DateTime<Utc>,
    inputs_raw: Json,
    inputs_parsed: Json,
    outputs: SyncMutex<serde_json::Map<String, Json>>,
    output_separator: char,
    state: SyncMutex<ProcessState>,
    listeners: EventHelper,
    coordinator: SyncMutex<Option<Arc<dyn Coordinator>>>,
    cleanups: SyncMutex<Vec<Box<dyn FnOnce() + Send>>>,
    cleanups_run: AtomicBool,
    step_table: StepTable,
    ports: Option<Arc<dyn PortNamespace>>,
    object_loader: Arc<dyn ObjectLoader>,
    status: SyncMutex<Option<String>>,
    pre_paused_status: SyncMutex<Option<String>>,
    paused: AtomicBool,
    pause_notify: Notify,
    stepping: AtomicBool,
    kill_requested: AtomicBool,
    pending_kill_msg: SyncMutex<Option<String>>,
    closed: AtomicBool,
    outcome: OutcomeCell,
}

impl Process {
    pub fn builder(run_step: impl Into<String>) -> ProcessBuilder {
        ProcessBuilder::new(run_step)
    }

    pub fn pid(&self) -> Uuid {
        self.pid
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    pub fn class_id(&self) -> Option<&str> {
        self.class_id.as_deref()
    }

    pub fn register_step(&self, name: impl Into<String>, f: Arc<StepFn>) {
        self.step_table.register(name, f);
    }

    pub fn label(&self) -> StateLabel {
        self.state.lock().label()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// The innermost process currently stepping on this task, if any.
    pub fn current() -> Option<Arc<Process>> {
        CURRENT_PROCESS.try_with(|p| p.clone()).ok()
    }

    pub fn add_process_listener(&self, listener: Arc<dyn ProcessListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_process_listener(&self, listener: &Arc<dyn ProcessListener>) {
        self.listeners.remove(listener);
    }

    pub fn register_cleanup(&self, thunk: impl FnOnce() + Send + 'static) {
        self.cleanups.lock().push(Box::new(thunk));
    }

    fn run_cleanups(&self) {
        if self.cleanups_run.swap(true, Ordering::SeqCst) {
            return;
        }
        let thunks = std::mem::take(&mut *self.cleanups.lock());
        for thunk in thunks {
            thunk();
        }
    }

    /// Subscribes this process with the coordinator under its pid, wiring
    /// RPC play/pause/kill/status. Unsubscribes via a registered cleanup,
    /// run once the process reaches a terminal state.
    pub fn attach_coordinator(self: &Arc<Self>, coordinator: Arc<dyn Coordinator>) {
        *self.coordinator.lock() = Some(coordinator.clone());
        let weak = Arc::downgrade(self);
        let handler: RpcHandler = Arc::new(move |msg: ControlMessage| {
            let weak = weak.clone();
            Box::pin(async move {
                let Some(process) = weak.upgrade() else {
                    return Err(crate::controllers::DeliveryError::Dropped);
                };
                let result = match msg {
                    ControlMessage::Play => serde_json::json!({"ok": process.play()}),
                    ControlMessage::Pause { message } => {
                        let text = message.and_then(|m| m.text);
                        serde_json::json!({"ok": process.pause(text).await})
                    }
                    ControlMessage::Kill { message } => {
                        let text = message.and_then(|m| m.text);
                        serde_json::json!({"ok": process.kill(text).await})
                    }
                    ControlMessage::Status => {
                        serde_json::json!({"status": process.label().as_str()})
                    }
                };
                Ok(result)
            })
        });
        coordinator.add_rpc_subscriber(self.pid, handler);
        let coordinator_for_cleanup = coordinator;
        let pid = self.pid;
        self.register_cleanup(move || coordinator_for_cleanup.remove_rpc_subscriber(pid));
    }

    fn broadcast_transition(&self, from: StateLabel, to: StateLabel) {
        if let Some(coordinator) = self.coordinator.lock().clone() {
            coordinator.broadcast_send(
                serde_json::json!({"pid": self.pid.to_string()}),
                None,
                Some(&state_changed_subject(from.as_str(), to.as_str())),
            );
        }
    }

    /// Only valid from `Created`; triggers entry to `Running`.
    #[instrument(skip(self), fields(pid = %self.pid))]
    pub fn start(self: &Arc<Self>) -> Result<(), ProcessError> {
        let mut guard = self.state.lock();
        if guard.label() != StateLabel::Created {
            return Err(ProcessError::InvalidState {
                state: guard.label().as_str(),
                what: "start() is only valid from Created",
            });
        }
        let next = match &*guard {
            ProcessState::Created(cs) => ProcessState::Running(RunningState {
                run_step: cs.run_step.clone(),
                args: cs.args.clone(),
                pending_command: None,
                running: Arc::new(AtomicBool::new(false)),
            }),
            _ => unreachable!(),
        };
        self.listeners.fire_event(|l| l.on_process_created(self.pid));
        self.transition_locked(guard, next)
    }

    /// Takes the state mutex by value so it can be dropped before firing any
    /// listener callback: `on_entered`/`on_terminated` re-lock `self.state`
    /// for the terminal arms, and `parking_lot::Mutex` is not reentrant.
    fn transition_locked(
        self: &Arc<Self>,
        mut guard: MutexGuard<'_, ProcessState>,
        next: ProcessState,
    ) -> Result<(), ProcessError> {
        let from = guard.label();
        let to = next.label();
        if let Err(e) = check_allowed(from, to) {
            if from == StateLabel::Created {
                return Err(e.into());
            }
            let excepted = ProcessState::Excepted(ExceptedState {
                exception: e.to_string(),
                traceback: format!("transition {from} -> {to} rejected: {e}"),
            });
            *guard = excepted;
            drop(guard);
            self.on_entered(from, StateLabel::Excepted);
            return Ok(());
        }
        *guard = next;
        drop(guard);
        self.on_entered(from, to);
        Ok(())
    }

    fn on_entered(&self, from: StateLabel, to: StateLabel) {
        match to {
            StateLabel::Running => self.listeners.fire_event(|l| l.on_process_running(self.pid)),
            StateLabel::Waiting => {
                let msg = self.status.lock().clone();
                self.listeners
                    .fire_event(|l| l.on_process_waiting(self.pid, msg.as_deref()));
            }
            StateLabel::Finished => {
                if let ProcessState::Finished(fs) = &*self.state.lock() {
                    self.listeners
                        .fire_event(|l| l.on_process_finished(self.pid, &fs.result, fs.successful));
                }
            }
            StateLabel::Excepted => {
                if let ProcessState::Excepted(es) = &*self.state.lock() {
                    self.listeners.fire_event(|l| l.on_process_excepted(self.pid, &es.exception));
                }
            }
            StateLabel::Killed => {
                if let ProcessState::Killed(ks) = &*self.state.lock() {
                    self.listeners.fire_event(|l| l.on_process_killed(self.pid, &ks.message));
                }
            }
            StateLabel::Created => {}
        }
        self.broadcast_transition(from, to);
        if to.is_terminal() {
            self.on_terminated();
        }
    }

    fn on_terminated(&self) {
        let outcome = match &*self.state.lock() {
            ProcessState::Finished(fs) => ProcessOutcome::Finished {
                result: fs.result.clone(),
                successful: fs.successful,
            },
            ProcessState::Excepted(es) => ProcessOutcome::Excepted {
                exception: es.exception.clone(),
                traceback: es.traceback.clone(),
            },
            ProcessState::Killed(ks) => ProcessOutcome::Killed {
                message: ks.message.clone(),
            },
            _ => unreachable!("on_terminated only runs for terminal labels"),
        };
        self.outcome.resolve(outcome);
        self.closed.store(true, Ordering::SeqCst);
        self.run_cleanups();
    }

    /// Executes one state's unit of work and performs the resulting
    /// transition. Blocks on the pause notification first if paused, and
    /// registers itself as the task-local "current process" for the
    /// duration of the call so `Process::current()` resolves inside a
    /// running step function.
    #[instrument(skip(self), fields(pid = %self.pid))]
    pub async fn step(self: &Arc<Self>) -> Result<(), ProcessError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProcessError::Closed { pid: self.pid });
        }
        while self.paused.load(Ordering::SeqCst) {
            self.pause_notify.notified().await;
            if self.closed.load(Ordering::SeqCst) {
                return Err(ProcessError::Closed { pid: self.pid });
            }
        }

        self.stepping.store(true, Ordering::SeqCst);
        let result = CURRENT_PROCESS.scope(self.clone(), self.step_inner()).await;
        self.stepping.store(false, Ordering::SeqCst);
        result
    }

    async fn step_inner(self: &Arc<Self>) -> Result<(), ProcessError> {
        let mut guard = self.state.lock();
        if guard.label().is_terminal() {
            return Err(ProcessError::Closed { pid: self.pid });
        }

        let next = match &*guard {
            ProcessState::Created(cs) => ProcessState::Running(RunningState {
                run_step: cs.run_step.clone(),
                args: cs.args.clone(),
                pending_command: None,
                running: Arc::new(AtomicBool::new(false)),
            }),
            ProcessState::Running(rs) => {
                let run_step = rs.run_step.clone();
                let args = rs.args.clone();
                let running_flag = rs.running.clone();
                let step_fn = self
                    .step_table
                    .get(&run_step)
                    .ok_or_else(|| ProcessError::UnknownStep { name: run_step.clone() })?;

                running_flag.store(true, Ordering::SeqCst);
                drop(guard);
                let outcome = step_fn(self.clone(), args).await;
                running_flag.store(false, Ordering::SeqCst);
                guard = self.state.lock();

                let command = if self.kill_requested.swap(false, Ordering::SeqCst) {
                    Command::Kill {
                        msg: self.pending_kill_msg.lock().take(),
                    }
                } else {
                    match outcome {
                        Ok(cmd) => cmd,
                        Err(err) => {
                            let excepted = ProcessState::Excepted(ExceptedState {
                                exception: err.to_string(),
                                traceback: format!("{err:?}"),
                            });
                            let from = guard.label();
                            *guard = excepted;
                            drop(guard);
                            self.on_entered(from, StateLabel::Excepted);
                            return Ok(());
                        }
                    }
                };
                Self::apply_command(command)
            }
            ProcessState::Waiting(ws) => {
                let resume = ws.resume.clone();
                let continue_step = ws.continue_step.clone();
                drop(guard);
                let value = resume.wait().await;
                guard = self.state.lock();
                ProcessState::Running(RunningState {
                    run_step: continue_step,
                    args: value,
                    pending_command: None,
                    running: Arc::new(AtomicBool::new(false)),
                })
            }
            ProcessState::Finished(_) | ProcessState::Excepted(_) | ProcessState::Killed(_) => {
                return Err(ProcessError::Closed { pid: self.pid });
            }
        };

        self.transition_locked(guard, next)
    }

    fn apply_command(command: Command) -> ProcessState {
        match command {
            Command::Continue { next_step, args } => ProcessState::Running(RunningState {
                run_step: next_step,
                args,
                pending_command: None,
                running: Arc::new(AtomicBool::new(false)),
            }),
            Command::Wait { next_step, msg, data } => ProcessState::Waiting(WaitingState {
                continue_step: next_step,
                msg,
                data,
                resume: ResumeSlot::new(),
            }),
            Command::Stop { result, successful } => ProcessState::Finished(FinishedState { result, successful }),
            Command::Kill { msg } => ProcessState::Killed(KilledState {
                message: KillMessage::new(msg),
            }),
        }
    }

    /// Loops `step()` until a terminal state.
    pub async fn step_until_terminated(self: &Arc<Self>) -> Result<(), ProcessError> {
        loop {
            match self.step().await {
                Ok(()) => {
                    if self.label().is_terminal() {
                        return Ok(());
                    }
                }
                Err(ProcessError::Closed { .. }) if self.label().is_terminal() => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Runs to completion and returns `outputs`.
    pub async fn execute(self: &Arc<Self>) -> Result<serde_json::Map<String, Json>, ProcessError> {
        if self.closed.load(Ordering::SeqCst) && self.outcome.peek().is_none() {
            return Err(ProcessError::Closed { pid: self.pid });
        }
        self.step_until_terminated().await?;
        Ok(self.outputs.lock().clone())
    }

    /// The future that resolves when this process reaches a terminal
    /// state, yielding the recorded outcome.
    pub async fn outcome(&self) -> ProcessOutcome {
        self.outcome.wait().await
    }

    /// Validates `value` against the port capability and stores it,
    /// supporting dotted nested namespaces. Emits `on_output_emitted`.
    #[instrument(skip(self, value), fields(pid = %self.pid))]
    pub fn out(&self, port_name: &str, value: Json) -> Result<(), ProcessError> {
        if let Some(ports) = &self.ports {
            ports
                .validate_output(port_name, &value)
                .map_err(|e| ProcessError::OutputValidation {
                    port: port_name.to_string(),
                    reason: e.to_string(),
                })?;
        }
        let dynamic = self.ports.as_ref().map(|p| p.get_port(port_name).is_none()).unwrap_or(true);
        insert_dotted(&mut self.outputs.lock(), port_name, self.output_separator, value.clone());
        self.listeners
            .fire_event(|l| l.on_output_emitted(self.pid, port_name, &value, dynamic));
        Ok(())
    }

    pub fn outputs(&self) -> serde_json::Map<String, Json> {
        self.outputs.lock().clone()
    }

    /// Idempotent. If currently mid-step, the pause takes effect at the
    /// next step boundary rather than interrupting the in-flight step —
    /// this crate has no coroutine-style suspension point inside a running
    /// step function, see `DESIGN.md`.
    #[instrument(skip(self, msg), fields(pid = %self.pid))]
    pub async fn pause(&self, msg: Option<String>) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        if self.paused.swap(true, Ordering::SeqCst) {
            return true;
        }
        let previous_status = self.status.lock().clone();
        *self.pre_paused_status.lock() = previous_status;
        if let Some(msg) = msg {
            *self.status.lock() = Some(msg);
        }
        self.listeners.fire_event(|l| l.on_process_paused(self.pid));
        true
    }

    /// Cancels any pending pause, restores `status`, and wakes a step()
    /// blocked waiting on the pause.
    #[instrument(skip(self), fields(pid = %self.pid))]
    pub fn play(&self) -> bool {
        if !self.paused.swap(false, Ordering::SeqCst) {
            return false;
        }
        let restored = self.pre_paused_status.lock().take();
        *self.status.lock() = restored;
        self.pause_notify.notify_waiters();
        self.listeners.fire_event(|l| l.on_process_played(self.pid));
        true
    }

    /// Idempotent w.r.t. already-killed; fails on other terminal states.
    /// If a step is in flight, registers a kill that dominates whatever
    /// command that step produces (spec Invariant: kill beats pause and
    /// whatever the running step returns); otherwise kills immediately.
    #[instrument(skip(self, msg), fields(pid = %self.pid))]
    pub async fn kill(self: &Arc<Self>, msg: Option<String>) -> bool {
        if self.label() == StateLabel::Killed {
            return true;
        }
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        if self.stepping.load(Ordering::SeqCst) {
            *self.pending_kill_msg.lock() = msg;
            self.kill_requested.store(true, Ordering::SeqCst);
            if let ProcessState::Waiting(ws) = &*self.state.lock() {
                ws.resume.resume(Json::Null);
            }
            self.pause_notify.notify_waiters();
            true
        } else {
            let guard = self.state.lock();
            let next = ProcessState::Killed(KilledState {
                message: KillMessage::new(msg),
            });
            let _ = self.transition_locked(guard, next);
            // A step() task may be parked at the pause gate (e.g. paused
            // then killed while not stepping); wake it so it observes
            // `closed` and returns rather than hanging forever.
            self.pause_notify.notify_waiters();
            true
        }
    }

    /// Only valid from `Waiting`; resolves the current state's resume
    /// future, scheduling a transition to `Running` at the next `step()`.
    pub fn resume(&self, value: Option<Json>) -> Result<(), ProcessError> {
        let guard = self.state.lock();
        match &*guard {
            ProcessState::Waiting(ws) => {
                ws.resume.resume(value.unwrap_or(Json::Null));
                Ok(())
            }
            other => Err(ProcessError::InvalidState {
                state: other.label().as_str(),
                what: "resume() is only valid from Waiting",
            }),
        }
    }

    /// Forces a transition to `Excepted`.
    pub fn fail(self: &Arc<Self>, exception: impl Into<String>, traceback: Option<String>) -> Result<(), ProcessError> {
        let exception = exception.into();
        let guard = self.state.lock();
        let next = ProcessState::Excepted(ExceptedState {
            traceback: traceback.unwrap_or_else(|| exception.clone()),
            exception,
        });
        self.transition_locked(guard, next)
    }
}

fn insert_dotted(map: &mut serde_json::Map<String, Json>, dotted_name: &str, separator: char, value: Json) {
    let parts: Vec<&str> = dotted_name.split(separator).collect();
    let mut cursor = map;
    for part in &parts[..parts.len().saturating_sub(1)] {
        cursor = cursor
            .entry(part.to_string())
            .or_insert_with(|| Json::Object(serde_json::Map::new()))
            .as_object_mut()
            .expect("nested output namespace is always an object");
    }
    if let Some(last) = parts.last() {
        cursor.insert(last.to_string(), value);
    }
}

/// Builds a fresh `Process` in `Created`.
pub struct ProcessBuilder {
    run_step: String,
    args: Json,
    inputs_raw: Json,
    class_id: Option<String>,
    ports: Option<Arc<dyn PortNamespace>>,
    object_loader: Option<Arc<dyn ObjectLoader>>,
    output_separator: char,
}

impl ProcessBuilder {
    pub fn new(run_step: impl Into<String>) -> Self {
        Self {
            run_step: run_step.into(),
            args: Json::Null,
            inputs_raw: Json::Null,
            class_id: None,
            ports: None,
            object_loader: None,
            output_separator: '.',
        }
    }

    pub fn args(mut self, args: Json) -> Self {
        self.args = args;
        self
    }

    pub fn inputs_raw(mut self, inputs: Json) -> Self {
        self.inputs_raw = inputs;
        self
    }

    pub fn class_id(mut self, class_id: impl Into<String>) -> Self {
        self.class_id = Some(class_id.into());
        self
    }

    pub fn ports(mut self, ports: Arc<dyn PortNamespace>) -> Self {
        self.ports = Some(ports);
        self
    }

    pub fn object_loader(mut self, loader: Arc<dyn ObjectLoader>) -> Self {
        self.object_loader = Some(loader);
        self
    }

    pub fn build(self) -> Result<Arc<Process>, ProcessError> {
        let inputs_parsed = match &self.ports {
            Some(ports) => ports
                .pre_process(&self.inputs_raw)
                .map_err(|e| ProcessError::InputValidation { reason: e.to_string() })?,
            None => self.inputs_raw.clone(),
        };
        if let Some(ports) = &self.ports {
            if let Some(err) = ports.validate(&inputs_parsed) {
                return Err(ProcessError::InputValidation { reason: err.to_string() });
            }
        }
        Ok(Arc::new(Process {
            pid: Uuid::new_v4(),
            class_id: self.class_id,
            creation_time: Utc::now(),
            inputs_raw: self.inputs_raw,
            inputs_parsed,
            outputs: SyncMutex::new(serde_json::Map::new()),
            output_separator: self.output_separator,
            state: SyncMutex::new(ProcessState::Created(CreatedState {
                run_step: self.run_step,
                args: self.args,
            })),
            listeners: EventHelper::new(),
            coordinator: SyncMutex::new(None),
            cleanups: SyncMutex::new(Vec::new()),
            cleanups_run: AtomicBool::new(false),
            step_table: StepTable::default(),
            ports: self.ports,
            object_loader: self.object_loader.unwrap_or_else(|| Arc::new(DefaultLoader::new())),
            status: SyncMutex::new(None),
            pre_paused_status: SyncMutex::new(None),
            paused: AtomicBool::new(false),
            pause_notify: Notify::new(),
            stepping: AtomicBool::new(false),
            kill_requested: AtomicBool::new(false),
            pending_kill_msg: SyncMutex::new(None),
            closed: AtomicBool::new(false),
            outcome: OutcomeCell::default(),
        }))
    }
}

const PROCESS_CLASS: &str = "workloom.process";

impl Savable for Process {
    fn save(&self, ctx: &SaveContext) -> Bundle {
        let mut bundle = Bundle::new().with_class_name(PROCESS_CLASS);
        bundle.insert("_pid", Json::String(self.pid.to_string()));
        if let Some(class_id) = &self.class_id {
            bundle.insert("_class_id", Json::String(class_id.clone()));
        }
        bundle.insert("_CREATION_TIME", Json::String(self.creation_time.to_rfc3339()));
        bundle.insert("_paused", Json::Bool(self.paused.load(Ordering::SeqCst)));
        bundle.insert(
            "_status",
            self.status.lock().clone().map(Json::String).unwrap_or(Json::Null),
        );
        bundle.insert(
            "_pre_paused_status",
            self.pre_paused_status
                .lock()
                .clone()
                .map(Json::String)
                .unwrap_or(Json::Null),
        );
        bundle.insert("INPUTS_RAW", self.inputs_raw.clone());
        bundle.insert("INPUTS_PARSED", self.inputs_parsed.clone());
        bundle.insert("OUTPUTS", Json::Object(self.outputs.lock().clone()));

        let state_snapshot = self.state.lock();
        bundle.insert_typed("_state", state_snapshot.save(ctx), FieldKind::Savable);
        drop(state_snapshot);
        bundle.insert_typed("_listeners", self.listeners.save(ctx), FieldKind::Savable);
        bundle
    }

    fn recreate_from(bundle: &Bundle, ctx: &LoadContext) -> Result<Self, SavableError> {
        let pid_str = bundle
            .get("_pid")
            .and_then(BundleValue::as_scalar)
            .and_then(Json::as_str)
            .ok_or(SavableError::MissingField { field: "_pid" })?;
        let pid = Uuid::parse_str(pid_str).map_err(|_| SavableError::MissingField { field: "_pid" })?;
        let creation_time = bundle
            .get("_CREATION_TIME")
            .and_then(BundleValue::as_scalar)
            .and_then(Json::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or(SavableError::MissingField { field: "_CREATION_TIME" })?;
        let state_bundle = bundle
            .get("_state")
            .and_then(BundleValue::as_bundle)
            .ok_or(SavableError::MissingField { field: "_state" })?;
        let state = ProcessState::recreate_from(state_bundle, ctx)?;
        let listeners = match bundle.get("_listeners").and_then(BundleValue::as_bundle) {
            Some(b) => EventHelper::recreate_from(b, ctx)?,
            None => EventHelper::new(),
        };
        let outputs = bundle
            .get("OUTPUTS")
            .and_then(BundleValue::as_scalar)
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        let is_terminal = state.label().is_terminal();
        let outcome = OutcomeCell::default();
        match &state {
            ProcessState::Finished(fs) => outcome.resolve(ProcessOutcome::Finished {
                result: fs.result.clone(),
                successful: fs.successful,
            }),
            ProcessState::Excepted(es) => outcome.resolve(ProcessOutcome::Excepted {
                exception: es.exception.clone(),
                traceback: es.traceback.clone(),
            }),
            ProcessState::Killed(ks) => outcome.resolve(ProcessOutcome::Killed {
                message: ks.message.clone(),
            }),
            _ => {}
        }

        let default_loader: Arc<dyn ObjectLoader> = Arc::new(DefaultLoader::new());
        Ok(Process {
            pid,
            class_id: bundle
                .get("_class_id")
                .and_then(BundleValue::as_scalar)
                .and_then(Json::as_str)
                .map(str::to_string),
            creation_time,
            inputs_raw: bundle
                .get("INPUTS_RAW")
                .and_then(BundleValue::as_scalar)
                .cloned()
                .unwrap_or(Json::Null),
            inputs_parsed: bundle
                .get("INPUTS_PARSED")
                .and_then(BundleValue::as_scalar)
                .cloned()
                .unwrap_or(Json::Null),
            outputs: SyncMutex::new(outputs),
            output_separator: '.',
            state: SyncMutex::new(state),
            listeners,
            coordinator: SyncMutex::new(None),
            cleanups: SyncMutex::new(Vec::new()),
            cleanups_run: AtomicBool::new(is_terminal),
            step_table: StepTable::default(),
            ports: None,
            object_loader: crate::savable::resolve_loader(bundle, ctx, &default_loader),
            status: SyncMutex::new(
                bundle
                    .get("_status")
                    .and_then(BundleValue::as_scalar)
                    .and_then(Json::as_str)
                    .map(str::to_string),
            ),
            pre_paused_status: SyncMutex::new(
                bundle
                    .get("_pre_paused_status")
                    .and_then(BundleValue::as_scalar)
                    .and_then(Json::as_str)
                    .map(str::to_string),
            ),
            paused: AtomicBool::new(
                bundle
                    .get("_paused")
                    .and_then(BundleValue::as_scalar)
                    .and_then(Json::as_bool)
                    .unwrap_or(false),
            ),
            pause_notify: Notify::new(),
            stepping: AtomicBool::new(false),
            kill_requested: AtomicBool::new(false),
            pending_kill_msg: SyncMutex::new(None),
            closed: AtomicBool::new(is_terminal),
            outcome,
        })
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process").field("pid", &self.pid).finish_non_exhaustive()
    }
}
