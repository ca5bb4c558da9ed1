//! Thin async/sync façades that convert control intents into coordinator
//! messages, plus the `Coordinator` capability and launcher the core
//! consumes but never implements a wire format for.

pub mod messages;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value as Json;
use thiserror::Error;
use uuid::Uuid;

use crate::object_loader::ObjectLoader;
use crate::persistence::Persister;
use crate::process::Process;
use messages::{ControlMessage, Task};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Error, Diagnostic)]
pub enum DeliveryError {
    #[error("no subscriber registered for recipient {recipient}")]
    #[diagnostic(code(workloom::controllers::no_subscriber))]
    NoSubscriber { recipient: String },

    #[error("delivery timed out")]
    #[diagnostic(code(workloom::controllers::timeout))]
    Timeout,

    #[error("recipient dropped the response channel")]
    #[diagnostic(code(workloom::controllers::dropped))]
    Dropped,
}

pub type RpcHandler = Arc<dyn Fn(ControlMessage) -> BoxFuture<'static, Result<Json, DeliveryError>> + Send + Sync>;
pub type BroadcastHandler = Arc<dyn Fn(&Json, Option<&str>, Option<&str>) + Send + Sync>;
pub type TaskHandler = Arc<dyn Fn(Task) -> BoxFuture<'static, Result<Json, DeliveryError>> + Send + Sync>;

/// External capability providing RPC, broadcast, and task messaging. The
/// core consumes this capability; it never assumes a wire format (spec.md
/// §6).
#[async_trait]
pub trait Coordinator: Send + Sync {
    fn add_rpc_subscriber(&self, pid: Uuid, handler: RpcHandler);
    fn remove_rpc_subscriber(&self, pid: Uuid);
    fn add_broadcast_subscriber(&self, id: Uuid, handler: BroadcastHandler);
    fn remove_broadcast_subscriber(&self, id: Uuid);
    fn add_task_subscriber(&self, id: Uuid, handler: TaskHandler);
    fn remove_task_subscriber(&self, id: Uuid);

    async fn rpc_send(&self, recipient_id: Uuid, msg: ControlMessage) -> Result<Json, DeliveryError>;
    fn broadcast_send(&self, body: Json, sender: Option<&str>, subject: Option<&str>);
    async fn task_send(&self, task: Task, no_reply: bool) -> Result<Option<Json>, DeliveryError>;
}

/// An in-memory coordinator: every subscriber lives in this process. Used
/// by tests and single-host deployments, exactly as `InMemoryCheckpointer`
/// stands in for a real backing store.
#[derive(Default)]
pub struct InProcessCoordinator {
    rpc: RwLock<FxHashMap<Uuid, RpcHandler>>,
    broadcast: RwLock<FxHashMap<Uuid, BroadcastHandler>>,
    tasks: RwLock<FxHashMap<Uuid, TaskHandler>>,
}

impl InProcessCoordinator {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Coordinator for InProcessCoordinator {
    fn add_rpc_subscriber(&self, pid: Uuid, handler: RpcHandler) {
        self.rpc.write().insert(pid, handler);
    }

    fn remove_rpc_subscriber(&self, pid: Uuid) {
        self.rpc.write().remove(&pid);
    }

    fn add_broadcast_subscriber(&self, id: Uuid, handler: BroadcastHandler) {
        self.broadcast.write().insert(id, handler);
    }

    fn remove_broadcast_subscriber(&self, id: Uuid) {
        self.broadcast.write().remove(&id);
    }

    fn add_task_subscriber(&self, id: Uuid, handler: TaskHandler) {
        self.tasks.write().insert(id, handler);
    }

    fn remove_task_subscriber(&self, id: Uuid) {
        self.tasks.write().remove(&id);
    }

    async fn rpc_send(&self, recipient_id: Uuid, msg: ControlMessage) -> Result<Json, DeliveryError> {
        let handler = self
            .rpc
            .read()
            .get(&recipient_id)
            .cloned()
            .ok_or_else(|| DeliveryError::NoSubscriber {
                recipient: recipient_id.to_string(),
            })?;
        handler(msg).await
    }

    fn broadcast_send(&self, body: Json, sender: Option<&str>, subject: Option<&str>) {
        for handler in self.broadcast.read().values() {
            handler(&body, sender, subject);
        }
    }

    async fn task_send(&self, task: Task, no_reply: bool) -> Result<Option<Json>, DeliveryError> {
        // Single-subscriber broadcast-to-any-one-launcher semantics: the
        // first registered task subscriber claims every task.
        let handler = self.tasks.read().values().next().cloned();
        let Some(handler) = handler else {
            return Err(DeliveryError::NoSubscriber {
                recipient: "<task subscriber>".to_string(),
            });
        };
        if no_reply {
            tokio::spawn(async move {
                let _ = handler(task).await;
            });
            Ok(None)
        } else {
            handler(task).await.map(Some)
        }
    }
}

/// Client-side façade speaking the control verbs over a [`Coordinator`].
/// Each verb encodes a typed message and awaits the coordinator's reply.
pub struct AsyncController {
    coordinator: Arc<dyn Coordinator>,
}

impl AsyncController {
    pub fn new(coordinator: Arc<dyn Coordinator>) -> Self {
        Self { coordinator }
    }

    pub async fn pause_process(&self, pid: Uuid, msg: Option<String>) -> Result<Json, DeliveryError> {
        self.coordinator
            .rpc_send(
                pid,
                ControlMessage::Pause {
                    message: msg.map(|text| messages::ControlMessagePayload {
                        text: Some(text),
                        sender: None,
                        timestamp: chrono::Utc::now(),
                    }),
                },
            )
            .await
    }

    pub async fn play_process(&self, pid: Uuid) -> Result<Json, DeliveryError> {
        self.coordinator.rpc_send(pid, ControlMessage::Play).await
    }

    pub async fn kill_process(&self, pid: Uuid, msg: Option<String>) -> Result<Json, DeliveryError> {
        self.coordinator
            .rpc_send(
                pid,
                ControlMessage::Kill {
                    message: msg.map(|text| messages::ControlMessagePayload {
                        text: Some(text),
                        sender: None,
                        timestamp: chrono::Utc::now(),
                    }),
                },
            )
            .await
    }

    pub async fn get_status(&self, pid: Uuid) -> Result<Json, DeliveryError> {
        self.coordinator.rpc_send(pid, ControlMessage::Status).await
    }

    pub async fn continue_process(
        &self,
        pid: Uuid,
        tag: Option<String>,
        nowait: bool,
    ) -> Result<Option<Json>, DeliveryError> {
        self.coordinator
            .task_send(Task::Continue { pid, tag, nowait }, nowait)
            .await
    }

    pub async fn launch_process(
        &self,
        process_class: String,
        args: Vec<Json>,
        kwargs: Json,
        persist: bool,
        nowait: bool,
    ) -> Result<Option<Json>, DeliveryError> {
        self.coordinator
            .task_send(
                Task::Launch {
                    process_class,
                    args,
                    kwargs,
                    persist,
                    nowait,
                },
                nowait,
            )
            .await
    }

    pub async fn execute_process(
        &self,
        process_class: String,
        args: Vec<Json>,
        kwargs: Json,
    ) -> Result<Option<Json>, DeliveryError> {
        self.coordinator
            .task_send(
                Task::Create {
                    process_class,
                    args,
                    kwargs,
                    persist: false,
                    nowait: false,
                },
                false,
            )
            .await
    }
}

/// Same verbs as [`AsyncController`] but returning the delivery future
/// directly instead of awaiting it, plus broadcast-style "all" operations.
pub struct SyncController {
    coordinator: Arc<dyn Coordinator>,
}

impl SyncController {
    pub fn new(coordinator: Arc<dyn Coordinator>) -> Self {
        Self { coordinator }
    }

    pub fn pause_process(&self, pid: Uuid) -> BoxFuture<'static, Result<Json, DeliveryError>> {
        let coordinator = self.coordinator.clone();
        async move { coordinator.rpc_send(pid, ControlMessage::Pause { message: None }).await }.boxed()
    }

    pub fn play_process(&self, pid: Uuid) -> BoxFuture<'static, Result<Json, DeliveryError>> {
        let coordinator = self.coordinator.clone();
        async move { coordinator.rpc_send(pid, ControlMessage::Play).await }.boxed()
    }

    pub fn kill_process(&self, pid: Uuid) -> BoxFuture<'static, Result<Json, DeliveryError>> {
        let coordinator = self.coordinator.clone();
        async move { coordinator.rpc_send(pid, ControlMessage::Kill { message: None }).await }.boxed()
    }

    pub fn pause_all(&self) {
        self.coordinator.broadcast_send(
            serde_json::json!({"intent": "pause"}),
            None,
            Some("control.pause_all"),
        );
    }

    pub fn play_all(&self) {
        self.coordinator
            .broadcast_send(serde_json::json!({"intent": "play"}), None, Some("control.play_all"));
    }

    pub fn kill_all(&self) {
        self.coordinator
            .broadcast_send(serde_json::json!({"intent": "kill"}), None, Some("control.kill_all"));
    }
}

/// Subscriber registered with the coordinator's task channel on the
/// receiving side. Dispatches on the task body's kind, using the injected
/// [`Persister`] to store an initial checkpoint on `launch(persist=true)`
/// and to load one on `continue`.
pub struct ProcessLauncher {
    pub persister: Arc<dyn Persister>,
    pub loader: Arc<dyn ObjectLoader>,
    pub registry: RwLock<FxHashMap<String, Arc<dyn Fn() -> Process + Send + Sync>>>,
}

impl ProcessLauncher {
    pub fn new(persister: Arc<dyn Persister>, loader: Arc<dyn ObjectLoader>) -> Self {
        Self {
            persister,
            loader,
            registry: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn register_class(&self, class_id: impl Into<String>, ctor: Arc<dyn Fn() -> Process + Send + Sync>) {
        self.registry.write().insert(class_id.into(), ctor);
    }

    pub async fn handle(&self, task: Task) -> Result<Json, crate::process::ProcessError> {
        match task {
            Task::Create { process_class, persist, .. } | Task::Launch { process_class, persist, .. } => {
                let ctor = self
                    .registry
                    .read()
                    .get(&process_class)
                    .cloned()
                    .ok_or_else(|| crate::process::ProcessError::UnknownStep {
                        name: process_class.clone(),
                    })?;
                let process = ctor();
                if persist {
                    let ctx = crate::savable::SaveContext::new(self.loader.clone());
                    let bundle = crate::savable::Savable::save(&process, &ctx);
                    self.persister
                        .save_checkpoint(process.pid(), None, bundle)
                        .await
                        .map_err(crate::savable::SavableError::from)?;
                }
                Ok(serde_json::json!({"pid": process.pid().to_string()}))
            }
            Task::Continue { pid, tag, .. } => {
                let bundle = self
                    .persister
                    .load_checkpoint(pid, tag.as_deref())
                    .await
                    .map_err(crate::savable::SavableError::from)?;
                let ctx = crate::savable::LoadContext::new().with_loader(self.loader.clone());
                let process = Process::recreate_from(&bundle, &ctx)?;
                Ok(serde_json::json!({"pid": process.pid().to_string()}))
            }
        }
    }
}
