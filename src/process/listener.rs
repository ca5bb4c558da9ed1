//! The listener capability: lifecycle callbacks a process event receiver
//! may implement, fanned out by [`crate::event_helper::EventHelper`].

use serde_json::Value as Json;

use super::state::KillMessage;

/// Capability set of named callbacks a process listener may implement.
///
/// Every method has a default no-op body, so listeners only override the
/// events they actually care about. Implementations must be `Send + Sync`
/// since a process's listener set may be consulted from the coordinator's
/// marshalling path as well as from stepping.
pub trait ProcessListener: Send + Sync {
    fn on_process_created(&self, _pid: uuid::Uuid) {}
    fn on_process_running(&self, _pid: uuid::Uuid) {}
    fn on_process_waiting(&self, _pid: uuid::Uuid, _msg: Option<&str>) {}
    fn on_process_paused(&self, _pid: uuid::Uuid) {}
    fn on_process_played(&self, _pid: uuid::Uuid) {}
    fn on_process_finished(&self, _pid: uuid::Uuid, _result: &Json, _successful: bool) {}
    fn on_process_excepted(&self, _pid: uuid::Uuid, _exception: &str) {}
    fn on_process_killed(&self, _pid: uuid::Uuid, _message: &KillMessage) {}
    fn on_output_emitted(&self, _pid: uuid::Uuid, _port: &str, _value: &Json, _dynamic: bool) {}

    /// Stable class identifier used to rebind this listener on load. Only
    /// listeners that need to survive a save/load cycle need to override
    /// this; the default marks a listener as session-local (not persisted).
    fn class_id(&self) -> Option<&'static str> {
        None
    }
}

/// A lifecycle event as forwarded by [`ChannelListener`] — the shape a host
/// streams to a web client or a CLI `watch` consumer.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessEvent {
    Running {
        pid: uuid::Uuid,
    },
    Waiting {
        pid: uuid::Uuid,
        msg: Option<String>,
    },
    Paused {
        pid: uuid::Uuid,
    },
    Played {
        pid: uuid::Uuid,
    },
    Finished {
        pid: uuid::Uuid,
        result: Json,
        successful: bool,
    },
    Excepted {
        pid: uuid::Uuid,
        exception: String,
    },
    Killed {
        pid: uuid::Uuid,
        message: KillMessage,
    },
    OutputEmitted {
        pid: uuid::Uuid,
        port: String,
        value: Json,
        dynamic: bool,
    },
}

/// A [`ProcessListener`] that forwards every lifecycle callback onto a
/// `flume` channel, the same role the teacher's `ChannelSink` plays for a
/// web server streaming `EventBus` output to clients. Never persisted:
/// forwarding only makes sense to a single live subscriber, so `class_id()`
/// is left at its trait default.
pub struct ChannelListener {
    tx: flume::Sender<ProcessEvent>,
}

impl ChannelListener {
    /// Builds a listener paired with the receiving end a host drives (e.g.
    /// wrapped as an `async-stream` stream for a long-lived subscriber).
    pub fn new() -> (Self, flume::Receiver<ProcessEvent>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, rx)
    }
}

impl ProcessListener for ChannelListener {
    fn on_process_running(&self, pid: uuid::Uuid) {
        let _ = self.tx.send(ProcessEvent::Running { pid });
    }

    fn on_process_waiting(&self, pid: uuid::Uuid, msg: Option<&str>) {
        let _ = self.tx.send(ProcessEvent::Waiting {
            pid,
            msg: msg.map(str::to_string),
        });
    }

    fn on_process_paused(&self, pid: uuid::Uuid) {
        let _ = self.tx.send(ProcessEvent::Paused { pid });
    }

    fn on_process_played(&self, pid: uuid::Uuid) {
        let _ = self.tx.send(ProcessEvent::Played { pid });
    }

    fn on_process_finished(&self, pid: uuid::Uuid, result: &Json, successful: bool) {
        let _ = self.tx.send(ProcessEvent::Finished {
            pid,
            result: result.clone(),
            successful,
        });
    }

    fn on_process_excepted(&self, pid: uuid::Uuid, exception: &str) {
        let _ = self.tx.send(ProcessEvent::Excepted {
            pid,
            exception: exception.to_string(),
        });
    }

    fn on_process_killed(&self, pid: uuid::Uuid, message: &KillMessage) {
        let _ = self.tx.send(ProcessEvent::Killed {
            pid,
            message: message.clone(),
        });
    }

    fn on_output_emitted(&self, pid: uuid::Uuid, port: &str, value: &Json, dynamic: bool) {
        let _ = self.tx.send(ProcessEvent::OutputEmitted {
            pid,
            port: port.to_string(),
            value: value.clone(),
            dynamic,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_listener_forwards_running_event() {
        let (listener, rx) = ChannelListener::new();
        listener.on_process_running(uuid::Uuid::nil());
        match rx.try_recv().expect("event forwarded") {
            ProcessEvent::Running { pid } => assert_eq!(pid, uuid::Uuid::nil()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn channel_listener_forwards_output_emitted() {
        let (listener, rx) = ChannelListener::new();
        listener.on_output_emitted(uuid::Uuid::nil(), "default", &serde_json::json!(5), false);
        match rx.try_recv().expect("event forwarded") {
            ProcessEvent::OutputEmitted { port, value, .. } => {
                assert_eq!(port, "default");
                assert_eq!(value, serde_json::json!(5));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
