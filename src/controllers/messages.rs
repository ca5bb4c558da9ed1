//! Wire shapes for Controller<->Launcher and RPC control traffic. These are
//! logical shapes (spec.md §6): this crate does not assume any wire format,
//! only that it round-trips through `serde_json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Task {
    Create {
        process_class: String,
        args: Vec<Json>,
        kwargs: Json,
        persist: bool,
        nowait: bool,
    },
    Launch {
        process_class: String,
        args: Vec<Json>,
        kwargs: Json,
        persist: bool,
        nowait: bool,
    },
    Continue {
        pid: Uuid,
        tag: Option<String>,
        nowait: bool,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ControlMessagePayload {
    pub text: Option<String>,
    pub sender: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum ControlMessage {
    Play,
    Pause {
        #[serde(default)]
        message: Option<ControlMessagePayload>,
    },
    Kill {
        #[serde(default)]
        message: Option<ControlMessagePayload>,
    },
    Status,
}

/// Broadcast subject format: `state_changed.<FROM>.<TO>`.
pub fn state_changed_subject(from: &str, to: &str) -> String {
    format!("state_changed.{from}.{to}")
}
