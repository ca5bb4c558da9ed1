use parking_lot::Mutex;
use workloom::process::{KillMessage, ProcessListener};

/// A listener that records every lifecycle callback it receives, in order,
/// as a short event tag. Used across the integration suite in place of a
/// mock: the recorded log is asserted against directly.
#[derive(Default)]
pub struct RecordingListener {
    log: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn count(&self, tag: &str) -> usize {
        self.log.lock().iter().filter(|e| e.as_str() == tag).count()
    }
}

impl ProcessListener for RecordingListener {
    fn on_process_created(&self, _pid: uuid::Uuid) {
        self.log.lock().push("created".to_string());
    }

    fn on_process_running(&self, _pid: uuid::Uuid) {
        self.log.lock().push("running".to_string());
    }

    fn on_process_waiting(&self, _pid: uuid::Uuid, _msg: Option<&str>) {
        self.log.lock().push("waiting".to_string());
    }

    fn on_process_paused(&self, _pid: uuid::Uuid) {
        self.log.lock().push("paused".to_string());
    }

    fn on_process_played(&self, _pid: uuid::Uuid) {
        self.log.lock().push("played".to_string());
    }

    fn on_process_finished(&self, _pid: uuid::Uuid, _result: &serde_json::Value, _successful: bool) {
        self.log.lock().push("finished".to_string());
    }

    fn on_process_excepted(&self, _pid: uuid::Uuid, _exception: &str) {
        self.log.lock().push("excepted".to_string());
    }

    fn on_process_killed(&self, _pid: uuid::Uuid, _message: &KillMessage) {
        self.log.lock().push("killed".to_string());
    }

    fn on_output_emitted(&self, _pid: uuid::Uuid, port: &str, _value: &serde_json::Value, _dynamic: bool) {
        self.log.lock().push(format!("output:{port}"));
    }

    fn class_id(&self) -> Option<&'static str> {
        Some("test.recording_listener")
    }
}
