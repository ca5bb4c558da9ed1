//! Demo: Basic Process Lifecycle
//!
//! This demonstration shows the fundamental Process control surface: starting
//! a process, stepping it through a `Wait`/`resume` round trip, listening for
//! lifecycle events, and reading its final outputs.
//!
//! What You'll Learn:
//! 1. Registering step functions by name on a `Process`
//! 2. Driving a process with `step()` and `step_until_terminated()`
//! 3. Suspending with `Command::Wait` and resuming with `resume()`
//! 4. Observing lifecycle transitions through a `ProcessListener`
//!
//! Running This Demo:
//! ```bash
//! cargo run --example basic_process
//! ```

use std::sync::Arc;

use serde_json::{json, Value as Json};
use tracing::info;
use workloom::config::init_tracing;
use workloom::process::{Command, Process, ProcessListener, StateLabel};

/// Listener that just logs each transition through `tracing`.
struct LoggingListener;

impl ProcessListener for LoggingListener {
    fn on_process_running(&self, pid: uuid::Uuid) {
        info!(%pid, "process running");
    }

    fn on_process_waiting(&self, pid: uuid::Uuid, msg: Option<&str>) {
        info!(%pid, ?msg, "process waiting");
    }

    fn on_process_finished(&self, pid: uuid::Uuid, result: &Json, successful: bool) {
        info!(%pid, %result, successful, "process finished");
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    init_tracing();

    let process = Process::builder("collect_input")
        .args(json!({"prompt": "how many widgets?"}))
        .build()
        .map_err(|e| miette::miette!("{e}"))?;

    process.register_step(
        "collect_input",
        Arc::new(|_process: Arc<Process>, _args: Json| {
            Box::pin(async move {
                Ok(Command::Wait {
                    next_step: "tally".to_string(),
                    msg: Some("waiting for the operator to supply a count".to_string()),
                    data: Json::Null,
                })
            })
        }),
    );
    process.register_step(
        "tally",
        Arc::new(|process: Arc<Process>, _args: Json| {
            Box::pin(async move {
                process.out("default", json!(7))?;
                Ok(Command::Stop { result: json!(7), successful: true })
            })
        }),
    );

    process.add_process_listener(Arc::new(LoggingListener));

    process.start().map_err(|e| miette::miette!("{e}"))?;
    process.step().await.map_err(|e| miette::miette!("{e}"))?;
    assert_eq!(process.label(), StateLabel::Waiting);

    info!("operator supplies the count out of band, resuming");
    process.resume(None).map_err(|e| miette::miette!("{e}"))?;
    process.step_until_terminated().await.map_err(|e| miette::miette!("{e}"))?;

    info!(outputs = ?process.outputs(), "demo finished");
    Ok(())
}
