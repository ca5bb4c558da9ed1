//! Control-surface invariants: terminal closure, pause idempotency, and
//! kill's dominance over a concurrently requested pause.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as Json;
use tokio::sync::Notify;
use workloom::process::{Command, Process, ProcessError, StateLabel};

#[tokio::test]
async fn invariant_3_step_on_terminal_process_fails_closed() {
    let process = Process::builder("entry").build().unwrap();
    process.register_step(
        "entry",
        Arc::new(|_process: Arc<Process>, _args: Json| {
            Box::pin(async move { Ok(Command::Stop { result: Json::Null, successful: true }) })
        }),
    );
    process.start().unwrap();
    process.step_until_terminated().await.unwrap();
    assert_eq!(process.label(), StateLabel::Finished);

    let err = process.step().await.unwrap_err();
    assert!(matches!(err, ProcessError::Closed { .. }));
}

#[tokio::test]
async fn invariant_5_pause_is_idempotent_and_play_unpauses_once() {
    let process = Process::builder("entry").build().unwrap();
    process.register_step(
        "entry",
        Arc::new(|_process: Arc<Process>, _args: Json| {
            Box::pin(async move {
                Ok(Command::Wait {
                    next_step: "entry".to_string(),
                    msg: None,
                    data: Json::Null,
                })
            })
        }),
    );
    process.start().unwrap();

    assert!(process.pause(None).await);
    assert!(process.is_paused());
    assert!(process.pause(None).await, "second pause() call stays idempotent");
    assert!(process.is_paused());

    assert!(process.play());
    assert!(!process.is_paused());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invariant_6_kill_dominates_a_concurrent_pause_while_stepping() {
    let process = Process::builder("entry").build().unwrap();
    let started = Arc::new(Notify::new());
    let proceed = Arc::new(Notify::new());
    let started_in_step = started.clone();
    let proceed_in_step = proceed.clone();
    process.register_step(
        "entry",
        Arc::new(move |_process: Arc<Process>, _args: Json| {
            let started = started_in_step.clone();
            let proceed = proceed_in_step.clone();
            Box::pin(async move {
                started.notify_one();
                proceed.notified().await;
                Ok(Command::Continue { next_step: "entry".to_string(), args: Json::Null })
            })
        }),
    );
    process.start().unwrap();

    let stepping_process = process.clone();
    let step_task = tokio::spawn(async move { stepping_process.step().await });

    started.notified().await;
    assert!(process.pause(Some("routine pause".to_string())).await);
    assert!(process.kill(Some("kill wins".to_string())).await);
    proceed.notify_one();

    tokio::time::timeout(Duration::from_secs(1), step_task)
        .await
        .expect("step task completes")
        .unwrap()
        .unwrap();

    assert_eq!(process.label(), StateLabel::Killed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn kill_while_paused_wakes_a_step_task_parked_at_the_pause_gate() {
    let process = Process::builder("entry").build().unwrap();
    process.register_step(
        "entry",
        Arc::new(|_process: Arc<Process>, _args: Json| {
            Box::pin(async move { Ok(Command::Stop { result: Json::Null, successful: true }) })
        }),
    );
    process.start().unwrap();
    assert!(process.pause(None).await);

    let parked_process = process.clone();
    let step_task = tokio::spawn(async move { parked_process.step().await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(process.kill(Some("operator abort".to_string())).await);

    let result = tokio::time::timeout(Duration::from_secs(1), step_task)
        .await
        .expect("a parked step() must be woken by kill(), not left hanging")
        .unwrap();
    assert!(matches!(result, Err(ProcessError::Closed { .. })));
    assert_eq!(process.label(), StateLabel::Killed);
}
