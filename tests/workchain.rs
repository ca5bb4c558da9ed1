//! Scenario F: the outline interpreter driven directly through an
//! `if/elif/else` plus `while` outline, and the same outline driven from
//! inside a Process step function, suspending the surrounding process for
//! each `Wait` the outline raises.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value as Json};
use workloom::process::{Command, Process, StateLabel};
use workloom::workchain::{DriveOutcome, Instruction, StepOutcome, Stepper, WorkChain, WorkChainContext};

fn build_outline() -> Instruction {
    Instruction::block([
        Instruction::call("greet"),
        Instruction::if_("is_small", Instruction::call("small_branch"))
            .elif("is_medium", Instruction::call("medium_branch"))
            .else_(Instruction::call("large_branch"))
            .build(),
        Instruction::while_("below_target", Instruction::call("increment")),
        Instruction::Return(Some(0)),
    ])
}

#[test]
fn direct_drive_loop_runs_the_expected_branch_and_while_iterations() {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let mut wc = WorkChain::new(Arc::new(build_outline()));
    wc.context.set("n", json!(4));
    wc.context.set("target", json!(3));

    let record = |log: Arc<Mutex<Vec<&'static str>>>, name: &'static str| -> Arc<workloom::workchain::StepFn> {
        Arc::new(move |_ctx: &mut WorkChainContext| {
            log.lock().push(name);
            StepOutcome::Advance
        })
    };

    wc.steps.register("greet", record(log.clone(), "greet"));
    wc.steps.register("small_branch", record(log.clone(), "small_branch"));
    wc.steps.register("medium_branch", record(log.clone(), "medium_branch"));
    wc.steps.register("large_branch", record(log.clone(), "large_branch"));
    {
        let log = log.clone();
        wc.steps.register(
            "increment",
            Arc::new(move |ctx: &mut WorkChainContext| {
                log.lock().push("increment");
                let n = ctx.get("n").and_then(Json::as_i64).unwrap_or(0);
                ctx.set("n", json!(n + 1));
                StepOutcome::Advance
            }),
        );
    }
    wc.predicates.register("is_small", Arc::new(|ctx: &WorkChainContext| {
        ctx.get("n").and_then(Json::as_i64).unwrap_or(0) < 2
    }));
    wc.predicates.register("is_medium", Arc::new(|ctx: &WorkChainContext| {
        ctx.get("n").and_then(Json::as_i64).unwrap_or(0) < 5
    }));
    wc.predicates.register("below_target", Arc::new(|ctx: &WorkChainContext| {
        let n = ctx.get("n").and_then(Json::as_i64).unwrap_or(0);
        let target = ctx.get("target").and_then(Json::as_i64).unwrap_or(0);
        n < target
    }));

    let mut stepper = Stepper::for_root();
    let result = loop {
        match wc.drive(&mut stepper).expect("every symbol above is registered") {
            DriveOutcome::Progressed { done: false } => continue,
            DriveOutcome::Progressed { done: true } => continue,
            DriveOutcome::Wait { .. } => panic!("this outline never suspends"),
            DriveOutcome::Done(v) => break v,
        }
    };

    assert_eq!(result, json!(0));
    let executed = log.lock();
    assert_eq!(executed.first(), Some(&"greet"));
    assert!(executed.contains(&"medium_branch"));
    assert!(!executed.contains(&"small_branch"));
    assert!(!executed.contains(&"large_branch"));
    assert_eq!(
        executed.iter().filter(|s| **s == "increment").count(),
        0,
        "n starts at 4, already at or past target=3, while body never runs"
    );
}

#[tokio::test]
async fn outline_wrapped_in_a_process_step_suspends_the_process_on_wait() {
    let outline = Instruction::block([
        Instruction::call("ask"),
        Instruction::call("finish"),
    ]);
    let wc = WorkChain::new(Arc::new(outline));
    let stepper = Stepper::for_root();
    let driver = Arc::new(Mutex::new((wc, stepper)));

    {
        let mut guard = driver.lock();
        let asked = Arc::new(Mutex::new(false));
        let asked_for_step = asked.clone();
        guard.0.steps.register(
            "ask",
            Arc::new(move |_ctx: &mut WorkChainContext| {
                let mut asked = asked_for_step.lock();
                if *asked {
                    StepOutcome::Advance
                } else {
                    *asked = true;
                    StepOutcome::Wait {
                        msg: Some("need operator input".to_string()),
                        data: Json::Null,
                    }
                }
            }),
        );
        guard.0.steps.register(
            "finish",
            Arc::new(|_ctx: &mut WorkChainContext| StepOutcome::Result(json!("done"))),
        );
    }

    let process = Process::builder("drive").build().unwrap();
    let driver_for_step = driver.clone();
    process.register_step(
        "drive",
        Arc::new(move |_process: Arc<Process>, _args: Json| {
            let driver = driver_for_step.clone();
            Box::pin(async move {
                loop {
                    let outcome = {
                        let mut guard = driver.lock();
                        let (wc, stepper) = &mut *guard;
                        wc.drive(stepper)
                    };
                    match outcome {
                        Ok(DriveOutcome::Progressed { done: false }) => continue,
                        Ok(DriveOutcome::Progressed { done: true }) => continue,
                        Ok(DriveOutcome::Done(v)) => {
                            return Ok(Command::Stop { result: v, successful: true });
                        }
                        Ok(DriveOutcome::Wait { msg, data }) => {
                            return Ok(Command::Wait { next_step: "drive".to_string(), msg, data });
                        }
                        Err(e) => {
                            return Err(workloom::process::ProcessError::RunError { message: e.to_string() });
                        }
                    }
                }
            })
        }),
    );

    process.start().unwrap();
    process.step().await.unwrap();
    assert_eq!(process.label(), StateLabel::Waiting);

    process.resume(None).unwrap();
    process.step().await.unwrap();
    process.step().await.unwrap();

    assert_eq!(process.label(), StateLabel::Finished);
}
