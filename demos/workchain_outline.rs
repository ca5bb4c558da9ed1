//! Demo: WorkChain Outline Driving a Process
//!
//! This demonstration shows a declarative `if/elif/else` + `while` outline
//! compiled once, then driven one `FunctionCall` unit at a time from inside a
//! Process step function — suspending the surrounding process whenever the
//! outline itself wants to wait.
//!
//! What You'll Learn:
//! 1. Building an `Instruction` tree with the `Instruction::block`/`if_`/
//!    `while_`/`call` builders
//! 2. Registering step and predicate functions on a `WorkChain`
//! 3. Translating `DriveOutcome` into `Command::{Stop,Wait}` inside a
//!    Process step closure
//!
//! Running This Demo:
//! ```bash
//! cargo run --example workchain_outline
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value as Json};
use tracing::info;
use workloom::config::init_tracing;
use workloom::process::{Command, Process};
use workloom::workchain::{DriveOutcome, Instruction, StepOutcome, Stepper, WorkChain, WorkChainContext};

fn build_outline() -> Instruction {
    Instruction::block([
        Instruction::call("tally_orders"),
        Instruction::if_("backlog_small", Instruction::call("ship_directly"))
            .else_(Instruction::call("queue_for_batch"))
            .build(),
        Instruction::while_("more_batches", Instruction::call("process_batch")),
        Instruction::Return(Some(0)),
    ])
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    init_tracing();

    let mut wc = WorkChain::new(Arc::new(build_outline()));
    wc.context.set("orders", json!(12));
    wc.context.set("batches_remaining", json!(2));

    wc.steps.register(
        "tally_orders",
        Arc::new(|_ctx: &mut WorkChainContext| {
            info!("tallying orders");
            StepOutcome::Advance
        }),
    );
    wc.steps.register(
        "ship_directly",
        Arc::new(|_ctx: &mut WorkChainContext| {
            info!("backlog small, shipping directly");
            StepOutcome::Advance
        }),
    );
    wc.steps.register(
        "queue_for_batch",
        Arc::new(|_ctx: &mut WorkChainContext| {
            info!("backlog large, queuing for batch processing");
            StepOutcome::Advance
        }),
    );
    wc.steps.register(
        "process_batch",
        Arc::new(|ctx: &mut WorkChainContext| {
            let remaining = ctx.get("batches_remaining").and_then(Json::as_i64).unwrap_or(0);
            info!(remaining, "processing one batch");
            ctx.set("batches_remaining", json!(remaining - 1));
            StepOutcome::Advance
        }),
    );
    wc.predicates.register(
        "backlog_small",
        Arc::new(|ctx: &WorkChainContext| ctx.get("orders").and_then(Json::as_i64).unwrap_or(0) < 10),
    );
    wc.predicates.register(
        "more_batches",
        Arc::new(|ctx: &WorkChainContext| ctx.get("batches_remaining").and_then(Json::as_i64).unwrap_or(0) > 0),
    );

    let driver = Arc::new(Mutex::new((wc, Stepper::for_root())));

    let process = Process::builder("drive").build().map_err(|e| miette::miette!("{e}"))?;
    process.register_step(
        "drive",
        Arc::new(move |_process: Arc<Process>, _args: Json| {
            let driver = driver.clone();
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

    process.start().map_err(|e| miette::miette!("{e}"))?;
    process.step_until_terminated().await.map_err(|e| miette::miette!("{e}"))?;

    info!("workchain outline finished driving the process");
    Ok(())
}
