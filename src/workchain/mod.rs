//! The WorkChain outline engine: an interpreter over a declarative outline
//! of blocks, `if/elif/else`, `while`, and `return`, whose position is
//! itself persistable via a [`stepper::Stepper`].

pub mod context;
pub mod instruction;
pub mod stepper;

pub use context::WorkChainContext;
pub use instruction::Instruction;
pub use stepper::Stepper;

use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value as Json;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum WorkChainError {
    #[error("no step function registered under name `{name}`")]
    #[diagnostic(code(workloom::workchain::unknown_step))]
    UnknownStep { name: String },

    #[error("no predicate registered under name `{name}`")]
    #[diagnostic(code(workloom::workchain::unknown_predicate))]
    UnknownPredicate { name: String },
}

/// What a single `FunctionCall` unit reports back to the driver.
pub enum StepOutcome {
    /// The step ran and produced no awaitable result: move on.
    Advance,
    /// The step completed with named results to store in the context.
    ToContext(Vec<(String, Json)>),
    /// The step wants the surrounding Process to suspend.
    Wait { msg: Option<String>, data: Json },
    /// The step produced the outline's final result directly.
    Result(Json),
}

/// Outcome of driving the outline by exactly one `FunctionCall` unit.
pub enum DriveOutcome {
    /// One unit ran; `done` says whether the driven node (and everything
    /// nested under it) has now fully completed.
    Progressed { done: bool },
    Wait { msg: Option<String>, data: Json },
    Done(Json),
}

pub type StepFn = dyn Fn(&mut WorkChainContext) -> StepOutcome + Send + Sync;
pub type PredicateFn = dyn Fn(&WorkChainContext) -> bool + Send + Sync;

#[derive(Clone, Default)]
pub struct StepRegistry(FxHashMap<String, Arc<StepFn>>);

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, f: Arc<StepFn>) {
        self.0.insert(name.into(), f);
    }

    fn call(&self, name: &str, ctx: &mut WorkChainContext) -> Result<StepOutcome, WorkChainError> {
        let f = self
            .0
            .get(name)
            .cloned()
            .ok_or_else(|| WorkChainError::UnknownStep { name: name.to_string() })?;
        Ok(f(ctx))
    }
}

#[derive(Clone, Default)]
pub struct PredicateRegistry(FxHashMap<String, Arc<PredicateFn>>);

impl PredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, f: Arc<PredicateFn>) {
        self.0.insert(name.into(), f);
    }

    fn eval(&self, name: &str, ctx: &WorkChainContext) -> Result<bool, WorkChainError> {
        let f = self
            .0
            .get(name)
            .cloned()
            .ok_or_else(|| WorkChainError::UnknownPredicate { name: name.to_string() })?;
        Ok(f(ctx))
    }
}

fn initial_stepper_for(instr: &Instruction) -> Stepper {
    match instr {
        Instruction::FunctionCall(_) => Stepper::Function,
        Instruction::Block(_) => Stepper::Block { index: 0, child: None },
        Instruction::If { .. } => Stepper::If { branch: None, child: None },
        Instruction::While { .. } => Stepper::While { child: None },
        Instruction::Return(_) => Stepper::Return,
    }
}

/// Drives `instr`/`stepper` by exactly one `FunctionCall` unit.
fn advance(
    instr: &Instruction,
    stepper: &mut Stepper,
    ctx: &mut WorkChainContext,
    steps: &StepRegistry,
    predicates: &PredicateRegistry,
) -> Result<DriveOutcome, WorkChainError> {
    match (instr, stepper) {
        (Instruction::FunctionCall(name), Stepper::Function) => match steps.call(name, ctx)? {
            StepOutcome::Advance => Ok(DriveOutcome::Progressed { done: true }),
            StepOutcome::ToContext(pairs) => {
                ctx.to_context(pairs);
                Ok(DriveOutcome::Progressed { done: true })
            }
            StepOutcome::Wait { msg, data } => Ok(DriveOutcome::Wait { msg, data }),
            StepOutcome::Result(value) => Ok(DriveOutcome::Done(value)),
        },

        (Instruction::Block(items), Stepper::Block { index, child }) => {
            if *index >= items.len() {
                return Ok(DriveOutcome::Progressed { done: true });
            }
            let item = &items[*index];
            let child_stepper = child.get_or_insert_with(|| Box::new(initial_stepper_for(item)));
            match advance(item, child_stepper, ctx, steps, predicates)? {
                DriveOutcome::Done(v) => Ok(DriveOutcome::Done(v)),
                DriveOutcome::Wait { msg, data } => Ok(DriveOutcome::Wait { msg, data }),
                DriveOutcome::Progressed { done } => {
                    if done {
                        *index += 1;
                        *child = None;
                        Ok(DriveOutcome::Progressed { done: *index >= items.len() })
                    } else {
                        Ok(DriveOutcome::Progressed { done: false })
                    }
                }
            }
        }

        (Instruction::If { branches, else_branch }, Stepper::If { branch, child }) => {
            if branch.is_none() {
                let mut chosen = None;
                for (i, (predicate, _)) in branches.iter().enumerate() {
                    if predicates.eval(predicate, ctx)? {
                        chosen = Some(i);
                        break;
                    }
                }
                match chosen {
                    Some(i) => *branch = Some(i),
                    None if else_branch.is_some() => *branch = Some(branches.len()),
                    None => return Ok(DriveOutcome::Progressed { done: true }),
                }
            }
            let taken = branch.expect("branch chosen above");
            let body: &Instruction = if taken == branches.len() {
                else_branch.as_deref().expect("else branch recorded in cursor")
            } else {
                &branches[taken].1
            };
            let child_stepper = child.get_or_insert_with(|| Box::new(initial_stepper_for(body)));
            match advance(body, child_stepper, ctx, steps, predicates)? {
                DriveOutcome::Done(v) => Ok(DriveOutcome::Done(v)),
                DriveOutcome::Wait { msg, data } => Ok(DriveOutcome::Wait { msg, data }),
                DriveOutcome::Progressed { done } => Ok(DriveOutcome::Progressed { done }),
            }
        }

        (Instruction::While { predicate, body }, Stepper::While { child }) => {
            if child.is_none() {
                if !predicates.eval(predicate, ctx)? {
                    return Ok(DriveOutcome::Progressed { done: true });
                }
                *child = Some(Box::new(initial_stepper_for(body)));
            }
            let child_stepper = child.as_mut().expect("armed above");
            match advance(body, child_stepper, ctx, steps, predicates)? {
                DriveOutcome::Done(v) => Ok(DriveOutcome::Done(v)),
                DriveOutcome::Wait { msg, data } => Ok(DriveOutcome::Wait { msg, data }),
                DriveOutcome::Progressed { done } => {
                    if done {
                        // Defer the next predicate check to the following
                        // drive() call rather than re-evaluating it here;
                        // a `While` only ever re-arms through the
                        // `child.is_none()` branch above.
                        *child = None;
                    }
                    Ok(DriveOutcome::Progressed { done: false })
                }
            }
        }

        (Instruction::Return(code), Stepper::Return) => Ok(DriveOutcome::Done(
            code.map(Json::from).unwrap_or(Json::Null),
        )),

        _ => unreachable!("stepper shape must match its instruction; constructed in lockstep"),
    }
}

/// A compiled outline plus its runtime context and step/predicate
/// registries. `drive()` is the function a workchain's registered process
/// step calls once per `Running` invocation.
pub struct WorkChain {
    pub outline: Arc<Instruction>,
    pub context: WorkChainContext,
    pub steps: StepRegistry,
    pub predicates: PredicateRegistry,
}

impl WorkChain {
    pub fn new(outline: Arc<Instruction>) -> Self {
        Self {
            outline,
            context: WorkChainContext::new(),
            steps: StepRegistry::new(),
            predicates: PredicateRegistry::new(),
        }
    }

    pub fn drive(&mut self, stepper: &mut Stepper) -> Result<DriveOutcome, WorkChainError> {
        advance(&self.outline, stepper, &mut self.context, &self.steps, &self.predicates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn record_step(log: Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Arc<StepFn> {
        Arc::new(move |_ctx: &mut WorkChainContext| {
            log.lock().push(name);
            StepOutcome::Advance
        })
    }

    #[test]
    fn if_elif_else_and_while_execute_the_expected_units() {
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let outline = Instruction::block([
            Instruction::call("s1"),
            Instruction::if_("isA", Instruction::call("s2"))
                .elif("isB", Instruction::call("s3"))
                .else_(Instruction::call("s4"))
                .build(),
            Instruction::call("s5"),
            Instruction::while_("lt_n", Instruction::call("s6")),
        ]);

        let mut wc = WorkChain::new(Arc::new(outline));
        wc.context.set("value", serde_json::json!("A"));
        wc.context.set("counter", serde_json::json!(0));
        wc.context.set("n", serde_json::json!(3));

        wc.steps.register("s1", record_step(log.clone(), "s1"));
        wc.steps.register("s2", record_step(log.clone(), "s2"));
        wc.steps.register("s3", record_step(log.clone(), "s3"));
        wc.steps.register("s4", record_step(log.clone(), "s4"));
        wc.steps.register("s5", record_step(log.clone(), "s5"));
        wc.steps.register(
            "s6",
            Arc::new({
                let log = log.clone();
                move |ctx: &mut WorkChainContext| {
                    log.lock().push("s6");
                    let n = ctx.get("counter").and_then(serde_json::Value::as_i64).unwrap_or(0);
                    ctx.set("counter", serde_json::json!(n + 1));
                    StepOutcome::Advance
                }
            }),
        );

        wc.predicates.register(
            "isA",
            Arc::new({
                let log = log.clone();
                move |ctx: &WorkChainContext| {
                    log.lock().push("isA");
                    ctx.get("value").and_then(serde_json::Value::as_str) == Some("A")
                }
            }),
        );
        wc.predicates.register(
            "isB",
            Arc::new({
                let log = log.clone();
                move |ctx: &WorkChainContext| {
                    log.lock().push("isB");
                    ctx.get("value").and_then(serde_json::Value::as_str) == Some("B")
                }
            }),
        );
        wc.predicates.register(
            "lt_n",
            Arc::new({
                let log = log.clone();
                move |ctx: &WorkChainContext| {
                    log.lock().push("ltN");
                    let counter = ctx.get("counter").and_then(serde_json::Value::as_i64).unwrap_or(0);
                    let n = ctx.get("n").and_then(serde_json::Value::as_i64).unwrap_or(0);
                    counter < n
                }
            }),
        );

        let mut stepper = Stepper::for_root();
        loop {
            match wc.drive(&mut stepper).expect("no unregistered symbols") {
                DriveOutcome::Progressed { done: true } => break,
                DriveOutcome::Progressed { done: false } => continue,
                DriveOutcome::Wait { .. } => panic!("outline should not suspend in this scenario"),
                DriveOutcome::Done(_) => break,
            }
        }

        assert_eq!(wc.context.get("counter").and_then(serde_json::Value::as_i64), Some(3));
        let executed = log.lock();
        assert_eq!(
            executed.iter().filter(|s| **s == "s6").count(),
            3,
            "s6 runs once per while iteration"
        );
        assert!(executed.contains(&"s1"));
        assert!(executed.contains(&"isA"));
        assert!(executed.contains(&"s2"));
        assert!(executed.contains(&"s5"));
        assert!(!executed.contains(&"s3"), "isB branch must not run once isA wins");
    }

    #[test]
    fn return_instruction_yields_exit_code() {
        let outline = Instruction::block([Instruction::Return(Some(7))]);
        let mut wc = WorkChain::new(Arc::new(outline));
        let mut stepper = Stepper::for_root();
        match wc.drive(&mut stepper).unwrap() {
            DriveOutcome::Done(v) => assert_eq!(v, serde_json::json!(7)),
            _ => panic!("expected Done"),
        }
    }
}
