//! Save/recreate invariants: a Waiting-state checkpoint round trip
//! (Scenario D), the general recreate(save(P)) ≅ P property (Invariant 1),
//! an Object Loader round trip (Invariant 7), and the bundle deep-copy
//! guarantee (Invariant 8).

use std::sync::Arc;

use serde_json::{json, Value as Json};
use workloom::object_loader::{DefaultLoader, ObjectLoader, Symbol};
use workloom::process::{Command, Process, ProcessListener, StateLabel};
use workloom::savable::{LoadContext, SaveContext, Savable};

mod common;
use common::RecordingListener;

fn entry_waits() -> Arc<workloom::process::StepFn> {
    Arc::new(|_process: Arc<Process>, _args: Json| {
        Box::pin(async move {
            Ok(Command::Wait {
                next_step: "finish".to_string(),
                msg: Some("waiting for checkpoint".to_string()),
                data: Json::Null,
            })
        })
    })
}

fn finish_with_output() -> Arc<workloom::process::StepFn> {
    Arc::new(|process: Arc<Process>, _args: Json| {
        Box::pin(async move {
            process.out("default", json!(42))?;
            Ok(Command::Stop { result: json!(42), successful: true })
        })
    })
}

#[tokio::test]
async fn scenario_d_save_during_waiting_then_resume_on_the_recreated_process() {
    let original = Process::builder("entry").build().unwrap();
    original.register_step("entry", entry_waits());
    original.register_step("finish", finish_with_output());

    let listener = Arc::new(RecordingListener::new());
    let as_listener: Arc<dyn ProcessListener> = listener.clone();
    original.add_process_listener(as_listener.clone());

    original.start().unwrap();
    original.step().await.unwrap();
    assert_eq!(original.label(), StateLabel::Waiting);

    let save_ctx = SaveContext::default();
    let bundle = original.save(&save_ctx);

    let load_ctx = LoadContext::new().with_listener("test.recording_listener", as_listener.clone());
    let recreated = Process::recreate_from(&bundle, &load_ctx).unwrap();
    let recreated = Arc::new(recreated);

    assert_eq!(recreated.pid(), original.pid());
    assert_eq!(recreated.label(), StateLabel::Waiting);

    recreated.register_step("entry", entry_waits());
    recreated.register_step("finish", finish_with_output());

    recreated.resume(None).unwrap();
    recreated.step().await.unwrap();
    recreated.step().await.unwrap();

    assert_eq!(recreated.label(), StateLabel::Finished);
    assert_eq!(recreated.outputs().get("default"), Some(&json!(42)));
}

#[tokio::test]
async fn invariant_1_recreate_of_save_preserves_identity_and_behaviour() {
    let process = Process::builder("entry")
        .args(json!({"n": 3}))
        .inputs_raw(json!({"n": 3}))
        .build()
        .unwrap();
    process.register_step("entry", entry_waits());
    process.register_step("finish", finish_with_output());
    process.start().unwrap();
    process.step().await.unwrap();

    let ctx = SaveContext::default();
    let bundle = process.save(&ctx);
    let recreated = Process::recreate_from(&bundle, &LoadContext::default()).unwrap();

    assert_eq!(recreated.pid(), process.pid());
    assert_eq!(recreated.label(), process.label());
    assert_eq!(recreated.outputs(), process.outputs());
    assert!(!recreated.is_paused());
    assert_eq!(recreated.is_paused(), process.is_paused());
}

#[test]
fn invariant_7_object_loader_round_trips_every_registered_symbol() {
    let loader = DefaultLoader::new();
    let step: Arc<workloom::process::StepFn> = Arc::new(|_p, _args| Box::pin(async { unreachable!() }));
    loader.register("workloom.demo.entry", Symbol::StepFn(step.clone()));

    let identifier = loader.identify(&Symbol::StepFn(step), "workloom.demo.entry").unwrap();
    match loader.load(&identifier).unwrap() {
        Symbol::StepFn(_) => {}
        Symbol::ProcessCtor(_) => panic!("expected the registered StepFn symbol back"),
    }
}

#[tokio::test]
async fn invariant_8_mutating_the_live_process_does_not_alter_an_earlier_bundle() {
    let process = Process::builder("entry").build().unwrap();
    process.register_step("entry", finish_with_output());

    let ctx = SaveContext::default();
    let bundle_before = process.save(&ctx);
    assert_eq!(
        bundle_before.get("OUTPUTS").and_then(|v| v.as_scalar()),
        Some(&json!({}))
    );

    process.start().unwrap();
    process.step_until_terminated().await.unwrap();

    let bundle_after = process.save(&ctx);
    assert_eq!(
        bundle_before.get("OUTPUTS").and_then(|v| v.as_scalar()),
        Some(&json!({})),
        "a bundle taken before the mutation must not observe it"
    );
    assert_eq!(
        bundle_after.get("OUTPUTS").and_then(|v| v.as_scalar()),
        Some(&json!({"default": 42}))
    );
}
