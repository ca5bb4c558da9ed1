//! # Workloom: a persistable process runtime
//!
//! Workloom turns a long-running computational workflow into a cooperatively
//! scheduled state machine whose complete runtime state can be captured into
//! a serialisable snapshot at every transition, reconstituted later
//! (possibly on a different host), and driven to completion. It targets
//! scientific-workflow orchestration, where individual steps may wait hours
//! on an external event, the host may crash or restart, and recovery must be
//! exact.
//!
//! ## Core concepts
//!
//! - **Object loader** ([`object_loader`]) — bidirectional mapping between
//!   runtime symbols (step functions, process constructors) and stable
//!   string identifiers.
//! - **Savable** ([`savable`]) — the uniform save/recreate contract every
//!   persistable type implements, and the [`savable::Bundle`] snapshot shape.
//! - **Persister** ([`persistence`]) — a store of named bundle snapshots
//!   keyed by `(pid, tag)`, in-memory or filesystem-backed.
//! - **State machine core** ([`statemachine`]) — the transition-legality
//!   check every [`process::Process`] transition goes through.
//! - **Process** ([`process`]) — the state machine itself:
//!   `Created -> Running <-> Waiting -> Finished|Excepted|Killed`, with
//!   pause/play, kill, interrupts, and an outcome future.
//! - **WorkChain** ([`workchain`]) — a declarative outline interpreter
//!   (`Block`, `If`/`elif`/`else`, `While`, `Return`) whose cursor
//!   ([`workchain::Stepper`]) is itself persistable.
//! - **Controllers** ([`controllers`]) — façades that convert control
//!   intents (`pause`, `play`, `kill`, `continue`) into messages over a
//!   [`controllers::Coordinator`] capability.
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use workloom::process::{Command, Process};
//!
//! #[tokio::main]
//! async fn main() {
//!     let process = Process::builder("entry").build().unwrap();
//!     process.register_step(
//!         "entry",
//!         Arc::new(|process: Arc<Process>, _args| {
//!             Box::pin(async move {
//!                 process.out("default", json!(5))?;
//!                 Ok(Command::Stop { result: json!(5), successful: true })
//!             })
//!         }),
//!     );
//!
//!     process.start().unwrap();
//!     let outputs = process.execute().await.unwrap();
//!     assert_eq!(outputs.get("default"), Some(&json!(5)));
//! }
//! ```
//!
//! ## Module guide
//!
//! - [`object_loader`] - identifier round-tripping for persistable symbols
//! - [`savable`] - the Bundle shape and the Savable save/recreate contract
//! - [`persistence`] - checkpoint stores keyed by (pid, tag)
//! - [`statemachine`] - generic transition-legality checking
//! - [`event_helper`] - listener fan-out, itself Savable
//! - [`process`] - the Process lifecycle state machine
//! - [`workchain`] - the declarative outline engine and its steppers
//! - [`controllers`] - control-plane façades over a Coordinator capability
//! - [`ports`] - the input/output value-validation capability
//! - [`config`] - ambient runtime configuration and tracing setup

pub mod config;
pub mod controllers;
pub mod event_helper;
pub mod object_loader;
pub mod persistence;
pub mod ports;
pub mod process;
pub mod savable;
pub mod statemachine;
pub mod workchain;
