//! Directives a step function returns, telling the `Running` state which
//! transition to perform next.

use serde_json::Value as Json;

use crate::savable::{Bundle, BundleValue, FieldKind, LoadContext, SaveContext, Savable, SavableError};

/// A directive returned from a user-supplied step function.
///
/// Modelled as a closed sum rather than an open class hierarchy: dispatch is
/// an exhaustive match instead of a chain of `isinstance` checks.
#[derive(Clone, Debug)]
pub enum Command {
    /// Keep running: invoke `next_step` with `args` in a fresh `Running`.
    Continue { next_step: String, args: Json },
    /// Suspend into `Waiting`; `next_step` names the function to invoke on
    /// resume, `msg` is a human-readable note, `data` an opaque payload.
    Wait {
        next_step: String,
        msg: Option<String>,
        data: Json,
    },
    /// Terminate into `Finished` with the given result.
    Stop { result: Json, successful: bool },
    /// Terminate into `Killed` carrying an optional message.
    Kill { msg: Option<String> },
}

/// Sentinel marking a step's bare return value as unsuccessful without
/// raising an exception or a kill: the Rust analogue of the host's
/// `UnsuccessfulResult(result)` wrapper.
#[derive(Clone, Debug)]
pub struct UnsuccessfulResult(pub Json);

/// Values a step function may hand to [`Command::from_return_value`].
pub trait IntoCommand {
    fn into_command(self) -> Command;
}

impl IntoCommand for Command {
    fn into_command(self) -> Command {
        self
    }
}

impl IntoCommand for Json {
    fn into_command(self) -> Command {
        Command::Stop { result: self, successful: true }
    }
}

impl IntoCommand for UnsuccessfulResult {
    fn into_command(self) -> Command {
        Command::Stop { result: self.0, successful: false }
    }
}

impl Command {
    /// Coerces a bare step-function return value: a plain `Json` becomes
    /// `Stop(value, true)`, while the `UnsuccessfulResult` sentinel becomes
    /// `Stop(value, false)`; a `Command` passes through unchanged.
    pub fn from_return_value(value: impl IntoCommand) -> Self {
        value.into_command()
    }
}

const CLASS_CONTINUE: &str = "workloom.command.continue";
const CLASS_WAIT: &str = "workloom.command.wait";
const CLASS_STOP: &str = "workloom.command.stop";
const CLASS_KILL: &str = "workloom.command.kill";

impl Savable for Command {
    fn save(&self, _ctx: &SaveContext) -> Bundle {
        let mut bundle = Bundle::new();
        match self {
            Command::Continue { next_step, args } => {
                bundle = bundle.with_class_name(CLASS_CONTINUE);
                bundle.insert_typed("next_step", Json::String(next_step.clone()), FieldKind::Method);
                bundle.insert("args", args.clone());
            }
            Command::Wait { next_step, msg, data } => {
                bundle = bundle.with_class_name(CLASS_WAIT);
                bundle.insert_typed("next_step", Json::String(next_step.clone()), FieldKind::Method);
                bundle.insert("msg", msg.clone().map(Json::String).unwrap_or(Json::Null));
                bundle.insert("data", data.clone());
            }
            Command::Stop { result, successful } => {
                bundle = bundle.with_class_name(CLASS_STOP);
                bundle.insert("result", result.clone());
                bundle.insert("successful", Json::Bool(*successful));
            }
            Command::Kill { msg } => {
                bundle = bundle.with_class_name(CLASS_KILL);
                bundle.insert("msg", msg.clone().map(Json::String).unwrap_or(Json::Null));
            }
        }
        bundle
    }

    fn recreate_from(bundle: &Bundle, _ctx: &LoadContext) -> Result<Self, SavableError> {
        let class_name = bundle
            .meta()
            .class_name
            .as_deref()
            .ok_or(SavableError::MissingClassName)?;
        let get_str = |field: &'static str| -> Result<String, SavableError> {
            bundle
                .get(field)
                .and_then(BundleValue::as_scalar)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or(SavableError::MissingField { field })
        };
        let get_json = |field: &'static str| -> Json {
            bundle
                .get(field)
                .and_then(BundleValue::as_scalar)
                .cloned()
                .unwrap_or(Json::Null)
        };
        let get_opt_str = |field: &'static str| -> Option<String> {
            match bundle.get(field).and_then(BundleValue::as_scalar) {
                Some(Json::String(s)) => Some(s.clone()),
                _ => None,
            }
        };
        match class_name {
            CLASS_CONTINUE => Ok(Command::Continue {
                next_step: get_str("next_step")?,
                args: get_json("args"),
            }),
            CLASS_WAIT => Ok(Command::Wait {
                next_step: get_str("next_step")?,
                msg: get_opt_str("msg"),
                data: get_json("data"),
            }),
            CLASS_STOP => Ok(Command::Stop {
                result: get_json("result"),
                successful: bundle
                    .get("successful")
                    .and_then(BundleValue::as_scalar)
                    .and_then(Json::as_bool)
                    .unwrap_or(true),
            }),
            CLASS_KILL => Ok(Command::Kill {
                msg: get_opt_str("msg"),
            }),
            other => Err(SavableError::UnknownClass {
                class_id: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_round_trips() {
        let cmd = Command::Stop {
            result: serde_json::json!({"ok": true}),
            successful: true,
        };
        let ctx = SaveContext::default();
        let bundle = cmd.save(&ctx);
        let restored = Command::recreate_from(&bundle, &LoadContext::default()).unwrap();
        assert!(matches!(restored, Command::Stop { successful: true, .. }));
    }

    #[test]
    fn wait_preserves_next_step_name() {
        let cmd = Command::Wait {
            next_step: "continue_after_wait".to_string(),
            msg: Some("blocked on external event".to_string()),
            data: Json::Null,
        };
        let bundle = cmd.save(&SaveContext::default());
        let restored = Command::recreate_from(&bundle, &LoadContext::default()).unwrap();
        match restored {
            Command::Wait { next_step, msg, .. } => {
                assert_eq!(next_step, "continue_after_wait");
                assert_eq!(msg.as_deref(), Some("blocked on external event"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn bare_value_coerces_to_successful_stop() {
        let cmd = Command::from_return_value(serde_json::json!(5));
        assert!(matches!(cmd, Command::Stop { successful: true, .. }));
    }

    #[test]
    fn unsuccessful_result_sentinel_coerces_to_unsuccessful_stop() {
        let cmd = Command::from_return_value(UnsuccessfulResult(serde_json::json!(256)));
        match cmd {
            Command::Stop { result, successful } => {
                assert!(!successful);
                assert_eq!(result, serde_json::json!(256));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
