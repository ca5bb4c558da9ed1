//! Persistable cursor into a compiled outline. Each [`Instruction`] variant
//! produces a matching `Stepper` variant; only the cursor is saved, never
//! the (class-level, immutable) instruction tree itself.

use crate::savable::{Bundle, BundleValue, FieldKind, LoadContext, SaveContext, Savable, SavableError};

#[derive(Clone, Debug)]
pub enum Stepper {
    Function,
    Block {
        index: usize,
        child: Option<Box<Stepper>>,
    },
    If {
        branch: Option<usize>,
        child: Option<Box<Stepper>>,
    },
    While {
        child: Option<Box<Stepper>>,
    },
    Return,
}

impl Stepper {
    pub fn for_root() -> Self {
        Stepper::Block {
            index: 0,
            child: None,
        }
    }
}

const CLASS_FUNCTION: &str = "workloom.workchain.stepper.function";
const CLASS_BLOCK: &str = "workloom.workchain.stepper.block";
const CLASS_IF: &str = "workloom.workchain.stepper.if";
const CLASS_WHILE: &str = "workloom.workchain.stepper.while";
const CLASS_RETURN: &str = "workloom.workchain.stepper.return";

impl Savable for Stepper {
    fn save(&self, ctx: &SaveContext) -> Bundle {
        let mut bundle = Bundle::new();
        match self {
            Stepper::Function => {
                bundle = bundle.with_class_name(CLASS_FUNCTION);
            }
            Stepper::Block { index, child } => {
                bundle = bundle.with_class_name(CLASS_BLOCK);
                bundle.insert("index", serde_json::Value::from(*index));
                if let Some(child) = child {
                    bundle.insert_typed("child", child.save(ctx), FieldKind::Savable);
                }
            }
            Stepper::If { branch, child } => {
                bundle = bundle.with_class_name(CLASS_IF);
                bundle.insert(
                    "branch",
                    branch.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null),
                );
                if let Some(child) = child {
                    bundle.insert_typed("child", child.save(ctx), FieldKind::Savable);
                }
            }
            Stepper::While { child } => {
                bundle = bundle.with_class_name(CLASS_WHILE);
                if let Some(child) = child {
                    bundle.insert_typed("child", child.save(ctx), FieldKind::Savable);
                }
            }
            Stepper::Return => {
                bundle = bundle.with_class_name(CLASS_RETURN);
            }
        }
        bundle
    }

    fn recreate_from(bundle: &Bundle, ctx: &LoadContext) -> Result<Self, SavableError> {
        let class_name = bundle
            .meta()
            .class_name
            .as_deref()
            .ok_or(SavableError::MissingClassName)?;
        let child = match bundle.get("child") {
            Some(BundleValue::Bundle(b)) => Some(Box::new(Stepper::recreate_from(b, ctx)?)),
            _ => None,
        };
        match class_name {
            CLASS_FUNCTION => Ok(Stepper::Function),
            CLASS_BLOCK => {
                let index = bundle
                    .get("index")
                    .and_then(BundleValue::as_scalar)
                    .and_then(serde_json::Value::as_u64)
                    .ok_or(SavableError::MissingField { field: "index" })? as usize;
                Ok(Stepper::Block { index, child })
            }
            CLASS_IF => {
                let branch = bundle
                    .get("branch")
                    .and_then(BundleValue::as_scalar)
                    .and_then(serde_json::Value::as_u64)
                    .map(|v| v as usize);
                Ok(Stepper::If { branch, child })
            }
            CLASS_WHILE => Ok(Stepper::While { child }),
            CLASS_RETURN => Ok(Stepper::Return),
            other => Err(SavableError::UnknownClass {
                class_id: other.to_string(),
            }),
        }
    }
}
