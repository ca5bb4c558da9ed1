//! Uniform save/recreate contract used by every persistable runtime type:
//! process states, commands, the event helper, steppers, and the process
//! itself.

pub mod bundle;

pub use bundle::{Bundle, BundleMeta, BundleValue, FieldKind, META_KEY};

use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::object_loader::{DefaultLoader, Identifier, ObjectLoader};
use crate::process::ProcessListener;
use crate::workchain::instruction::Instruction;

#[derive(Debug, Error, Diagnostic)]
pub enum SavableError {
    #[error("bundle is missing required field `{field}`")]
    #[diagnostic(
        code(workloom::savable::bundle_format),
        help("The bundle was not produced by a compatible version of this type's save().")
    )]
    MissingField { field: &'static str },

    #[error("bundle meta is missing class_name")]
    #[diagnostic(code(workloom::savable::bundle_format))]
    MissingClassName,

    #[error("field `{field}` has an unrecognised type hint")]
    #[diagnostic(code(workloom::savable::bundle_format))]
    UnknownFieldKind { field: String },

    #[error("no Savable type registered for class id `{class_id}`")]
    #[diagnostic(code(workloom::savable::unknown_class))]
    UnknownClass { class_id: String },

    #[error(transparent)]
    #[diagnostic(code(workloom::savable::object_loader))]
    Loader(#[from] crate::object_loader::LoaderError),

    #[error("field `{field}` could not be decoded: {source}")]
    #[diagnostic(code(workloom::savable::decode))]
    Decode {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("attempted to persist a method whose receiver is not the owning instance: {name}")]
    #[diagnostic(code(workloom::savable::cross_instance_method))]
    CrossInstanceMethod { name: String },

    #[error(transparent)]
    #[diagnostic(code(workloom::savable::persistence))]
    Persistence(#[from] crate::persistence::PersisterError),
}

/// Read-only context threaded through every `save` call.
#[derive(Clone)]
pub struct SaveContext {
    pub loader: Arc<dyn ObjectLoader>,
}

impl Default for SaveContext {
    fn default() -> Self {
        Self {
            loader: Arc::new(DefaultLoader::new()),
        }
    }
}

impl SaveContext {
    pub fn new(loader: Arc<dyn ObjectLoader>) -> Self {
        Self { loader }
    }
}

/// Read-only context threaded through every `recreate_from` call.
///
/// Carries the object loader, a registry of externally supplied listener
/// instances keyed by class id (the rebind mechanism this crate uses in
/// place of cyclic owner/child back-references, see `DESIGN.md`), and the
/// immutable workchain instruction tree a [`crate::workchain::stepper::Stepper`]
/// needs in order to reattach its cursor.
#[derive(Clone, Default)]
pub struct LoadContext {
    pub loader: Option<Arc<dyn ObjectLoader>>,
    pub listener_registry: FxHashMap<String, Arc<dyn ProcessListener>>,
    pub outline: Option<Arc<Instruction>>,
}

impl LoadContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loader(mut self, loader: Arc<dyn ObjectLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_listener(mut self, class_id: impl Into<String>, listener: Arc<dyn ProcessListener>) -> Self {
        self.listener_registry.insert(class_id.into(), listener);
        self
    }

    pub fn with_outline(mut self, outline: Arc<Instruction>) -> Self {
        self.outline = Some(outline);
        self
    }

    pub fn loader_or_default(&self, default: &Arc<dyn ObjectLoader>) -> Arc<dyn ObjectLoader> {
        self.loader.clone().unwrap_or_else(|| default.clone())
    }
}

/// Resolves which loader a bundle should be loaded with: the context's, the
/// bundle's own declared `object_loader`, or finally the supplied default.
pub fn resolve_loader(
    bundle: &Bundle,
    ctx: &LoadContext,
    default: &Arc<dyn ObjectLoader>,
) -> Arc<dyn ObjectLoader> {
    if let Some(loader) = &ctx.loader {
        return loader.clone();
    }
    if bundle.meta().object_loader.is_some() {
        // A non-default loader identifier is informational only in this
        // crate: hosts resolve it themselves and supply it via LoadContext.
    }
    default.clone()
}

/// Capability set {save, recreate_from} every persistable runtime type
/// implements directly — this crate realises the protocol via per-type
/// `impl`s over closed sums rather than open field reflection, since each
/// concrete type (`ProcessState`, `Command`, `Stepper`, ...) already knows
/// its own exact shape.
pub trait Savable: Sized {
    fn save(&self, ctx: &SaveContext) -> Bundle;
    fn recreate_from(bundle: &Bundle, ctx: &LoadContext) -> Result<Self, SavableError>;
}

pub(crate) fn identifier_field(bundle: &Bundle, field: &'static str) -> Result<Identifier, SavableError> {
    let value = bundle
        .get(field)
        .and_then(|v| v.as_scalar())
        .ok_or(SavableError::MissingField { field })?;
    let s = value
        .as_str()
        .ok_or(SavableError::MissingField { field })?;
    Ok(Identifier::new(s))
}
