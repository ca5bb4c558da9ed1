//! Bidirectional mapping between runtime types/functions and stable string
//! identifiers, used to rebind method names, process classes, and workchain
//! step functions across a save/load boundary.
//!
//! Rust has no runtime reflection over qualified module paths, so the
//! default loader here is registry-backed rather than name-resolving: hosts
//! register every persistable symbol under a stable key at startup, and
//! [`ObjectLoader::identify`]/[`ObjectLoader::load`] round-trip through that
//! registry. This is the "secondary implementation" the original design
//! describes, promoted to the only implementation a systems language needs.

use std::fmt;
use std::sync::Arc;

use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Stable textual name for a registered type or free function.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Identifier(pub String);

impl Identifier {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum LoaderError {
    #[error("object is not addressable by a stable identifier: {reason}")]
    #[diagnostic(
        code(workloom::object_loader::invalid_identifier),
        help("Register the symbol with the loader before saving it.")
    )]
    InvalidIdentifier { reason: String },

    #[error("no symbol registered under identifier `{identifier}`")]
    #[diagnostic(
        code(workloom::object_loader::registry_miss),
        help("Call register() for this identifier before attempting to load it.")
    )]
    RegistryMiss { identifier: String },

    #[error("identifier `{raw}` is malformed")]
    #[diagnostic(code(workloom::object_loader::malformed_identifier))]
    MalformedIdentifier { raw: String },
}

/// A runtime symbol addressable through an [`ObjectLoader`]: a process
/// constructor, a workchain step function, or a listener factory.
#[derive(Clone)]
pub enum Symbol {
    /// A workchain/process step function, keyed by name in a process's step
    /// table (see [`crate::process::StepTable`]).
    StepFn(Arc<crate::process::StepFn>),
    /// A process constructor, used by controllers/launchers to create a
    /// fresh process instance from a class identifier.
    ProcessCtor(Arc<dyn Fn() -> crate::process::Process + Send + Sync>),
}

/// Bidirectional mapping between runtime symbols and stable identifiers.
///
/// `load(identify(x)) == x` must hold for every identifier produced by
/// `identify`; the default implementation enforces this by construction,
/// since `identify` only ever returns keys already present in the registry.
pub trait ObjectLoader: Send + Sync {
    fn identify(&self, symbol: &Symbol, name: &str) -> Result<Identifier, LoaderError>;
    fn load(&self, identifier: &Identifier) -> Result<Symbol, LoaderError>;
    fn register(&self, identifier: impl Into<String>, symbol: Symbol);
}

/// Registry-backed loader: the host registers symbols under short names.
/// This is the only loader most hosts need, and the one this crate uses by
/// default for process class ids and workchain step names.
#[derive(Clone, Default)]
pub struct DefaultLoader {
    registry: Arc<RwLock<FxHashMap<String, Symbol>>>,
}

impl DefaultLoader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectLoader for DefaultLoader {
    fn identify(&self, _symbol: &Symbol, name: &str) -> Result<Identifier, LoaderError> {
        if name.is_empty() {
            return Err(LoaderError::InvalidIdentifier {
                reason: "empty symbol name".to_string(),
            });
        }
        if !self.registry.read().contains_key(name) {
            return Err(LoaderError::InvalidIdentifier {
                reason: format!("`{name}` was never registered with this loader"),
            });
        }
        Ok(Identifier::new(name))
    }

    fn load(&self, identifier: &Identifier) -> Result<Symbol, LoaderError> {
        self.registry
            .read()
            .get(identifier.as_str())
            .cloned()
            .ok_or_else(|| LoaderError::RegistryMiss {
                identifier: identifier.0.clone(),
            })
    }

    fn register(&self, identifier: impl Into<String>, symbol: Symbol) {
        self.registry.write().insert(identifier.into(), symbol);
    }
}

/// A loader that prefixes every identifier it mints, letting a host run
/// several independent registries (e.g. per process family) under one
/// [`crate::savable::LoadContext`] without collisions. Preferred for
/// compact on-wire identifiers and for test isolation.
#[derive(Clone)]
pub struct PrefixedLoader {
    prefix: String,
    inner: DefaultLoader,
}

impl PrefixedLoader {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            inner: DefaultLoader::new(),
        }
    }

    fn strip(&self, identifier: &Identifier) -> Result<String, LoaderError> {
        identifier
            .as_str()
            .strip_prefix(&self.prefix)
            .map(str::to_string)
            .ok_or_else(|| LoaderError::MalformedIdentifier {
                raw: identifier.0.clone(),
            })
    }
}

impl ObjectLoader for PrefixedLoader {
    fn identify(&self, symbol: &Symbol, name: &str) -> Result<Identifier, LoaderError> {
        let inner = self.inner.identify(symbol, name)?;
        Ok(Identifier::new(format!("{}{}", self.prefix, inner.0)))
    }

    fn load(&self, identifier: &Identifier) -> Result<Symbol, LoaderError> {
        let stripped = self.strip(identifier)?;
        self.inner.load(&Identifier::new(stripped))
    }

    fn register(&self, identifier: impl Into<String>, symbol: Symbol) {
        self.inner.register(identifier, symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_through_default_loader() {
        let loader = DefaultLoader::new();
        let step: Arc<crate::process::StepFn> = Arc::new(|_p, _ctx| Box::pin(async { todo!() }));
        loader.register("demo.step", Symbol::StepFn(step.clone()));
        let id = loader
            .identify(&Symbol::StepFn(step), "demo.step")
            .expect("registered symbol identifies");
        assert!(matches!(loader.load(&id), Ok(Symbol::StepFn(_))));
    }

    #[test]
    fn unregistered_symbol_is_invalid() {
        let loader = DefaultLoader::new();
        let step: Arc<crate::process::StepFn> = Arc::new(|_p, _ctx| Box::pin(async { todo!() }));
        let err = loader
            .identify(&Symbol::StepFn(step), "missing")
            .unwrap_err();
        assert!(matches!(err, LoaderError::InvalidIdentifier { .. }));
    }

    #[test]
    fn prefixed_loader_round_trips() {
        let loader = PrefixedLoader::new("wc::");
        let step: Arc<crate::process::StepFn> = Arc::new(|_p, _ctx| Box::pin(async { todo!() }));
        loader.register("s1", Symbol::StepFn(step.clone()));
        let id = loader.identify(&Symbol::StepFn(step), "s1").unwrap();
        assert_eq!(id.as_str(), "wc::s1");
        assert!(matches!(loader.load(&id), Ok(Symbol::StepFn(_))));
    }
}
