//! The workchain's persistable "context": named results stashed by
//! `ToContext` mappings and made available to later steps.

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::savable::{Bundle, BundleValue, LoadContext, SaveContext, Savable, SavableError};

/// A Savable attribute of the workchain holding named intermediate results,
/// the systems-language realisation of the original design's `ContextMixin`.
#[derive(Clone, Debug, Default)]
pub struct WorkChainContext {
    values: IndexMap<String, Json>,
}

impl WorkChainContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Json) {
        self.values.insert(key.into(), value);
    }

    /// Applies a `ToContext` mapping: every `(key, value)` pair is stored,
    /// available to steps run after this one.
    pub fn to_context(&mut self, pairs: impl IntoIterator<Item = (String, Json)>) {
        for (key, value) in pairs {
            self.set(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Json> {
        self.values.get(key)
    }
}

impl Savable for WorkChainContext {
    fn save(&self, _ctx: &SaveContext) -> Bundle {
        let mut bundle = Bundle::new().with_class_name("workloom.workchain.context");
        for (key, value) in &self.values {
            bundle.insert(key.clone(), value.clone());
        }
        bundle
    }

    fn recreate_from(bundle: &Bundle, _ctx: &LoadContext) -> Result<Self, SavableError> {
        let mut values = IndexMap::new();
        for (key, value) in bundle.fields() {
            if let BundleValue::Scalar(json) = value {
                values.insert(key.clone(), json.clone());
            }
        }
        Ok(WorkChainContext { values })
    }
}
