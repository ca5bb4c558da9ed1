//! The in-memory snapshot tree: an ordered, string-keyed mapping that a
//! [`super::Savable`] writes itself into and reads itself back from.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Reserved key under which a bundle's metadata lives.
pub const META_KEY: &str = "!!meta";

/// Per-field type hint written into [`BundleMeta::types`], distinguishing a
/// plain deep-copied value from a field that needs special reconstruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Deep-copied scalar or container value; no special handling on load.
    #[serde(rename = "plain")]
    Plain,
    /// A bound step-function name, rebound by lookup on load.
    #[serde(rename = "m")]
    Method,
    /// A nested [`super::Savable`], stored as a sub-[`Bundle`].
    #[serde(rename = "S")]
    Savable,
}

/// Metadata sub-mapping every bundle carries under [`META_KEY`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BundleMeta {
    /// Object Loader identifier for the owning Savable's type.
    pub class_name: Option<String>,
    /// Identifier of a non-default loader used to save this bundle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_loader: Option<String>,
    /// Per-field type hints, keyed by field name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub types: IndexMap<String, FieldKind>,
    /// Free-form host metadata, not interpreted by the engine.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub user: IndexMap<String, Json>,
}

/// A value stored in a [`Bundle`]: a scalar, a nested bundle, or a list.
///
/// Externally tagged rather than `#[serde(untagged)]` so the discriminant is
/// explicit in the encoded form rather than inferred from shape, keeping a
/// bundle's on-disk representation stable as `Json`'s own shape varies.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum BundleValue {
    Scalar(Json),
    Bundle(Bundle),
    List(Vec<BundleValue>),
}

impl BundleValue {
    pub fn as_scalar(&self) -> Option<&Json> {
        match self {
            BundleValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bundle(&self) -> Option<&Bundle> {
        match self {
            BundleValue::Bundle(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[BundleValue]> {
        match self {
            BundleValue::List(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Json> for BundleValue {
    fn from(v: Json) -> Self {
        BundleValue::Scalar(v)
    }
}

impl From<Bundle> for BundleValue {
    fn from(b: Bundle) -> Self {
        BundleValue::Bundle(b)
    }
}

/// Ordered mapping `String -> Value` plus a reserved metadata entry.
///
/// A `Bundle` is plain owned data: cloning it can never alias the live
/// object it was produced from, which is the systems-language realisation
/// of the "deep copy" invariant the original design calls for.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Bundle {
    meta: BundleMeta,
    fields: IndexMap<String, BundleValue>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn meta(&self) -> &BundleMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut BundleMeta {
        &mut self.meta
    }

    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.meta.class_name = Some(class_name.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<BundleValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn insert_typed(
        &mut self,
        field: impl Into<String>,
        value: impl Into<BundleValue>,
        kind: FieldKind,
    ) {
        let field = field.into();
        self.meta.types.insert(field.clone(), kind);
        self.fields.insert(field, value.into());
    }

    pub fn get(&self, field: &str) -> Option<&BundleValue> {
        self.fields.get(field)
    }

    pub fn field_kind(&self, field: &str) -> Option<FieldKind> {
        self.meta.types.get(field).copied()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &BundleValue)> {
        self.fields.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
