//! Minimal port/value-validation capability. Spec.md treats port
//! specifications as an external collaborator the Process only consults at
//! its boundaries (construction-time inputs, `out()`); this module ships the
//! one concrete implementation this repository needs so those boundary
//! calls have a real callee instead of a mock, the same way the teacher
//! ships `InMemoryCheckpointer` alongside the `Checkpointer` trait.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value as Json;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ValidationError {
    #[error("unknown port `{port}` and dynamic ports are disabled on this namespace")]
    #[diagnostic(code(workloom::ports::unknown_port))]
    UnknownPort { port: String },

    #[error("port `{port}` expected {expected}, got {got}")]
    #[diagnostic(code(workloom::ports::type_mismatch))]
    TypeMismatch {
        port: String,
        expected: &'static str,
        got: &'static str,
    },

    #[error("port `{port}` is required but was not provided")]
    #[diagnostic(code(workloom::ports::required))]
    Required { port: String },
}

/// The scalar shapes a [`PortSpec`] can require. Kept deliberately small:
/// the concrete rule engine for richer schemas is explicitly out of scope
/// (spec.md §1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortKind {
    Any,
    String,
    Number,
    Bool,
    Object,
    Array,
}

impl PortKind {
    fn matches(self, value: &Json) -> bool {
        match self {
            PortKind::Any => true,
            PortKind::String => value.is_string(),
            PortKind::Number => value.is_number(),
            PortKind::Bool => value.is_boolean(),
            PortKind::Object => value.is_object(),
            PortKind::Array => value.is_array(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            PortKind::Any => "any",
            PortKind::String => "string",
            PortKind::Number => "number",
            PortKind::Bool => "bool",
            PortKind::Object => "object",
            PortKind::Array => "array",
        }
    }
}

fn json_kind_name(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

#[derive(Clone, Debug)]
pub struct PortSpec {
    pub kind: PortKind,
    pub required: bool,
    pub default: Option<Json>,
}

impl PortSpec {
    pub fn required(kind: PortKind) -> Self {
        Self {
            kind,
            required: true,
            default: None,
        }
    }

    pub fn optional(kind: PortKind, default: Option<Json>) -> Self {
        Self {
            kind,
            required: false,
            default,
        }
    }
}

/// A capability the Process consults at its boundaries: pre-processing raw
/// inputs and validating values placed on `out()`.
pub trait PortNamespace: Send + Sync {
    fn pre_process(&self, raw: &Json) -> Result<Json, ValidationError>;
    fn validate(&self, parsed: &Json) -> Option<ValidationError>;
    fn get_port(&self, path: &str) -> Option<&PortSpec>;
    fn validate_dynamic_ports(&self) -> bool;
    fn validate_output(&self, port: &str, value: &Json) -> Result<(), ValidationError>;
}

/// A flat, dotted-path port namespace: the concrete namespace every
/// `Process` uses unless a host supplies its own.
#[derive(Clone, Default)]
pub struct FlatPortNamespace {
    ports: FxHashMap<String, PortSpec>,
    allow_dynamic: bool,
}

impl FlatPortNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_dynamic(mut self) -> Self {
        self.allow_dynamic = true;
        self
    }

    pub fn with_port(mut self, name: impl Into<String>, spec: PortSpec) -> Self {
        self.ports.insert(name.into(), spec);
        self
    }
}

impl PortNamespace for FlatPortNamespace {
    fn pre_process(&self, raw: &Json) -> Result<Json, ValidationError> {
        let mut parsed = raw.clone();
        if let Json::Object(map) = &mut parsed {
            for (name, spec) in &self.ports {
                if !map.contains_key(name) {
                    if let Some(default) = &spec.default {
                        map.insert(name.clone(), default.clone());
                    } else if spec.required {
                        return Err(ValidationError::Required { port: name.clone() });
                    }
                }
            }
        }
        Ok(parsed)
    }

    fn validate(&self, parsed: &Json) -> Option<ValidationError> {
        let Json::Object(map) = parsed else {
            return None;
        };
        for (name, value) in map {
            if let Some(spec) = self.ports.get(name) {
                if !spec.kind.matches(value) {
                    return Some(ValidationError::TypeMismatch {
                        port: name.clone(),
                        expected: spec.kind.name(),
                        got: json_kind_name(value),
                    });
                }
            } else if !self.allow_dynamic {
                return Some(ValidationError::UnknownPort { port: name.clone() });
            }
        }
        None
    }

    fn get_port(&self, path: &str) -> Option<&PortSpec> {
        self.ports.get(path)
    }

    fn validate_dynamic_ports(&self) -> bool {
        self.allow_dynamic
    }

    fn validate_output(&self, port: &str, value: &Json) -> Result<(), ValidationError> {
        match self.ports.get(port) {
            Some(spec) if !spec.kind.matches(value) => Err(ValidationError::TypeMismatch {
                port: port.to_string(),
                expected: spec.kind.name(),
                got: json_kind_name(value),
            }),
            None if !self.allow_dynamic => Err(ValidationError::UnknownPort {
                port: port.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_port_fails_preprocess() {
        let ns = FlatPortNamespace::new().with_port("n", PortSpec::required(PortKind::Number));
        let err = ns.pre_process(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, ValidationError::Required { .. }));
    }

    #[test]
    fn dynamic_ports_disallowed_by_default() {
        let ns = FlatPortNamespace::new();
        let err = ns
            .validate(&serde_json::json!({"surprise": 1}))
            .expect("unknown port should fail validation");
        assert!(matches!(err, ValidationError::UnknownPort { .. }));
    }

    #[test]
    fn allow_dynamic_accepts_unknown_ports() {
        let ns = FlatPortNamespace::new().allow_dynamic();
        assert!(ns.validate(&serde_json::json!({"anything": 1})).is_none());
    }
}
