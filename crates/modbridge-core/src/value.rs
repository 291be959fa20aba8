//! Runtime values crossing the module boundary.
//!
//! Module code exchanges JSON with the engine. JSON is decoded into [`Value`]
//! as soon as it arrives so conversions can match on the value's shape, and is
//! re-encoded with [`Value::to_json`] when it has to leave again.
//!
//! Numbers: an integer that fits in `i64` decodes to [`Value::Int`], a larger
//! non-negative integer to [`Value::UInt`], and any other number to
//! [`Value::Float`]. Integers therefore round-trip exactly. Encoding a NaN or
//! infinite float is an error rather than a silent `null`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use anyhow::{anyhow, Context, Result};

use modbridge_types::Digest;

use crate::interface::InterfaceValue;

/// Prefix of content sources that must outlive any cached call result that
/// references them.
pub const BLOB_SOURCE_PREFIX: &str = "blob://";

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    /// Integers above `i64::MAX`.
    UInt(u64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
    /// A concrete value presented through an interface type.
    Interface(Box<InterfaceValue>),
    /// An object owned by the core module.
    Core(CoreObject),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn empty_object() -> Self {
        Value::Object(BTreeMap::new())
    }

    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => Value::Int(i),
                (None, Some(u)) => Value::UInt(u),
                (None, None) => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Encode as JSON. Interface values encode as their underlying value and
    /// core objects as their ID.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::UInt(u) => serde_json::Value::from(*u),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| anyhow!("cannot encode non-finite number {} as JSON", f))?,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(Value::to_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    let encoded = v
                        .to_json()
                        .with_context(|| format!("failed to encode field {:?}", k))?;
                    out.insert(k.clone(), encoded);
                }
                serde_json::Value::Object(out)
            }
            Value::Interface(iv) => iv.value.to_json()?,
            Value::Core(obj) => serde_json::Value::String(obj.id.clone()),
        })
    }

    /// Deterministic JSON text: object keys sorted, no whitespace.
    pub fn canonical_json(&self) -> Result<String> {
        let json = self.to_json()?;
        serde_json::to_string(&json).context("failed to serialize value")
    }

    /// Short shape name for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::UInt(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Object(_) => "object",
            Value::Interface(_) => "interface value",
            Value::Core(_) => "core object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_interface(&self) -> Option<&InterfaceValue> {
        match self {
            Value::Interface(iv) => Some(iv),
            _ => None,
        }
    }

    /// Field lookup on an object value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Interface(a), Value::Interface(b)) => a == b,
            (Value::Core(a), Value::Core(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json() {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "<{}>", self.kind_name()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// =============================================================================
// Core objects
// =============================================================================

/// An object owned by the core module, referenced by its ID.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreObject {
    pub type_name: String,
    pub id: String,
    pub fields: BTreeMap<String, Value>,
    /// Content this object was built from.
    pub definitions: Vec<ContentDefinition>,
}

/// One source of content backing a core object, e.g. `blob://sha256:...`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentDefinition {
    pub source: String,
}

impl CoreObject {
    /// Digests of the `blob://` sources this object depends on.
    pub fn dependency_blobs(&self) -> Result<BTreeSet<Digest>> {
        self.definitions
            .iter()
            .filter_map(|def| def.source.strip_prefix(BLOB_SOURCE_PREFIX))
            .map(|digest| {
                digest
                    .parse::<Digest>()
                    .with_context(|| format!("invalid blob source in {} {}", self.type_name, self.id))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers() {
        assert_eq!(Value::from_json(json!(42)), Value::Int(42));
        assert_eq!(Value::from_json(json!(-7)), Value::Int(-7));
        assert_eq!(Value::from_json(json!(1.5)), Value::Float(1.5));
        // too large for i64, still exact
        let big = Value::from_json(json!(u64::MAX));
        assert_eq!(big, Value::UInt(u64::MAX));
        assert_eq!(big.canonical_json().unwrap(), "18446744073709551615");
        assert_eq!(big.kind_name(), "int");
        assert_ne!(
            Value::from_json(json!(u64::MAX - 1)).canonical_json().unwrap(),
            big.canonical_json().unwrap()
        );
        assert_eq!(Value::Int(i64::MAX).to_json().unwrap(), json!(i64::MAX));
    }

    #[test]
    fn test_non_finite_floats_are_rejected() {
        for f in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = Value::List(vec![Value::Float(f)]).canonical_json().unwrap_err();
            assert!(err.to_string().contains("non-finite"));
        }
    }

    #[test]
    fn test_canonical_json_is_sorted_and_compact() {
        let v = Value::from_json(json!({"b": [1, {"z": true, "a": null}], "a": "x"}));
        assert_eq!(
            v.canonical_json().unwrap(),
            r#"{"a":"x","b":[1,{"a":null,"z":true}]}"#
        );
    }

    #[test]
    fn test_core_object_encodes_as_id() {
        let obj = CoreObject {
            type_name: "File".into(),
            id: "core:File:abc".into(),
            fields: BTreeMap::new(),
            definitions: vec![],
        };
        assert_eq!(Value::Core(obj).to_json().unwrap(), json!("core:File:abc"));
    }

    #[test]
    fn test_dependency_blobs() {
        let blob = Digest::from_string("local dir");
        let obj = CoreObject {
            type_name: "Directory".into(),
            id: "dir".into(),
            fields: BTreeMap::new(),
            definitions: vec![
                ContentDefinition {
                    source: format!("blob://{}", blob),
                },
                ContentDefinition {
                    source: "git://example.com/repo".into(),
                },
            ],
        };
        let blobs = obj.dependency_blobs().unwrap();
        assert_eq!(blobs.into_iter().collect::<Vec<_>>(), vec![blob]);

        let bad = CoreObject {
            definitions: vec![ContentDefinition {
                source: "blob://nope".into(),
            }],
            ..obj
        };
        assert!(bad.dependency_blobs().is_err());
    }

    #[test]
    fn test_accessors() {
        let v = Value::object([("name", Value::from("world")), ("n", Value::from(2i64))]);
        assert_eq!(v.get("name").and_then(Value::as_str), Some("world"));
        assert_eq!(v.get("n").and_then(Value::as_i64), Some(2));
        assert!(v.get("missing").is_none());
        assert_eq!(v.kind_name(), "object");
        assert_eq!(v.to_string(), r#"{"n":2,"name":"world"}"#);
    }
}
