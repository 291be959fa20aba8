//! Opaque IDs for module object values.
//!
//! A module object crosses the wire by reference as an ID string. The ID carries
//! the object's field map, the digest of the module that owns the object type
//! and the (namespaced) type name, so any module can hand an object it received
//! back to the engine and have it resolved against the right module.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::encoding::{base64_decode, base64_encode};

/// Prefix that marks a string as a module object ID.
pub const MODULE_ID_PREFIX: &str = "modobj:";

/// The decoded contents of a module object ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleObjectData {
    /// Field map of the object, keyed by the names the owning module uses.
    pub data: serde_json::Value,
    /// Digest of the module that defines `type_name`.
    pub mod_digest: Digest,
    /// Object type name, with namespacing applied.
    pub type_name: String,
}

/// Encode module object data as an opaque ID.
pub fn encode_module(data: &ModuleObjectData) -> Result<String> {
    if !data.data.is_object() && !data.data.is_null() {
        return Err(anyhow!(
            "module object {} must be encoded from a field map, got {}",
            data.type_name,
            json_kind(&data.data)
        ));
    }
    let bytes = serde_json::to_vec(data)
        .with_context(|| format!("failed to serialize module object {}", data.type_name))?;
    Ok(format!("{}{}", MODULE_ID_PREFIX, base64_encode(&bytes)))
}

/// Decode a module object ID.
///
/// When `expected_type_name` is non-empty the decoded type name must match it;
/// interface conversions pass an empty name because they learn the concrete type
/// from the ID itself.
pub fn decode_module_id(id: &str, expected_type_name: &str) -> Result<ModuleObjectData> {
    let encoded = id
        .strip_prefix(MODULE_ID_PREFIX)
        .ok_or_else(|| anyhow!("invalid module object ID: missing {} prefix", MODULE_ID_PREFIX))?;
    let bytes = base64_decode(encoded, "module object ID")?;
    let data: ModuleObjectData =
        serde_json::from_slice(&bytes).context("failed to parse module object ID payload")?;
    if !expected_type_name.is_empty() && data.type_name != expected_type_name {
        return Err(anyhow!(
            "invalid type name {:?} in module object ID, expected {:?}",
            data.type_name,
            expected_type_name
        ));
    }
    Ok(data)
}

/// Whether `s` looks like a module object ID.
pub fn is_module_id(s: &str) -> bool {
    s.starts_with(MODULE_ID_PREFIX)
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ModuleObjectData {
        ModuleObjectData {
            data: json!({"greeting": "hi", "count": 2}),
            mod_digest: Digest::from_string("greeter-module"),
            type_name: "Greeter".to_string(),
        }
    }

    #[test]
    fn test_encode_decode() {
        let id = encode_module(&sample()).unwrap();
        assert!(is_module_id(&id));
        let decoded = decode_module_id(&id, "Greeter").unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_decode_any_type() {
        let id = encode_module(&sample()).unwrap();
        let decoded = decode_module_id(&id, "").unwrap();
        assert_eq!(decoded.type_name, "Greeter");
        assert_eq!(decoded.mod_digest, Digest::from_string("greeter-module"));
    }

    #[test]
    fn test_decode_type_mismatch() {
        let id = encode_module(&sample()).unwrap();
        let err = decode_module_id(&id, "Other").unwrap_err();
        assert!(err.to_string().contains("expected \"Other\""));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        // serde_json maps are ordered, so key order in the input doesn't matter
        let a = ModuleObjectData {
            data: serde_json::from_str(r#"{"b":1,"a":2}"#).unwrap(),
            ..sample()
        };
        let b = ModuleObjectData {
            data: serde_json::from_str(r#"{"a":2,"b":1}"#).unwrap(),
            ..sample()
        };
        assert_eq!(encode_module(&a).unwrap(), encode_module(&b).unwrap());
    }

    #[test]
    fn test_rejects_non_map_data_and_garbage() {
        let bad = ModuleObjectData {
            data: json!([1, 2]),
            ..sample()
        };
        assert!(encode_module(&bad).is_err());
        assert!(decode_module_id("not-an-id", "").is_err());
        assert!(decode_module_id("modobj:%%%", "").is_err());
    }
}
