// hash.rs - Canonical policy hashing.
//
// Every policy identity in the system (the enforcer's effective hash, the
// hierarchy's merge hash, the `validate` response) comes from this one
// function. The value is serialized to JSON with object keys sorted at
// every depth, then digested with SHA-256.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Hash any serializable value over its sorted-key canonical JSON form.
///
/// Returns `sha256:<64 lowercase hex chars>`. Field declaration order and
/// map insertion order never affect the result.
pub fn canonical_hash<T: Serialize + ?Sized>(value: &T) -> String {
    // Serializing plain data structs into a Value cannot fail; a Null
    // fallback keeps the function total for exotic Serialize impls.
    let value = serde_json::to_value(value).unwrap_or(Value::Null);
    let canonical = canonicalize(&value);
    let json = canonical.to_string();

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

/// Rebuild a JSON value with object keys inserted in sorted order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
