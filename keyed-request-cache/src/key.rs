use crate::descriptor::RequestDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Serialize a JSON value deterministically.
///
/// Object keys are sorted by byte order at every level, arrays keep their order and
/// no whitespace is emitted, so structurally equal values always produce the same
/// string regardless of how their maps were built.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<_> = map.iter().collect();
            fields.sort_by(|(a, _), (b, _)| a.cmp(b));

            out.push('{');
            for (i, (name, value)) in fields.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::from(name.as_str()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Content digest identifying equivalent requests.
///
/// Hex-encoded SHA-256 of the canonical form of `[method, path, body]`. Only used for
/// in-memory lookup, never persisted.
#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Clone, Debug, Serialize, Deserialize)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn from_descriptor(descriptor: &RequestDescriptor) -> Self {
        let parts = Value::Array(vec![
            Value::from(descriptor.method().to_string()),
            Value::from(descriptor.path().as_str()),
            descriptor.body().clone().unwrap_or(Value::Null),
        ]);

        let mut hasher = Sha256::new();
        hasher.update(canonical_json(&parts).as_bytes());
        RequestKey(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
