use sha2::{Digest, Sha256};

use crate::Context;

/// Hex SHA-256 over the template id and the canonical JSON of the context.
/// Nested objects are hashed with sorted keys regardless of how the map
/// backing `serde_json::Value` orders them.
pub fn fingerprint(template_id: &str, context: &Context) -> String {
    let mut hasher = Sha256::new();
    hasher.update(template_id.as_bytes());
    hasher.update([0u8]);
    for (key, value) in context {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical_json(value).as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body = entries
                .into_iter()
                .map(|(key, value)| {
                    format!(
                        "{}:{}",
                        serde_json::Value::String(key.clone()),
                        canonical_json(value)
                    )
                })
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{body}}}")
        }
        serde_json::Value::Array(items) => {
            let body = items
                .iter()
                .map(canonical_json)
                .collect::<Vec<_>>()
                .join(",");
            format!("[{body}]")
        }
        other => other.to_string(),
    }
}
