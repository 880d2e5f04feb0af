//! Checksum Engine - deterministic digests used for change detection
//!
//! Each digest covers a fixed field subset, serialized as canonical JSON
//! (object keys sorted, integers in plain decimal) and hashed with SHA-256:
//! - content: name, lifeSpan, description, floodlightId, rules in stored order
//! - shares: the sorted share list
//!
//! Fields outside a subset (id, floodlightName, the rule's friendly label) never
//! affect the digest.

use crate::domain::{Audience, AudienceRule};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumEngine;

impl ChecksumEngine {
    pub fn new() -> Self {
        Self
    }

    /// Digest over the identity-relevant fields
    pub fn content_checksum(&self, audience: &Audience) -> String {
        let rules: Vec<Value> = audience.rules.iter().map(canonical_rule).collect();
        digest(&json!({
            "name": audience.name,
            "lifeSpan": audience.life_span,
            "description": audience.description,
            "floodlightId": audience.floodlight_id,
            "rules": rules,
        }))
    }

    /// Digest over the sharing list only
    pub fn shares_checksum(&self, audience: &Audience) -> String {
        // BTreeSet iterates sorted, so the list is already canonical
        let shares: Vec<&str> = audience.shares.iter().map(String::as_str).collect();
        digest(&json!({ "shares": shares }))
    }
}

fn canonical_rule(rule: &AudienceRule) -> Value {
    json!({
        "group": rule.group,
        "variableName": rule.variable_name,
        "operator": rule.operator,
        "value": rule.value,
        "negation": rule.negation,
    })
}

fn digest(value: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Compact JSON with object keys sorted, independent of serde_json's map feature flags
fn write_canonical(value: &Value, out: &mut String) {
    match value {
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
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
