//! JSON mappings carried by events.

use serde_json::{Map, Value};

/// JSON object carried as event data or metadata.
///
/// Mirrors the relational `jsonb` column shape: string keys, arbitrary JSON
/// values. An absent payload is the empty mapping, never null.
pub type Payload = Map<String, Value>;

/// Merge `extra` into `base`, top-level keys only.
///
/// Keys present in `extra` replace keys in `base`; nested objects are
/// replaced wholesale, not merged.
pub fn shallow_merge(base: &mut Payload, extra: &Payload) {
    for (key, value) in extra {
        base.insert(key.clone(), value.clone());
    }
}
