//! Hash helpers, kept behind a thin API so the hash algorithm can change
//! without touching callers. BLAKE3 is used for its speed; none of this is
//! a wire/security guarantee, only a stable fingerprint within one
//! simulation run.

use super::to_canonical_json;
use blake3::Hasher;
use serde_json::Value;

pub fn hash_str(input: &str) -> String {
    let mut h = Hasher::new();
    h.update(input.as_bytes());
    h.finalize().to_hex().to_string()
}

pub fn hash_value(v: &Value) -> String {
    let canonical = to_canonical_json(v);
    hash_str(&canonical)
}
