//! Hashing primitives for LinkChain
//!
//! Blocks are hashed over a canonical JSON rendering: object keys sorted
//! lexicographically, no insignificant whitespace. Two blocks with the same
//! field values therefore always produce the same digest, independent of how
//! they were built or which process built them.

use crate::blockchain::Block;
use crate::error::Result;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest, as stored in `Block::previous_hash`.
pub type HexDigest = String;

/// SHA-256 of `bytes`, lowercase hex.
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> HexDigest {
    hex::encode(Sha256::digest(bytes.as_ref()))
}

/// Render a JSON value with object keys in sorted order at every depth.
///
/// `serde_json::Map` only iterates sorted while the `preserve_order` feature
/// is off; any crate in the build can turn it on through feature
/// unification, so the order is fixed here instead of relied on.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Serializing a plain string into JSON cannot fail.
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
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

/// Digest of a block over its canonical serialization.
pub fn digest_block(block: &Block) -> Result<HexDigest> {
    let value = serde_json::to_value(block)?;
    Ok(sha256_hex(canonical_json(&value)))
}
