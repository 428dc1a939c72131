//! Content hashing for change detection.
//!
//! - **Item hash**: SHA-256 of the JSON serialization of one normalized record.
//!   Fields are emitted in declaration order, so the digest is sensitive to
//!   the struct layout. Keys without a dedicated field land in flattened
//!   `extra` maps, so every feed key reaches the digest. Passthrough maps
//!   are `serde_json::Map`s and serialize with sorted keys.
//! - **Aggregate hash**: SHA-256 over `"<catalogId>:<itemHash>|"` for every
//!   item sorted by `catalogId`; empty string for an empty feed.

use sha2::{Digest, Sha256};

use vendorsync_core::NormalizedProduct;

use crate::SyncError;

/// Hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

/// Content hash of a normalized record.
pub fn product_hash(product: &NormalizedProduct) -> Result<String, SyncError> {
    let json = serde_json::to_vec(product)?;
    Ok(sha256_hex(&json))
}

/// Order-independent digest over `(catalogId, itemHash)` pairs.
pub fn aggregate_hash<'a, I>(items: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut pairs: Vec<(&str, &str)> = items.into_iter().collect();
    if pairs.is_empty() {
        return String::new();
    }
    // Stable sort: duplicate catalog ids keep their relative feed order.
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let mut h = Sha256::new();
    for (catalog_id, item_hash) in pairs {
        h.update(catalog_id.as_bytes());
        h.update(b":");
        h.update(item_hash.as_bytes());
        h.update(b"|");
    }
    hex::encode(h.finalize())
}
