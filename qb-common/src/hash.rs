//! Input hashing
//!
//! A quote remembers the digest of the title and body it was last parsed
//! from. Comparing that digest with one computed from the record's current
//! text tells the moderator whether the record was edited since.

use sha2::{Digest, Sha256};

/// SHA-256 of title and body, hex encoded
///
/// The title is length-prefixed so that moving text across the title/body
/// boundary always produces a different digest.
pub fn input_hash(title: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.len().to_le_bytes());
    hasher.update(title.as_bytes());
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}
