//! Per-agent tool keys. Only the SHA-256 of a key is ever stored.

use rand::Rng;
use sha2::{Digest, Sha256};

/// Prefix carried by every agent tool key.
pub const TOOL_KEY_PREFIX: &str = "vxl_tk_";

const KEY_BYTES: usize = 32;

/// Generate a tool key and its stored hash: `vxl_tk_` + 64 hex chars.
pub fn generate_tool_key() -> (String, String) {
    let mut bytes = [0u8; KEY_BYTES];
    rand::thread_rng().fill(&mut bytes[..]);
    let key = format!("{TOOL_KEY_PREFIX}{}", hex::encode(bytes));
    let hash = hash_key(&key);
    (key, hash)
}

/// Whether a presented key should be looked up as an agent key.
pub fn is_tool_key(key: &str) -> bool {
    key.starts_with(TOOL_KEY_PREFIX)
}

pub fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Short non-secret identifier shown in listings: 8 chars after the prefix.
pub fn key_prefix(key: &str) -> String {
    key.strip_prefix(TOOL_KEY_PREFIX)
        .map(|rest| rest.chars().take(8).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_key_roundtrip() {
        let (key, hash) = generate_tool_key();
        assert!(key.starts_with(TOOL_KEY_PREFIX));
        assert_eq!(key.len(), TOOL_KEY_PREFIX.len() + 64);
        assert_eq!(hash, hash_key(&key));
        assert_eq!(key_prefix(&key).len(), 8);
    }

    #[test]
    fn generated_keys_are_distinct() {
        let (a, _) = generate_tool_key();
        let (b, _) = generate_tool_key();
        assert_ne!(a, b);
    }

    #[test]
    fn key_prefix_is_empty_for_foreign_keys() {
        assert_eq!(key_prefix("sk_live_abcdef"), "");
        assert!(!is_tool_key("sk_live_abcdef"));
    }
}
