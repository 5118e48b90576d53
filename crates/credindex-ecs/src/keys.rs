//! Primary key builders.
//!
//! Keys start with the chain id, followed by identity values in a fixed order, joined
//! with `-`. Addresses and hashes are always rendered as lower-case `0x` hex so a key
//! built from a checksummed address and one built from a lower-case path segment agree.

use alloy_primitives::{Address, B256, U256};

pub fn hex_address(address: &Address) -> String {
    format!("{address:#x}")
}

pub fn hex_b256(hash: &B256) -> String {
    format!("{hash:#x}")
}

pub fn hex_bytes(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Lower-cases a user-supplied hex string (path segment, query value).
pub fn normalize_hex(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

pub fn credential(chain_id: u64, labelhash: &B256) -> String {
    credential_hex(chain_id, &hex_b256(labelhash))
}

/// Credential key from an already rendered (or user-supplied) label hash.
pub fn credential_hex(chain_id: u64, labelhash: &str) -> String {
    format!("{chain_id}-{}", normalize_hex(labelhash))
}

pub fn resolver(chain_id: u64, address: &Address) -> String {
    resolver_hex(chain_id, &hex_address(address))
}

pub fn resolver_hex(chain_id: u64, address: &str) -> String {
    format!("{chain_id}-{}", normalize_hex(address))
}

/// Text record and contract metadata entries.
pub fn record(chain_id: u64, resolver: &Address, key: &str) -> String {
    format!("{chain_id}-{}-{key}", hex_address(resolver))
}

pub fn address_record(chain_id: u64, resolver: &Address, coin_type: &U256) -> String {
    format!("{chain_id}-{}-{coin_type}", hex_address(resolver))
}

/// History rows keyed by the log occurrence that produced them.
pub fn history(chain_id: u64, entity: &str, block_number: u64, log_index: u64) -> String {
    format!("{chain_id}-{entity}-{block_number}-{log_index}")
}

pub fn renewal(chain_id: u64, tx_hash: &B256, log_index: u64) -> String {
    format!("{chain_id}-{}-{log_index}", hex_b256(tx_hash))
}

pub fn approval(chain_id: u64, owner: &Address, operator: &Address) -> String {
    format!("{chain_id}-{}-{}", hex_address(owner), hex_address(operator))
}

/// Record key used when the plaintext key only exists as an indexed topic hash.
pub fn synthesized_text_key(block_number: u64, log_index: u64) -> String {
    format!("indexed-key-{block_number}-{log_index}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};

    #[test]
    fn test_keys_are_lower_case() {
        let resolver_addr = address!("B5b31DEb61f6b9Dd61b222ad50084e11EF53B8E3");
        assert_eq!(
            resolver(11155111, &resolver_addr),
            "11155111-0xb5b31deb61f6b9dd61b222ad50084e11ef53b8e3"
        );
        assert_eq!(
            record(1, &resolver_addr, "avatar"),
            "1-0xb5b31deb61f6b9dd61b222ad50084e11ef53b8e3-avatar"
        );
        assert_eq!(
            address_record(1, &resolver_addr, &U256::from(60)),
            "1-0xb5b31deb61f6b9dd61b222ad50084e11ef53b8e3-60"
        );
    }

    #[test]
    fn test_path_segment_matches_stored_key() {
        let labelhash = b256!("00000000000000000000000000000000000000000000000000000000000000AB");
        let from_path = "0x00000000000000000000000000000000000000000000000000000000000000AB";
        assert_eq!(credential(1, &labelhash), credential_hex(1, from_path));
        assert_eq!(
            resolver(1, &address!("00000000000000000000000000000000000000bb")),
            resolver_hex(1, "0x00000000000000000000000000000000000000BB")
        );
    }

    #[test]
    fn test_history_and_synthesized_keys() {
        assert_eq!(history(1, "0xabc", 100, 2), "1-0xabc-100-2");
        assert_eq!(synthesized_text_key(100, 2), "indexed-key-100-2");
        assert_eq!(hex_bytes(&[0xde, 0xad]), "0xdead");
    }
}
