//! Derived credential fields.

use alloy_primitives::U256;

use crate::chain::NAME_SUFFIX;

/// A credential is expired once the block that touched it is strictly past a non-zero
/// expiration. `observed_time` is always a block timestamp, never wall-clock time.
pub fn is_expired(expiration: U256, observed_time: u64) -> bool {
    !expiration.is_zero() && U256::from(observed_time) > expiration
}

/// `label.ecs.eth`, or None while the label is unknown.
pub fn full_name(label: Option<&str>) -> Option<String> {
    label
        .filter(|label| !label.is_empty())
        .map(|label| format!("{label}{NAME_SUFFIX}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiration_boundaries() {
        let expiration = U256::from(1_700_000_000u64);
        assert!(!is_expired(expiration, 1_699_999_999));
        // Equal is not past.
        assert!(!is_expired(expiration, 1_700_000_000));
        assert!(is_expired(expiration, 1_700_000_001));
        // Zero means never set.
        assert!(!is_expired(U256::ZERO, u64::MAX));
        // Expirations beyond u64 never expire.
        assert!(!is_expired(U256::MAX, u64::MAX));
    }

    #[test]
    fn test_full_name() {
        assert_eq!(full_name(Some("alice")).as_deref(), Some("alice.ecs.eth"));
        assert_eq!(full_name(Some("")), None);
        assert_eq!(full_name(None), None);
    }
}
