//! Solidity bindings for the events and views the indexer consumes.
//!
//! Indexed `string` parameters only reach logs as their keccak256 hash, so their
//! generated fields are `B256`.

use alloy_primitives::B256;
use alloy_sol_types::SolEvent;

pub mod registry {
    alloy_sol_types::sol! {
        event NewLabelhashOwner(bytes32 indexed labelhash, string indexed label, address owner);

        event Transfer(bytes32 indexed labelhash, address owner);

        event ResolverChanged(bytes32 indexed labelhash, address resolver);

        event ResolverReviewUpdated(bytes32 indexed labelhash, string review);

        event ExpirationExtended(bytes32 indexed labelhash, uint256 newExpiration);

        event ApprovalForAll(address indexed owner, address indexed operator, bool approved);

        function getLabel(bytes32 labelhash) external view returns (string);
        function getExpiration(bytes32 labelhash) external view returns (uint256);
        function resolver(bytes32 labelhash) external view returns (address);
    }
}

pub mod registrar {
    alloy_sol_types::sol! {
        event NameRegistered(string indexed label, address owner, uint256 cost, uint256 expires);

        event NameRenewed(string indexed label, uint256 cost, uint256 newExpiration);
    }
}

pub mod factory {
    alloy_sol_types::sol! {
        event ResolverCloneDeployed(address indexed clone, address indexed owner);
    }
}

pub mod resolver {
    alloy_sol_types::sol! {
        event AddrChanged(address a);

        event AddressChanged(uint256 coinType, bytes newAddress);

        event ContenthashChanged(bytes hash);

        event TextChanged(string indexed key, string value);

        event ContractMetadataUpdated(string indexed indexedKey, string key, bytes value);

        event OwnershipTransferred(address indexed previousOwner, address indexed newOwner);
    }
}

/// `topic0` of every resolver event.
///
/// Resolver instances are created at runtime, so log queries select them by signature
/// instead of by address.
pub fn resolver_event_topics() -> Vec<B256> {
    vec![
        resolver::AddrChanged::SIGNATURE_HASH,
        resolver::AddressChanged::SIGNATURE_HASH,
        resolver::ContenthashChanged::SIGNATURE_HASH,
        resolver::TextChanged::SIGNATURE_HASH,
        resolver::ContractMetadataUpdated::SIGNATURE_HASH,
        resolver::OwnershipTransferred::SIGNATURE_HASH,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;

    #[test]
    fn test_signatures_match_canonical_strings() {
        assert_eq!(
            registry::NewLabelhashOwner::SIGNATURE_HASH,
            keccak256("NewLabelhashOwner(bytes32,string,address)")
        );
        assert_eq!(
            resolver::ContractMetadataUpdated::SIGNATURE_HASH,
            keccak256("ContractMetadataUpdated(string,string,bytes)")
        );
        assert_eq!(
            factory::ResolverCloneDeployed::SIGNATURE_HASH,
            keccak256("ResolverCloneDeployed(address,address)")
        );
    }

    #[test]
    fn test_resolver_topics_are_distinct() {
        let mut topics = resolver_event_topics();
        topics.sort();
        topics.dedup();
        assert_eq!(topics.len(), 6);
    }
}
