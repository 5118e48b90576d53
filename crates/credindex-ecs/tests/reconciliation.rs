//! End-to-end reconciliation: encoded logs → EcsDecoder → EcsSink → EcsStore.

use alloy_primitives::{address, b256, keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolEvent, SolValue};
use anyhow::Context;
use async_trait::async_trait;
use credindex::etl::{Decoder, ExtractionBatch, RawLog, Sink};
use credindex_ecs::abi::registry::{getExpirationCall, getLabelCall, resolverCall};
use credindex_ecs::abi::{factory, registrar, registry, resolver};
use credindex_ecs::reader::DEFAULT_READ_TIMEOUT;
use credindex_ecs::storage::{
    AddressRecord, Approval, ContractMetadataEntry, Credential, Renewal, Resolver, ResolverTransfer,
    TextRecord,
};
use credindex_ecs::{
    keys, BestEffortReader, ChainReader, Deployment, EcsDecoder, EcsSink, EcsStore,
};
use std::sync::Arc;

const OWNER: Address = address!("000000000000000000000000000000000000000a");
const OPERATOR: Address = address!("000000000000000000000000000000000000000c");
const CLONE: Address = address!("000000000000000000000000000000000000000b");
const STRANGER: Address = address!("00000000000000000000000000000000000000ff");
const H1: B256 = b256!("1111111111111111111111111111111111111111111111111111111111111111");
const H2: B256 = b256!("2222222222222222222222222222222222222222222222222222222222222222");
/// Label every stub reader answers with unless a test says otherwise.
const LABEL: &str = "alice";

/// Answers registry views from fixed values; `None` makes the read fail.
#[derive(Default)]
struct StubReader {
    label: Option<String>,
    expiration: Option<U256>,
    resolver: Option<Address>,
}

#[async_trait]
impl ChainReader for StubReader {
    async fn call(
        &self,
        _chain_id: u64,
        _block_number: u64,
        _to: Address,
        calldata: Bytes,
    ) -> anyhow::Result<Bytes> {
        let selector = calldata.get(..4).context("short calldata")?;
        let output = if selector == getLabelCall::SELECTOR {
            self.label.clone().map(|label| (label,).abi_encode_params())
        } else if selector == getExpirationCall::SELECTOR {
            self.expiration.map(|expiration| expiration.abi_encode())
        } else if selector == resolverCall::SELECTOR {
            self.resolver.map(|resolver| resolver.abi_encode())
        } else {
            None
        };
        output.map(Bytes::from).context("read not stubbed")
    }
}

struct Harness {
    deployment: Deployment,
    decoder: EcsDecoder,
    sink: EcsSink,
}

impl Harness {
    fn new(reader: StubReader) -> Self {
        let deployment = Deployment::sepolia();
        let store = Arc::new(EcsStore::in_memory().unwrap());
        let reader = BestEffortReader::new(Arc::new(reader), DEFAULT_READ_TIMEOUT);
        Self {
            decoder: EcsDecoder::new([deployment.clone()]),
            sink: EcsSink::new(store, reader),
            deployment,
        }
    }

    fn with_label(label: &str) -> Self {
        Self::new(StubReader {
            label: Some(label.to_string()),
            expiration: Some(U256::from(1_800_000_000u64)),
            resolver: Some(Address::ZERO),
        })
    }

    fn store(&self) -> &EcsStore {
        self.sink.store()
    }

    async fn deliver(&self, logs: &[RawLog]) {
        let envelopes = self.decoder.decode(logs).await.unwrap();
        let batch = ExtractionBatch::empty(self.deployment.chain_id);
        self.sink.process(&envelopes, &batch).await.unwrap();
    }

    fn credential(&self, labelhash: B256) -> Option<Credential> {
        self.store()
            .find(&keys::credential(self.deployment.chain_id, &labelhash))
            .unwrap()
    }

    fn resolver(&self, address: Address) -> Option<Resolver> {
        self.store()
            .find(&keys::resolver(self.deployment.chain_id, &address))
            .unwrap()
    }
}

fn log<E: SolEvent>(event: &E, address: Address, at: (u64, u64), timestamp: u64) -> RawLog {
    let (block_number, log_index) = at;
    let data = event.encode_log_data();
    RawLog {
        chain_id: 11155111,
        address,
        topics: data.topics().to_vec(),
        data: data.data,
        block_number,
        block_hash: None,
        block_timestamp: Some(timestamp),
        transaction_hash: B256::left_padding_from(&block_number.to_be_bytes()),
        log_index,
    }
}

fn claim(harness: &Harness, labelhash: B256, owner: Address, at: (u64, u64), timestamp: u64) -> RawLog {
    claim_with_label(harness, labelhash, LABEL, owner, at, timestamp)
}

/// A claim whose indexed label topic is `keccak256(label)`.
fn claim_with_label(
    harness: &Harness,
    labelhash: B256,
    label: &str,
    owner: Address,
    at: (u64, u64),
    timestamp: u64,
) -> RawLog {
    log(
        &registry::NewLabelhashOwner {
            labelhash,
            label: keccak256(label),
            owner,
        },
        harness.deployment.registry,
        at,
        timestamp,
    )
}

fn deploy(harness: &Harness, clone: Address, owner: Address, at: (u64, u64)) -> RawLog {
    log(
        &factory::ResolverCloneDeployed { clone, owner },
        harness.deployment.factory,
        at,
        1_700_000_000 + at.0,
    )
}

fn point(harness: &Harness, labelhash: B256, resolver: Address, at: (u64, u64)) -> RawLog {
    log(
        &registry::ResolverChanged { labelhash, resolver },
        harness.deployment.registry,
        at,
        1_700_000_000 + at.0,
    )
}

fn text(contract: Address, value: &str, at: (u64, u64)) -> RawLog {
    log(
        &resolver::TextChanged {
            key: B256::repeat_byte(0x77),
            value: value.to_string(),
        },
        contract,
        at,
        1_700_000_000 + at.0,
    )
}

#[tokio::test]
async fn scenario_label_claim_without_resolver() {
    let harness = Harness::with_label("alice");
    harness
        .deliver(&[claim(&harness, H1, OWNER, (10, 0), 1_700_000_000)])
        .await;

    let credential = harness.credential(H1).unwrap();
    assert_eq!(credential.owner, keys::hex_address(&OWNER));
    assert_eq!(credential.resolver_address, None);
    assert!(!credential.is_expired);
    assert_eq!(credential.label.as_deref(), Some("alice"));
    assert_eq!(credential.full_name.as_deref(), Some("alice.ecs.eth"));
    assert_eq!(credential.registered.block_number, 10);
}

#[tokio::test]
async fn scenario_factory_clone_then_resolver_pointer() {
    let harness = Harness::with_label("alice");
    harness
        .deliver(&[
            claim(&harness, H1, OWNER, (10, 0), 1_700_000_010),
            deploy(&harness, CLONE, OWNER, (11, 0)),
        ])
        .await;

    let resolver = harness.resolver(CLONE).unwrap();
    assert_eq!(resolver.labelhash, None);
    assert_eq!(resolver.owner, keys::hex_address(&OWNER));

    harness.deliver(&[point(&harness, H1, CLONE, (12, 0))]).await;

    let credential = harness.credential(H1).unwrap();
    assert_eq!(credential.resolver_address, Some(keys::hex_address(&CLONE)));
    assert_eq!(credential.resolver_updated_at, 1_700_000_012);

    let resolver = harness.resolver(CLONE).unwrap();
    assert_eq!(resolver.labelhash, Some(keys::hex_b256(&H1)));
    assert_eq!(resolver.label.as_deref(), Some("alice"));
    assert_eq!(resolver.deployed.block_number, 11);
}

#[tokio::test]
async fn scenario_redelivered_text_change_is_absorbed() {
    let harness = Harness::with_label("alice");
    harness.deliver(&[deploy(&harness, CLONE, OWNER, (99, 0))]).await;

    let change = text(CLONE, "v1", (100, 2));
    harness.deliver(&[change.clone()]).await;
    harness.deliver(&[change]).await;

    let records = harness.store().scan::<TextRecord>(|_| true).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].value, "v1");
    assert_eq!(records[0].key, "indexed-key-100-2");
    assert!(records[0].key_synthesized);
    assert_eq!(records[0].key_hash, Some(keys::hex_b256(&B256::repeat_byte(0x77))));
}

#[tokio::test]
async fn scenario_expiration_boundaries() {
    let harness = Harness::new(StubReader {
        label: Some("alice".to_string()),
        expiration: Some(U256::from(1_700_000_000u64)),
        resolver: Some(Address::ZERO),
    });
    harness
        .deliver(&[claim(&harness, H1, OWNER, (10, 0), 1_700_000_001)])
        .await;
    assert!(harness.credential(H1).unwrap().is_expired);

    let extended = log(
        &registry::ExpirationExtended {
            labelhash: H1,
            newExpiration: U256::from(1_800_000_000u64),
        },
        harness.deployment.registry,
        (11, 0),
        1_700_000_002,
    );
    harness.deliver(&[extended]).await;

    let credential = harness.credential(H1).unwrap();
    assert!(!credential.is_expired);
    assert_eq!(credential.expiration, U256::from(1_800_000_000u64));
}

#[tokio::test]
async fn scenario_approval_is_latest_wins() {
    let harness = Harness::with_label("alice");
    let approval = |approved, block_number| {
        log(
            &registry::ApprovalForAll {
                owner: OWNER,
                operator: OPERATOR,
                approved,
            },
            harness.deployment.registry,
            (block_number, 0),
            1_700_000_000 + block_number,
        )
    };
    harness.deliver(&[approval(true, 20), approval(false, 21)]).await;

    let approvals = harness.store().scan::<Approval>(|_| true).unwrap();
    assert_eq!(approvals.len(), 1);
    assert!(!approvals[0].approved);
    assert_eq!(approvals[0].set_at.block_number, 21);
}

#[tokio::test]
async fn replaying_the_whole_history_changes_nothing() {
    let harness = Harness::with_label("alice");
    let history = vec![
        claim(&harness, H1, OWNER, (10, 0), 1_700_000_010),
        deploy(&harness, CLONE, OWNER, (11, 0)),
        point(&harness, H1, CLONE, (12, 0)),
        text(CLONE, "v1", (13, 0)),
        log(
            &registry::Transfer {
                labelhash: H1,
                owner: OPERATOR,
            },
            harness.deployment.registry,
            (14, 0),
            1_700_000_014,
        ),
    ];

    harness.deliver(&history).await;
    let credentials = harness.store().scan::<Credential>(|_| true).unwrap();
    let resolvers = harness.store().scan::<Resolver>(|_| true).unwrap();
    let texts = harness.store().scan::<TextRecord>(|_| true).unwrap();

    harness.deliver(&history).await;
    assert_eq!(harness.store().scan::<Credential>(|_| true).unwrap(), credentials);
    assert_eq!(harness.store().scan::<Resolver>(|_| true).unwrap(), resolvers);
    assert_eq!(harness.store().scan::<TextRecord>(|_| true).unwrap(), texts);
    assert_eq!(
        harness
            .store()
            .count::<credindex_ecs::storage::CredentialTransfer>()
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn unrelated_keys_commute() {
    let forward = Harness::with_label("alice");
    let backward = Harness::with_label("alice");
    let review = |harness: &Harness, labelhash, at: (u64, u64)| {
        log(
            &registry::ResolverReviewUpdated {
                labelhash,
                review: "ok".to_string(),
            },
            harness.deployment.registry,
            at,
            1_700_000_000 + at.0,
        )
    };

    let a1 = claim(&forward, H1, OWNER, (10, 0), 1_700_000_010);
    let a2 = claim(&forward, H2, OPERATOR, (10, 1), 1_700_000_010);
    let r1 = review(&forward, H1, (11, 0));
    let r2 = review(&forward, H2, (11, 1));

    forward.deliver(&[a1.clone(), a2.clone(), r1.clone(), r2.clone()]).await;
    backward.deliver(&[a2, r2]).await;
    backward.deliver(&[a1, r1]).await;

    let mut left = forward.store().scan::<Credential>(|_| true).unwrap();
    let mut right = backward.store().scan::<Credential>(|_| true).unwrap();
    left.sort_by(|a, b| a.id.cmp(&b.id));
    right.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(left, right);
    assert_eq!(left.len(), 2);
}

#[tokio::test]
async fn partial_updates_keep_ungoverned_fields() {
    let harness = Harness::with_label("alice");
    harness
        .deliver(&[
            claim(&harness, H1, OWNER, (10, 0), 1_700_000_010),
            log(
                &registry::ResolverReviewUpdated {
                    labelhash: H1,
                    review: "verified".to_string(),
                },
                harness.deployment.registry,
                (11, 0),
                1_700_000_011,
            ),
            log(
                &registry::Transfer {
                    labelhash: H1,
                    owner: OPERATOR,
                },
                harness.deployment.registry,
                (12, 0),
                1_700_000_012,
            ),
        ])
        .await;

    let credential = harness.credential(H1).unwrap();
    assert_eq!(credential.owner, keys::hex_address(&OPERATOR));
    assert_eq!(credential.review.as_deref(), Some("verified"));
    assert_eq!(credential.label.as_deref(), Some("alice"));
    assert_eq!(credential.expiration, U256::from(1_800_000_000u64));
    assert_eq!(credential.registered.block_number, 10);
    assert_eq!(credential.last_update.block_number, 12);
}

#[tokio::test]
async fn failed_label_read_keeps_existing_label() {
    let harness = Harness::with_label("alice");
    harness
        .deliver(&[claim(&harness, H1, OWNER, (10, 0), 1_700_000_010)])
        .await;

    // Same store, reader now failing every call.
    let degraded = EcsSink::new(harness.sink.store().clone(), BestEffortReader::disabled());
    let envelopes = harness
        .decoder
        .decode(&[claim(&harness, H1, OPERATOR, (20, 0), 1_700_000_020)])
        .await
        .unwrap();
    degraded
        .process(&envelopes, &ExtractionBatch::empty(11155111))
        .await
        .unwrap();

    let credential = harness.credential(H1).unwrap();
    assert_eq!(credential.owner, keys::hex_address(&OPERATOR));
    assert_eq!(credential.label.as_deref(), Some("alice"));
    assert_eq!(credential.expiration, U256::from(1_800_000_000u64));
    assert_eq!(credential.resolver_updated_at, 1_700_000_010);
}

#[tokio::test]
async fn events_for_missing_credentials_create_nothing() {
    let harness = Harness::with_label("alice");
    harness
        .deliver(&[log(
            &registry::ResolverReviewUpdated {
                labelhash: H2,
                review: "ghost".to_string(),
            },
            harness.deployment.registry,
            (5, 0),
            1_700_000_005,
        )])
        .await;
    assert_eq!(harness.store().count::<Credential>().unwrap(), 0);
}

#[tokio::test]
async fn resolver_events_require_admission() {
    let harness = Harness::with_label("alice");

    harness.deliver(&[text(STRANGER, "spam", (30, 0))]).await;
    assert_eq!(harness.store().count::<TextRecord>().unwrap(), 0);
    assert!(harness.resolver(STRANGER).is_none());

    // The registry points a credential at it: admitted from then on.
    harness
        .deliver(&[
            claim(&harness, H1, OWNER, (31, 0), 1_700_000_031),
            point(&harness, H1, STRANGER, (32, 0)),
            text(STRANGER, "hello", (33, 0)),
        ])
        .await;

    let resolver = harness.resolver(STRANGER).unwrap();
    assert_eq!(resolver.labelhash, Some(keys::hex_b256(&H1)));
    assert_eq!(resolver.label.as_deref(), Some("alice"));
    assert_eq!(resolver.owner, keys::hex_address(&Address::ZERO));
    assert_eq!(resolver.deployed.block_number, 33);

    let records = harness.store().scan::<TextRecord>(|_| true).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].value, "hello");
}

#[tokio::test]
async fn lookups_ignore_hex_case() {
    let harness = Harness::with_label("alice");
    harness
        .deliver(&[claim(&harness, H1, OWNER, (10, 0), 1_700_000_010)])
        .await;

    let upper = format!("0x{}", hex_upper(&H1));
    let credential: Option<Credential> = harness
        .store()
        .find(&keys::credential_hex(11155111, &upper))
        .unwrap();
    assert!(credential.is_some());
}

fn hex_upper(hash: &B256) -> String {
    hash.iter().map(|byte| format!("{byte:02X}")).collect()
}

#[tokio::test]
async fn replaying_an_announced_resolver_converges() {
    let harness = Harness::with_label("alice");
    let history = vec![
        claim(&harness, H1, OWNER, (31, 0), 1_700_000_031),
        point(&harness, H1, STRANGER, (32, 0)),
        text(STRANGER, "hello", (33, 0)),
    ];

    harness.deliver(&history).await;
    let resolvers = harness.store().scan::<Resolver>(|_| true).unwrap();
    let credentials = harness.store().scan::<Credential>(|_| true).unwrap();
    assert_eq!(resolvers.len(), 1);
    assert_eq!(resolvers[0].last_update.block_number, 33);

    harness.deliver(&history).await;
    assert_eq!(harness.store().scan::<Resolver>(|_| true).unwrap(), resolvers);
    assert_eq!(harness.store().scan::<Credential>(|_| true).unwrap(), credentials);
}

#[tokio::test]
async fn label_not_matching_the_claimed_topic_is_not_stored() {
    let harness = Harness::with_label("alice");
    harness
        .deliver(&[claim_with_label(&harness, H1, "mallory", OWNER, (10, 0), 1_700_000_010)])
        .await;

    let credential = harness.credential(H1).unwrap();
    assert_eq!(credential.owner, keys::hex_address(&OWNER));
    assert_eq!(credential.label, None);
    assert_eq!(credential.full_name, None);
}

#[tokio::test]
async fn eth_address_change_sets_cached_address_and_coin_60_record() {
    let harness = Harness::with_label("alice");
    let changed = log(
        &resolver::AddrChanged { a: OPERATOR },
        CLONE,
        (12, 0),
        1_700_000_012,
    );
    harness
        .deliver(&[deploy(&harness, CLONE, OWNER, (11, 0)), changed.clone()])
        .await;
    harness.deliver(&[changed]).await;

    let resolver = harness.resolver(CLONE).unwrap();
    assert_eq!(resolver.eth_address, Some(keys::hex_address(&OPERATOR)));
    assert_eq!(resolver.last_update.block_number, 12);

    let records = harness.store().scan::<AddressRecord>(|_| true).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, keys::address_record(11155111, &CLONE, &U256::from(60)));
    assert_eq!(records[0].address, keys::hex_address(&OPERATOR));
}

#[tokio::test]
async fn only_twenty_byte_coin_60_addresses_refresh_the_cached_address() {
    let harness = Harness::with_label("alice");
    let address_changed = |value: Bytes, block_number| {
        log(
            &resolver::AddressChanged {
                coinType: U256::from(60),
                newAddress: value,
            },
            CLONE,
            (block_number, 0),
            1_700_000_000 + block_number,
        )
    };
    harness
        .deliver(&[
            deploy(&harness, CLONE, OWNER, (11, 0)),
            address_changed(Bytes::copy_from_slice(OPERATOR.as_slice()), 12),
        ])
        .await;
    assert_eq!(
        harness.resolver(CLONE).unwrap().eth_address,
        Some(keys::hex_address(&OPERATOR))
    );

    let short = Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]);
    harness.deliver(&[address_changed(short.clone(), 13)]).await;

    let resolver = harness.resolver(CLONE).unwrap();
    assert_eq!(resolver.eth_address, Some(keys::hex_address(&OPERATOR)));

    let records = harness.store().scan::<AddressRecord>(|_| true).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].address, keys::hex_bytes(&short));
    assert_eq!(records[0].set_at.block_number, 12);
    assert_eq!(records[0].last_update.block_number, 13);
}

#[tokio::test]
async fn contenthash_change_is_stored_on_the_resolver() {
    let harness = Harness::with_label("alice");
    let hash = Bytes::from_static(&[0xe3, 0x01, 0x01, 0x70]);
    harness
        .deliver(&[
            deploy(&harness, CLONE, OWNER, (11, 0)),
            log(
                &resolver::ContenthashChanged { hash: hash.clone() },
                CLONE,
                (12, 0),
                1_700_000_012,
            ),
        ])
        .await;

    let resolver = harness.resolver(CLONE).unwrap();
    assert_eq!(resolver.contenthash, Some(keys::hex_bytes(&hash)));
    assert_eq!(resolver.last_update.block_number, 12);
}

#[tokio::test]
async fn contract_metadata_is_overwritten_per_key() {
    let harness = Harness::with_label("alice");
    let metadata = |value: &str, block_number| {
        log(
            &resolver::ContractMetadataUpdated {
                indexedKey: keccak256("avatar"),
                key: "avatar".to_string(),
                value: Bytes::copy_from_slice(value.as_bytes()),
            },
            CLONE,
            (block_number, 0),
            1_700_000_000 + block_number,
        )
    };
    harness
        .deliver(&[
            deploy(&harness, CLONE, OWNER, (11, 0)),
            metadata("first", 12),
            metadata("second", 13),
        ])
        .await;

    let entries = harness.store().scan::<ContractMetadataEntry>(|_| true).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, keys::record(11155111, &CLONE, "avatar"));
    assert_eq!(entries[0].value, keys::hex_bytes("second".as_bytes()));
    assert_eq!(entries[0].set_at.block_number, 12);
    assert_eq!(entries[0].last_update.block_number, 13);
}

#[tokio::test]
async fn redelivered_ownership_transfer_keeps_one_history_row() {
    let harness = Harness::with_label("alice");
    let transfer = log(
        &resolver::OwnershipTransferred {
            previousOwner: OWNER,
            newOwner: OPERATOR,
        },
        CLONE,
        (12, 0),
        1_700_000_012,
    );
    harness
        .deliver(&[deploy(&harness, CLONE, OWNER, (11, 0)), transfer.clone()])
        .await;
    harness.deliver(&[transfer]).await;

    assert_eq!(harness.store().count::<ResolverTransfer>().unwrap(), 1);
    let resolver = harness.resolver(CLONE).unwrap();
    assert_eq!(resolver.owner, keys::hex_address(&OPERATOR));
    assert_eq!(resolver.last_update.block_number, 12);
}

#[tokio::test]
async fn record_events_from_unadmitted_contracts_are_dropped() {
    let harness = Harness::with_label("alice");
    harness
        .deliver(&[
            log(&resolver::AddrChanged { a: OPERATOR }, STRANGER, (40, 0), 1_700_000_040),
            log(
                &resolver::AddressChanged {
                    coinType: U256::from(60),
                    newAddress: Bytes::copy_from_slice(OPERATOR.as_slice()),
                },
                STRANGER,
                (40, 1),
                1_700_000_040,
            ),
            log(
                &resolver::ContenthashChanged {
                    hash: Bytes::from_static(&[0x01]),
                },
                STRANGER,
                (40, 2),
                1_700_000_040,
            ),
            log(
                &resolver::ContractMetadataUpdated {
                    indexedKey: keccak256("avatar"),
                    key: "avatar".to_string(),
                    value: Bytes::from_static(b"x"),
                },
                STRANGER,
                (40, 3),
                1_700_000_040,
            ),
            log(
                &resolver::OwnershipTransferred {
                    previousOwner: OWNER,
                    newOwner: OPERATOR,
                },
                STRANGER,
                (40, 4),
                1_700_000_040,
            ),
        ])
        .await;

    assert!(harness.resolver(STRANGER).is_none());
    assert_eq!(harness.store().count::<Resolver>().unwrap(), 0);
    assert_eq!(harness.store().count::<AddressRecord>().unwrap(), 0);
    assert_eq!(harness.store().count::<ContractMetadataEntry>().unwrap(), 0);
    assert_eq!(harness.store().count::<ResolverTransfer>().unwrap(), 0);
}

fn registered(harness: &Harness, label: &str, cost: u64, at: (u64, u64)) -> RawLog {
    log(
        &registrar::NameRegistered {
            label: keccak256(label),
            owner: OWNER,
            cost: U256::from(cost),
            expires: U256::from(1_900_000_000u64),
        },
        harness.deployment.registrar,
        at,
        1_700_000_000 + at.0,
    )
}

fn renewed(harness: &Harness, label: &str, at: (u64, u64)) -> RawLog {
    log(
        &registrar::NameRenewed {
            label: keccak256(label),
            cost: U256::from(5u64),
            newExpiration: U256::from(1_950_000_000u64),
        },
        harness.deployment.registrar,
        at,
        1_700_000_000 + at.0,
    )
}

#[tokio::test]
async fn name_registration_sets_only_the_cost_of_the_matching_credential() {
    let harness = Harness::with_label("alice");
    harness
        .deliver(&[
            claim(&harness, H1, OWNER, (10, 0), 1_700_000_010),
            registered(&harness, "alice", 1_000, (11, 0)),
        ])
        .await;

    let credential = harness.credential(H1).unwrap();
    assert_eq!(credential.registration_cost, Some(U256::from(1_000u64)));
    assert_eq!(credential.last_update.block_number, 11);
    assert_eq!(credential.expiration, U256::from(1_800_000_000u64));
    assert_eq!(credential.owner, keys::hex_address(&OWNER));
    assert_eq!(credential.registered.block_number, 10);
}

#[tokio::test]
async fn name_registration_without_credential_creates_nothing() {
    let harness = Harness::with_label("alice");
    harness
        .deliver(&[
            claim(&harness, H1, OWNER, (10, 0), 1_700_000_010),
            registered(&harness, "bob", 1_000, (11, 0)),
        ])
        .await;

    assert_eq!(harness.store().count::<Credential>().unwrap(), 1);
    assert!(harness.credential(keccak256("bob")).is_none());
    assert_eq!(harness.credential(H1).unwrap().registration_cost, None);
}

#[tokio::test]
async fn renewals_record_whether_the_label_was_matched() {
    let harness = Harness::with_label("alice");
    let history = vec![
        claim(&harness, H1, OWNER, (10, 0), 1_700_000_010),
        renewed(&harness, "alice", (11, 0)),
        renewed(&harness, "bob", (11, 1)),
    ];
    harness.deliver(&history).await;
    harness.deliver(&history).await;

    let renewals = harness.store().scan::<Renewal>(|_| true).unwrap();
    assert_eq!(renewals.len(), 2);

    let matched = renewals.iter().find(|renewal| !renewal.labelhash_unverified).unwrap();
    assert_eq!(matched.labelhash, keys::hex_b256(&H1));
    assert_eq!(matched.new_expiration, U256::from(1_950_000_000u64));

    let unmatched = renewals.iter().find(|renewal| renewal.labelhash_unverified).unwrap();
    assert_eq!(unmatched.labelhash, keys::hex_b256(&keccak256("bob")));
}
