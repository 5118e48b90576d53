//! SQLite entity store.
//!
//! One table per entity, each keyed by a chain-qualified text `id` (see [`crate::keys`]).
//! Writes go through a small generic contract (`find`, `scan`, `upsert`, `update`,
//! `insert_ignore`) so reconciliation code never writes SQL.
//!
//! Column conventions:
//! - addresses, hashes and byte strings are lower-case `0x` hex text
//! - 256-bit integers are decimal text
//! - block numbers and timestamps are integers
//!
//! There are no foreign keys. Credentials and resolvers reference each other softly and
//! either side may be missing.

use alloy_primitives::U256;
use anyhow::{anyhow, bail, Context, Result};
use rusqlite::types::{ToSql, Type};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS credentials (
    id TEXT PRIMARY KEY,
    chain_id INTEGER NOT NULL,
    chain_name TEXT NOT NULL,
    labelhash TEXT NOT NULL,
    label TEXT,
    full_name TEXT,
    owner TEXT NOT NULL,
    resolver_address TEXT,
    resolver_updated_at INTEGER NOT NULL,
    review TEXT,
    expiration TEXT NOT NULL,
    is_expired INTEGER NOT NULL,
    registration_cost TEXT,
    registered_block INTEGER NOT NULL,
    registered_timestamp INTEGER NOT NULL,
    registered_tx TEXT NOT NULL,
    updated_block INTEGER NOT NULL,
    updated_timestamp INTEGER NOT NULL,
    updated_tx TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_credentials_owner ON credentials(owner);
CREATE INDEX IF NOT EXISTS idx_credentials_resolver ON credentials(resolver_address);

CREATE TABLE IF NOT EXISTS resolvers (
    id TEXT PRIMARY KEY,
    chain_id INTEGER NOT NULL,
    chain_name TEXT NOT NULL,
    address TEXT NOT NULL,
    owner TEXT NOT NULL,
    labelhash TEXT,
    label TEXT,
    eth_address TEXT,
    contenthash TEXT,
    deployed_block INTEGER NOT NULL,
    deployed_timestamp INTEGER NOT NULL,
    deployed_tx TEXT NOT NULL,
    updated_block INTEGER NOT NULL,
    updated_timestamp INTEGER NOT NULL,
    updated_tx TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS text_records (
    id TEXT PRIMARY KEY,
    chain_id INTEGER NOT NULL,
    resolver TEXT NOT NULL,
    key TEXT NOT NULL,
    key_hash TEXT,
    key_synthesized INTEGER NOT NULL,
    value TEXT NOT NULL,
    set_block INTEGER NOT NULL,
    set_timestamp INTEGER NOT NULL,
    set_tx TEXT NOT NULL,
    updated_block INTEGER NOT NULL,
    updated_timestamp INTEGER NOT NULL,
    updated_tx TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_text_records_resolver ON text_records(chain_id, resolver);

CREATE TABLE IF NOT EXISTS address_records (
    id TEXT PRIMARY KEY,
    chain_id INTEGER NOT NULL,
    resolver TEXT NOT NULL,
    coin_type TEXT NOT NULL,
    address TEXT NOT NULL,
    set_block INTEGER NOT NULL,
    set_timestamp INTEGER NOT NULL,
    set_tx TEXT NOT NULL,
    updated_block INTEGER NOT NULL,
    updated_timestamp INTEGER NOT NULL,
    updated_tx TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS contract_metadata (
    id TEXT PRIMARY KEY,
    chain_id INTEGER NOT NULL,
    resolver TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    set_block INTEGER NOT NULL,
    set_timestamp INTEGER NOT NULL,
    set_tx TEXT NOT NULL,
    updated_block INTEGER NOT NULL,
    updated_timestamp INTEGER NOT NULL,
    updated_tx TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_contract_metadata_resolver ON contract_metadata(chain_id, resolver);

CREATE TABLE IF NOT EXISTS credential_transfers (
    id TEXT PRIMARY KEY,
    chain_id INTEGER NOT NULL,
    labelhash TEXT NOT NULL,
    new_owner TEXT NOT NULL,
    block_number INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    tx_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS resolver_transfers (
    id TEXT PRIMARY KEY,
    chain_id INTEGER NOT NULL,
    resolver TEXT NOT NULL,
    previous_owner TEXT NOT NULL,
    new_owner TEXT NOT NULL,
    block_number INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    tx_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS renewals (
    id TEXT PRIMARY KEY,
    chain_id INTEGER NOT NULL,
    labelhash TEXT NOT NULL,
    labelhash_unverified INTEGER NOT NULL,
    cost TEXT NOT NULL,
    new_expiration TEXT NOT NULL,
    block_number INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    tx_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS approvals (
    id TEXT PRIMARY KEY,
    chain_id INTEGER NOT NULL,
    owner TEXT NOT NULL,
    operator TEXT NOT NULL,
    approved INTEGER NOT NULL,
    set_block INTEGER NOT NULL,
    set_timestamp INTEGER NOT NULL,
    set_tx TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS admissions (
    id TEXT PRIMARY KEY,
    chain_id INTEGER NOT NULL,
    resolver TEXT NOT NULL,
    labelhash TEXT NOT NULL,
    announced_block INTEGER NOT NULL,
    announced_timestamp INTEGER NOT NULL,
    announced_tx TEXT NOT NULL
);
";

/// Where and when a fact was observed on chain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Provenance {
    pub block_number: u64,
    pub timestamp: u64,
    pub tx_hash: String,
}

impl Provenance {
    /// The later of two observations. Ties keep `self`, so re-applying older events never
    /// moves a row's last update backwards.
    pub fn latest(self, other: Self) -> Self {
        if other.block_number > self.block_number {
            other
        } else {
            self
        }
    }
}

/// A row type with a fixed table layout.
pub trait Entity: Sized {
    const TABLE: &'static str;
    /// Column names in parameter order. The first one is always `id`.
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> &str;

    /// Values in `COLUMNS` order.
    fn to_params(&self) -> Vec<Box<dyn ToSql>>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub id: String,
    pub chain_id: u64,
    pub chain_name: String,
    pub labelhash: String,
    pub label: Option<String>,
    pub full_name: Option<String>,
    pub owner: String,
    pub resolver_address: Option<String>,
    pub resolver_updated_at: u64,
    pub review: Option<String>,
    pub expiration: U256,
    pub is_expired: bool,
    /// From the registrar, matched to this credential through `keccak256(label)`.
    pub registration_cost: Option<U256>,
    pub registered: Provenance,
    pub last_update: Provenance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolver {
    pub id: String,
    pub chain_id: u64,
    pub chain_name: String,
    pub address: String,
    pub owner: String,
    pub labelhash: Option<String>,
    pub label: Option<String>,
    pub eth_address: Option<String>,
    pub contenthash: Option<String>,
    pub deployed: Provenance,
    pub last_update: Provenance,
}

/// Text record. When the plaintext key was only available as an indexed topic the row
/// is keyed per occurrence, `key_synthesized` is set and `key_hash` holds the topic, so
/// one logical key may be spread over several rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRecord {
    pub id: String,
    pub chain_id: u64,
    pub resolver: String,
    pub key: String,
    pub key_hash: Option<String>,
    pub key_synthesized: bool,
    pub value: String,
    pub set_at: Provenance,
    pub last_update: Provenance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub id: String,
    pub chain_id: u64,
    pub resolver: String,
    pub coin_type: U256,
    pub address: String,
    pub set_at: Provenance,
    pub last_update: Provenance,
}

/// Contract metadata entry; `value` is the raw bytes as hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractMetadataEntry {
    pub id: String,
    pub chain_id: u64,
    pub resolver: String,
    pub key: String,
    pub value: String,
    pub set_at: Provenance,
    pub last_update: Provenance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialTransfer {
    pub id: String,
    pub chain_id: u64,
    pub labelhash: String,
    pub new_owner: String,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverTransfer {
    pub id: String,
    pub chain_id: u64,
    pub resolver: String,
    pub previous_owner: String,
    pub new_owner: String,
    pub provenance: Provenance,
}

/// Renewal history row. The registrar only exposes `keccak256(label)` as an indexed topic.
/// When a credential with that label hash (or a stored label hashing to it) is known,
/// `labelhash` is that credential's and `labelhash_unverified` is false; otherwise the raw
/// topic is recorded and flagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renewal {
    pub id: String,
    pub chain_id: u64,
    pub labelhash: String,
    pub labelhash_unverified: bool,
    pub cost: U256,
    pub new_expiration: U256,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approval {
    pub id: String,
    pub chain_id: u64,
    pub owner: String,
    pub operator: String,
    pub approved: bool,
    pub set_at: Provenance,
}

/// A resolver announced by the registry that has not emitted an accepted event yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub id: String,
    pub chain_id: u64,
    pub resolver: String,
    pub labelhash: String,
    pub announced: Provenance,
}

type Params = Vec<Box<dyn ToSql>>;

fn push_u64(params: &mut Params, value: u64) {
    params.push(Box::new(value as i64));
}

fn push_u256(params: &mut Params, value: &U256) {
    params.push(Box::new(value.to_string()));
}

fn push_provenance(params: &mut Params, provenance: &Provenance) {
    push_u64(params, provenance.block_number);
    push_u64(params, provenance.timestamp);
    params.push(Box::new(provenance.tx_hash.clone()));
}

fn get_u64(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(idx)? as u64)
}

fn parse_u256(idx: usize, text: &str) -> rusqlite::Result<U256> {
    U256::from_str(text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.to_string().into())
    })
}

fn get_u256(row: &Row<'_>, idx: usize) -> rusqlite::Result<U256> {
    let text: String = row.get(idx)?;
    parse_u256(idx, &text)
}

fn get_opt_u256(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<U256>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|text| parse_u256(idx, &text)).transpose()
}

fn get_provenance(row: &Row<'_>, idx: usize) -> rusqlite::Result<Provenance> {
    Ok(Provenance {
        block_number: get_u64(row, idx)?,
        timestamp: get_u64(row, idx + 1)?,
        tx_hash: row.get(idx + 2)?,
    })
}

impl Entity for Credential {
    const TABLE: &'static str = "credentials";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "chain_id",
        "chain_name",
        "labelhash",
        "label",
        "full_name",
        "owner",
        "resolver_address",
        "resolver_updated_at",
        "review",
        "expiration",
        "is_expired",
        "registration_cost",
        "registered_block",
        "registered_timestamp",
        "registered_tx",
        "updated_block",
        "updated_timestamp",
        "updated_tx",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_params(&self) -> Params {
        let mut params: Params = vec![Box::new(self.id.clone())];
        push_u64(&mut params, self.chain_id);
        params.push(Box::new(self.chain_name.clone()));
        params.push(Box::new(self.labelhash.clone()));
        params.push(Box::new(self.label.clone()));
        params.push(Box::new(self.full_name.clone()));
        params.push(Box::new(self.owner.clone()));
        params.push(Box::new(self.resolver_address.clone()));
        push_u64(&mut params, self.resolver_updated_at);
        params.push(Box::new(self.review.clone()));
        push_u256(&mut params, &self.expiration);
        params.push(Box::new(self.is_expired));
        params.push(Box::new(self.registration_cost.map(|cost| cost.to_string())));
        push_provenance(&mut params, &self.registered);
        push_provenance(&mut params, &self.last_update);
        params
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            chain_id: get_u64(row, 1)?,
            chain_name: row.get(2)?,
            labelhash: row.get(3)?,
            label: row.get(4)?,
            full_name: row.get(5)?,
            owner: row.get(6)?,
            resolver_address: row.get(7)?,
            resolver_updated_at: get_u64(row, 8)?,
            review: row.get(9)?,
            expiration: get_u256(row, 10)?,
            is_expired: row.get(11)?,
            registration_cost: get_opt_u256(row, 12)?,
            registered: get_provenance(row, 13)?,
            last_update: get_provenance(row, 16)?,
        })
    }
}

impl Entity for Resolver {
    const TABLE: &'static str = "resolvers";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "chain_id",
        "chain_name",
        "address",
        "owner",
        "labelhash",
        "label",
        "eth_address",
        "contenthash",
        "deployed_block",
        "deployed_timestamp",
        "deployed_tx",
        "updated_block",
        "updated_timestamp",
        "updated_tx",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_params(&self) -> Params {
        let mut params: Params = vec![Box::new(self.id.clone())];
        push_u64(&mut params, self.chain_id);
        params.push(Box::new(self.chain_name.clone()));
        params.push(Box::new(self.address.clone()));
        params.push(Box::new(self.owner.clone()));
        params.push(Box::new(self.labelhash.clone()));
        params.push(Box::new(self.label.clone()));
        params.push(Box::new(self.eth_address.clone()));
        params.push(Box::new(self.contenthash.clone()));
        push_provenance(&mut params, &self.deployed);
        push_provenance(&mut params, &self.last_update);
        params
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            chain_id: get_u64(row, 1)?,
            chain_name: row.get(2)?,
            address: row.get(3)?,
            owner: row.get(4)?,
            labelhash: row.get(5)?,
            label: row.get(6)?,
            eth_address: row.get(7)?,
            contenthash: row.get(8)?,
            deployed: get_provenance(row, 9)?,
            last_update: get_provenance(row, 12)?,
        })
    }
}

impl Entity for TextRecord {
    const TABLE: &'static str = "text_records";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "chain_id",
        "resolver",
        "key",
        "key_hash",
        "key_synthesized",
        "value",
        "set_block",
        "set_timestamp",
        "set_tx",
        "updated_block",
        "updated_timestamp",
        "updated_tx",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_params(&self) -> Params {
        let mut params: Params = vec![Box::new(self.id.clone())];
        push_u64(&mut params, self.chain_id);
        params.push(Box::new(self.resolver.clone()));
        params.push(Box::new(self.key.clone()));
        params.push(Box::new(self.key_hash.clone()));
        params.push(Box::new(self.key_synthesized));
        params.push(Box::new(self.value.clone()));
        push_provenance(&mut params, &self.set_at);
        push_provenance(&mut params, &self.last_update);
        params
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            chain_id: get_u64(row, 1)?,
            resolver: row.get(2)?,
            key: row.get(3)?,
            key_hash: row.get(4)?,
            key_synthesized: row.get(5)?,
            value: row.get(6)?,
            set_at: get_provenance(row, 7)?,
            last_update: get_provenance(row, 10)?,
        })
    }
}

impl Entity for AddressRecord {
    const TABLE: &'static str = "address_records";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "chain_id",
        "resolver",
        "coin_type",
        "address",
        "set_block",
        "set_timestamp",
        "set_tx",
        "updated_block",
        "updated_timestamp",
        "updated_tx",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_params(&self) -> Params {
        let mut params: Params = vec![Box::new(self.id.clone())];
        push_u64(&mut params, self.chain_id);
        params.push(Box::new(self.resolver.clone()));
        push_u256(&mut params, &self.coin_type);
        params.push(Box::new(self.address.clone()));
        push_provenance(&mut params, &self.set_at);
        push_provenance(&mut params, &self.last_update);
        params
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            chain_id: get_u64(row, 1)?,
            resolver: row.get(2)?,
            coin_type: get_u256(row, 3)?,
            address: row.get(4)?,
            set_at: get_provenance(row, 5)?,
            last_update: get_provenance(row, 8)?,
        })
    }
}

impl Entity for ContractMetadataEntry {
    const TABLE: &'static str = "contract_metadata";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "chain_id",
        "resolver",
        "key",
        "value",
        "set_block",
        "set_timestamp",
        "set_tx",
        "updated_block",
        "updated_timestamp",
        "updated_tx",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_params(&self) -> Params {
        let mut params: Params = vec![Box::new(self.id.clone())];
        push_u64(&mut params, self.chain_id);
        params.push(Box::new(self.resolver.clone()));
        params.push(Box::new(self.key.clone()));
        params.push(Box::new(self.value.clone()));
        push_provenance(&mut params, &self.set_at);
        push_provenance(&mut params, &self.last_update);
        params
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            chain_id: get_u64(row, 1)?,
            resolver: row.get(2)?,
            key: row.get(3)?,
            value: row.get(4)?,
            set_at: get_provenance(row, 5)?,
            last_update: get_provenance(row, 8)?,
        })
    }
}

impl Entity for CredentialTransfer {
    const TABLE: &'static str = "credential_transfers";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "chain_id",
        "labelhash",
        "new_owner",
        "block_number",
        "timestamp",
        "tx_hash",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_params(&self) -> Params {
        let mut params: Params = vec![Box::new(self.id.clone())];
        push_u64(&mut params, self.chain_id);
        params.push(Box::new(self.labelhash.clone()));
        params.push(Box::new(self.new_owner.clone()));
        push_provenance(&mut params, &self.provenance);
        params
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            chain_id: get_u64(row, 1)?,
            labelhash: row.get(2)?,
            new_owner: row.get(3)?,
            provenance: get_provenance(row, 4)?,
        })
    }
}

impl Entity for ResolverTransfer {
    const TABLE: &'static str = "resolver_transfers";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "chain_id",
        "resolver",
        "previous_owner",
        "new_owner",
        "block_number",
        "timestamp",
        "tx_hash",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_params(&self) -> Params {
        let mut params: Params = vec![Box::new(self.id.clone())];
        push_u64(&mut params, self.chain_id);
        params.push(Box::new(self.resolver.clone()));
        params.push(Box::new(self.previous_owner.clone()));
        params.push(Box::new(self.new_owner.clone()));
        push_provenance(&mut params, &self.provenance);
        params
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            chain_id: get_u64(row, 1)?,
            resolver: row.get(2)?,
            previous_owner: row.get(3)?,
            new_owner: row.get(4)?,
            provenance: get_provenance(row, 5)?,
        })
    }
}

impl Entity for Renewal {
    const TABLE: &'static str = "renewals";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "chain_id",
        "labelhash",
        "labelhash_unverified",
        "cost",
        "new_expiration",
        "block_number",
        "timestamp",
        "tx_hash",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_params(&self) -> Params {
        let mut params: Params = vec![Box::new(self.id.clone())];
        push_u64(&mut params, self.chain_id);
        params.push(Box::new(self.labelhash.clone()));
        params.push(Box::new(self.labelhash_unverified));
        push_u256(&mut params, &self.cost);
        push_u256(&mut params, &self.new_expiration);
        push_provenance(&mut params, &self.provenance);
        params
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            chain_id: get_u64(row, 1)?,
            labelhash: row.get(2)?,
            labelhash_unverified: row.get(3)?,
            cost: get_u256(row, 4)?,
            new_expiration: get_u256(row, 5)?,
            provenance: get_provenance(row, 6)?,
        })
    }
}

impl Entity for Approval {
    const TABLE: &'static str = "approvals";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "chain_id",
        "owner",
        "operator",
        "approved",
        "set_block",
        "set_timestamp",
        "set_tx",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_params(&self) -> Params {
        let mut params: Params = vec![Box::new(self.id.clone())];
        push_u64(&mut params, self.chain_id);
        params.push(Box::new(self.owner.clone()));
        params.push(Box::new(self.operator.clone()));
        params.push(Box::new(self.approved));
        push_provenance(&mut params, &self.set_at);
        params
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            chain_id: get_u64(row, 1)?,
            owner: row.get(2)?,
            operator: row.get(3)?,
            approved: row.get(4)?,
            set_at: get_provenance(row, 5)?,
        })
    }
}

impl Entity for Admission {
    const TABLE: &'static str = "admissions";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "chain_id",
        "resolver",
        "labelhash",
        "announced_block",
        "announced_timestamp",
        "announced_tx",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_params(&self) -> Params {
        let mut params: Params = vec![Box::new(self.id.clone())];
        push_u64(&mut params, self.chain_id);
        params.push(Box::new(self.resolver.clone()));
        params.push(Box::new(self.labelhash.clone()));
        push_provenance(&mut params, &self.announced);
        params
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            chain_id: get_u64(row, 1)?,
            resolver: row.get(2)?,
            labelhash: row.get(3)?,
            announced: get_provenance(row, 4)?,
        })
    }
}

/// Result of [`EcsStore::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Inserted,
    Updated,
}

fn select_sql<E: Entity>(clause: &str) -> String {
    format!("SELECT {} FROM {} {clause}", E::COLUMNS.join(", "), E::TABLE)
}

fn placeholders<E: Entity>() -> String {
    (1..=E::COLUMNS.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_sql<E: Entity>() -> String {
    let assignments = E::COLUMNS[1..]
        .iter()
        .map(|column| format!("{column} = excluded.{column}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {assignments}",
        E::TABLE,
        E::COLUMNS.join(", "),
        placeholders::<E>()
    )
}

fn read_one<E: Entity>(conn: &Connection, id: &str) -> Result<Option<E>> {
    conn.query_row(&select_sql::<E>("WHERE id = ?1"), [id], E::from_row)
        .optional()
        .with_context(|| format!("failed to read {} row {id}", E::TABLE))
}

fn write_one<E: Entity>(conn: &Connection, row: &E) -> Result<()> {
    let params = row.to_params();
    conn.execute(&write_sql::<E>(), params_from_iter(params.iter()))
        .with_context(|| format!("failed to write {} row {}", E::TABLE, row.id()))?;
    Ok(())
}

/// Entity store backed by one SQLite connection.
pub struct EcsStore {
    conn: Mutex<Connection>,
}

impl EcsStore {
    /// Create or open the database.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open entity store at {}", path.display()))?;
        let store = Self::init(conn)?;
        tracing::info!(target: "credindex_ecs::storage", path = %path.display(), "Entity store ready");
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA temp_store=MEMORY;
             PRAGMA busy_timeout=5000;",
        )?;
        conn.execute_batch(SCHEMA)
            .context("failed to create entity tables")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("entity store lock poisoned"))
    }

    pub fn find<E: Entity>(&self, id: &str) -> Result<Option<E>> {
        let conn = self.lock()?;
        read_one(&conn, id)
    }

    /// Full-table scan, filtered in memory. Row order is unspecified.
    pub fn scan<E: Entity>(&self, predicate: impl Fn(&E) -> bool) -> Result<Vec<E>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&select_sql::<E>(""))?;
        let rows = stmt.query_map([], E::from_row)?;

        let mut matched = Vec::new();
        for row in rows {
            let row = row.with_context(|| format!("failed to decode {} row", E::TABLE))?;
            if predicate(&row) {
                matched.push(row);
            }
        }
        Ok(matched)
    }

    /// Insert `insert` if its id is free, otherwise persist `update(existing)`.
    ///
    /// Runs in one transaction. `update` must keep the row id.
    pub fn upsert<E: Entity>(&self, insert: E, update: impl FnOnce(E) -> E) -> Result<Upserted> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let outcome = match read_one::<E>(&tx, insert.id())? {
            None => {
                write_one(&tx, &insert)?;
                Upserted::Inserted
            }
            Some(existing) => {
                let updated = update(existing);
                if updated.id() != insert.id() {
                    bail!(
                        "update changed {} row id from {} to {}",
                        E::TABLE,
                        insert.id(),
                        updated.id()
                    );
                }
                write_one(&tx, &updated)?;
                Upserted::Updated
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    /// Apply `update` to an existing row. Returns None, writing nothing, when there is no row.
    pub fn update<E: Entity>(&self, id: &str, update: impl FnOnce(E) -> E) -> Result<Option<E>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let Some(existing) = read_one::<E>(&tx, id)? else {
            return Ok(None);
        };
        let updated = update(existing);
        if updated.id() != id {
            bail!("update changed {} row id from {id} to {}", E::TABLE, updated.id());
        }
        write_one(&tx, &updated)?;

        tx.commit()?;
        Ok(Some(updated))
    }

    /// Insert unless the id exists. Returns whether a row was written.
    pub fn insert_ignore<E: Entity>(&self, row: &E) -> Result<bool> {
        let conn = self.lock()?;
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
            E::TABLE,
            E::COLUMNS.join(", "),
            placeholders::<E>()
        );
        let params = row.to_params();
        let changed = conn
            .execute(&sql, params_from_iter(params.iter()))
            .with_context(|| format!("failed to insert {} row {}", E::TABLE, row.id()))?;
        Ok(changed > 0)
    }

    pub fn count<E: Entity>(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", E::TABLE), [], |row| {
            row.get(0)
        })?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provenance(block_number: u64) -> Provenance {
        Provenance {
            block_number,
            timestamp: 1_700_000_000 + block_number,
            tx_hash: format!("0x{block_number:064x}"),
        }
    }

    fn credential(owner: &str) -> Credential {
        Credential {
            id: "1-0xaa".to_string(),
            chain_id: 1,
            chain_name: "mainnet".to_string(),
            labelhash: "0xaa".to_string(),
            label: Some("alice".to_string()),
            full_name: Some("alice.ecs.eth".to_string()),
            owner: owner.to_string(),
            resolver_address: None,
            resolver_updated_at: 1_700_000_001,
            review: None,
            expiration: U256::from(1_800_000_000u64),
            is_expired: false,
            registration_cost: None,
            registered: provenance(1),
            last_update: provenance(1),
        }
    }

    #[test]
    fn test_latest_provenance_never_goes_back() {
        assert_eq!(provenance(5).latest(provenance(7)), provenance(7));
        assert_eq!(provenance(7).latest(provenance(5)), provenance(7));

        let mut same_block = provenance(7);
        same_block.tx_hash = "0xother".to_string();
        assert_eq!(provenance(7).latest(same_block), provenance(7));
    }

    #[test]
    fn test_upsert_inserts_then_merges() {
        let store = EcsStore::in_memory().unwrap();

        let outcome = store.upsert(credential("0x01"), |existing| existing).unwrap();
        assert_eq!(outcome, Upserted::Inserted);

        let outcome = store
            .upsert(credential("0x02"), |existing| Credential {
                owner: "0x02".to_string(),
                last_update: provenance(5),
                ..existing
            })
            .unwrap();
        assert_eq!(outcome, Upserted::Updated);

        let stored: Credential = store.find("1-0xaa").unwrap().unwrap();
        assert_eq!(stored.owner, "0x02");
        assert_eq!(stored.registered, provenance(1));
        assert_eq!(stored.last_update, provenance(5));
        assert_eq!(stored.expiration, U256::from(1_800_000_000u64));
        assert_eq!(store.count::<Credential>().unwrap(), 1);
    }

    #[test]
    fn test_update_missing_row_writes_nothing() {
        let store = EcsStore::in_memory().unwrap();
        let updated = store
            .update::<Credential>("1-0xaa", |existing| existing)
            .unwrap();
        assert!(updated.is_none());
        assert_eq!(store.count::<Credential>().unwrap(), 0);
    }

    #[test]
    fn test_update_cannot_change_id() {
        let store = EcsStore::in_memory().unwrap();
        store.upsert(credential("0x01"), |existing| existing).unwrap();
        let result = store.update::<Credential>("1-0xaa", |existing| Credential {
            id: "1-0xbb".to_string(),
            ..existing
        });
        assert!(result.is_err());
        assert!(store.find::<Credential>("1-0xbb").unwrap().is_none());
    }

    #[test]
    fn test_insert_ignore_is_idempotent() {
        let store = EcsStore::in_memory().unwrap();
        let renewal = Renewal {
            id: "1-0xtx-3".to_string(),
            chain_id: 1,
            labelhash: "0xaa".to_string(),
            labelhash_unverified: true,
            cost: U256::from(10u64).pow(U256::from(18u64)),
            new_expiration: U256::from(1_900_000_000u64),
            provenance: provenance(9),
        };
        assert!(store.insert_ignore(&renewal).unwrap());
        assert!(!store.insert_ignore(&renewal).unwrap());

        let stored: Renewal = store.find("1-0xtx-3").unwrap().unwrap();
        assert_eq!(stored, renewal);
    }

    #[test]
    fn test_scan_filters_rows() {
        let store = EcsStore::in_memory().unwrap();
        for (id, approved) in [("1-a-b", true), ("1-a-c", false), ("2-a-b", true)] {
            let approval = Approval {
                id: id.to_string(),
                chain_id: id[..1].parse().unwrap(),
                owner: "a".to_string(),
                operator: id[4..].to_string(),
                approved,
                set_at: provenance(1),
            };
            store.insert_ignore(&approval).unwrap();
        }

        let approved = store.scan::<Approval>(|a| a.approved).unwrap();
        assert_eq!(approved.len(), 2);
        let chain_one = store.scan::<Approval>(|a| a.chain_id == 1).unwrap();
        assert_eq!(chain_one.len(), 2);
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecs.db");

        {
            let store = EcsStore::new(&path).unwrap();
            store.upsert(credential("0x01"), |existing| existing).unwrap();
        }

        let store = EcsStore::new(&path).unwrap();
        let stored: Credential = store.find("1-0xaa").unwrap().unwrap();
        assert_eq!(stored, credential("0x01"));
    }
}
