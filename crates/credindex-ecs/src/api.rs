//! Read API over the entity store.
//!
//! Routes (all GET):
//! - `/` and `/api/health` (public)
//! - `/api/credentials`, `/api/credentials/by-label/:label`, `/api/credentials/by-owner/:address`
//! - `/api/credentials/:chain_id/:labelhash` and `.../metadata` (public)
//! - `/api/resolvers`, `/api/resolvers/:chain_id/:address`
//! - `/api/resolvers/:chain_id/:address/info` (public), `.../text`, `.../metadata`
//! - `/api/stats`
//!
//! When an API key is configured every other route requires `Authorization: Bearer <key>`.
//! Path addresses and hashes are lower-cased before lookup; big integers, block numbers
//! and timestamps are rendered as decimal strings.

use axum::extract::{Path, Query, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::error::ApiError;
use crate::keys;
use crate::storage::{
    AddressRecord, ContractMetadataEntry, Credential, CredentialTransfer, EcsStore, Provenance,
    Renewal, Resolver, ResolverTransfer, TextRecord,
};

const PROTOCOL_VERSION: &str = "0.2.2-beta";
const CREDENTIAL_TYPE: &str = "https://eips.ethereum.org/EIPS/eip-8049#credential-v1";

type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Clone)]
pub struct ApiState {
    store: Arc<EcsStore>,
    api_key: Option<Arc<str>>,
}

impl ApiState {
    pub fn new(store: Arc<EcsStore>, api_key: Option<String>) -> Self {
        Self {
            store,
            api_key: api_key.map(Arc::from),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health))
        .route("/api/credentials", get(list_credentials))
        .route("/api/credentials/by-label/:label", get(credential_by_label))
        .route("/api/credentials/by-owner/:address", get(credentials_by_owner))
        .route("/api/credentials/:chain_id/:labelhash", get(credential_detail))
        .route("/api/credentials/:chain_id/:labelhash/metadata", get(credential_metadata))
        .route("/api/resolvers", get(list_resolvers))
        .route("/api/resolvers/:chain_id/:address", get(resolver_detail))
        .route("/api/resolvers/:chain_id/:address/info", get(resolver_info))
        .route("/api/resolvers/:chain_id/:address/text", get(resolver_text))
        .route("/api/resolvers/:chain_id/:address/metadata", get(resolver_metadata))
        .route("/api/stats", get(stats))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
}

/// Routes served without a key.
pub fn is_public_path(path: &str) -> bool {
    if path == "/" || path == "/api/health" {
        return true;
    }
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    matches!(
        segments.as_slice(),
        ["api", "credentials", _, _, "metadata"] | ["api", "resolvers", _, _, "info"]
    )
}

async fn require_api_key(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };
    if is_public_path(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized("Missing or invalid Authorization header"))?;
    if token != expected {
        return Err(ApiError::Unauthorized("Invalid API key"));
    }
    Ok(next.run(request).await)
}

/// Decodes a `0x` value to text when it is mostly printable; otherwise returns it as is.
pub fn try_decode_hex(value: &str) -> String {
    let Some(digits) = value.strip_prefix("0x") else {
        return value.to_string();
    };
    let Ok(bytes) = hex::decode(digits) else {
        return value.to_string();
    };

    let decoded = String::from_utf8_lossy(&bytes).replace('\0', "");
    let total = decoded.chars().count();
    if total == 0 {
        return decoded;
    }
    let printable = decoded.chars().filter(|c| (' '..'\x7f').contains(c)).count();
    if printable as f64 / total as f64 > 0.8 {
        decoded
    } else {
        value.to_string()
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    chain_id: Option<u64>,
    expired: Option<String>,
    owner: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl ListQuery {
    fn page(&self, default_limit: usize, max_limit: usize) -> (usize, usize) {
        (
            self.limit.unwrap_or(default_limit).min(max_limit),
            self.offset.unwrap_or(0),
        )
    }
}

fn paginate<T>(rows: Vec<T>, limit: usize, offset: usize) -> Vec<T> {
    rows.into_iter().skip(offset).take(limit).collect()
}

fn provenance_json(provenance: &Provenance) -> Value {
    json!({
        "block": provenance.block_number.to_string(),
        "timestamp": provenance.timestamp.to_string(),
        "txHash": provenance.tx_hash,
    })
}

fn last_update_json(provenance: &Provenance) -> Value {
    json!({
        "block": provenance.block_number.to_string(),
        "timestamp": provenance.timestamp.to_string(),
    })
}

fn credential_json(credential: &Credential) -> Map<String, Value> {
    let value = json!({
        "labelhash": credential.labelhash,
        "label": credential.label,
        "fullName": credential.full_name,
        "chainId": credential.chain_id,
        "chainName": credential.chain_name,
        "owner": credential.owner,
        "resolverAddress": credential.resolver_address,
        "resolverUpdatedAt": credential.resolver_updated_at.to_string(),
        "review": credential.review,
        "expiration": credential.expiration.to_string(),
        "isExpired": credential.is_expired,
        "registeredAt": provenance_json(&credential.registered),
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn resolver_json(resolver: &Resolver) -> Map<String, Value> {
    let value = json!({
        "address": resolver.address,
        "chainId": resolver.chain_id,
        "chainName": resolver.chain_name,
        "owner": resolver.owner,
        "labelhash": resolver.labelhash,
        "label": resolver.label,
        "ethAddress": resolver.eth_address,
        "contenthash": resolver.contenthash,
        "deployedAt": provenance_json(&resolver.deployed),
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "ECS Indexer API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Indexer for the Ethereum Credential Service (ECS) protocol",
        "endpoints": {
            "GET /api/health": "Health check (public)",
            "GET /api/credentials": "List all registered credentials (labels)",
            "GET /api/credentials/:chainId/:labelhash": "Get credential by labelhash",
            "GET /api/credentials/:chainId/:labelhash/metadata": "Get credential metadata (public)",
            "GET /api/credentials/by-label/:label": "Get credential by label name",
            "GET /api/credentials/by-owner/:address": "Get credentials by owner",
            "GET /api/resolvers": "List all deployed credential resolvers",
            "GET /api/resolvers/:chainId/:address": "Get resolver details",
            "GET /api/resolvers/:chainId/:address/info": "Get resolver info (public)",
            "GET /api/resolvers/:chainId/:address/text": "Get all text records for a resolver",
            "GET /api/resolvers/:chainId/:address/metadata": "Get all contract metadata for a resolver",
            "GET /api/stats": "Get global statistics",
        },
        "protocol": {
            "name": "Ethereum Credential Service (ECS)",
            "version": PROTOCOL_VERSION,
            "documentation": "https://github.com/nxt3d/ecs",
        },
        "auth": "API key required (Bearer token) - except for endpoints marked (public)",
    }))
}

async fn health(State(state): State<ApiState>) -> Json<Value> {
    let counts = state
        .store
        .count::<Credential>()
        .and_then(|credentials| Ok((credentials, state.store.count::<Resolver>()?)));

    match counts {
        Ok((credentials, resolvers)) => Json(json!({
            "status": "ok",
            "timestamp": now_iso(),
            "service": "ecs-indexer",
            "stats": { "credentials": credentials, "resolvers": resolvers },
        })),
        // The service is up even when the store is busy; stats are just omitted.
        Err(e) => {
            tracing::warn!(target: "credindex_ecs::api", error = %e, "Health stats unavailable");
            Json(json!({
                "status": "ok",
                "timestamp": now_iso(),
                "service": "ecs-indexer",
            }))
        }
    }
}

async fn list_credentials(State(state): State<ApiState>, Query(query): Query<ListQuery>) -> ApiResult {
    let expired = query.expired.as_deref().map(|value| value == "true");
    let mut credentials = state
        .store
        .scan::<Credential>(|credential| {
            query.chain_id.map_or(true, |chain_id| credential.chain_id == chain_id)
                && expired.map_or(true, |expired| credential.is_expired == expired)
        })
        .map_err(ApiError::storage("Failed to fetch credentials"))?;
    credentials.sort_by(|a, b| b.registered.timestamp.cmp(&a.registered.timestamp));

    let (limit, offset) = query.page(50, 100);
    let total = credentials.len();
    let page: Vec<Value> = paginate(credentials, limit, offset)
        .iter()
        .map(|credential| Value::Object(credential_json(credential)))
        .collect();

    Ok(Json(json!({
        "credentials": page,
        "pagination": { "limit": limit, "offset": offset, "total": total },
        "timestamp": now_iso(),
    })))
}

async fn credential_by_label(
    State(state): State<ApiState>,
    Path(label): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let label = label.to_lowercase();
    let mut matches = state
        .store
        .scan::<Credential>(|credential| {
            credential
                .label
                .as_deref()
                .is_some_and(|candidate| candidate.to_lowercase() == label)
                && query.chain_id.map_or(true, |chain_id| credential.chain_id == chain_id)
        })
        .map_err(ApiError::storage("Failed to fetch credential"))?;
    matches.sort_by(|a, b| a.id.cmp(&b.id));

    let credential = matches
        .first()
        .ok_or(ApiError::NotFound("Credential not found"))?;
    let mut body = credential_json(credential);
    body.insert("timestamp".to_string(), json!(now_iso()));
    Ok(Json(Value::Object(body)))
}

async fn credentials_by_owner(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let owner = keys::normalize_hex(&address);
    let mut credentials = state
        .store
        .scan::<Credential>(|credential| {
            credential.owner == owner
                && query.chain_id.map_or(true, |chain_id| credential.chain_id == chain_id)
        })
        .map_err(ApiError::storage("Failed to fetch credentials"))?;
    credentials.sort_by(|a, b| b.registered.timestamp.cmp(&a.registered.timestamp));

    let (limit, offset) = query.page(100, 1000);
    let total = credentials.len();
    let page: Vec<Value> = paginate(credentials, limit, offset)
        .iter()
        .map(|credential| {
            json!({
                "labelhash": credential.labelhash,
                "label": credential.label,
                "fullName": credential.full_name,
                "chainId": credential.chain_id,
                "chainName": credential.chain_name,
                "resolverAddress": credential.resolver_address,
                "expiration": credential.expiration.to_string(),
                "isExpired": credential.is_expired,
                "registeredAt": last_update_json(&credential.registered),
            })
        })
        .collect();

    Ok(Json(json!({
        "owner": owner,
        "credentials": page,
        "pagination": { "limit": limit, "offset": offset, "total": total },
        "timestamp": now_iso(),
    })))
}

async fn credential_detail(
    State(state): State<ApiState>,
    Path((chain_id, labelhash)): Path<(u64, String)>,
) -> ApiResult {
    const CONTEXT: &str = "Failed to fetch credential";
    let labelhash = keys::normalize_hex(&labelhash);

    let credential = state
        .store
        .find::<Credential>(&keys::credential_hex(chain_id, &labelhash))
        .map_err(ApiError::storage(CONTEXT))?
        .ok_or(ApiError::NotFound("Credential not found"))?;

    let mut transfers = state
        .store
        .scan::<CredentialTransfer>(|t| t.chain_id == chain_id && t.labelhash == labelhash)
        .map_err(ApiError::storage(CONTEXT))?;
    transfers.sort_by(|a, b| b.provenance.block_number.cmp(&a.provenance.block_number));
    let transfers: Vec<Value> = transfers
        .iter()
        .take(20)
        .map(|t| {
            json!({
                "newOwner": t.new_owner,
                "block": t.provenance.block_number.to_string(),
                "timestamp": t.provenance.timestamp.to_string(),
                "txHash": t.provenance.tx_hash,
            })
        })
        .collect();

    let mut renewals = state
        .store
        .scan::<Renewal>(|r| r.chain_id == chain_id && r.labelhash == labelhash)
        .map_err(ApiError::storage(CONTEXT))?;
    renewals.sort_by(|a, b| b.provenance.block_number.cmp(&a.provenance.block_number));
    let renewals: Vec<Value> = renewals
        .iter()
        .take(10)
        .map(|r| {
            json!({
                "cost": r.cost.to_string(),
                "newExpiration": r.new_expiration.to_string(),
                "block": r.provenance.block_number.to_string(),
                "timestamp": r.provenance.timestamp.to_string(),
                "txHash": r.provenance.tx_hash,
            })
        })
        .collect();

    let mut body = credential_json(&credential);
    body.insert(
        "registrationCost".to_string(),
        json!(credential.registration_cost.map(|cost| cost.to_string())),
    );
    body.insert("transferHistory".to_string(), Value::Array(transfers));
    body.insert("renewalHistory".to_string(), Value::Array(renewals));
    body.insert("timestamp".to_string(), json!(now_iso()));
    Ok(Json(Value::Object(body)))
}

/// `expiration` seconds as an ISO date, null when out of range.
fn expiration_date(credential: &Credential) -> Value {
    i64::try_from(credential.expiration)
        .ok()
        .and_then(|seconds| DateTime::<Utc>::from_timestamp(seconds, 0))
        .map_or(Value::Null, |date| {
            json!(date.to_rfc3339_opts(SecondsFormat::Millis, true))
        })
}

async fn credential_metadata(
    State(state): State<ApiState>,
    Path((chain_id, labelhash)): Path<(u64, String)>,
) -> ApiResult {
    const CONTEXT: &str = "Failed to fetch credential metadata";

    let credential = state
        .store
        .find::<Credential>(&keys::credential_hex(chain_id, &labelhash))
        .map_err(ApiError::storage(CONTEXT))?
        .ok_or(ApiError::NotFound("Credential not found"))?;

    let mut body = Map::new();
    body.insert("type".to_string(), json!(CREDENTIAL_TYPE));
    body.insert("label".to_string(), json!(credential.label));
    body.insert("fullName".to_string(), json!(credential.full_name));
    body.insert("owner".to_string(), json!(credential.owner));
    body.insert("resolverAddress".to_string(), json!(credential.resolver_address));
    body.insert("review".to_string(), json!(credential.review));
    body.insert("expiration".to_string(), json!(credential.expiration.to_string()));
    body.insert("expirationDate".to_string(), expiration_date(&credential));
    body.insert("isExpired".to_string(), json!(credential.is_expired));

    // Resolver metadata is merged last and may shadow the fields above.
    if let Some(resolver) = credential.resolver_address.as_deref() {
        let entries = state
            .store
            .scan::<ContractMetadataEntry>(|m| m.chain_id == chain_id && m.resolver == resolver)
            .map_err(ApiError::storage(CONTEXT))?;
        for entry in entries {
            body.insert(entry.key, json!(try_decode_hex(&entry.value)));
        }
    }

    Ok(Json(Value::Object(body)))
}

async fn list_resolvers(State(state): State<ApiState>, Query(query): Query<ListQuery>) -> ApiResult {
    let owner = query.owner.as_deref().map(keys::normalize_hex);
    let mut resolvers = state
        .store
        .scan::<Resolver>(|resolver| {
            query.chain_id.map_or(true, |chain_id| resolver.chain_id == chain_id)
                && owner.as_deref().map_or(true, |owner| resolver.owner == owner)
        })
        .map_err(ApiError::storage("Failed to fetch resolvers"))?;
    resolvers.sort_by(|a, b| b.deployed.timestamp.cmp(&a.deployed.timestamp));

    let (limit, offset) = query.page(50, 100);
    let total = resolvers.len();
    let page: Vec<Value> = paginate(resolvers, limit, offset)
        .iter()
        .map(|resolver| Value::Object(resolver_json(resolver)))
        .collect();

    Ok(Json(json!({
        "resolvers": page,
        "pagination": { "limit": limit, "offset": offset, "total": total },
        "timestamp": now_iso(),
    })))
}

async fn resolver_detail(
    State(state): State<ApiState>,
    Path((chain_id, address)): Path<(u64, String)>,
) -> ApiResult {
    const CONTEXT: &str = "Failed to fetch resolver";
    let address = keys::normalize_hex(&address);
    let store = &state.store;

    let resolver = store
        .find::<Resolver>(&keys::resolver_hex(chain_id, &address))
        .map_err(ApiError::storage(CONTEXT))?
        .ok_or(ApiError::NotFound("Resolver not found"))?;

    let texts: Map<String, Value> = store
        .scan::<TextRecord>(|t| t.chain_id == chain_id && t.resolver == address)
        .map_err(ApiError::storage(CONTEXT))?
        .into_iter()
        .map(|t| (t.key, json!(t.value)))
        .collect();

    let metadata: Map<String, Value> = store
        .scan::<ContractMetadataEntry>(|m| m.chain_id == chain_id && m.resolver == address)
        .map_err(ApiError::storage(CONTEXT))?
        .into_iter()
        .map(|m| {
            let decoded = try_decode_hex(&m.value);
            (m.key, json!({ "value": m.value, "decoded": decoded }))
        })
        .collect();

    let addresses: Map<String, Value> = store
        .scan::<AddressRecord>(|a| a.chain_id == chain_id && a.resolver == address)
        .map_err(ApiError::storage(CONTEXT))?
        .into_iter()
        .map(|a| (a.coin_type.to_string(), json!(a.address)))
        .collect();

    let mut transfers = store
        .scan::<ResolverTransfer>(|t| t.chain_id == chain_id && t.resolver == address)
        .map_err(ApiError::storage(CONTEXT))?;
    transfers.sort_by(|a, b| b.provenance.block_number.cmp(&a.provenance.block_number));
    let transfers: Vec<Value> = transfers
        .iter()
        .take(20)
        .map(|t| {
            json!({
                "previousOwner": t.previous_owner,
                "newOwner": t.new_owner,
                "block": t.provenance.block_number.to_string(),
                "timestamp": t.provenance.timestamp.to_string(),
                "txHash": t.provenance.tx_hash,
            })
        })
        .collect();

    let mut body = resolver_json(&resolver);
    body.insert("textRecords".to_string(), Value::Object(texts));
    body.insert("contractMetadata".to_string(), Value::Object(metadata));
    body.insert("addressRecords".to_string(), Value::Object(addresses));
    body.insert("transferHistory".to_string(), Value::Array(transfers));
    body.insert("timestamp".to_string(), json!(now_iso()));
    Ok(Json(Value::Object(body)))
}

async fn resolver_info(
    State(state): State<ApiState>,
    Path((chain_id, address)): Path<(u64, String)>,
) -> ApiResult {
    const CONTEXT: &str = "Failed to fetch resolver info";
    let address = keys::normalize_hex(&address);

    let resolver = state
        .store
        .find::<Resolver>(&keys::resolver_hex(chain_id, &address))
        .map_err(ApiError::storage(CONTEXT))?;
    let credential = state
        .store
        .scan::<Credential>(|c| {
            c.chain_id == chain_id && c.resolver_address.as_deref() == Some(address.as_str())
        })
        .map_err(ApiError::storage(CONTEXT))?
        .into_iter()
        .max_by_key(|c| c.resolver_updated_at);

    let non_empty = |value: &Option<String>| value.clone().filter(|value| !value.is_empty());
    let label = credential
        .as_ref()
        .and_then(|c| non_empty(&c.label))
        .or_else(|| resolver.as_ref().and_then(|r| non_empty(&r.label)))
        .unwrap_or_default();
    let resolver_updated = credential
        .as_ref()
        .map_or_else(|| "0".to_string(), |c| c.resolver_updated_at.to_string());
    let review = credential
        .as_ref()
        .and_then(|c| non_empty(&c.review))
        .unwrap_or_default();

    Ok(Json(json!({
        "label": label,
        "resolverUpdated": resolver_updated,
        "review": review,
    })))
}

async fn resolver_text(
    State(state): State<ApiState>,
    Path((chain_id, address)): Path<(u64, String)>,
) -> ApiResult {
    let address = keys::normalize_hex(&address);
    let mut records = state
        .store
        .scan::<TextRecord>(|t| t.chain_id == chain_id && t.resolver == address)
        .map_err(ApiError::storage("Failed to fetch text records"))?;
    records.sort_by(|a, b| a.set_at.block_number.cmp(&b.set_at.block_number));

    let entries: Vec<Value> = records
        .iter()
        .map(|t| {
            json!({
                "key": t.key,
                "keyHash": t.key_hash,
                "keySynthesized": t.key_synthesized,
                "value": t.value,
                "setAt": provenance_json(&t.set_at),
                "lastUpdate": last_update_json(&t.last_update),
            })
        })
        .collect();

    Ok(Json(json!({
        "resolverAddress": address,
        "chainId": chain_id,
        "total": entries.len(),
        "textRecords": entries,
        "timestamp": now_iso(),
    })))
}

async fn resolver_metadata(
    State(state): State<ApiState>,
    Path((chain_id, address)): Path<(u64, String)>,
) -> ApiResult {
    let address = keys::normalize_hex(&address);
    let mut entries = state
        .store
        .scan::<ContractMetadataEntry>(|m| m.chain_id == chain_id && m.resolver == address)
        .map_err(ApiError::storage("Failed to fetch contract metadata"))?;
    entries.sort_by(|a, b| a.key.cmp(&b.key));

    let entries: Vec<Value> = entries
        .iter()
        .map(|m| {
            json!({
                "key": m.key,
                "value": m.value,
                "decoded": try_decode_hex(&m.value),
                "setAt": provenance_json(&m.set_at),
                "lastUpdate": last_update_json(&m.last_update),
            })
        })
        .collect();

    Ok(Json(json!({
        "contractAddress": address,
        "chainId": chain_id,
        "total": entries.len(),
        "metadata": entries,
        "timestamp": now_iso(),
    })))
}

fn by_chain<'a>(names: impl Iterator<Item = &'a str>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for name in names {
        *counts.entry(name.to_string()).or_insert(0) += 1;
    }
    counts
}

async fn stats(State(state): State<ApiState>) -> ApiResult {
    const CONTEXT: &str = "Failed to fetch stats";
    let store = &state.store;

    let credentials = store
        .scan::<Credential>(|_| true)
        .map_err(ApiError::storage(CONTEXT))?;
    let resolvers = store
        .scan::<Resolver>(|_| true)
        .map_err(ApiError::storage(CONTEXT))?;
    let metadata_entries = store
        .count::<ContractMetadataEntry>()
        .map_err(ApiError::storage(CONTEXT))?;
    let text_records = store
        .count::<TextRecord>()
        .map_err(ApiError::storage(CONTEXT))?;

    let expired = credentials.iter().filter(|c| c.is_expired).count();
    let credential_owners: HashSet<&str> = credentials.iter().map(|c| c.owner.as_str()).collect();
    let resolver_owners: HashSet<&str> = resolvers.iter().map(|r| r.owner.as_str()).collect();

    Ok(Json(json!({
        "credentials": {
            "total": credentials.len(),
            "active": credentials.len() - expired,
            "expired": expired,
            "uniqueOwners": credential_owners.len(),
            "byChain": by_chain(credentials.iter().map(|c| c.chain_name.as_str())),
        },
        "resolvers": {
            "total": resolvers.len(),
            "uniqueOwners": resolver_owners.len(),
            "byChain": by_chain(resolvers.iter().map(|r| r.chain_name.as_str())),
        },
        "metadata": {
            "totalContractMetadataEntries": metadata_entries,
            "totalTextRecords": text_records,
        },
        "timestamp": now_iso(),
    })))
}
