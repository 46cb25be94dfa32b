//! Ethereum JSON-RPC client for transfer history and token balances.
//!
//! Speaks plain JSON-RPC 2.0 over HTTP via `reqwest`. Three methods are
//! used:
//!
//! - `eth_blockNumber` for the chain head.
//! - `eth_getLogs` for the collection's `Transfer` events, paged over block
//!   ranges so providers with result caps accept every request.
//! - `eth_call` of `balanceOf(address)` on the token contract, pinned to the
//!   cycle's block.
//!
//! Words, addresses, and calldata go through `alloy` primitives; the ABI of
//! the two contract members is declared with `sol!`.
//!
//! [`ChainSource`] adapts the client to the core's [`EventSource`] and
//! [`BalanceSource`] traits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{B256, Bytes, U64, U256};
use alloy_sol_types::{SolCall, SolEvent};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info};

use points_core::source::{BalanceSource, EventSource, SourceError};
use points_types::{Address, BalanceQuote, EventSequence, TransferEvent, UnitId};

mod abi {
    #![allow(missing_docs)]

    alloy_sol_types::sol! {
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);

        function balanceOf(address owner) external view returns (uint256);
    }
}

/// Errors from the JSON-RPC client.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The HTTP request could not be sent or its body read.
    #[error("RPC transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-success HTTP status.
    #[error("RPC endpoint returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, if readable.
        body: String,
    },

    /// The endpoint answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// A response could not be decoded.
    #[error("RPC decode error: {0}")]
    Decode(String),
}

impl From<RpcError> for SourceError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Transport(_) | RpcError::Status { .. } => Self::Unavailable(err.to_string()),
            RpcError::Rpc { .. } => Self::Rejected(err.to_string()),
            RpcError::Decode(_) => Self::Malformed(err.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// A log entry as returned by `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    /// Emitting contract.
    pub address: alloy_primitives::Address,
    /// Indexed topics; `topics[0]` is the event signature.
    pub topics: Vec<B256>,
    /// Block number; absent for pending logs.
    #[serde(default)]
    pub block_number: Option<U64>,
    /// Log index within the block.
    #[serde(default)]
    pub log_index: Option<U64>,
    /// Set when the log was removed by a reorganization.
    #[serde(default)]
    pub removed: bool,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A minimal Ethereum JSON-RPC client.
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Create a client for `url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Transport`] if the HTTP client cannot be built.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_owned(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Send one JSON-RPC request and decode its `result` as `T`.
    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(RpcError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RpcResponse = response.json().await?;
        let result = into_result(parsed)?;
        serde_json::from_value(result).map_err(|e| RpcError::Decode(format!("{method}: {e}")))
    }

    /// The latest block number.
    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let head: U64 = self.request("eth_blockNumber", json!([])).await?;
        Ok(head.saturating_to())
    }

    /// `Transfer` logs emitted by `contract` in `[from_block, to_block]`.
    pub async fn transfer_logs(
        &self,
        contract: &Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, RpcError> {
        let params = json!([{
            "address": contract.to_string(),
            "topics": [abi::Transfer::SIGNATURE_HASH],
            "fromBlock": U64::from(from_block),
            "toBlock": U64::from(to_block),
        }]);
        self.request("eth_getLogs", params).await
    }

    /// `balanceOf(owner)` on `token` at `block`, as a raw integer.
    pub async fn balance_of(
        &self,
        token: &Address,
        owner: &Address,
        block: u64,
    ) -> Result<U256, RpcError> {
        let params = json!([
            { "to": token.to_string(), "data": encode_balance_of(owner) },
            U64::from(block),
        ]);
        let returned: Bytes = self.request("eth_call", params).await?;
        decode_balance(&returned)
    }
}

// ---------------------------------------------------------------------------
// Chain-backed sources
// ---------------------------------------------------------------------------

/// Event and balance source backed by an Ethereum node.
pub struct ChainSource {
    rpc: RpcClient,
    collection: Address,
    token: Address,
    deployment_block: u64,
    page_blocks: u64,
}

impl ChainSource {
    /// Create a source reading `collection` transfers and `token` balances.
    ///
    /// History starts at `deployment_block` and is fetched `page_blocks`
    /// blocks per request.
    pub fn new(
        rpc: RpcClient,
        collection: Address,
        token: Address,
        deployment_block: u64,
        page_blocks: u64,
    ) -> Self {
        Self {
            rpc,
            collection,
            token,
            deployment_block,
            page_blocks: page_blocks.max(1),
        }
    }
}

impl EventSource for ChainSource {
    async fn fetch_events(&self, to_block: u64) -> Result<Vec<TransferEvent>, SourceError> {
        let mut events = Vec::new();
        for (from, to) in block_pages(self.deployment_block, to_block, self.page_blocks) {
            let logs = self.rpc.transfer_logs(&self.collection, from, to).await?;
            debug!(from, to, logs = logs.len(), "Fetched log page");
            for log in logs.iter().filter(|log| !log.removed) {
                if log.address != self.collection.to_alloy() {
                    return Err(SourceError::Malformed(format!(
                        "log from unexpected contract {}",
                        Address::from(log.address)
                    )));
                }
                events.push(decode_transfer(log)?);
            }
        }
        info!(
            from_block = self.deployment_block,
            to_block,
            events = events.len(),
            "Fetched transfer history"
        );
        Ok(events)
    }
}

impl BalanceSource for ChainSource {
    async fn chain_head(&self) -> Result<u64, SourceError> {
        Ok(self.rpc.block_number().await?)
    }

    async fn balance_of(&self, address: &Address, block: u64) -> Result<BalanceQuote, SourceError> {
        let raw = self.rpc.balance_of(&self.token, address, block).await?;
        Ok(BalanceQuote {
            raw,
            block_number: block,
        })
    }
}

// ---------------------------------------------------------------------------
// Encoding and decoding
// ---------------------------------------------------------------------------

fn into_result(response: RpcResponse) -> Result<Value, RpcError> {
    if let Some(err) = response.error {
        return Err(RpcError::Rpc {
            code: err.code,
            message: err.message,
        });
    }
    response
        .result
        .ok_or_else(|| RpcError::Decode("response has neither result nor error".to_owned()))
}

/// Inclusive block ranges covering `[from, to]`, `size` blocks each.
fn block_pages(from: u64, to: u64, size: u64) -> Vec<(u64, u64)> {
    let mut pages = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(size.saturating_sub(1)).min(to);
        pages.push((start, end));
        match end.checked_add(1) {
            Some(next) => start = next,
            None => break,
        }
    }
    pages
}

/// Calldata for `balanceOf(owner)`.
fn encode_balance_of(owner: &Address) -> Bytes {
    abi::balanceOfCall {
        owner: owner.to_alloy(),
    }
    .abi_encode()
    .into()
}

/// Decode the `uint256` returned by `balanceOf`.
fn decode_balance(returned: &[u8]) -> Result<U256, RpcError> {
    returned
        .get(..32)
        .and_then(U256::try_from_be_slice)
        .ok_or_else(|| {
            RpcError::Decode(format!(
                "balanceOf returned {} bytes, expected 32",
                returned.len()
            ))
        })
}

/// Decode an ERC-721 `Transfer(from, to, tokenId)` log.
///
/// All three arguments are indexed, so they arrive in topics 1 to 3. The
/// zero address decodes to `None` (mint source or burn destination).
fn decode_transfer(log: &RawLog) -> Result<TransferEvent, RpcError> {
    let [signature, from, to, token_id] = log.topics.as_slice() else {
        return Err(RpcError::Decode(format!(
            "expected 4 topics for an ERC-721 Transfer, got {}",
            log.topics.len()
        )));
    };
    if *signature != abi::Transfer::SIGNATURE_HASH {
        return Err(RpcError::Decode(format!("unexpected event signature {signature}")));
    }

    let party = |word: &B256| {
        let address = alloy_primitives::Address::from_word(*word);
        (!address.is_zero()).then(|| Address::from(address))
    };

    let token_id = U256::from_be_bytes(token_id.0);
    let unit_id = u64::try_from(token_id)
        .map(UnitId)
        .map_err(|e| RpcError::Decode(format!("token id {token_id}: {e}")))?;

    let block_number = log
        .block_number
        .ok_or_else(|| RpcError::Decode("log without blockNumber".to_owned()))?;
    let log_index = log
        .log_index
        .ok_or_else(|| RpcError::Decode("log without logIndex".to_owned()))?;

    Ok(TransferEvent {
        from: party(from),
        to: party(to),
        unit_id,
        sequence: EventSequence::new(block_number.saturating_to(), log_index.saturating_to()),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use alloy_primitives::b256;

    use super::*;

    const COLLECTION: &str = "0x00000000000000000000000000000000000000c0";

    fn word_for(address: &str) -> B256 {
        Address::parse(address).unwrap().to_alloy().into_word()
    }

    fn holder(last: &str) -> String {
        format!("0x{last:0>40}")
    }

    fn raw_log(from: &str, to: &str, token_id: u64) -> RawLog {
        RawLog {
            address: Address::parse(COLLECTION).unwrap().to_alloy(),
            topics: vec![
                abi::Transfer::SIGNATURE_HASH,
                word_for(&holder(from)),
                word_for(&holder(to)),
                U256::from(token_id).into(),
            ],
            block_number: Some(U64::from(14_517_552)),
            log_index: Some(U64::from(31)),
            removed: false,
        }
    }

    #[test]
    fn transfer_signature_is_the_standard_topic() {
        assert_eq!(
            abi::Transfer::SIGNATURE_HASH,
            b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef")
        );
    }

    #[test]
    fn decodes_mint_with_null_source() {
        let log = raw_log("0", "ab", 1888);
        let event = decode_transfer(&log).unwrap();

        assert_eq!(event.from, None);
        assert_eq!(
            event.to.unwrap().to_string(),
            "0x00000000000000000000000000000000000000ab"
        );
        assert_eq!(event.unit_id, UnitId(1888));
        assert_eq!(event.sequence, EventSequence::new(14_517_552, 31));
    }

    #[test]
    fn decodes_burn_with_null_destination() {
        let log = raw_log("AB", "0", 5);
        let event = decode_transfer(&log).unwrap();

        assert_eq!(
            event.from.unwrap().to_string(),
            "0x00000000000000000000000000000000000000ab"
        );
        assert_eq!(event.to, None);
    }

    #[test]
    fn rejects_erc20_shaped_log() {
        let mut log = raw_log("0", "ab", 1);
        log.topics.pop();
        assert!(matches!(decode_transfer(&log), Err(RpcError::Decode(_))));
    }

    #[test]
    fn rejects_other_event_signature() {
        let mut log = raw_log("0", "ab", 1);
        log.topics[0] = word_for(&holder("1234"));
        assert!(decode_transfer(&log).is_err());
    }

    #[test]
    fn rejects_token_id_above_u64() {
        let mut log = raw_log("0", "ab", 1);
        log.topics[3] = U256::from(u64::MAX).saturating_add(U256::from(1)).into();
        assert!(decode_transfer(&log).is_err());
    }

    #[test]
    fn balance_of_calldata_is_abi_encoded() {
        let owner = Address::parse("0x00000000000000000000000000000000000000Ab").unwrap();
        let data = encode_balance_of(&owner);
        assert_eq!(data.len(), 4 + 32);
        assert_eq!(data[..4], abi::balanceOfCall::SELECTOR);
        assert_eq!(data[..4], [0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(data[35], 0xab);
        assert!(data[4..35].iter().all(|b| *b == 0));
    }

    #[test]
    fn decodes_full_width_balances() {
        let one_token = U256::from(1_000_000_000_000_000_000_u128);
        assert_eq!(decode_balance(&one_token.to_be_bytes::<32>()).unwrap(), one_token);

        let above_u128 = U256::from(u128::MAX).saturating_add(U256::from(1));
        assert_eq!(decode_balance(&above_u128.to_be_bytes::<32>()).unwrap(), above_u128);
        assert_eq!(decode_balance(&U256::MAX.to_be_bytes::<32>()).unwrap(), U256::MAX);

        assert!(decode_balance(&[]).is_err());
        assert!(decode_balance(&[0_u8; 31]).is_err());
    }

    #[test]
    fn pages_cover_range_inclusively() {
        assert_eq!(block_pages(10, 25, 10), vec![(10, 19), (20, 25)]);
        assert_eq!(block_pages(10, 10, 10), vec![(10, 10)]);
        assert!(block_pages(11, 10, 10).is_empty());
        assert_eq!(block_pages(0, 2, 1), vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn rpc_error_object_is_surfaced() {
        let response: RpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32005, "message": "query returned more than 10000 results" }
        }))
        .unwrap();
        let err = into_result(response).unwrap_err();
        assert!(matches!(err, RpcError::Rpc { code: -32005, .. }));
        assert!(matches!(SourceError::from(err), SourceError::Rejected(_)));
    }

    #[test]
    fn logs_deserialize_from_node_shape() {
        let logs: Vec<RawLog> = serde_json::from_value(json!([{
            "address": COLLECTION,
            "topics": [
                "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef",
                format!("0x{:0>64}", "0"),
                format!("0x{:0>64}", "ab"),
                format!("0x{:064x}", 7),
            ],
            "data": "0x",
            "blockNumber": "0x10",
            "transactionHash": "0x01",
            "logIndex": "0x2",
            "removed": false
        }]))
        .unwrap();
        let event = decode_transfer(&logs[0]).unwrap();
        assert_eq!(event.sequence, EventSequence::new(16, 2));
        assert_eq!(event.unit_id, UnitId(7));
        assert_eq!(event.from, None);
    }
}
