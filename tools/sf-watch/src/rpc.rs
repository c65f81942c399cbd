//! HTTP JSON-RPC chain client.
//!
//! Implements [`ChainClient`] over the node's HTTP endpoint. HTTP has no
//! push channel, so the watermark subscription and transaction tracking
//! are synthesized by polling; the first poll of every subscription runs
//! immediately, which preserves the deliver-current-value-on-subscribe
//! contract the waiter relies on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chain_client::{
    BlockHeader, BlockNumber, BlockRef, ChainClient, ChainError, ChainResult, DispatchOutcome,
    PrivilegedCall, SignedPayload, TxStatus, TxStatusStream, Watermark, WatermarkSubscription,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

#[derive(Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    method: &'a str,
    params: P,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse<R> {
    result: Option<R>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct HeaderResponse {
    number: String,
}

#[derive(Deserialize)]
struct SignedBlock {
    block: Block,
}

#[derive(Deserialize)]
struct Block {
    extrinsics: Vec<String>,
}

const METHOD_NOT_FOUND: i64 = -32601;

/// [`ChainClient`] over HTTP JSON-RPC.
#[derive(Clone)]
pub struct HttpChainClient {
    client: reqwest::Client,
    endpoint: String,
    pallet: String,
    poll_interval: Duration,
    request_id: Arc<AtomicU64>,
}

impl HttpChainClient {
    /// Connect and probe the configured pallet surface once. A missing
    /// surface is a [`ChainError::Configuration`] and should abort
    /// startup.
    pub async fn connect(
        endpoint: impl Into<String>,
        pallet: impl Into<String>,
        poll_interval: Duration,
    ) -> ChainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ChainError::connection(format!("failed to build HTTP client: {e}")))?;

        let this = Self {
            client,
            endpoint: endpoint.into(),
            pallet: pallet.into(),
            poll_interval,
            request_id: Arc::new(AtomicU64::new(1)),
        };

        let current = this.verified_height().await?;
        debug!(
            pallet = %this.pallet,
            verified_height = current,
            "watermark surface probed"
        );
        Ok(this)
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn call<P: Serialize, R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> ChainResult<R> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ChainError::connection(format!("cannot connect to {}", self.endpoint))
                } else {
                    ChainError::connection(e.to_string())
                }
            })?;

        let body: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| ChainError::connection(format!("invalid JSON-RPC response: {e}")))?;

        if let Some(error) = body.error {
            if error.code == METHOD_NOT_FOUND {
                return Err(ChainError::configuration(format!(
                    "method {method} not exposed by the node: {}",
                    error.message
                )));
            }
            return Err(ChainError::connection(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }
        body.result
            .ok_or_else(|| ChainError::connection("missing result in JSON-RPC response"))
    }

    /// Current watermark, straight from the pallet RPC.
    async fn verified_height(&self) -> ChainResult<BlockNumber> {
        self.call(&format!("{}_verifiedHeight", self.pallet), [(); 0])
            .await
    }

    /// Poll finalized blocks until the given extrinsic shows up, feeding
    /// lifecycle statuses as they materialize.
    async fn watch_inclusion(&self, payload_hex: String, status_tx: mpsc::Sender<TxStatus>) {
        if status_tx.send(TxStatus::Ready).await.is_err() {
            return;
        }

        let mut next_block: Option<BlockNumber> = None;
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let head = match self.finalized_height().await {
                Ok(head) => head,
                Err(error) => {
                    warn!(%error, "finalized head poll failed, ending status stream");
                    return;
                }
            };
            let start = next_block.unwrap_or(head);
            for number in start..=head {
                match self.find_in_block(number, &payload_hex).await {
                    Ok(Some(block)) => {
                        let _ = status_tx.send(TxStatus::InBlock(block)).await;
                        // Only finalized blocks are scanned, so inclusion
                        // here is already final.
                        // TODO: decode System.Events for the block so an
                        // ExtrinsicFailed surfaces as a dispatch error
                        // instead of an unconditional success.
                        let _ = status_tx
                            .send(TxStatus::Finalized {
                                block,
                                outcome: DispatchOutcome::Success,
                            })
                            .await;
                        return;
                    }
                    Ok(None) => {}
                    Err(error) => {
                        warn!(%error, number, "block scan failed, ending status stream");
                        return;
                    }
                }
            }
            next_block = Some(head + 1);
        }
    }

    async fn find_in_block(
        &self,
        number: BlockNumber,
        payload_hex: &str,
    ) -> ChainResult<Option<BlockRef>> {
        let hash: Option<String> = self.call("chain_getBlockHash", [number]).await?;
        let Some(hash) = hash else {
            return Ok(None);
        };
        let signed: Option<SignedBlock> = self.call("chain_getBlock", [hash.clone()]).await?;
        let Some(signed) = signed else {
            return Ok(None);
        };
        if signed.block.extrinsics.iter().any(|xt| xt == payload_hex) {
            Ok(Some(parse_block_ref(&hash)?))
        } else {
            Ok(None)
        }
    }

    fn spawn_inclusion_watch(&self, payload_hex: String) -> TxStatusStream {
        let (status_tx, stream) = TxStatusStream::channel(8);
        let client = self.clone();
        tokio::spawn(async move {
            client.watch_inclusion(payload_hex, status_tx).await;
        });
        stream
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn finalized_height(&self) -> ChainResult<BlockNumber> {
        let hash: String = self.call("chain_getFinalizedHead", [(); 0]).await?;
        let header: Option<HeaderResponse> = self.call("chain_getHeader", [hash]).await?;
        let header =
            header.ok_or_else(|| ChainError::connection("finalized head has no header"))?;
        parse_hex_u64(&header.number)
    }

    async fn header(&self, block: &BlockRef) -> ChainResult<BlockHeader> {
        let header: Option<HeaderResponse> =
            self.call("chain_getHeader", [block.to_string()]).await?;
        let header = header.ok_or(ChainError::NotFound { block: *block })?;
        Ok(BlockHeader {
            number: parse_hex_u64(&header.number)?,
        })
    }

    async fn subscribe_watermark(&self) -> ChainResult<WatermarkSubscription> {
        let (tx, sub) = WatermarkSubscription::channel(16);
        let client = self.clone();
        tokio::spawn(async move {
            let mut last: Option<Watermark> = None;
            let mut ticker = interval(client.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // First tick fires immediately: the current value is
                // delivered on establishment, not on the first change.
                ticker.tick().await;
                match client.verified_height().await {
                    Ok(height) => {
                        let watermark = Watermark(height);
                        if last != Some(watermark) {
                            last = Some(watermark);
                            if tx.send(Ok(watermark)).await.is_err() {
                                return; // subscriber dropped its handle
                            }
                        }
                    }
                    Err(error) => {
                        let _ = tx.send(Err(error)).await;
                        return;
                    }
                }
            }
        });
        Ok(sub)
    }

    async fn submit_transaction(&self, payload: SignedPayload) -> ChainResult<TxStatusStream> {
        let payload_hex = format!("0x{}", hex::encode(payload.as_bytes()));
        let tx_hash: String = self
            .call("author_submitExtrinsic", [payload_hex.clone()])
            .await?;
        debug!(%tx_hash, "transaction submitted");
        Ok(self.spawn_inclusion_watch(payload_hex))
    }

    async fn submit_privileged(&self, call: PrivilegedCall) -> ChainResult<TxStatusStream> {
        // The node composes and signs the call with its configured key;
        // the response is the submitted extrinsic, which we then track
        // through finalization like any other payload.
        let method = format!("{}_recordVerifiedHeight", call.pallet);
        let payload_hex: String = self.call(&method, [call.target]).await?;
        debug!(target = call.target, "privileged advancement submitted");
        Ok(self.spawn_inclusion_watch(payload_hex))
    }
}

fn parse_hex_u64(value: &str) -> ChainResult<u64> {
    let digits = value.trim_start_matches("0x");
    u64::from_str_radix(digits, 16)
        .map_err(|e| ChainError::connection(format!("bad hex number {value}: {e}")))
}

fn parse_block_ref(value: &str) -> ChainResult<BlockRef> {
    let bytes = hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| ChainError::connection(format!("bad block hash {value}: {e}")))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ChainError::connection(format!("block hash {value} is not 32 bytes")))?;
    Ok(BlockRef::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_block_numbers() {
        assert_eq!(parse_hex_u64("0x64").unwrap(), 100);
        assert_eq!(parse_hex_u64("ff").unwrap(), 255);
        assert!(parse_hex_u64("0xzz").is_err());
    }

    #[test]
    fn parses_block_refs_of_exactly_32_bytes() {
        let hex64 = format!("0x{}", "ab".repeat(32));
        let block = parse_block_ref(&hex64).unwrap();
        assert_eq!(block.as_bytes()[0], 0xab);
        assert!(parse_block_ref("0xabcd").is_err());
    }
}
