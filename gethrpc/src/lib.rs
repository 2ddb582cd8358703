// Copyright (C) 2025, 2026 Ethpoolv2 Developers (see AUTHORS)
//
// This file is part of Ethpoolv2
//
// Ethpoolv2 is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Ethpoolv2 is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// Ethpoolv2. If not, see <https://www.gnu.org/licenses/>.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::error;

/// JSON-RPC 2.0 request structure (Ethereum node format)
#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    method: String,
    params: Vec<serde_json::Value>,
    id: u64,
}

/// JSON-RPC 2.0 response structure (Ethereum node format)
/// A null `result` is a valid reply (e.g. asking for a block the node
/// does not have), so it is modelled as an Option.
#[derive(Deserialize, Debug)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error structure
#[derive(Deserialize, Debug)]
struct JsonRpcError {
    code: i32,
    message: String,
}

/// Error type for the GethRpcClient
#[derive(Debug)]
pub enum GethRpcError {
    HttpError { status_code: u16, message: String },
    ParseError { message: String },
    RpcError { code: i32, message: String },
    Other(String),
}

impl Error for GethRpcError {}

impl fmt::Display for GethRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GethRpcError::HttpError {
                status_code,
                message,
            } => {
                write!(f, "HTTP error {status_code}: {message}")
            }
            GethRpcError::ParseError { message } => {
                write!(f, "Parse error: {message}")
            }
            GethRpcError::RpcError { code, message } => {
                write!(f, "RPC error {code}: {message}")
            }
            GethRpcError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

/// A block as returned by `eth_getBlockByNumber` with full transaction
/// objects, or by `eth_getUncleByBlockNumberAndIndex` (uncles carry no
/// transactions). All numeric fields are 0x-prefixed hex strings; decoding
/// them is the caller's concern.
///
/// `nonce` is populated by Geth-style nodes. Parity-style nodes instead
/// expose the PoW seal as `sealFields`, where the second entry is the nonce.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBlockReply {
    pub number: String,
    pub hash: String,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub seal_fields: Vec<String>,
    #[serde(default)]
    pub uncles: Vec<String>,
    #[serde(default)]
    pub transactions: Vec<TxReply>,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub timestamp: String,
}

/// A transaction object embedded in a block reply.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReply {
    pub hash: String,
    #[serde(default)]
    pub gas_price: String,
}

/// A transaction receipt from `eth_getTransactionReceipt`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceiptReply {
    pub gas_used: String,
}

/// The pending block from `eth_getBlockByNumber("pending", false)`.
/// Only the height is consumed, and the reply carries transaction hashes
/// rather than objects, so it gets its own narrow type.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingBlockReply {
    pub number: String,
}

/// JSON-RPC client for an Ethereum node.
///
/// Read-only view of the chain used by the block unlocker: blocks by
/// height, uncles by (height, index), transaction receipts and the pending
/// head. Requests carry a per-request timeout; expiry surfaces as an error.
#[derive(Debug, Clone)]
pub struct GethRpcClient {
    name: String,
    client: reqwest::Client,
    url: String,
    request_id: Arc<AtomicU64>,
}

impl GethRpcClient {
    pub fn new(name: &str, url: &str, timeout: Duration) -> Result<Self, GethRpcError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GethRpcError::Other(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: name.to_string(),
            client,
            url: url.to_string(),
            request_id: Arc::new(AtomicU64::new(0)),
        })
    }

    pub async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<Option<T>, GethRpcError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);

        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: method.to_string(),
            params,
            id,
        };

        let response = match self.client.post(&self.url).json(&request).send().await {
            Ok(resp) => resp,
            Err(e) => {
                error!(
                    "{}: HTTP request to node failed: method={}, error={}",
                    self.name, method, e
                );
                return Err(GethRpcError::Other(format!("HTTP request failed: {e}")));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(
                "{}: error reaching node with status={}. Message={:?}",
                self.name, status_code, error_body
            );
            return Err(GethRpcError::HttpError {
                status_code,
                message: error_body,
            });
        }

        let rpc_response: JsonRpcResponse<T> =
            response
                .json()
                .await
                .map_err(|e| GethRpcError::ParseError {
                    message: format!("Failed to parse response: {e}"),
                })?;

        if let Some(error) = rpc_response.error {
            return Err(GethRpcError::RpcError {
                code: error.code,
                message: error.message,
            });
        }

        Ok(rpc_response.result)
    }

    /// Fetch the block at the given height with full transaction objects.
    /// Returns `None` when the node has no block at that height.
    pub async fn get_block_by_height(
        &self,
        height: i64,
    ) -> Result<Option<GetBlockReply>, GethRpcError> {
        let params = vec![
            serde_json::json!(format!("0x{height:x}")),
            serde_json::json!(true),
        ];
        self.request("eth_getBlockByNumber", params).await
    }

    /// Fetch the uncle at `index` of the block at `height`.
    pub async fn get_uncle_by_block_number_and_index(
        &self,
        height: i64,
        index: usize,
    ) -> Result<Option<GetBlockReply>, GethRpcError> {
        let params = vec![
            serde_json::json!(format!("0x{height:x}")),
            serde_json::json!(format!("0x{index:x}")),
        ];
        self.request("eth_getUncleByBlockNumberAndIndex", params)
            .await
    }

    /// Fetch the receipt for a transaction hash. A null receipt (not yet
    /// mined, or pruned) is returned as `None`.
    pub async fn get_tx_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TxReceiptReply>, GethRpcError> {
        let params = vec![serde_json::json!(tx_hash)];
        self.request("eth_getTransactionReceipt", params).await
    }

    /// Fetch the pending head. Only its `number` is meaningful to callers;
    /// a node answering null here is broken, so that case is an error.
    pub async fn get_pending_block(&self) -> Result<PendingBlockReply, GethRpcError> {
        let params = vec![serde_json::json!("pending"), serde_json::json!(false)];
        self.request("eth_getBlockByNumber", params)
            .await?
            .ok_or_else(|| GethRpcError::Other("node returned null pending block".to_string()))
    }
}
