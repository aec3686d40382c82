use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, trace};
use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

use lotto_common::Address;

use crate::{
    endpoint::{ChainReader, ReadRequest, TransportError},
    submitter::TxHash,
};

/// Timeouts applied by the HTTP layer, the pool adds its own per-attempt bound
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub request_timeout: Duration,
    pub connection_timeout: Duration,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            connection_timeout: Duration::from_secs(3),
        }
    }
}

/// Health information for one endpoint
#[derive(Debug, Clone)]
pub struct EndpointHealth {
    pub is_healthy: bool,
    pub chain_id: Option<u64>,
    pub block_number: Option<u64>,
    pub response_time: Duration,
    pub error_message: Option<String>,
}

/// JSON-RPC request structure
#[derive(Debug, serde::Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u32,
    method: &'a str,
    params: Value,
}

/// JSON-RPC response structure
#[derive(Debug, serde::Deserialize)]
#[allow(dead_code)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Value,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC error structure
#[derive(Debug, serde::Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    data: Option<Value>,
}

/// JSON-RPC client for one settlement-layer node.
/// Every call is a single attempt: failover is the pool's job.
pub struct RpcClient {
    client: Client,
    url: Url,
}

impl RpcClient {
    /// Create a new client with default configuration
    pub fn new(address: &str) -> Result<Self> {
        Self::with_config(address, RpcClientConfig::default())
    }

    pub fn with_config(address: &str, config: RpcClientConfig) -> Result<Self> {
        let url = endpoint_url(address)?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connection_timeout)
            .build()?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: rand::random::<u32>(),
            method,
            params,
        };

        if log::log_enabled!(log::Level::Trace) {
            trace!("JSON-RPC {} -> {}", method, self.url);
        }

        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Connect(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(TransportError::Http(response.status().as_u16()));
        }

        let rpc_response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| {
                TransportError::InvalidResponse(format!("failed to parse JSON response: {}", e))
            })?;

        if let Some(error) = rpc_response.error {
            return Err(rpc_error(error));
        }

        rpc_response
            .result
            .ok_or_else(|| TransportError::InvalidResponse("no result in response".to_string()))
    }

    /// `eth_call` against the latest block
    pub async fn eth_call(&self, to: &Address, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        let params = json!([
            {
                "to": to.to_string(),
                "data": format!("0x{}", hex::encode(data)),
            },
            "latest"
        ]);

        let result = self.request("eth_call", params).await?;
        decode_hex_data(&result)
    }

    /// Submit a transaction through a node-managed account
    pub async fn send_transaction(
        &self,
        from: &Address,
        to: &Address,
        data: &[u8],
    ) -> Result<TxHash, TransportError> {
        let params = json!([{
            "from": from.to_string(),
            "to": to.to_string(),
            "data": format!("0x{}", hex::encode(data)),
        }]);

        let result = self.request("eth_sendTransaction", params).await?;
        let bytes = decode_hex_data(&result)?;
        TxHash::from_slice(&bytes).ok_or_else(|| {
            TransportError::InvalidResponse(format!("invalid transaction hash: {}", result))
        })
    }

    pub async fn chain_id(&self) -> Result<u64, TransportError> {
        let result = self.request("eth_chainId", Value::Array(Vec::new())).await?;
        decode_quantity(&result)
    }

    pub async fn block_number(&self) -> Result<u64, TransportError> {
        let result = self.request("eth_blockNumber", Value::Array(Vec::new())).await?;
        decode_quantity(&result)
    }

    /// Probe the endpoint without failing
    pub async fn health_check(&self) -> EndpointHealth {
        let start_time = Instant::now();

        let chain_id = match self.chain_id().await {
            Ok(id) => id,
            Err(e) => {
                return EndpointHealth {
                    is_healthy: false,
                    chain_id: None,
                    block_number: None,
                    response_time: start_time.elapsed(),
                    error_message: Some(format!("chain id check failed: {}", e)),
                }
            }
        };

        let block_number = self.block_number().await.ok();

        EndpointHealth {
            is_healthy: true,
            chain_id: Some(chain_id),
            block_number,
            response_time: start_time.elapsed(),
            error_message: None,
        }
    }
}

#[async_trait]
impl ChainReader for RpcClient {
    async fn call(&self, request: &ReadRequest) -> Result<Vec<u8>, TransportError> {
        if log::log_enabled!(log::Level::Debug) {
            debug!("eth_call {} on {} via {}", request.label, request.to, self.url);
        }
        self.eth_call(&request.to, &request.data).await
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient").field("url", &self.url).finish()
    }
}

fn rpc_error(error: JsonRpcError) -> TransportError {
    let message = match error.data {
        Some(Value::String(data)) if !error.message.contains(&data) => {
            format!("{} ({})", error.message, data)
        }
        _ => error.message,
    };
    TransportError::Rpc {
        code: error.code,
        message,
    }
}

/// `0x`-prefixed byte string, `0x` alone is an empty result
/// Parse an endpoint address, `host:port` without a scheme means plain HTTP
pub fn endpoint_url(address: &str) -> Result<Url, url::ParseError> {
    if address.contains("://") {
        Url::parse(address)
    } else {
        Url::parse(&format!("http://{}", address))
    }
}

pub fn decode_hex_data(value: &Value) -> Result<Vec<u8>, TransportError> {
    let text = value
        .as_str()
        .ok_or_else(|| {
            TransportError::InvalidResponse(format!("expected hex string, got {}", value))
        })?;
    let digits = text.strip_prefix("0x").unwrap_or(text);
    hex::decode(digits)
        .map_err(|e| TransportError::InvalidResponse(format!("invalid hex data: {}", e)))
}

/// `0x`-prefixed quantity without leading zeros
pub fn decode_quantity(value: &Value) -> Result<u64, TransportError> {
    let text = value
        .as_str()
        .ok_or_else(|| {
            TransportError::InvalidResponse(format!("expected quantity, got {}", value))
        })?;
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u64::from_str_radix(digits, 16).map_err(|e| {
        TransportError::InvalidResponse(format!("invalid quantity {}: {}", text, e))
    })
}
