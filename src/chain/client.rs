use async_trait::async_trait;
use futures_util::StreamExt;
use jsonrpsee::core::client::{ClientT, SubscriptionClientT};
use jsonrpsee::rpc_params;
use jsonrpsee::ws_client::{WsClient, WsClientBuilder};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::{BlockHash, ChainRpc, HeadSubscription, parse_block_number};
use crate::error::ChainError;

#[derive(Debug, Deserialize)]
struct Header {
    number: String,
}

/// Substrate JSON-RPC client over a single WebSocket connection.
#[derive(Clone)]
pub struct WsChainClient {
    client: Arc<WsClient>,
    endpoint: url::Url,
}

impl std::fmt::Debug for WsChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsChainClient")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl WsChainClient {
    pub async fn connect(endpoint: &url::Url) -> Result<Self, ChainError> {
        info!("Connecting to chain endpoint {endpoint}");

        let client = WsClientBuilder::default()
            .max_response_size(64 * 1024 * 1024)
            .build(endpoint.as_str())
            .await
            .map_err(|e| ChainError::Connection(format!("{endpoint}: {e}")))?;

        Ok(Self {
            client: Arc::new(client),
            endpoint: endpoint.clone(),
        })
    }

    fn rpc_error(method: &'static str, err: impl std::fmt::Display) -> ChainError {
        ChainError::Rpc {
            method,
            message: err.to_string(),
        }
    }

    fn decode_hex(method: &'static str, payload: &str) -> Result<Vec<u8>, ChainError> {
        hex::decode(payload.trim_start_matches("0x")).map_err(|e| Self::rpc_error(method, e))
    }
}

#[async_trait]
impl ChainRpc for WsChainClient {
    async fn subscribe_finalized_heads(&self) -> Result<HeadSubscription, ChainError> {
        if !self.client.is_connected() {
            return Err(ChainError::Connection(format!(
                "{}: connection closed",
                self.endpoint
            )));
        }

        let subscription = self
            .client
            .subscribe::<Header, _>(
                "chain_subscribeFinalizedHeads",
                rpc_params![],
                "chain_unsubscribeFinalizedHeads",
            )
            .await
            .map_err(|e| ChainError::Subscribe(e.to_string()))?;

        debug!("Subscribed to finalized heads on {}", self.endpoint);

        Ok(HeadSubscription::new(subscription.map(|item| {
            let header = item.map_err(|e| ChainError::Stream(e.to_string()))?;
            parse_block_number(&header.number).map_err(|e| ChainError::Stream(e.to_string()))
        })))
    }

    async fn block_hash(&self, number: u64) -> Result<BlockHash, ChainError> {
        const METHOD: &str = "chain_getBlockHash";

        let hash: Option<String> = self
            .client
            .request(METHOD, rpc_params![number])
            .await
            .map_err(|e| Self::rpc_error(METHOD, e))?;

        hash.map(BlockHash).ok_or(ChainError::BlockNotFound(number))
    }

    async fn metadata(&self, at: &BlockHash) -> Result<Vec<u8>, ChainError> {
        const METHOD: &str = "state_getMetadata";

        let metadata: String = self
            .client
            .request(METHOD, rpc_params![&at.0])
            .await
            .map_err(|e| Self::rpc_error(METHOD, e))?;

        Self::decode_hex(METHOD, &metadata)
    }

    async fn storage(&self, key: &str, at: &BlockHash) -> Result<Option<Vec<u8>>, ChainError> {
        const METHOD: &str = "state_getStorage";

        let value: Option<String> = self
            .client
            .request(METHOD, rpc_params![key, &at.0])
            .await
            .map_err(|e| Self::rpc_error(METHOD, e))?;

        value
            .map(|payload| Self::decode_hex(METHOD, &payload))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_to_unreachable_endpoint_is_connection_error() {
        let endpoint = url::Url::parse("ws://127.0.0.1:1").unwrap();

        let err = WsChainClient::connect(&endpoint).await.unwrap_err();
        assert!(matches!(err, ChainError::Connection(_)));
    }

    #[test]
    fn test_decode_hex_payload() {
        assert_eq!(
            WsChainClient::decode_hex("state_getStorage", "0x0102ff").unwrap(),
            vec![1, 2, 255]
        );
        assert!(matches!(
            WsChainClient::decode_hex("state_getStorage", "0xzz"),
            Err(ChainError::Rpc { method: "state_getStorage", .. })
        ));
    }
}
