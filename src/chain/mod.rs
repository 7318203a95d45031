use async_trait::async_trait;
use clap::Parser;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use std::fmt::{Display, Formatter};

use crate::error::{ChainError, DecodeError};
use crate::network::Network;

mod client;
pub(crate) mod decode;
#[cfg(test)]
pub(crate) mod fixture;
mod heads;
pub(crate) mod ss58;
pub(crate) mod transfers;

pub use client::WsChainClient;
pub use heads::FinalizedHeads;
pub use transfers::{BlockTransfers, TransferEvent, transfers_in_block};

/// Storage key of `System.Events`: `twox128("System") ++ twox128("Events")`.
pub(crate) const SYSTEM_EVENTS_KEY: &str =
    "0x26aa394eea5630e07c48ae0c9558cef780d41e5e16056765bc8461851072c9d7";

#[derive(Parser, Debug, Clone, Default)]
pub struct ChainEnv {
    #[clap(long, env)]
    pub polkadot_ws_url: Option<url::Url>,
    #[clap(long, env)]
    pub kusama_ws_url: Option<url::Url>,
    #[clap(long, env)]
    pub westend_ws_url: Option<url::Url>,
}

impl ChainEnv {
    pub fn endpoints(&self) -> Vec<(Network, url::Url)> {
        [
            (Network::Polkadot, &self.polkadot_ws_url),
            (Network::Kusama, &self.kusama_ws_url),
            (Network::Westend, &self.westend_ws_url),
        ]
        .into_iter()
        .filter_map(|(network, url)| url.clone().map(|url| (network, url)))
        .collect()
    }
}

/// Hex encoded (`0x`-prefixed) block hash as returned by the node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockHash(pub String);

impl Display for BlockHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) fn parse_block_number(number: &str) -> Result<u64, DecodeError> {
    let digits = number.strip_prefix("0x").unwrap_or(number);
    u64::from_str_radix(digits, 16)
        .map_err(|e| DecodeError::InvalidHeader(format!("{number}: {e}")))
}

/// A live subscription to finalized block numbers. Dropping it unsubscribes.
pub struct HeadSubscription {
    inner: BoxStream<'static, Result<u64, ChainError>>,
}

impl HeadSubscription {
    pub fn new(stream: impl Stream<Item = Result<u64, ChainError>> + Send + 'static) -> Self {
        Self {
            inner: stream.boxed(),
        }
    }

    /// Waits for the next finalized header. A closed stream is a stream error.
    pub async fn next_header(&mut self) -> Result<u64, ChainError> {
        match self.inner.next().await {
            Some(result) => result,
            None => Err(ChainError::Stream("subscription closed".to_string())),
        }
    }
}

impl std::fmt::Debug for HeadSubscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadSubscription").finish_non_exhaustive()
    }
}

#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn subscribe_finalized_heads(&self) -> Result<HeadSubscription, ChainError>;

    async fn block_hash(&self, number: u64) -> Result<BlockHash, ChainError>;

    /// SCALE encoded runtime metadata valid at `at`.
    async fn metadata(&self, at: &BlockHash) -> Result<Vec<u8>, ChainError>;

    async fn storage(&self, key: &str, at: &BlockHash) -> Result<Option<Vec<u8>>, ChainError>;
}
