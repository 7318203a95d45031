use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashSet;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::chain::{BlockTransfers, ChainRpc, FinalizedHeads, transfers_in_block};
use crate::error::{BlockProcessingError, ChainError};
use crate::ingest::{IngestConfig, IngestSummary, RawTransfer, ingest_batch};
use crate::matcher::{RemainingWork, match_subscribers};
use crate::network::Network;
use crate::store::{TxAction, TxDirection, TxStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannerConfig {
    pub page_size: u64,
    pub max_catch_up: u64,
    pub ingest: IngestConfig,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            page_size: 100_000,
            max_catch_up: 16,
            ingest: IngestConfig::default(),
        }
    }
}

/// Follows finalized blocks of one network and turns transfers touching
/// subscribers into transactions and pending notifications.
pub struct BlockScanner<C: ChainRpc> {
    network: Network,
    rpc: C,
    pool: SqlitePool,
    config: ScannerConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl<C: ChainRpc> BlockScanner<C> {
    pub fn new(
        network: Network,
        rpc: C,
        pool: SqlitePool,
        config: ScannerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            network,
            rpc,
            pool,
            config,
            shutdown_rx,
        }
    }

    /// Runs until shutdown. Returns an error only when the chain connection is
    /// lost; failures of a single block are logged and the block is skipped.
    pub async fn run(mut self) -> Result<(), ChainError> {
        info!("Starting block scanner for {}", self.network);

        let mut heads = FinalizedHeads::subscribe(&self.rpc, self.config.max_catch_up).await?;

        loop {
            tokio::select! {
                next = heads.next_block() => {
                    let number = next?;

                    if let Err(e) = process_block(
                        &self.rpc,
                        &self.pool,
                        self.network,
                        &self.config,
                        number,
                    )
                    .await
                    {
                        error!("Skipping block {number} on {}: {e}", self.network);
                    }
                }
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!(
                            "Received shutdown signal, stopping scanner for {} after block {:?}",
                            self.network,
                            heads.last_yielded()
                        );
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn process_block<C: ChainRpc>(
    rpc: &C,
    pool: &SqlitePool,
    network: Network,
    config: &ScannerConfig,
    number: u64,
) -> Result<IngestSummary, BlockProcessingError> {
    let block = transfers_in_block(rpc, network, number).await?;
    handle_block(pool, network, config, &block, Utc::now()).await
}

/// Matches a block's transfers against subscribers and ingests those that
/// touch at least one subscribed address.
pub async fn handle_block(
    pool: &SqlitePool,
    network: Network,
    config: &ScannerConfig,
    block: &BlockTransfers,
    now: DateTime<Utc>,
) -> Result<IngestSummary, BlockProcessingError> {
    let work = RemainingWork::from_transfers(&block.transfers);
    let matches = match_subscribers(pool, network, work, config.page_size).await?;

    if matches.is_empty() {
        debug!(
            "Block {} on {network}: {} transfers, no subscribers involved",
            block.number,
            block.transfers.len()
        );
        return Ok(IngestSummary::default());
    }

    for m in &matches {
        debug!(
            "{:?} subscriber {} has {} counterparties in block {}, {} planck total",
            m.direction,
            m.subscriber.address,
            m.counterparties.len(),
            block.number,
            m.counterparties
                .values()
                .fold(0_u128, |total, amount| total.saturating_add(*amount))
        );
    }

    let matched: HashSet<(&str, TxDirection)> = matches
        .iter()
        .map(|m| (m.subscriber.address.as_str(), m.direction))
        .collect();

    let transfers: Vec<RawTransfer> = block
        .transfers
        .iter()
        .filter(|t| {
            matched.contains(&(t.from.as_str(), TxDirection::Out))
                || matched.contains(&(t.to.as_str(), TxDirection::In))
        })
        .map(|t| RawTransfer {
            external_tx_id: block.external_tx_id(t),
            hash: block.hash.to_string(),
            action: TxAction::Transfer,
            currency: network.currency(),
            from: t.from.clone(),
            to: t.to.clone(),
            value: t.amount,
            fee: t.fee,
            timestamp_ms: now.timestamp_millis(),
            status: TxStatus::Success,
        })
        .collect();

    info!(
        "Block {} on {network}: {} of {} transfers involve {} subscriptions",
        block.number,
        transfers.len(),
        block.transfers.len(),
        matches.len()
    );

    Ok(ingest_batch(pool, &config.ingest, &transfers, now.timestamp()).await?)
}
