use std::collections::HashMap;
use tracing::debug;

use super::decode::{EventRecord, Phase, decode_event_records};
use super::{BlockHash, ChainRpc, SYSTEM_EVENTS_KEY, ss58};
use crate::error::ExtractError;
use crate::network::Network;

/// A `Balances.Transfer` event with SS58 encoded participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub event_index: u32,
    pub extrinsic_index: Option<u32>,
    pub from: String,
    pub to: String,
    pub amount: u128,
    /// Zero when no fee deposit shares the transfer's phase.
    pub fee: u128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTransfers {
    pub number: u64,
    pub hash: BlockHash,
    pub transfers: Vec<TransferEvent>,
}

impl BlockTransfers {
    pub fn external_tx_id(&self, transfer: &TransferEvent) -> String {
        format!("{}-{}", self.number, transfer.event_index)
    }
}

pub async fn transfers_in_block<C: ChainRpc + ?Sized>(
    rpc: &C,
    network: Network,
    number: u64,
) -> Result<BlockTransfers, ExtractError> {
    let hash = rpc.block_hash(number).await?;

    // Runtime upgrades change event layouts, so metadata is always taken at this block.
    let metadata = rpc.metadata(&hash).await?;

    let Some(raw) = rpc.storage(SYSTEM_EVENTS_KEY, &hash).await? else {
        debug!("Block {number} ({hash}) has no System.Events storage");
        return Ok(BlockTransfers {
            number,
            hash,
            transfers: Vec::new(),
        });
    };

    let records = decode_event_records(&metadata, &raw)?;
    let transfers = transfers_from_records(&records, network);

    debug!(
        "Block {number} ({hash}): {} events, {} transfers",
        records.len(),
        transfers.len()
    );

    Ok(BlockTransfers {
        number,
        hash,
        transfers,
    })
}

pub fn transfers_from_records(records: &[EventRecord], network: Network) -> Vec<TransferEvent> {
    let fees = fees_by_extrinsic(records);
    let prefix = network.ss58_prefix();

    records
        .iter()
        .filter(|record| record.is("Balances", "Transfer"))
        .filter_map(|record| {
            let from = record.account("from", 0)?;
            let to = record.account("to", 1)?;
            let amount = record.balance("amount", 2)?;

            let extrinsic_index = match record.phase {
                Phase::ApplyExtrinsic(index) => Some(index),
                Phase::Finalization | Phase::Initialization => None,
            };
            let fee = extrinsic_index
                .and_then(|index| fees.get(&index).copied())
                .unwrap_or(0);

            Some(TransferEvent {
                event_index: record.index,
                extrinsic_index,
                from: ss58::encode(prefix, &from),
                to: ss58::encode(prefix, &to),
                amount,
                fee,
            })
        })
        .collect()
}

/// `modl` ++ `py/trsry`, zero padded: the treasury pallet account.
const TREASURY_ACCOUNT: [u8; 32] = *b"modlpy/trsry\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0";

#[derive(Debug, Default)]
struct FeeDeposits {
    treasury_event: Option<u128>,
    to_treasury_account: u128,
    others: u128,
}

impl FeeDeposits {
    /// Runtimes that emit both `Treasury.Deposit` and the `Balances.Deposit`
    /// crediting the treasury account report the same amount twice.
    fn total(&self) -> u128 {
        let treasury = self.treasury_event.unwrap_or(self.to_treasury_account);
        self.others.saturating_add(treasury)
    }
}

fn fees_by_extrinsic(records: &[EventRecord]) -> HashMap<u32, u128> {
    let mut deposits: HashMap<u32, FeeDeposits> = HashMap::new();

    for record in records {
        let Phase::ApplyExtrinsic(index) = record.phase else {
            continue;
        };

        if record.is("Treasury", "Deposit") {
            let Some(value) = record.balance("value", 0) else {
                continue;
            };
            let entry = deposits.entry(index).or_default();
            entry.treasury_event = Some(entry.treasury_event.unwrap_or(0).saturating_add(value));
        } else if record.is("Balances", "Deposit") {
            let Some(amount) = record.balance("amount", 1) else {
                continue;
            };
            let entry = deposits.entry(index).or_default();
            if record.account("who", 0) == Some(TREASURY_ACCOUNT) {
                entry.to_treasury_account = entry.to_treasury_account.saturating_add(amount);
            } else {
                entry.others = entry.others.saturating_add(amount);
            }
        }
    }

    deposits
        .into_iter()
        .map(|(index, deposits)| (index, deposits.total()))
        .collect()
}
