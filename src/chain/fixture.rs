//! A minimal SCALE runtime for tests: V14 metadata declaring `System.Events`
//! and an in-memory node serving it.

use async_trait::async_trait;
use frame_metadata::RuntimeMetadataPrefixed;
use frame_metadata::v14::{
    ExtrinsicMetadata, PalletMetadata, PalletStorageMetadata, RuntimeMetadataV14,
    StorageEntryMetadata, StorageEntryModifier, StorageEntryType,
};
use parity_scale_codec::Encode;
use scale_info::{TypeInfo, meta_type};
use std::sync::Mutex;

use super::{BlockHash, ChainRpc, HeadSubscription};
use crate::error::ChainError;

#[derive(Encode, TypeInfo)]
pub struct AccountId32(pub [u8; 32]);

#[derive(Encode, TypeInfo)]
pub enum BalancesEvent {
    Withdraw {
        who: AccountId32,
        amount: u128,
    },
    Transfer {
        from: AccountId32,
        to: AccountId32,
        amount: u128,
    },
    Deposit {
        who: AccountId32,
        amount: u128,
    },
}

#[derive(Encode, TypeInfo)]
pub enum TreasuryEvent {
    Deposit { value: u128 },
}

#[derive(Encode, TypeInfo)]
pub enum SystemEvent {
    ExtrinsicSuccess,
}

#[derive(Encode, TypeInfo)]
pub enum RuntimeEvent {
    System(SystemEvent),
    Balances(BalancesEvent),
    Treasury(TreasuryEvent),
}

#[derive(Encode, TypeInfo)]
pub enum Phase {
    ApplyExtrinsic(u32),
    Finalization,
    Initialization,
}

#[derive(Encode, TypeInfo)]
pub struct EventRecord {
    pub phase: Phase,
    pub event: RuntimeEvent,
    pub topics: Vec<[u8; 32]>,
}

impl EventRecord {
    pub fn in_extrinsic(index: u32, event: RuntimeEvent) -> Self {
        Self {
            phase: Phase::ApplyExtrinsic(index),
            event,
            topics: Vec::new(),
        }
    }
}

pub fn encoded_metadata() -> Vec<u8> {
    let system = PalletMetadata {
        name: "System",
        storage: Some(PalletStorageMetadata {
            prefix: "System",
            entries: vec![StorageEntryMetadata {
                name: "Events",
                modifier: StorageEntryModifier::Default,
                ty: StorageEntryType::Plain(meta_type::<Vec<EventRecord>>()),
                default: vec![0],
                docs: vec![],
            }],
        }),
        calls: None,
        event: None,
        constants: vec![],
        error: None,
        index: 0,
    };

    let extrinsic = ExtrinsicMetadata {
        ty: meta_type::<()>(),
        version: 4,
        signed_extensions: vec![],
    };

    RuntimeMetadataPrefixed::from(RuntimeMetadataV14::new(
        vec![system],
        extrinsic,
        meta_type::<()>(),
    ))
    .encode()
}

pub fn block_hash(number: u64) -> BlockHash {
    BlockHash(format!("0x{number:064x}"))
}

/// Serves fixed metadata and events for every block and records the block
/// hash each metadata and storage request was made at.
pub struct StaticChain {
    pub metadata: Vec<u8>,
    pub events: Option<Vec<u8>>,
    pub requested_at: Mutex<Vec<(&'static str, BlockHash)>>,
}

impl StaticChain {
    pub fn new(metadata: Vec<u8>, events: Option<Vec<u8>>) -> Self {
        Self {
            metadata,
            events,
            requested_at: Mutex::new(Vec::new()),
        }
    }

    pub fn requested_at(&self) -> Vec<(&'static str, BlockHash)> {
        self.requested_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainRpc for StaticChain {
    async fn subscribe_finalized_heads(&self) -> Result<HeadSubscription, ChainError> {
        Err(ChainError::Subscribe("static chain has no heads".to_string()))
    }

    async fn block_hash(&self, number: u64) -> Result<BlockHash, ChainError> {
        Ok(block_hash(number))
    }

    async fn metadata(&self, at: &BlockHash) -> Result<Vec<u8>, ChainError> {
        self.requested_at
            .lock()
            .unwrap()
            .push(("metadata", at.clone()));
        Ok(self.metadata.clone())
    }

    async fn storage(&self, _key: &str, at: &BlockHash) -> Result<Option<Vec<u8>>, ChainError> {
        self.requested_at
            .lock()
            .unwrap()
            .push(("storage", at.clone()));
        Ok(self.events.clone())
    }
}
