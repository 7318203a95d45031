//! Domain-specific error types, one per pipeline stage.
//! Each stage maps onto how the scan loop reacts: connection errors restart the
//! network task, everything else skips the current block.

/// Chain endpoint and subscription errors.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Failed to connect to chain endpoint: {0}")]
    Connection(String),
    #[error("Failed to subscribe to finalized heads: {0}")]
    Subscribe(String),
    #[error("Finalized head stream error: {0}")]
    Stream(String),
    #[error("RPC call {method} failed: {message}")]
    Rpc {
        method: &'static str,
        message: String,
    },
    #[error("Block {0} not found")]
    BlockNotFound(u64),
}

/// Metadata and event payload decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Failed to decode runtime metadata: {0}")]
    Metadata(#[from] parity_scale_codec::Error),
    #[error("Unsupported runtime metadata version")]
    UnsupportedMetadata,
    #[error("System.Events storage entry not found in metadata")]
    MissingEventsStorage,
    #[error("Failed to decode event records: {0}")]
    Events(String),
    #[error("Unexpected event record shape: {0}")]
    RecordShape(String),
    #[error("Invalid block header: {0}")]
    InvalidHeader(String),
}

/// Failure to turn a block into transfers.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Database persistence and data corruption errors.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Invalid network in database: {0}")]
    InvalidNetwork(String),
    #[error("Invalid currency in database: {0}")]
    InvalidCurrency(String),
    #[error("Invalid direction in database: {0}")]
    InvalidDirection(String),
    #[error("Invalid transaction action in database: {0}")]
    InvalidAction(String),
    #[error("Invalid transaction status in database: {0}")]
    InvalidStatus(String),
    #[error("Invalid notification type in database: {0}")]
    InvalidNotificationType(String),
}

/// Business rule violations on incoming transfers.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),
    #[error("Unknown transaction action: {0}")]
    UnknownAction(String),
    #[error("Unknown transaction status: {0}")]
    UnknownStatus(String),
    #[error("Invalid planck amount: {0}")]
    InvalidAmount(String),
    #[error("Amount {0} does not fit a display decimal")]
    AmountOverflow(u128),
    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Transfer validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Database persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl From<sqlx::Error> for IngestError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(PersistenceError::Database(err))
    }
}

/// Everything that can make the scan loop skip a single block.
#[derive(Debug, thiserror::Error)]
pub enum BlockProcessingError {
    #[error("Transfer extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("Subscriber lookup failed: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Transaction ingestion failed: {0}")]
    Ingest(#[from] IngestError),
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Database persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl From<sqlx::Error> for SchedulerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(PersistenceError::Database(err))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No chain endpoint configured; set at least one *_WS_URL")]
    NoEndpoints,
    #[error("Push configuration error: {0}")]
    Push(#[from] chain_notifier_push::PushError),
}
