use sqlx::SqlitePool;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::error::{PersistenceError, ValidationError};
use crate::network::Currency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxDirection {
    In,
    Out,
}

impl TxDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
        }
    }
}

impl FromStr for TxDirection {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(Self::In),
            "OUT" => Ok(Self::Out),
            _ => Err(PersistenceError::InvalidDirection(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxAction {
    Transfer,
    StakingReward,
    StakingWithdrawn,
    StakingOpenDeposit,
    StakingAddAmount,
}

impl TxAction {
    const ALL: [Self; 5] = [
        Self::Transfer,
        Self::StakingReward,
        Self::StakingWithdrawn,
        Self::StakingOpenDeposit,
        Self::StakingAddAmount,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transfer => "TRANSFER",
            Self::StakingReward => "STAKING_REWARD",
            Self::StakingWithdrawn => "STAKING_WITHDRAWN",
            Self::StakingOpenDeposit => "STAKING_OPEN_DEPOSIT",
            Self::StakingAddAmount => "STAKING_ADD_AMOUNT",
        }
    }

    /// Name used by the transaction feed, e.g. `StakingReward`.
    pub const fn feed_name(self) -> &'static str {
        match self {
            Self::Transfer => "Transfer",
            Self::StakingReward => "StakingReward",
            Self::StakingWithdrawn => "StakingWithdrawn",
            Self::StakingOpenDeposit => "StakingOpenDeposit",
            Self::StakingAddAmount => "StakingAddAmount",
        }
    }

    pub fn from_feed_name(name: &str) -> Result<Self, ValidationError> {
        Self::ALL
            .into_iter()
            .find(|action| action.feed_name() == name)
            .ok_or_else(|| ValidationError::UnknownAction(name.to_string()))
    }

    pub const fn is_notified(self) -> bool {
        matches!(self, Self::Transfer | Self::StakingReward)
    }
}

impl Display for TxAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.feed_name())
    }
}

impl FromStr for TxAction {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| PersistenceError::InvalidAction(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxStatus {
    Success,
    Fail,
}

impl TxStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Fail => "FAIL",
        }
    }

    pub fn from_feed_name(name: &str) -> Result<Self, ValidationError> {
        match name {
            "Success" => Ok(Self::Success),
            "Fail" => Ok(Self::Fail),
            _ => Err(ValidationError::UnknownStatus(name.to_string())),
        }
    }
}

impl FromStr for TxStatus {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(Self::Success),
            "FAIL" => Ok(Self::Fail),
            _ => Err(PersistenceError::InvalidStatus(s.to_string())),
        }
    }
}

/// One side of a transfer as seen by the profile that owns it. Never updated
/// after insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: Option<i64>,
    pub external_tx_id: String,
    pub hash: String,
    pub currency: Currency,
    pub member_address: String,
    pub member_profile_id: Option<String>,
    pub owner: String,
    pub direction: TxDirection,
    pub action: TxAction,
    pub status: TxStatus,
    pub value: String,
    pub fee: String,
    pub price: f32,
    pub timestamp_ms: i64,
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    external_tx_id: String,
    hash: String,
    currency: String,
    member_address: String,
    member_profile_id: Option<String>,
    owner: String,
    direction: String,
    action: String,
    status: String,
    value: String,
    fee: String,
    price: f32,
    timestamp: i64,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = PersistenceError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let currency = row
            .currency
            .parse::<Currency>()
            .map_err(|_| PersistenceError::InvalidCurrency(row.currency.clone()))?;

        Ok(Self {
            id: Some(row.id),
            external_tx_id: row.external_tx_id,
            hash: row.hash,
            currency,
            member_address: row.member_address,
            member_profile_id: row.member_profile_id,
            owner: row.owner,
            direction: row.direction.parse()?,
            action: row.action.parse()?,
            status: row.status.parse()?,
            value: row.value,
            fee: row.fee,
            price: row.price,
            timestamp_ms: row.timestamp,
        })
    }
}

pub async fn transaction_by_tx_id_and_owner(
    pool: &SqlitePool,
    external_tx_id: &str,
    owner: &str,
) -> Result<Option<Transaction>, PersistenceError> {
    let row: Option<TransactionRow> = sqlx::query_as(
        r"
        SELECT id, external_tx_id, hash, currency, member_address, member_profile_id, owner,
               direction, action, status, value, fee, price, timestamp
        FROM transactions
        WHERE external_tx_id = ?1 AND owner = ?2
        ",
    )
    .bind(external_tx_id)
    .bind(owner)
    .fetch_optional(pool)
    .await?;

    row.map(Transaction::try_from).transpose()
}

/// Inserts the row unless `(external_tx_id, owner)` already exists. Returns
/// the new row id, or `None` for a duplicate.
pub async fn insert_transaction(
    pool: &SqlitePool,
    transaction: &Transaction,
) -> Result<Option<i64>, PersistenceError> {
    let result = sqlx::query(
        r"
        INSERT INTO transactions (
            external_tx_id, hash, currency, member_address, member_profile_id, owner,
            direction, action, status, value, fee, price, timestamp
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        ON CONFLICT(external_tx_id, owner) DO NOTHING
        ",
    )
    .bind(&transaction.external_tx_id)
    .bind(&transaction.hash)
    .bind(transaction.currency.ticker())
    .bind(&transaction.member_address)
    .bind(&transaction.member_profile_id)
    .bind(&transaction.owner)
    .bind(transaction.direction.as_str())
    .bind(transaction.action.as_str())
    .bind(transaction.status.as_str())
    .bind(&transaction.value)
    .bind(&transaction.fee)
    .bind(transaction.price)
    .bind(transaction.timestamp_ms)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    Ok(Some(result.last_insert_rowid()))
}
