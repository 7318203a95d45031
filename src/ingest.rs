use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::{debug, error, info};

use crate::error::{IngestError, ValidationError};
use crate::network::Currency;
use crate::store::{
    self, NewNotification, NotificationType, Profile, Transaction, TxAction, TxDirection,
    TxStatus,
};

const DEFAULT_PRICE_WINDOW_MINUTES: i64 = 15;
const STAKING_REWARD_TITLE: &str = "Deposit payout";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestConfig {
    pub price_window_ms: i64,
}

impl IngestConfig {
    pub const fn from_minutes(minutes: i64) -> Self {
        Self {
            price_window_ms: minutes.saturating_mul(60_000),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self::from_minutes(DEFAULT_PRICE_WINDOW_MINUTES)
    }
}

/// A transfer as reported by the chain or by the transaction feed, amounts in planck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransfer {
    pub external_tx_id: String,
    pub hash: String,
    pub action: TxAction,
    pub currency: Currency,
    pub from: String,
    pub to: String,
    pub value: u128,
    pub fee: u128,
    pub timestamp_ms: i64,
    pub status: TxStatus,
}

impl RawTransfer {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.external_tx_id.is_empty() {
            return Err(ValidationError::MissingField("id"));
        }
        if self.to.is_empty() {
            return Err(ValidationError::MissingField("to"));
        }
        if self.from.is_empty() && self.action != TxAction::StakingReward {
            return Err(ValidationError::MissingField("from"));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub transactions: usize,
    pub notifications: u64,
}

/// Rows written for one transfer and the notifications they call for.
#[derive(Debug, Default)]
pub struct TransferIngest {
    pub transactions: usize,
    pub notifications: Vec<NewNotification>,
}

struct Side<'a> {
    direction: TxDirection,
    owner: Option<&'a Profile>,
    counterparty: Option<&'a Profile>,
    counterparty_address: &'a str,
}

/// Writes one Transaction row per side that belongs to a known profile,
/// skipping sides already stored under `(external_tx_id, owner)`.
pub async fn ingest_transfer(
    pool: &SqlitePool,
    config: &IngestConfig,
    transfer: &RawTransfer,
    now_sec: i64,
) -> Result<TransferIngest, IngestError> {
    transfer.validate()?;

    let network = transfer.currency.network();
    let value = transfer.currency.from_planck(transfer.value)?;
    let fee = transfer.currency.from_planck(transfer.fee)?;
    let price = store::price_at(
        pool,
        transfer.currency,
        transfer.timestamp_ms,
        config.price_window_ms,
    )
    .await?;

    let sender = store::profile_by_address(pool, network, &transfer.from).await?;
    let receiver = store::profile_by_address(pool, network, &transfer.to).await?;

    let sides = [
        Side {
            direction: TxDirection::Out,
            owner: sender.as_ref(),
            counterparty: receiver.as_ref(),
            counterparty_address: &transfer.to,
        },
        Side {
            direction: TxDirection::In,
            owner: receiver.as_ref(),
            counterparty: sender.as_ref(),
            counterparty_address: &transfer.from,
        },
    ];

    let mut outcome = TransferIngest::default();

    for side in sides {
        let Some(owner) = side.owner else {
            continue;
        };

        if store::transaction_by_tx_id_and_owner(pool, &transfer.external_tx_id, &owner.id)
            .await?
            .is_some()
        {
            debug!(
                "Transaction {} for {} already stored, skipping",
                transfer.external_tx_id, owner.id
            );
            continue;
        }

        let transaction = Transaction {
            id: None,
            external_tx_id: transfer.external_tx_id.clone(),
            hash: transfer.hash.clone(),
            currency: transfer.currency,
            member_address: side.counterparty_address.to_string(),
            member_profile_id: side.counterparty.map(|profile| profile.id.clone()),
            owner: owner.id.clone(),
            direction: side.direction,
            action: transfer.action,
            status: transfer.status,
            value: value.to_string(),
            fee: fee.to_string(),
            price,
            timestamp_ms: transfer.timestamp_ms,
        };

        // Lost a race with a concurrent writer of the same row
        let Some(id) = store::insert_transaction(pool, &transaction).await? else {
            continue;
        };
        outcome.transactions += 1;

        if !transfer.action.is_notified() || owner.is_chat_bot {
            continue;
        }

        let title = if transfer.action == TxAction::StakingReward {
            STAKING_REWARD_TITLE.to_string()
        } else {
            Profile::display_name(side.counterparty, side.counterparty_address)
        };

        outcome.notifications.push(NewNotification {
            kind: NotificationType::Transaction,
            title,
            message: notification_body(side.direction, value, transfer.currency, price),
            target_id: id.to_string(),
            user_id: owner.id.clone(),
            timestamp_sec: now_sec,
        });
    }

    Ok(outcome)
}

/// Ingests transfers in order and stores all resulting notifications in one
/// batch. On failure the notifications of transfers already written are
/// still stored before the error is returned.
pub async fn ingest_batch(
    pool: &SqlitePool,
    config: &IngestConfig,
    transfers: &[RawTransfer],
    now_sec: i64,
) -> Result<IngestSummary, IngestError> {
    let mut summary = IngestSummary::default();
    let mut notifications = Vec::new();

    for transfer in transfers {
        match ingest_transfer(pool, config, transfer, now_sec).await {
            Ok(outcome) => {
                summary.transactions += outcome.transactions;
                notifications.extend(outcome.notifications);
            }
            Err(e) => {
                error!("Failed to ingest transfer {}: {e}", transfer.external_tx_id);
                store::insert_notifications(pool, &notifications).await?;
                return Err(e);
            }
        }
    }

    summary.notifications = store::insert_notifications(pool, &notifications).await?;

    if summary.transactions > 0 {
        info!(
            "Ingested {} transfers: {} transactions, {} notifications",
            transfers.len(),
            summary.transactions,
            summary.notifications
        );
    }

    Ok(summary)
}

fn notification_body(
    direction: TxDirection,
    value: Decimal,
    currency: Currency,
    price: f32,
) -> String {
    let verb = match direction {
        TxDirection::Out => "Sent",
        TxDirection::In => "Received",
    };
    let mut body = format!("{verb} {value} {}", currency.ticker());

    let price = Decimal::from_f32_retain(price).filter(|price| *price > Decimal::ZERO);
    if let Some(price) = price {
        body.push_str(&format!(" (${:.2})", (value * price).round_dp(2)));
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Network;
    use crate::store::{
        Price, insert_address, insert_price, insert_profile, undelivered_notifications,
    };
    use crate::test_utils::setup_test_db;
    use rust_decimal_macros::dec;

    const NOW_SEC: i64 = 1_700_000_000;
    const T_MS: i64 = NOW_SEC * 1000;

    async fn seed_profile(pool: &SqlitePool, id: &str, name: &str, address: &str) {
        insert_profile(
            pool,
            &Profile {
                id: id.to_string(),
                name: name.to_string(),
                username: id.to_string(),
                is_chat_bot: false,
            },
        )
        .await
        .unwrap();
        insert_address(pool, id, Network::Polkadot, address)
            .await
            .unwrap();
    }

    fn transfer(action: TxAction, from: &str, to: &str, value: u128) -> RawTransfer {
        RawTransfer {
            external_tx_id: "100-1".to_string(),
            hash: "0xabc".to_string(),
            action,
            currency: Currency::Dot,
            from: from.to_string(),
            to: to.to_string(),
            value,
            fee: 0,
            timestamp_ms: T_MS,
            status: TxStatus::Success,
        }
    }

    async fn transaction_count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_transfer_between_two_profiles() {
        let pool = setup_test_db().await;
        seed_profile(&pool, "alice", "Alice", "A").await;
        seed_profile(&pool, "bob", "", "B").await;

        let summary = ingest_batch(
            &pool,
            &IngestConfig::default(),
            &[transfer(TxAction::Transfer, "A", "B", 10_000)],
            NOW_SEC,
        )
        .await
        .unwrap();

        assert_eq!(summary, IngestSummary { transactions: 2, notifications: 2 });

        let out = store::transaction_by_tx_id_and_owner(&pool, "100-1", "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.direction, TxDirection::Out);
        assert_eq!(out.member_profile_id.as_deref(), Some("bob"));
        assert_eq!(out.member_address, "B");
        assert_eq!(out.value, "0.000001");

        let incoming = store::transaction_by_tx_id_and_owner(&pool, "100-1", "bob")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(incoming.direction, TxDirection::In);
        assert_eq!(incoming.member_profile_id.as_deref(), Some("alice"));

        let notifications = undelivered_notifications(&pool, NOW_SEC).await.unwrap();
        let mut rendered: Vec<(String, String, String)> = notifications
            .into_iter()
            .map(|n| (n.user_id, n.title, n.message))
            .collect();
        rendered.sort();
        assert_eq!(
            rendered,
            vec![
                ("alice".to_string(), "@bob".to_string(), "Sent 0.000001 DOT".to_string()),
                ("bob".to_string(), "Alice".to_string(), "Received 0.000001 DOT".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_reingesting_is_idempotent() {
        let pool = setup_test_db().await;
        seed_profile(&pool, "alice", "Alice", "A").await;
        let config = IngestConfig::default();
        let transfers = [transfer(TxAction::Transfer, "A", "X", 10_000)];

        let first = ingest_batch(&pool, &config, &transfers, NOW_SEC).await.unwrap();
        let second = ingest_batch(&pool, &config, &transfers, NOW_SEC).await.unwrap();

        assert_eq!(first.transactions, 1);
        assert_eq!(second, IngestSummary::default());
        assert_eq!(transaction_count(&pool).await, 1);
        assert_eq!(undelivered_notifications(&pool, NOW_SEC).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_staking_reward_has_fixed_title() {
        let pool = setup_test_db().await;
        seed_profile(&pool, "carol", "Carol", "C").await;

        let summary = ingest_batch(
            &pool,
            &IngestConfig::default(),
            &[transfer(TxAction::StakingReward, "", "C", 25_000_000_000)],
            NOW_SEC,
        )
        .await
        .unwrap();

        assert_eq!(summary, IngestSummary { transactions: 1, notifications: 1 });

        let notifications = undelivered_notifications(&pool, NOW_SEC).await.unwrap();
        assert_eq!(notifications[0].title, "Deposit payout");
        assert_eq!(notifications[0].message, "Received 2.5 DOT");

        let row = store::transaction_by_tx_id_and_owner(&pool, "100-1", "carol")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.direction, TxDirection::In);
        assert_eq!(row.action, TxAction::StakingReward);
    }

    #[tokio::test]
    async fn test_other_actions_and_chat_bots_get_no_notification() {
        let pool = setup_test_db().await;
        seed_profile(&pool, "alice", "Alice", "A").await;
        insert_profile(
            &pool,
            &Profile {
                id: "bot".to_string(),
                name: "Bot".to_string(),
                username: "bot".to_string(),
                is_chat_bot: true,
            },
        )
        .await
        .unwrap();
        insert_address(&pool, "bot", Network::Polkadot, "BOT")
            .await
            .unwrap();

        let mut withdrawn = transfer(TxAction::StakingWithdrawn, "X", "A", 1);
        withdrawn.external_tx_id = "w-1".to_string();
        let to_bot = transfer(TxAction::Transfer, "X", "BOT", 1);

        let summary = ingest_batch(&pool, &IngestConfig::default(), &[withdrawn, to_bot], NOW_SEC)
            .await
            .unwrap();

        assert_eq!(summary, IngestSummary { transactions: 2, notifications: 0 });
    }

    #[tokio::test]
    async fn test_body_includes_fiat_value_when_price_known() {
        let pool = setup_test_db().await;
        seed_profile(&pool, "bob", "Bob", "B").await;
        insert_price(
            &pool,
            &Price {
                timestamp_ms: T_MS + 60_000,
                currency: Currency::Dot,
                price: 4.5,
            },
        )
        .await
        .unwrap();

        ingest_batch(
            &pool,
            &IngestConfig::default(),
            &[transfer(TxAction::Transfer, "X", "B", 20_000_000_000)],
            NOW_SEC,
        )
        .await
        .unwrap();

        let notifications = undelivered_notifications(&pool, NOW_SEC).await.unwrap();
        assert_eq!(notifications[0].title, "X");
        assert_eq!(notifications[0].message, "Received 2 DOT ($9.00)");

        let row = store::transaction_by_tx_id_and_owner(&pool, "100-1", "bob")
            .await
            .unwrap()
            .unwrap();
        assert!((row.price - 4.5).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_failure_keeps_notifications_of_earlier_transfers() {
        let pool = setup_test_db().await;
        seed_profile(&pool, "bob", "Bob", "B").await;

        let good = transfer(TxAction::Transfer, "X", "B", 1);
        let mut bad = transfer(TxAction::Transfer, "X", "B", u128::MAX);
        bad.external_tx_id = "100-2".to_string();

        let err = ingest_batch(&pool, &IngestConfig::default(), &[good, bad], NOW_SEC)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IngestError::Validation(ValidationError::AmountOverflow(_))
        ));
        assert_eq!(undelivered_notifications(&pool, NOW_SEC).await.unwrap().len(), 1);
    }

    #[test]
    fn test_notification_body() {
        assert_eq!(
            notification_body(TxDirection::Out, dec!(1.5), Currency::Ksm, 0.0),
            "Sent 1.5 KSM"
        );
        assert_eq!(
            notification_body(TxDirection::In, dec!(3), Currency::Dot, 2.5),
            "Received 3 DOT ($7.50)"
        );
    }
}
