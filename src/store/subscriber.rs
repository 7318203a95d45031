use sqlx::SqlitePool;

use super::to_sql_int;
use crate::error::PersistenceError;
use crate::network::Network;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub address: String,
    pub push_token: String,
    pub network: Network,
}

#[derive(sqlx::FromRow)]
struct SubscriberRow {
    address: String,
    push_token: String,
    network: String,
}

impl TryFrom<SubscriberRow> for Subscriber {
    type Error = PersistenceError;

    fn try_from(row: SubscriberRow) -> Result<Self, Self::Error> {
        let network = row
            .network
            .parse()
            .map_err(|_| PersistenceError::InvalidNetwork(row.network.clone()))?;

        Ok(Self {
            address: row.address,
            push_token: row.push_token,
            network,
        })
    }
}

pub async fn subscribers_count(
    pool: &SqlitePool,
    network: Network,
) -> Result<u64, PersistenceError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscribers WHERE network = ?1")
        .bind(network.as_str())
        .fetch_one(pool)
        .await?;

    Ok(u64::try_from(count).unwrap_or_default())
}

/// One page of subscribers in stable address order.
pub async fn subscribers_by_range(
    pool: &SqlitePool,
    network: Network,
    offset: u64,
    limit: u64,
) -> Result<Vec<Subscriber>, PersistenceError> {
    let rows: Vec<SubscriberRow> = sqlx::query_as(
        r"
        SELECT address, push_token, network
        FROM subscribers
        WHERE network = ?1
        ORDER BY address
        LIMIT ?2 OFFSET ?3
        ",
    )
    .bind(network.as_str())
    .bind(to_sql_int(limit))
    .bind(to_sql_int(offset))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Subscriber::try_from).collect()
}

/// Push subscription of any address owned by the profile.
pub async fn subscriber_by_profile_id(
    pool: &SqlitePool,
    profile_id: &str,
) -> Result<Option<Subscriber>, PersistenceError> {
    let row: Option<SubscriberRow> = sqlx::query_as(
        r"
        SELECT s.address, s.push_token, s.network
        FROM subscribers s
        JOIN addresses a ON a.address = s.address AND a.network = s.network
        WHERE a.profile_id = ?1
        ORDER BY s.address
        LIMIT 1
        ",
    )
    .bind(profile_id)
    .fetch_optional(pool)
    .await?;

    row.map(Subscriber::try_from).transpose()
}

pub async fn insert_subscriber(
    pool: &SqlitePool,
    subscriber: &Subscriber,
) -> Result<(), PersistenceError> {
    sqlx::query(
        r"
        INSERT INTO subscribers (address, push_token, network)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(address) DO UPDATE SET
            push_token = excluded.push_token,
            network = excluded.network
        ",
    )
    .bind(&subscriber.address)
    .bind(&subscriber.push_token)
    .bind(subscriber.network.as_str())
    .execute(pool)
    .await?;

    Ok(())
}
