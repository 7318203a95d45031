use sqlx::SqlitePool;

use crate::error::PersistenceError;
use crate::network::Currency;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Price {
    pub timestamp_ms: i64,
    pub currency: Currency,
    pub price: f32,
}

#[derive(sqlx::FromRow)]
struct PriceRow {
    timestamp: i64,
    price: f32,
}

/// Samples for `currency` with `start_ms <= timestamp <= end_ms`, oldest first.
pub async fn prices(
    pool: &SqlitePool,
    currency: Currency,
    start_ms: i64,
    end_ms: i64,
) -> Result<Vec<Price>, PersistenceError> {
    let rows: Vec<PriceRow> = sqlx::query_as(
        r"
        SELECT timestamp, price
        FROM prices
        WHERE currency = ?1 AND timestamp >= ?2 AND timestamp <= ?3
        ORDER BY timestamp
        ",
    )
    .bind(currency.ticker())
    .bind(start_ms)
    .bind(end_ms)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Price {
            timestamp_ms: row.timestamp,
            currency,
            price: row.price,
        })
        .collect())
}

pub async fn insert_price(pool: &SqlitePool, price: &Price) -> Result<(), PersistenceError> {
    sqlx::query("INSERT OR REPLACE INTO prices (timestamp, currency, price) VALUES (?1, ?2, ?3)")
        .bind(price.timestamp_ms)
        .bind(price.currency.ticker())
        .bind(price.price)
        .execute(pool)
        .await?;

    Ok(())
}

/// Sample closest to `at_ms`; the earlier one wins a tie.
pub fn nearest_price(samples: &[Price], at_ms: i64) -> Option<&Price> {
    samples
        .iter()
        .min_by_key(|sample| (sample.timestamp_ms.abs_diff(at_ms), sample.timestamp_ms))
}

/// Price of `currency` around `at_ms`, or zero when no sample falls inside the window.
pub async fn price_at(
    pool: &SqlitePool,
    currency: Currency,
    at_ms: i64,
    window_ms: i64,
) -> Result<f32, PersistenceError> {
    let samples = prices(
        pool,
        currency,
        at_ms.saturating_sub(window_ms),
        at_ms.saturating_add(window_ms),
    )
    .await?;

    Ok(nearest_price(&samples, at_ms).map_or(0.0, |sample| sample.price))
}
