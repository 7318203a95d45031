//! Resolves which transfer participants are push subscribers by paging through
//! the subscriber table, stopping as soon as every participant is resolved.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::debug;

use crate::chain::TransferEvent;
use crate::error::PersistenceError;
use crate::network::Network;
use crate::store::{self, Subscriber, TxDirection};

/// Counterparty address to cumulative planck amount.
pub type Counterparties = HashMap<String, u128>;

#[async_trait]
pub trait SubscriberSource: Send + Sync {
    async fn subscribers_count(&self, network: Network) -> Result<u64, PersistenceError>;

    async fn subscribers_by_range(
        &self,
        network: Network,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Subscriber>, PersistenceError>;
}

#[async_trait]
impl SubscriberSource for SqlitePool {
    async fn subscribers_count(&self, network: Network) -> Result<u64, PersistenceError> {
        store::subscribers_count(self, network).await
    }

    async fn subscribers_by_range(
        &self,
        network: Network,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Subscriber>, PersistenceError> {
        store::subscribers_by_range(self, network, offset, limit).await
    }
}

/// Participants of a block not yet resolved against the subscriber table.
/// An address leaves both maps as soon as it is resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemainingWork {
    sent_by: HashMap<String, Counterparties>,
    received_by: HashMap<String, Counterparties>,
}

impl RemainingWork {
    pub fn from_transfers<'a>(transfers: impl IntoIterator<Item = &'a TransferEvent>) -> Self {
        let mut work = Self::default();

        for transfer in transfers {
            add_amount(&mut work.sent_by, &transfer.from, &transfer.to, transfer.amount);
            add_amount(&mut work.received_by, &transfer.to, &transfer.from, transfer.amount);
        }

        work
    }

    pub fn is_empty(&self) -> bool {
        self.sent_by.is_empty() && self.received_by.is_empty()
    }

    pub fn participants(&self) -> usize {
        self.sent_by
            .keys()
            .chain(self.received_by.keys().filter(|a| !self.sent_by.contains_key(*a)))
            .count()
    }

    fn resolve(&mut self, subscriber: &Subscriber) -> impl Iterator<Item = SubscriberMatch> {
        let sent = self
            .sent_by
            .remove(&subscriber.address)
            .map(|counterparties| SubscriberMatch {
                subscriber: subscriber.clone(),
                direction: TxDirection::Out,
                counterparties,
            });

        let received = self
            .received_by
            .remove(&subscriber.address)
            .map(|counterparties| SubscriberMatch {
                subscriber: subscriber.clone(),
                direction: TxDirection::In,
                counterparties,
            });

        sent.into_iter().chain(received)
    }
}

fn add_amount(
    map: &mut HashMap<String, Counterparties>,
    address: &str,
    counterparty: &str,
    amount: u128,
) {
    let total = map
        .entry(address.to_string())
        .or_default()
        .entry(counterparty.to_string())
        .or_default();
    *total = total.saturating_add(amount);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberMatch {
    pub subscriber: Subscriber,
    pub direction: TxDirection,
    pub counterparties: Counterparties,
}

/// Pages through the network's subscribers until `work` is empty or every
/// row has been seen. Pages are read sequentially.
pub async fn match_subscribers<S: SubscriberSource + ?Sized>(
    source: &S,
    network: Network,
    mut work: RemainingWork,
    page_size: u64,
) -> Result<Vec<SubscriberMatch>, PersistenceError> {
    if work.sent_by.is_empty() || work.received_by.is_empty() {
        return Ok(Vec::new());
    }

    let page_size = page_size.max(1);
    let total = source.subscribers_count(network).await?;
    let mut matches = Vec::new();
    let mut offset = 0;

    while offset < total && !work.is_empty() {
        let page = source
            .subscribers_by_range(network, offset, page_size)
            .await?;

        if page.is_empty() {
            break;
        }

        for subscriber in &page {
            matches.extend(work.resolve(subscriber));
            if work.is_empty() {
                break;
            }
        }

        offset = offset.saturating_add(page_size);
    }

    debug!(
        "Matched {} subscriptions on {network}, {} participants unresolved after offset {offset}",
        matches.len(),
        work.participants()
    );

    Ok(matches)
}
