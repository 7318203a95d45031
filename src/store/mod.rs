//! SQLite persistence for subscribers, profiles, prices, transactions and
//! notifications. Enums are stored as upper-case text.

mod notification;
mod price;
mod profile;
mod subscriber;
mod transaction;

pub use notification::{
    NewNotification, Notification, NotificationType, insert_notifications,
    mark_firebase_notified, undelivered_notifications,
};
pub use price::{Price, insert_price, nearest_price, price_at, prices};
pub use profile::{Profile, insert_address, insert_profile, profile_by_address};
pub use subscriber::{
    Subscriber, insert_subscriber, subscriber_by_profile_id, subscribers_by_range,
    subscribers_count,
};
pub use transaction::{
    Transaction, TxAction, TxDirection, TxStatus, insert_transaction,
    transaction_by_tx_id_and_owner,
};

/// SQLite integers are signed; counters and cursors above `i64::MAX` saturate.
pub(crate) fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
