use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::str::FromStr;

use crate::error::PersistenceError;

// 7 bound columns per row stays well under SQLite's parameter limit.
const INSERT_CHUNK: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationType {
    Transaction,
    Message,
}

impl NotificationType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transaction => "TRANSACTION",
            Self::Message => "MESSAGE",
        }
    }
}

impl FromStr for NotificationType {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRANSACTION" => Ok(Self::Transaction),
            "MESSAGE" => Ok(Self::Message),
            _ => Err(PersistenceError::InvalidNotificationType(s.to_string())),
        }
    }
}

/// Pending notification, not yet handed to the push provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub target_id: String,
    pub user_id: String,
    pub timestamp_sec: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: i64,
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub target_id: String,
    pub user_id: String,
    pub firebase_notified: bool,
    pub delivered: bool,
    pub timestamp_sec: i64,
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: i64,
    #[sqlx(rename = "type")]
    kind: String,
    title: String,
    message: String,
    target_id: String,
    user_id: String,
    firebase_notified: bool,
    delivered: bool,
    timestamp: i64,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = PersistenceError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            kind: row.kind.parse()?,
            title: row.title,
            message: row.message,
            target_id: row.target_id,
            user_id: row.user_id,
            firebase_notified: row.firebase_notified,
            delivered: row.delivered,
            timestamp_sec: row.timestamp,
        })
    }
}

/// Multi-row insert inside a single database transaction.
pub async fn insert_notifications(
    pool: &SqlitePool,
    notifications: &[NewNotification],
) -> Result<u64, PersistenceError> {
    if notifications.is_empty() {
        return Ok(0);
    }

    let mut sql_tx = pool.begin().await?;
    let mut inserted = 0;

    for chunk in notifications.chunks(INSERT_CHUNK) {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "INSERT INTO notifications \
             (type, title, message, target_id, user_id, firebase_notified, timestamp) ",
        );

        builder.push_values(chunk, |mut row, notification| {
            row.push_bind(notification.kind.as_str())
                .push_bind(&notification.title)
                .push_bind(&notification.message)
                .push_bind(&notification.target_id)
                .push_bind(&notification.user_id)
                .push_bind(false)
                .push_bind(notification.timestamp_sec);
        });

        inserted += builder.build().execute(&mut *sql_tx).await?.rows_affected();
    }

    sql_tx.commit().await?;
    Ok(inserted)
}

/// Notifications never handed to the push provider, created at or before
/// `max_timestamp_sec`, oldest first.
pub async fn undelivered_notifications(
    pool: &SqlitePool,
    max_timestamp_sec: i64,
) -> Result<Vec<Notification>, PersistenceError> {
    let rows: Vec<NotificationRow> = sqlx::query_as(
        r"
        SELECT id, type, title, message, target_id, user_id, firebase_notified, delivered, timestamp
        FROM notifications
        WHERE firebase_notified = 0 AND timestamp <= ?1
        ORDER BY id
        ",
    )
    .bind(max_timestamp_sec)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Notification::try_from).collect()
}

pub async fn mark_firebase_notified(pool: &SqlitePool, id: i64) -> Result<(), PersistenceError> {
    sqlx::query("UPDATE notifications SET firebase_notified = 1 WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}
