use chrono::{DateTime, Utc};
use rocket::data::{Data, ToByteUnit};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::serde::{Deserialize, Serialize};
use rocket::{Route, State, get, post, routes};
use sqlx::SqlitePool;
use tracing::{error, warn};

use crate::error::{IngestError, ValidationError};
use crate::ingest::{IngestConfig, RawTransfer, ingest_batch};
use crate::network::{Currency, parse_planck};
use crate::store::{TxAction, TxStatus};

const NOTIFY_BODY_LIMIT_MIB: u32 = 2;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[get("/health")]
pub fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// One entry of the external transaction feed. Amounts are planck strings,
/// `timestamp` is in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedTransaction {
    pub id: String,
    pub hash: String,
    pub action: String,
    pub currency: String,
    pub to: String,
    pub from: String,
    pub value: String,
    #[serde(default)]
    pub fee: String,
    pub timestamp: i64,
    pub status: String,
}

impl TryFrom<FeedTransaction> for RawTransfer {
    type Error = ValidationError;

    fn try_from(tx: FeedTransaction) -> Result<Self, Self::Error> {
        let fee = if tx.fee.is_empty() {
            0
        } else {
            parse_planck(&tx.fee)?
        };

        let transfer = Self {
            action: TxAction::from_feed_name(&tx.action)?,
            currency: tx.currency.parse::<Currency>()?,
            value: parse_planck(&tx.value)?,
            fee,
            status: TxStatus::from_feed_name(&tx.status)?,
            external_tx_id: tx.id,
            hash: tx.hash,
            from: tx.from,
            to: tx.to,
            timestamp_ms: tx.timestamp,
        };

        // The whole feed is checked before any of it is written
        transfer.validate()?;
        Ok(transfer)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "success")]
pub enum NotifyResponse {
    #[serde(rename = "true")]
    Accepted { accepted: usize, notifications: u64 },
    #[serde(rename = "false")]
    Error { error: String },
}

fn rejected(status: Status, error: String) -> (Status, Json<NotifyResponse>) {
    warn!("Rejected /notify request: {error}");
    (status, Json(NotifyResponse::Error { error }))
}

#[post("/notify", data = "<data>")]
pub async fn notify(
    data: Data<'_>,
    pool: &State<SqlitePool>,
    config: &State<IngestConfig>,
) -> (Status, Json<NotifyResponse>) {
    let body = match data.open(NOTIFY_BODY_LIMIT_MIB.mebibytes()).into_string().await {
        Ok(body) if body.is_complete() => body.into_inner(),
        Ok(_) => {
            return rejected(
                Status::PayloadTooLarge,
                format!("Body exceeds {NOTIFY_BODY_LIMIT_MIB} MiB"),
            );
        }
        Err(e) => return rejected(Status::BadRequest, format!("Failed to read body: {e}")),
    };

    let feed: Vec<FeedTransaction> = match serde_json::from_str(&body) {
        Ok(feed) => feed,
        Err(e) => return rejected(Status::BadRequest, format!("Invalid JSON: {e}")),
    };

    let transfers = match feed
        .into_iter()
        .map(RawTransfer::try_from)
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(transfers) => transfers,
        Err(e) => return rejected(Status::BadRequest, e.to_string()),
    };

    match ingest_batch(pool.inner(), config.inner(), &transfers, Utc::now().timestamp()).await {
        Ok(summary) => (
            Status::Ok,
            Json(NotifyResponse::Accepted {
                accepted: transfers.len(),
                notifications: summary.notifications,
            }),
        ),
        Err(IngestError::Validation(e)) => rejected(Status::BadRequest, e.to_string()),
        Err(e @ IngestError::Persistence(_)) => {
            error!("Failed to persist notified transactions: {e}");
            (
                Status::InternalServerError,
                Json(NotifyResponse::Error {
                    error: e.to_string(),
                }),
            )
        }
    }
}

pub fn routes() -> Vec<Route> {
    routes![health, notify]
}
