use chain_notifier_push::{DynPusher, PushMessage};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use crate::error::SchedulerError;
use crate::store::{
    Notification, mark_firebase_notified, subscriber_by_profile_id, undelivered_notifications,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub initial_delay: Duration,
    /// Minimum age of a notification before it is picked up.
    pub grace_period: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            initial_delay: Duration::from_secs(10),
            grace_period: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub delivered: usize,
    pub failed: usize,
    pub missing_token: usize,
}

impl TickSummary {
    pub const fn attempted(&self) -> usize {
        self.delivered + self.failed + self.missing_token
    }
}

/// Pushes pending notifications on a fixed interval. Every notification it
/// picks up is marked as notified exactly once, whatever the push outcome.
pub struct NotificationScheduler {
    config: SchedulerConfig,
    pool: SqlitePool,
    pusher: DynPusher,
    shutdown_rx: watch::Receiver<bool>,
}

impl NotificationScheduler {
    pub fn new(
        config: SchedulerConfig,
        pool: SqlitePool,
        pusher: DynPusher,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            pool,
            pusher,
            shutdown_rx,
        }
    }

    pub async fn run(mut self) {
        info!(
            "Starting notification scheduler with {} pusher, interval {:?}, initial delay {:?}",
            self.pusher.to_supported_pusher(),
            self.config.interval,
            self.config.initial_delay
        );

        let mut interval = interval_at(
            Instant::now() + self.config.initial_delay,
            self.config.interval,
        );
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick(Utc::now()).await {
                        Ok(summary) if summary.attempted() > 0 => info!(
                            "Notification tick: {} delivered, {} failed, {} without push token",
                            summary.delivered, summary.failed, summary.missing_token
                        ),
                        Ok(_) => debug!("Notification tick: nothing pending"),
                        Err(e) => error!("Notification tick failed: {e}"),
                    }
                }
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("Received shutdown signal, stopping notification scheduler");
                        break;
                    }
                }
            }
        }
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary, SchedulerError> {
        let grace = i64::try_from(self.config.grace_period.as_secs()).unwrap_or(i64::MAX);
        let pending =
            undelivered_notifications(&self.pool, now.timestamp().saturating_sub(grace)).await?;

        let mut summary = TickSummary::default();

        for notification in pending {
            if *self.shutdown_rx.borrow() {
                info!("Shutdown signal received, leaving remaining notifications pending");
                break;
            }

            self.deliver(&notification, &mut summary).await?;
            mark_firebase_notified(&self.pool, notification.id).await?;
        }

        Ok(summary)
    }

    async fn deliver(
        &self,
        notification: &Notification,
        summary: &mut TickSummary,
    ) -> Result<(), SchedulerError> {
        let token = subscriber_by_profile_id(&self.pool, &notification.user_id)
            .await?
            .map(|subscriber| subscriber.push_token)
            .filter(|token| !token.is_empty());

        let Some(token) = token else {
            debug!(
                "No push token for {}, dropping notification {}",
                notification.user_id, notification.id
            );
            summary.missing_token += 1;
            return Ok(());
        };

        let message = PushMessage {
            title: &notification.title,
            body: &notification.message,
            token: &token,
        };

        match self.pusher.notify(message).await {
            Ok(()) => summary.delivered += 1,
            Err(e) => {
                warn!(
                    "Push of notification {} to {} failed: {e}",
                    notification.id, notification.user_id
                );
                summary.failed += 1;
            }
        }

        Ok(())
    }
}
