use async_trait::async_trait;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tracing::warn;

use crate::{PushError, PushMessage, Pusher, SupportedPusher};

/// Pusher for dry-run mode that logs pushes without contacting a provider
#[derive(Debug, Clone)]
pub struct LogPusher {
    push_counter: Arc<AtomicU64>,
}

impl LogPusher {
    pub fn new() -> Self {
        Self {
            push_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn pushes(&self) -> u64 {
        self.push_counter.load(Ordering::SeqCst)
    }
}

impl Default for LogPusher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pusher for LogPusher {
    type Error = PushError;

    async fn notify(&self, message: PushMessage<'_>) -> Result<(), Self::Error> {
        let id = self.push_counter.fetch_add(1, Ordering::SeqCst) + 1;

        warn!(
            "[DRY-RUN] Would push #{id} to token {}: {} / {}",
            message.token, message.title, message.body
        );

        Ok(())
    }

    fn to_supported_pusher(&self) -> SupportedPusher {
        SupportedPusher::DryRun
    }
}
