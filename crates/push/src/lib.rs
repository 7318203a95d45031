use async_trait::async_trait;
use std::fmt::{Debug, Display};
use std::sync::Arc;

pub mod dry_run;
pub mod error;
pub mod fcm;

pub use dry_run::LogPusher;
pub use error::PushError;
pub use fcm::{FcmConfig, FcmPusher};
pub use test::{SentPush, TestPusher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportedPusher {
    Fcm,
    DryRun,
    Test,
}

impl Display for SupportedPusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fcm => write!(f, "fcm"),
            Self::DryRun => write!(f, "dry_run"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// A single device notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub token: &'a str,
}

#[async_trait]
pub trait Pusher: Debug + Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Deliver one notification to the device identified by `message.token`.
    /// Implementations do not retry; the caller decides what a failure means.
    async fn notify(&self, message: PushMessage<'_>) -> Result<(), Self::Error>;

    fn to_supported_pusher(&self) -> SupportedPusher;
}

pub type DynPusher = Arc<dyn Pusher<Error = PushError>>;
