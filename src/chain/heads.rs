use std::collections::VecDeque;
use tracing::{debug, info, warn};

use super::{ChainRpc, HeadSubscription};
use crate::error::ChainError;

enum StreamState {
    Subscribed(HeadSubscription),
    Resubscribing,
    Failed,
}

impl StreamState {
    const fn name(&self) -> &'static str {
        match self {
            Self::Subscribed(_) => "subscribed",
            Self::Resubscribing => "resubscribing",
            Self::Failed => "failed",
        }
    }
}

/// Finalized block numbers from one chain endpoint, in strictly increasing
/// order.
///
/// A dropped subscription moves the stream to `Resubscribing`; the next call
/// re-subscribes once and either returns to `Subscribed` or ends in `Failed`,
/// which is reported as a [`ChainError::Connection`] and is terminal.
/// Headers at or below the last yielded block are discarded. When finality
/// jumps over blocks, at most `max_catch_up` of the skipped blocks (the newest
/// ones) are yielded before the new head.
pub struct FinalizedHeads<'a, C: ChainRpc> {
    rpc: &'a C,
    state: StreamState,
    last_yielded: Option<u64>,
    pending: VecDeque<u64>,
    max_catch_up: u64,
}

impl<'a, C: ChainRpc> FinalizedHeads<'a, C> {
    pub async fn subscribe(rpc: &'a C, max_catch_up: u64) -> Result<Self, ChainError> {
        let subscription = rpc.subscribe_finalized_heads().await?;

        Ok(Self {
            rpc,
            state: StreamState::Subscribed(subscription),
            last_yielded: None,
            pending: VecDeque::new(),
            max_catch_up,
        })
    }

    pub const fn last_yielded(&self) -> Option<u64> {
        self.last_yielded
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    /// Returns the next finalized block number to process.
    pub async fn next_block(&mut self) -> Result<u64, ChainError> {
        if let Some(number) = self.pending.pop_front() {
            self.last_yielded = Some(number);
            return Ok(number);
        }

        loop {
            // Leaves `Resubscribing` behind if this future is dropped mid-wait,
            // so the next call starts with a fresh subscription.
            match std::mem::replace(&mut self.state, StreamState::Resubscribing) {
                StreamState::Subscribed(mut subscription) => {
                    match subscription.next_header().await {
                        Ok(number) => {
                            self.state = StreamState::Subscribed(subscription);

                            if self.last_yielded.is_some_and(|last| number <= last) {
                                debug!(
                                    "Discarding finalized head {number} (last yielded {:?})",
                                    self.last_yielded
                                );
                                continue;
                            }

                            return Ok(self.accept(number));
                        }
                        Err(e) => {
                            warn!("Finalized head subscription dropped: {e}, resubscribing");
                            drop(subscription);
                        }
                    }
                }
                StreamState::Resubscribing => match self.rpc.subscribe_finalized_heads().await {
                    Ok(subscription) => {
                        info!("Resubscribed to finalized heads");
                        self.state = StreamState::Subscribed(subscription);
                    }
                    Err(e) => {
                        self.state = StreamState::Failed;
                        return Err(ChainError::Connection(format!("resubscribe failed: {e}")));
                    }
                },
                StreamState::Failed => {
                    self.state = StreamState::Failed;
                    return Err(ChainError::Connection(
                        "finalized head stream has failed".to_string(),
                    ));
                }
            }
        }
    }

    fn accept(&mut self, number: u64) -> u64 {
        let Some(last) = self.last_yielded else {
            self.last_yielded = Some(number);
            return number;
        };

        let skipped = number - last - 1;
        if skipped > 0 && self.max_catch_up > 0 {
            let first = number - skipped.min(self.max_catch_up);
            if first > last + 1 {
                warn!(
                    "Finality jumped from {last} to {number}, not processing blocks {}..{first}",
                    last + 1
                );
            }
            self.pending.extend(first..number);
            self.pending.push_back(number);

            let next = self.pending.pop_front().unwrap_or(number);
            self.last_yielded = Some(next);
            return next;
        }

        self.last_yielded = Some(number);
        number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::BlockHash;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Serves one scripted subscription per `subscribe_finalized_heads` call.
    struct ScriptedRpc {
        subscriptions: Mutex<VecDeque<Result<Vec<Result<u64, ChainError>>, ChainError>>>,
        subscribe_calls: Mutex<usize>,
    }

    impl ScriptedRpc {
        fn new(scripts: Vec<Result<Vec<Result<u64, ChainError>>, ChainError>>) -> Self {
            Self {
                subscriptions: Mutex::new(scripts.into()),
                subscribe_calls: Mutex::new(0),
            }
        }

        fn subscribe_calls(&self) -> usize {
            *self.subscribe_calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ChainRpc for ScriptedRpc {
        async fn subscribe_finalized_heads(&self) -> Result<HeadSubscription, ChainError> {
            *self.subscribe_calls.lock().unwrap() += 1;
            let next = self
                .subscriptions
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ChainError::Subscribe("no more scripts".to_string())));
            next.map(|items| HeadSubscription::new(futures_util::stream::iter(items)))
        }

        async fn block_hash(&self, number: u64) -> Result<BlockHash, ChainError> {
            Err(ChainError::BlockNotFound(number))
        }

        async fn metadata(&self, _at: &BlockHash) -> Result<Vec<u8>, ChainError> {
            unimplemented!()
        }

        async fn storage(
            &self,
            _key: &str,
            _at: &BlockHash,
        ) -> Result<Option<Vec<u8>>, ChainError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn test_yields_increasing_blocks() {
        let rpc = ScriptedRpc::new(vec![Ok(vec![Ok(10), Ok(11), Ok(12)])]);
        let mut heads = FinalizedHeads::subscribe(&rpc, 0).await.unwrap();

        assert_eq!(heads.next_block().await.unwrap(), 10);
        assert_eq!(heads.next_block().await.unwrap(), 11);
        assert_eq!(heads.next_block().await.unwrap(), 12);
        assert_eq!(heads.last_yielded(), Some(12));
    }

    #[tokio::test]
    async fn test_resubscribes_after_stream_error_and_discards_replayed_heads() {
        let rpc = ScriptedRpc::new(vec![
            Ok(vec![
                Ok(10),
                Ok(11),
                Err(ChainError::Stream("connection reset".to_string())),
            ]),
            Ok(vec![Ok(10), Ok(11), Ok(12)]),
        ]);
        let mut heads = FinalizedHeads::subscribe(&rpc, 0).await.unwrap();

        assert_eq!(heads.next_block().await.unwrap(), 10);
        assert_eq!(heads.next_block().await.unwrap(), 11);
        assert_eq!(heads.next_block().await.unwrap(), 12);
        assert_eq!(rpc.subscribe_calls(), 2);
        assert_eq!(heads.state_name(), "subscribed");
    }

    #[tokio::test]
    async fn test_failed_resubscribe_escalates_to_connection_error() {
        let rpc = ScriptedRpc::new(vec![
            Ok(vec![Ok(5)]),
            Err(ChainError::Subscribe("node gone".to_string())),
        ]);
        let mut heads = FinalizedHeads::subscribe(&rpc, 0).await.unwrap();

        assert_eq!(heads.next_block().await.unwrap(), 5);

        let err = heads.next_block().await.unwrap_err();
        assert!(matches!(err, ChainError::Connection(_)));
        assert_eq!(heads.state_name(), "failed");

        // Failed is terminal: no further subscribe attempts
        assert!(matches!(
            heads.next_block().await,
            Err(ChainError::Connection(_))
        ));
        assert_eq!(rpc.subscribe_calls(), 2);
    }

    #[tokio::test]
    async fn test_fills_finality_gaps_up_to_limit() {
        let rpc = ScriptedRpc::new(vec![Ok(vec![Ok(100), Ok(103), Ok(120)])]);
        let mut heads = FinalizedHeads::subscribe(&rpc, 4).await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..9 {
            seen.push(heads.next_block().await.unwrap());
        }

        // 101..=103 fully, then only the 4 newest skipped blocks before 120
        assert_eq!(seen, vec![100, 101, 102, 103, 116, 117, 118, 119, 120]);
    }

    #[tokio::test]
    async fn test_no_gap_filling_when_disabled() {
        let rpc = ScriptedRpc::new(vec![Ok(vec![Ok(100), Ok(105)])]);
        let mut heads = FinalizedHeads::subscribe(&rpc, 0).await.unwrap();

        assert_eq!(heads.next_block().await.unwrap(), 100);
        assert_eq!(heads.next_block().await.unwrap(), 105);
    }
}
