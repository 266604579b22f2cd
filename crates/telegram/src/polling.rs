use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{ChatDispatcher, Update, UpdateEnvelope};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("update fetch failed: {0}")]
    Fetch(String),
    #[error("bot api rejected update request: {0}")]
    Rejected(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failed fetches tolerated before giving up.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 8, base_delay_ms: 250, max_delay_ms: 30_000 }
    }
}

impl ReconnectPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let multiplier = 1_u64 << attempt.min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms))
    }
}

#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Long-polls for updates after `offset`. `Ok(None)` means the source is
    /// closed and no more updates will arrive.
    async fn fetch_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Option<Vec<Update>>, TransportError>;
}

pub struct PollingRunner {
    source: Arc<dyn UpdateSource>,
    dispatcher: Arc<ChatDispatcher>,
    reconnect_policy: ReconnectPolicy,
    poll_timeout_secs: u64,
}

impl PollingRunner {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        dispatcher: Arc<ChatDispatcher>,
        reconnect_policy: ReconnectPolicy,
        poll_timeout_secs: u64,
    ) -> Self {
        Self { source, dispatcher, reconnect_policy, poll_timeout_secs }
    }

    /// Polls until the source closes. Fails once `max_retries` consecutive
    /// fetches have failed.
    pub async fn start(&self) -> Result<()> {
        let mut offset: Option<i64> = None;
        let mut failures: u32 = 0;
        info!(event_name = "ingress.telegram.polling_started", "telegram long polling started");

        loop {
            let batch = match self.source.fetch_updates(offset, self.poll_timeout_secs).await {
                Ok(Some(batch)) => batch,
                Ok(None) => {
                    info!(event_name = "ingress.telegram.polling_closed", "update source closed");
                    return Ok(());
                }
                Err(error) => {
                    warn!(
                        event_name = "ingress.telegram.fetch_failed",
                        attempt = failures,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %error,
                        "update fetch failed"
                    );
                    if failures >= self.reconnect_policy.max_retries {
                        bail!("telegram polling retries exhausted: {error}");
                    }
                    let delay = self.reconnect_policy.backoff(failures);
                    failures += 1;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    continue;
                }
            };

            failures = 0;
            for update in batch {
                let next = update.update_id + 1;
                offset = Some(offset.map_or(next, |current| current.max(next)));

                match UpdateEnvelope::from_update(update) {
                    Some(envelope) => {
                        self.dispatcher.dispatch(envelope);
                    }
                    None => debug!(
                        event_name = "ingress.telegram.update_skipped",
                        update_id = next - 1,
                        "update without a chat skipped"
                    ),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{PollingRunner, ReconnectPolicy, TransportError, UpdateSource};
    use crate::events::{
        ChatDispatcher, EventHandlerError, HandlerResult, Update, UpdateContext, UpdateEnvelope,
        UpdateHandler,
    };

    #[derive(Default)]
    struct ScriptedSource {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        batches: VecDeque<Result<Option<Vec<Update>>, TransportError>>,
        offsets: Vec<Option<i64>>,
    }

    impl ScriptedSource {
        fn with_script(batches: Vec<Result<Option<Vec<Update>>, TransportError>>) -> Self {
            Self { state: Mutex::new(ScriptedState { batches: batches.into(), offsets: Vec::new() }) }
        }

        async fn offsets(&self) -> Vec<Option<i64>> {
            self.state.lock().await.offsets.clone()
        }
    }

    #[async_trait]
    impl UpdateSource for ScriptedSource {
        async fn fetch_updates(
            &self,
            offset: Option<i64>,
            _timeout_secs: u64,
        ) -> Result<Option<Vec<Update>>, TransportError> {
            let mut state = self.state.lock().await;
            state.offsets.push(offset);
            state.batches.pop_front().unwrap_or(Ok(None))
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: std::sync::Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl UpdateHandler for Recorder {
        async fn handle(
            &self,
            envelope: &UpdateEnvelope,
            _ctx: &UpdateContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            self.seen.lock().expect("lock").push(envelope.update_id);
            Ok(HandlerResult::Processed)
        }
    }

    fn text_update(update_id: i64) -> Update {
        serde_json::from_value(serde_json::json!({
            "update_id": update_id,
            "message": {"message_id": update_id, "chat": {"id": 5}, "text": "hello"}
        }))
        .expect("update")
    }

    fn runner(source: Arc<ScriptedSource>, handler: Arc<Recorder>, max_retries: u32) -> PollingRunner {
        PollingRunner::new(
            source,
            Arc::new(ChatDispatcher::new(handler)),
            ReconnectPolicy { max_retries, base_delay_ms: 0, max_delay_ms: 0 },
            30,
        )
    }

    #[tokio::test]
    async fn offsets_advance_past_delivered_updates() {
        let source = Arc::new(ScriptedSource::with_script(vec![
            Ok(Some(vec![text_update(10), text_update(11)])),
            Err(TransportError::Fetch("reset by peer".to_string())),
            Ok(Some(vec![text_update(12)])),
        ]));
        let handler = Arc::new(Recorder::default());

        runner(source.clone(), handler.clone(), 3).start().await.expect("runner");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(source.offsets().await, vec![None, Some(12), Some(12), Some(13)]);
        assert_eq!(*handler.seen.lock().expect("lock"), vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn gives_up_after_consecutive_failures() {
        let failure = || Err(TransportError::Fetch("timeout".to_string()));
        let source = Arc::new(ScriptedSource::with_script(vec![failure(), failure(), failure()]));

        let result = runner(source.clone(), Arc::new(Recorder::default()), 2).start().await;

        assert!(result.is_err());
        assert_eq!(source.offsets().await.len(), 3);
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(250));
        assert_eq!(policy.backoff(2), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(30), Duration::from_millis(30_000));
    }
}
