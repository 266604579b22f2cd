//! Outbound flood control.
//!
//! Every outbound operation passes through one scheduler task. An operation is
//! released only when the global window has room and, for group chats, the
//! chat's own window has room too. Held operations never block eligible ones
//! queued behind them, but operations for the same chat are released and
//! delivered strictly in submission order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use questpal_core::config::DispatchConfig;
use questpal_core::domain::chat::{ChatId, ChatKind, MessageId};
use questpal_core::domain::geo::LatLon;

use crate::keyboard::InlineKeyboard;
use crate::lanes::{ChatLanes, LaneWorker};
use crate::messenger::{Messenger, MessengerError};

/// Delivery lanes with nothing to do for this long shut down.
const LANE_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Route {
    /// Counted against the global window only.
    Global,
    /// Counted against the global window and the chat's own window.
    Group(ChatId),
}

impl Route {
    pub fn for_chat(chat_id: ChatId) -> Self {
        match chat_id.kind() {
            ChatKind::Private => Self::Global,
            ChatKind::Group => Self::Group(chat_id),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    SendMessage { chat_id: ChatId, text: String, keyboard: Option<InlineKeyboard> },
    EditMessage { chat_id: ChatId, message_id: MessageId, text: String, keyboard: Option<InlineKeyboard> },
    DeleteMessage { chat_id: ChatId, message_id: MessageId },
    SendLocation { chat_id: ChatId, point: LatLon, keyboard: Option<InlineKeyboard> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationOutcome {
    Sent(MessageId),
    Applied,
}

impl Operation {
    pub fn chat_id(&self) -> ChatId {
        match self {
            Self::SendMessage { chat_id, .. }
            | Self::EditMessage { chat_id, .. }
            | Self::DeleteMessage { chat_id, .. }
            | Self::SendLocation { chat_id, .. } => *chat_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "send_message",
            Self::EditMessage { .. } => "edit_message",
            Self::DeleteMessage { .. } => "delete_message",
            Self::SendLocation { .. } => "send_location",
        }
    }

    async fn execute(self, messenger: &dyn Messenger) -> Result<OperationOutcome, MessengerError> {
        match self {
            Self::SendMessage { chat_id, text, keyboard } => messenger
                .send_message(chat_id, &text, keyboard.as_ref())
                .await
                .map(OperationOutcome::Sent),
            Self::EditMessage { chat_id, message_id, text, keyboard } => messenger
                .edit_message(chat_id, message_id, &text, keyboard.as_ref())
                .await
                .map(|()| OperationOutcome::Applied),
            Self::DeleteMessage { chat_id, message_id } => messenger
                .delete_message(chat_id, message_id)
                .await
                .map(|()| OperationOutcome::Applied),
            Self::SendLocation { chat_id, point, keyboard } => messenger
                .send_location(chat_id, point, keyboard.as_ref())
                .await
                .map(OperationOutcome::Sent),
        }
    }
}

type Reply = oneshot::Sender<Result<OperationOutcome, MessengerError>>;

struct Pending {
    operation: Operation,
    reply: Reply,
}

struct SlidingWindow {
    limit: usize,
    window: Duration,
    released: VecDeque<Instant>,
}

impl SlidingWindow {
    fn new(limit: u32, window_ms: u64) -> Self {
        Self {
            limit: usize::try_from(limit).unwrap_or(usize::MAX).max(1),
            window: Duration::from_millis(window_ms),
            released: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.released.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.released.pop_front();
            } else {
                break;
            }
        }
    }

    /// `None` when a release is allowed at `now`, otherwise the instant the
    /// oldest release leaves the window.
    fn blocked_until(&mut self, now: Instant) -> Option<Instant> {
        self.prune(now);
        if self.released.len() < self.limit {
            return None;
        }
        self.released.front().map(|oldest| *oldest + self.window)
    }

    fn record(&mut self, now: Instant) {
        self.released.push_back(now);
    }

    fn is_idle(&self) -> bool {
        self.released.is_empty()
    }
}

/// Handle to the scheduler task. Cloning shares the same windows.
#[derive(Clone)]
pub struct DispatchLimiter {
    submissions: mpsc::UnboundedSender<Pending>,
}

impl DispatchLimiter {
    /// Starts the scheduler on the current runtime. It stops once every handle
    /// is dropped and the queue has drained.
    pub fn spawn(messenger: Arc<dyn Messenger>, config: &DispatchConfig) -> Self {
        let (submissions, receiver) = mpsc::unbounded_channel();
        let scheduler = Scheduler {
            global: SlidingWindow::new(config.global_burst_limit, config.global_window_ms),
            group_limit: config.group_burst_limit,
            group_window_ms: config.group_window_ms,
            groups: HashMap::new(),
            pending: VecDeque::new(),
            lanes: ChatLanes::new(Arc::new(Delivery { messenger }), LANE_IDLE_TIMEOUT),
        };
        tokio::spawn(scheduler.run(receiver));
        Self { submissions }
    }

    /// Queues `operation` immediately and returns a receiver for its result.
    pub fn enqueue(
        &self,
        operation: Operation,
    ) -> oneshot::Receiver<Result<OperationOutcome, MessengerError>> {
        let (reply, receiver) = oneshot::channel();
        if let Err(mpsc::error::SendError(pending)) = self.submissions.send(Pending { operation, reply }) {
            let _ = pending.reply.send(Err(MessengerError::Transport("dispatch limiter stopped".to_string())));
        }
        receiver
    }

    /// Queues `operation` and waits until it has been released and delivered.
    pub async fn submit(&self, operation: Operation) -> Result<OperationOutcome, MessengerError> {
        self.enqueue(operation)
            .await
            .map_err(|_| MessengerError::Transport("dispatch limiter dropped the operation".to_string()))?
    }
}

struct Scheduler {
    global: SlidingWindow,
    group_limit: u32,
    group_window_ms: u64,
    groups: HashMap<ChatId, SlidingWindow>,
    pending: VecDeque<Pending>,
    lanes: ChatLanes<Pending>,
}

impl Scheduler {
    async fn run(mut self, mut submissions: mpsc::UnboundedReceiver<Pending>) {
        let mut open = true;
        loop {
            let wake = self.release_eligible(Instant::now());

            if self.pending.is_empty() {
                if !open {
                    break;
                }
                match submissions.recv().await {
                    Some(pending) => self.pending.push_back(pending),
                    None => open = false,
                }
                continue;
            }

            let Some(wake) = wake else {
                continue;
            };

            if open {
                tokio::select! {
                    received = submissions.recv() => match received {
                        Some(pending) => self.pending.push_back(pending),
                        None => open = false,
                    },
                    () = sleep_until(wake) => {}
                }
            } else {
                sleep_until(wake).await;
            }
        }
        debug!(event_name = "dispatch.limiter.stopped", "dispatch limiter drained and stopped");
    }

    /// Releases everything currently eligible and returns the earliest instant
    /// at which a held operation could become eligible.
    fn release_eligible(&mut self, now: Instant) -> Option<Instant> {
        let mut blocked_chats = HashSet::new();
        let mut wake: Option<Instant> = None;
        let mut index = 0;

        while index < self.pending.len() {
            let chat_id = self.pending[index].operation.chat_id();
            if blocked_chats.contains(&chat_id) {
                index += 1;
                continue;
            }

            let route = Route::for_chat(chat_id);
            match self.blocked_until(route, now) {
                None => {
                    if let Some(pending) = self.pending.remove(index) {
                        self.record(route, now);
                        self.release(pending);
                    }
                }
                Some(at) => {
                    blocked_chats.insert(chat_id);
                    wake = Some(wake.map_or(at, |current| current.min(at)));
                    index += 1;
                }
            }
        }

        self.groups.retain(|_, window| {
            window.prune(now);
            !window.is_idle()
        });
        wake
    }

    fn blocked_until(&mut self, route: Route, now: Instant) -> Option<Instant> {
        let global = self.global.blocked_until(now);
        let group = match route {
            Route::Global => None,
            Route::Group(chat_id) => {
                let (limit, window_ms) = (self.group_limit, self.group_window_ms);
                self.groups
                    .entry(chat_id)
                    .or_insert_with(|| SlidingWindow::new(limit, window_ms))
                    .blocked_until(now)
            }
        };
        match (global, group) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    fn record(&mut self, route: Route, now: Instant) {
        self.global.record(now);
        if let Route::Group(chat_id) = route {
            if let Some(window) = self.groups.get_mut(&chat_id) {
                window.record(now);
            }
        }
    }

    fn release(&mut self, pending: Pending) {
        let chat_id = pending.operation.chat_id();
        debug!(
            event_name = "dispatch.limiter.released",
            chat_id = chat_id.0,
            operation = pending.operation.name(),
            still_queued = self.pending.len(),
            "outbound operation released"
        );
        self.lanes.push(chat_id, pending);
    }
}

/// Delivers one chat's released operations in order.
struct Delivery {
    messenger: Arc<dyn Messenger>,
}

#[async_trait]
impl LaneWorker<Pending> for Delivery {
    async fn run(&self, chat_id: ChatId, job: Pending) {
        let operation = job.operation.name();
        let result = job.operation.execute(self.messenger.as_ref()).await;
        if let Err(error) = &result {
            if !error.is_benign() {
                warn!(
                    event_name = "dispatch.operation_failed",
                    chat_id = chat_id.0,
                    operation,
                    error = %error,
                    "outbound operation failed"
                );
            }
        }
        let _ = job.reply.send(result);
    }
}

/// [`Messenger`] that routes message operations through a [`DispatchLimiter`].
/// Callback answers are not messages and bypass the limiter.
pub struct ThrottledMessenger {
    inner: Arc<dyn Messenger>,
    limiter: DispatchLimiter,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn Messenger>, config: &DispatchConfig) -> Self {
        let limiter = DispatchLimiter::spawn(inner.clone(), config);
        Self { inner, limiter }
    }

    async fn expect_sent(&self, operation: Operation) -> Result<MessageId, MessengerError> {
        match self.limiter.submit(operation).await? {
            OperationOutcome::Sent(message_id) => Ok(message_id),
            OperationOutcome::Applied => {
                Err(MessengerError::Rejected("send completed without a message id".to_string()))
            }
        }
    }
}

#[async_trait]
impl Messenger for ThrottledMessenger {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageId, MessengerError> {
        self.expect_sent(Operation::SendMessage {
            chat_id,
            text: text.to_owned(),
            keyboard: keyboard.cloned(),
        })
        .await
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), MessengerError> {
        self.limiter
            .submit(Operation::EditMessage {
                chat_id,
                message_id,
                text: text.to_owned(),
                keyboard: keyboard.cloned(),
            })
            .await
            .map(|_| ())
    }

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), MessengerError> {
        self.limiter.submit(Operation::DeleteMessage { chat_id, message_id }).await.map(|_| ())
    }

    async fn send_location(
        &self,
        chat_id: ChatId,
        point: LatLon,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageId, MessengerError> {
        self.expect_sent(Operation::SendLocation { chat_id, point, keyboard: keyboard.cloned() }).await
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), MessengerError> {
        self.inner.answer_callback(callback_id, text, show_alert).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::Instant;

    use questpal_core::config::DispatchConfig;
    use questpal_core::domain::chat::{ChatId, MessageId};

    use super::{DispatchLimiter, Operation, OperationOutcome, Route, ThrottledMessenger};
    use crate::messenger::testing::{RecordingMessenger, SentCall};
    use crate::messenger::{Messenger, MessengerError};

    const GROUP: ChatId = ChatId(-100_555);

    fn text(chat_id: ChatId, body: impl Into<String>) -> Operation {
        Operation::SendMessage { chat_id, text: body.into(), keyboard: None }
    }

    fn sent_texts(calls: &[(Instant, SentCall)]) -> Vec<(Instant, ChatId, String)> {
        calls
            .iter()
            .filter_map(|(at, call)| match call {
                SentCall::SendMessage { chat_id, text, .. } => Some((*at, *chat_id, text.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn routes_follow_chat_kind() {
        assert_eq!(Route::for_chat(ChatId(17)), Route::Global);
        assert_eq!(Route::for_chat(GROUP), Route::Group(GROUP));
    }

    #[tokio::test(start_paused = true)]
    async fn group_burst_spills_into_the_next_window_in_order() {
        let messenger = Arc::new(RecordingMessenger::new());
        let limiter = DispatchLimiter::spawn(messenger.clone(), &DispatchConfig::default());
        let started = Instant::now();

        let receivers: Vec<_> = (0..40).map(|n| limiter.enqueue(text(GROUP, format!("m{n}")))).collect();
        for receiver in receivers {
            let outcome = receiver.await.expect("reply").expect("delivered");
            assert!(matches!(outcome, OperationOutcome::Sent(_)));
        }

        let sent = sent_texts(&messenger.timed_calls());
        assert_eq!(sent.len(), 40);
        let order: Vec<String> = sent.iter().map(|(_, _, body)| body.clone()).collect();
        let expected: Vec<String> = (0..40).map(|n| format!("m{n}")).collect();
        assert_eq!(order, expected);

        for (at, _, body) in &sent[..20] {
            assert!(at.duration_since(started) < Duration::from_secs(60), "{body} released too late");
        }
        for (at, _, body) in &sent[20..] {
            assert!(at.duration_since(started) >= Duration::from_secs(60), "{body} released too early");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_group_does_not_hold_back_private_chats() {
        let messenger = Arc::new(RecordingMessenger::new());
        let limiter = DispatchLimiter::spawn(messenger.clone(), &DispatchConfig::default());
        let started = Instant::now();

        let group: Vec<_> = (0..21).map(|n| limiter.enqueue(text(GROUP, format!("g{n}")))).collect();
        let private = limiter.enqueue(text(ChatId(7), "hello"));

        private.await.expect("reply").expect("delivered");
        let sent = sent_texts(&messenger.timed_calls());
        let (at, _, _) = sent
            .iter()
            .find(|(_, chat_id, _)| *chat_id == ChatId(7))
            .expect("private message delivered");
        assert!(at.duration_since(started) < Duration::from_secs(1));

        for receiver in group {
            receiver.await.expect("reply").expect("delivered");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn global_window_caps_private_traffic() {
        let messenger = Arc::new(RecordingMessenger::new());
        let limiter = DispatchLimiter::spawn(messenger.clone(), &DispatchConfig::default());
        let started = Instant::now();

        let receivers: Vec<_> = (1..=30).map(|n| limiter.enqueue(text(ChatId(n), "hi"))).collect();
        for receiver in receivers {
            receiver.await.expect("reply").expect("delivered");
        }

        let sent = sent_texts(&messenger.timed_calls());
        let late = sent
            .iter()
            .filter(|(at, _, _)| at.duration_since(started) >= Duration::from_millis(1017))
            .count();
        assert_eq!(late, 1);
    }

    #[tokio::test]
    async fn throttled_messenger_passes_results_and_errors_through() {
        let recording = Arc::new(RecordingMessenger::new());
        let messenger = ThrottledMessenger::new(recording.clone(), &DispatchConfig::default());

        let first = messenger.send_message(ChatId(3), "one", None).await.expect("send");
        assert_eq!(first, MessageId(1));

        recording.fail_next_edit(MessengerError::NotModified);
        let edit = messenger.edit_message(ChatId(3), first, "one", None).await;
        assert_eq!(edit, Err(MessengerError::NotModified));

        messenger.answer_callback("cb-1", None, false).await.expect("answer");
        assert!(recording
            .calls()
            .iter()
            .any(|call| matches!(call, SentCall::AnswerCallback { callback_id, .. } if callback_id == "cb-1")));
    }
}
