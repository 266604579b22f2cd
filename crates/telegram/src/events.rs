use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use questpal_core::domain::chat::{ChatId, MessageId};
use questpal_core::domain::geo::LatLon;
use questpal_core::errors::ApplicationError;

use crate::lanes::{ChatLanes, LaneWorker};
use crate::messenger::MessengerError;

/// Per-chat workers with nothing queued for this long shut down.
const CHAT_QUEUE_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Subset of the Bot API `Update` object the bot consumes.
#[derive(Clone, Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<WireMessage>,
    #[serde(default)]
    pub callback_query: Option<WireCallbackQuery>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireMessage {
    pub message_id: i64,
    pub chat: WireChat,
    #[serde(default)]
    pub from: Option<WireUser>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub location: Option<WireLocation>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireChat {
    pub id: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireLocation {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireCallbackQuery {
    pub id: String,
    pub from: WireUser,
    #[serde(default)]
    pub message: Option<WireMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    pub user_id: i64,
    pub username: Option<String>,
}

impl From<WireUser> for Sender {
    fn from(user: WireUser) -> Self {
        Self { user_id: user.id, username: user.username }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    /// `/name args`; a `@botname` suffix on the command is dropped.
    Command { name: String, args: Vec<String> },
    Text(String),
    Location(LatLon),
    Callback { callback_id: String, data: String },
    /// Anything else posted in the chat (stickers, photos, ...).
    Other,
}

impl ChatEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Command { .. } => "command",
            Self::Text(_) => "text",
            Self::Location(_) => "location",
            Self::Callback { .. } => "callback",
            Self::Other => "other",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateEnvelope {
    pub update_id: i64,
    pub chat_id: ChatId,
    /// The user's message, or for callbacks the message carrying the button.
    pub message_id: Option<MessageId>,
    pub sender: Option<Sender>,
    pub event: ChatEvent,
}

impl UpdateEnvelope {
    /// `None` for updates not tied to a chat the bot can answer in.
    pub fn from_update(update: Update) -> Option<Self> {
        let update_id = update.update_id;

        if let Some(query) = update.callback_query {
            let message = query.message?;
            return Some(Self {
                update_id,
                chat_id: ChatId(message.chat.id),
                message_id: Some(MessageId(message.message_id)),
                sender: Some(query.from.into()),
                event: ChatEvent::Callback {
                    callback_id: query.id,
                    data: query.data.unwrap_or_default(),
                },
            });
        }

        let message = update.message?;
        let event = match (message.location, message.text) {
            (Some(location), _) => ChatEvent::Location(LatLon::new(location.latitude, location.longitude)),
            (None, Some(text)) => parse_text(text),
            (None, None) => ChatEvent::Other,
        };

        Some(Self {
            update_id,
            chat_id: ChatId(message.chat.id),
            message_id: Some(MessageId(message.message_id)),
            sender: message.from.map(Sender::from),
            event,
        })
    }
}

fn parse_text(text: String) -> ChatEvent {
    let Some(command) = text.strip_prefix('/') else {
        return ChatEvent::Text(text);
    };
    let mut words = command.split_whitespace();
    let Some(head) = words.next() else {
        return ChatEvent::Text(text);
    };
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    let args = words.map(str::to_owned).collect();
    ChatEvent::Command { name, args }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateContext {
    pub correlation_id: String,
    pub update_id: i64,
    pub chat_id: ChatId,
    pub message_id: Option<MessageId>,
    pub sender: Option<Sender>,
}

impl UpdateContext {
    pub fn from_envelope(envelope: &UpdateEnvelope) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            update_id: envelope.update_id,
            chat_id: envelope.chat_id,
            message_id: envelope.message_id,
            sender: envelope.sender.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed,
    Ignored,
}

#[derive(Debug, Error)]
pub enum EventHandlerError {
    #[error(transparent)]
    Application(#[from] ApplicationError),
    #[error(transparent)]
    Messenger(#[from] MessengerError),
}

#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn handle(
        &self,
        envelope: &UpdateEnvelope,
        ctx: &UpdateContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

struct HandlerLane {
    handler: Arc<dyn UpdateHandler>,
}

#[async_trait]
impl LaneWorker<(UpdateEnvelope, UpdateContext)> for HandlerLane {
    async fn run(&self, _chat_id: ChatId, (envelope, ctx): (UpdateEnvelope, UpdateContext)) {
        match self.handler.handle(&envelope, &ctx).await {
            Ok(HandlerResult::Processed) => {}
            Ok(HandlerResult::Ignored) => {
                debug!(
                    event_name = "ingress.telegram.update_ignored",
                    correlation_id = %ctx.correlation_id,
                    chat_id = ctx.chat_id.0,
                    event_type = envelope.event.event_type(),
                    "update ignored"
                );
            }
            Err(error) => {
                warn!(
                    event_name = "ingress.telegram.handler_failed",
                    correlation_id = %ctx.correlation_id,
                    chat_id = ctx.chat_id.0,
                    event_type = envelope.event.event_type(),
                    error = %error,
                    "update handler failed; continuing"
                );
            }
        }
    }
}

/// Fans updates out to one FIFO worker per chat, so a chat's updates are
/// handled one at a time in arrival order while chats proceed in parallel.
pub struct ChatDispatcher {
    lanes: ChatLanes<(UpdateEnvelope, UpdateContext)>,
}

impl ChatDispatcher {
    pub fn new(handler: Arc<dyn UpdateHandler>) -> Self {
        Self { lanes: ChatLanes::new(Arc::new(HandlerLane { handler }), CHAT_QUEUE_IDLE_TIMEOUT) }
    }

    /// Queues the update on its chat's worker without waiting for it and
    /// returns the correlation id its handling is logged under.
    pub fn dispatch(&self, envelope: UpdateEnvelope) -> String {
        let ctx = UpdateContext::from_envelope(&envelope);
        info!(
            event_name = "ingress.telegram.update_received",
            correlation_id = %ctx.correlation_id,
            update_id = envelope.update_id,
            chat_id = envelope.chat_id.0,
            event_type = envelope.event.event_type(),
            "telegram update received"
        );
        let correlation_id = ctx.correlation_id.clone();
        self.lanes.push(envelope.chat_id, (envelope, ctx));
        correlation_id
    }

    pub fn active_chats(&self) -> usize {
        self.lanes.active()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use questpal_core::domain::chat::{ChatId, MessageId};
    use questpal_core::domain::geo::LatLon;

    use super::{
        ChatDispatcher, ChatEvent, EventHandlerError, HandlerResult, Update, UpdateContext,
        UpdateEnvelope, UpdateHandler,
    };

    fn update(json: serde_json::Value) -> Update {
        serde_json::from_value(json).expect("update json")
    }

    #[test]
    fn commands_strip_bot_suffix_and_split_args() {
        let envelope = UpdateEnvelope::from_update(update(serde_json::json!({
            "update_id": 5,
            "message": {
                "message_id": 77,
                "chat": {"id": -100},
                "from": {"id": 9, "username": "ash"},
                "text": "/Hunt@questpal_bot now please"
            }
        })))
        .expect("chat update");

        assert_eq!(envelope.chat_id, ChatId(-100));
        assert_eq!(envelope.message_id, Some(MessageId(77)));
        assert_eq!(
            envelope.event,
            ChatEvent::Command { name: "hunt".to_string(), args: vec!["now".to_string(), "please".to_string()] }
        );
    }

    #[test]
    fn locations_and_callbacks_are_recognised() {
        let location = UpdateEnvelope::from_update(update(serde_json::json!({
            "update_id": 6,
            "message": {"message_id": 1, "chat": {"id": 3}, "location": {"latitude": 1.5, "longitude": 2.5}}
        })))
        .expect("location");
        assert_eq!(location.event, ChatEvent::Location(LatLon::new(1.5, 2.5)));

        let callback = UpdateEnvelope::from_update(update(serde_json::json!({
            "update_id": 7,
            "callback_query": {
                "id": "cb-1",
                "from": {"id": 3},
                "message": {"message_id": 40, "chat": {"id": 3}},
                "data": "quest_skip s1"
            }
        })))
        .expect("callback");
        assert_eq!(callback.message_id, Some(MessageId(40)));
        assert_eq!(
            callback.event,
            ChatEvent::Callback { callback_id: "cb-1".to_string(), data: "quest_skip s1".to_string() }
        );
    }

    #[test]
    fn updates_without_a_chat_are_dropped() {
        assert!(UpdateEnvelope::from_update(update(serde_json::json!({"update_id": 8}))).is_none());
    }

    #[test]
    fn context_gets_a_fresh_correlation_id() {
        let envelope = UpdateEnvelope {
            update_id: 1,
            chat_id: ChatId(1),
            message_id: None,
            sender: None,
            event: ChatEvent::Other,
        };
        let first = UpdateContext::from_envelope(&envelope);
        let second = UpdateContext::from_envelope(&envelope);
        assert_ne!(first.correlation_id, second.correlation_id);
        assert_eq!(first.chat_id, ChatId(1));
    }

    #[derive(Default)]
    struct ContextRecorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl UpdateHandler for ContextRecorder {
        async fn handle(
            &self,
            _envelope: &UpdateEnvelope,
            ctx: &UpdateContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            self.seen.lock().expect("lock").push(ctx.correlation_id.clone());
            Ok(HandlerResult::Processed)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn handler_sees_the_correlation_id_logged_on_receipt() {
        let handler = Arc::new(ContextRecorder::default());
        let dispatcher = ChatDispatcher::new(handler.clone());

        let first = dispatcher.dispatch(text_update(1, 10));
        let second = dispatcher.dispatch(text_update(2, 10));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_ne!(first, second);
        assert_eq!(*handler.seen.lock().expect("lock"), vec![first, second]);
    }

    #[derive(Default)]
    struct SlowRecorder {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl UpdateHandler for SlowRecorder {
        async fn handle(
            &self,
            envelope: &UpdateEnvelope,
            _ctx: &UpdateContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            if envelope.update_id == 1 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.seen.lock().expect("lock").push(envelope.update_id);
            Ok(HandlerResult::Processed)
        }
    }

    fn text_update(update_id: i64, chat_id: i64) -> UpdateEnvelope {
        UpdateEnvelope {
            update_id,
            chat_id: ChatId(chat_id),
            message_id: Some(MessageId(update_id)),
            sender: None,
            event: ChatEvent::Text("hi".to_string()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn same_chat_is_serialized_and_other_chats_overtake() {
        let handler = Arc::new(SlowRecorder::default());
        let dispatcher = ChatDispatcher::new(handler.clone());

        dispatcher.dispatch(text_update(1, 10));
        dispatcher.dispatch(text_update(2, 10));
        dispatcher.dispatch(text_update(3, 20));
        tokio::time::sleep(Duration::from_secs(1)).await;

        let seen = handler.seen.lock().expect("lock").clone();
        assert_eq!(seen, vec![3, 1, 2]);
    }
}
