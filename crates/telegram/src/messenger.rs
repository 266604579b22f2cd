use async_trait::async_trait;
use thiserror::Error;

use questpal_core::domain::chat::{ChatId, MessageId};
use questpal_core::domain::geo::LatLon;

use crate::keyboard::InlineKeyboard;

/// Failures reported by the chat transport. `NotFound` and `NotModified` form
/// the benign class that callers may treat as already done.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MessengerError {
    #[error("message not found: {0}")]
    NotFound(String),
    #[error("message is not modified")]
    NotModified,
    #[error("request rejected by chat transport: {0}")]
    Rejected(String),
    #[error("chat transport unavailable: {0}")]
    Transport(String),
}

impl MessengerError {
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::NotModified)
    }
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageId, MessengerError>;

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), MessengerError>;

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), MessengerError>;

    async fn send_location(
        &self,
        chat_id: ChatId,
        point: LatLon,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageId, MessengerError>;

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), MessengerError>;
}

/// Recording messenger for tests across the workspace.
pub mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use questpal_core::domain::chat::{ChatId, MessageId};
    use questpal_core::domain::geo::LatLon;

    use super::{Messenger, MessengerError};
    use crate::keyboard::InlineKeyboard;

    #[derive(Clone, Debug, PartialEq)]
    pub enum SentCall {
        SendMessage { chat_id: ChatId, message_id: MessageId, text: String, keyboard: Option<InlineKeyboard> },
        EditMessage { chat_id: ChatId, message_id: MessageId, text: String, keyboard: Option<InlineKeyboard> },
        DeleteMessage { chat_id: ChatId, message_id: MessageId },
        SendLocation { chat_id: ChatId, message_id: MessageId, point: LatLon, keyboard: Option<InlineKeyboard> },
        AnswerCallback { callback_id: String, text: Option<String> },
    }

    #[derive(Default)]
    struct State {
        next_id: i64,
        calls: Vec<(Instant, SentCall)>,
        edit_failures: VecDeque<MessengerError>,
        delete_failures: VecDeque<MessengerError>,
    }

    /// Hands out increasing message ids and records every call. Failures can
    /// be scripted for edits and deletes.
    #[derive(Default)]
    pub struct RecordingMessenger {
        state: Mutex<State>,
    }

    impl RecordingMessenger {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_next_edit(&self, error: MessengerError) {
            self.lock().edit_failures.push_back(error);
        }

        pub fn fail_next_delete(&self, error: MessengerError) {
            self.lock().delete_failures.push_back(error);
        }

        pub fn calls(&self) -> Vec<SentCall> {
            self.lock().calls.iter().map(|(_, call)| call.clone()).collect()
        }

        pub fn timed_calls(&self) -> Vec<(Instant, SentCall)> {
            self.lock().calls.clone()
        }

        pub fn texts_sent(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    SentCall::SendMessage { text, .. } | SentCall::EditMessage { text, .. } => Some(text),
                    _ => None,
                })
                .collect()
        }

        pub fn last_text(&self) -> Option<String> {
            self.texts_sent().pop()
        }

        pub fn last_location(&self) -> Option<(LatLon, Option<InlineKeyboard>)> {
            self.calls().into_iter().rev().find_map(|call| match call {
                SentCall::SendLocation { point, keyboard, .. } => Some((point, keyboard)),
                _ => None,
            })
        }

        pub fn deleted(&self) -> Vec<MessageId> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    SentCall::DeleteMessage { message_id, .. } => Some(message_id),
                    _ => None,
                })
                .collect()
        }

        pub fn clear_calls(&self) {
            self.lock().calls.clear();
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, State> {
            match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            }
        }

        fn record(&self, call: SentCall) {
            self.lock().calls.push((Instant::now(), call));
        }

        fn next_id(&self) -> MessageId {
            let mut state = self.lock();
            state.next_id += 1;
            MessageId(state.next_id)
        }
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send_message(
            &self,
            chat_id: ChatId,
            text: &str,
            keyboard: Option<&InlineKeyboard>,
        ) -> Result<MessageId, MessengerError> {
            let message_id = self.next_id();
            self.record(SentCall::SendMessage {
                chat_id,
                message_id,
                text: text.to_owned(),
                keyboard: keyboard.cloned(),
            });
            Ok(message_id)
        }

        async fn edit_message(
            &self,
            chat_id: ChatId,
            message_id: MessageId,
            text: &str,
            keyboard: Option<&InlineKeyboard>,
        ) -> Result<(), MessengerError> {
            if let Some(error) = self.lock().edit_failures.pop_front() {
                return Err(error);
            }
            self.record(SentCall::EditMessage {
                chat_id,
                message_id,
                text: text.to_owned(),
                keyboard: keyboard.cloned(),
            });
            Ok(())
        }

        async fn delete_message(
            &self,
            chat_id: ChatId,
            message_id: MessageId,
        ) -> Result<(), MessengerError> {
            self.record(SentCall::DeleteMessage { chat_id, message_id });
            match self.lock().delete_failures.pop_front() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }

        async fn send_location(
            &self,
            chat_id: ChatId,
            point: LatLon,
            keyboard: Option<&InlineKeyboard>,
        ) -> Result<MessageId, MessengerError> {
            let message_id = self.next_id();
            self.record(SentCall::SendLocation {
                chat_id,
                message_id,
                point,
                keyboard: keyboard.cloned(),
            });
            Ok(message_id)
        }

        async fn answer_callback(
            &self,
            callback_id: &str,
            text: Option<&str>,
            _show_alert: bool,
        ) -> Result<(), MessengerError> {
            self.record(SentCall::AnswerCallback {
                callback_id: callback_id.to_owned(),
                text: text.map(str::to_owned),
            });
            Ok(())
        }
    }
}
