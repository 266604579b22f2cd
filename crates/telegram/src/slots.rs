use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use questpal_core::domain::chat::{ChatId, MessageId};
use questpal_core::domain::geo::LatLon;

use crate::chats::ChatMap;
use crate::keyboard::InlineKeyboard;
use crate::messenger::{Messenger, MessengerError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotCategory {
    /// Text message carrying the current prompt or status.
    Main,
    /// Map pin for the quest being presented.
    Location,
}

impl SlotCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Location => "location",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SlotContent {
    Text { text: String, keyboard: Option<InlineKeyboard> },
    Location { point: LatLon, keyboard: Option<InlineKeyboard> },
}

impl SlotContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into(), keyboard: None }
    }

    pub fn text_with_keyboard(text: impl Into<String>, keyboard: InlineKeyboard) -> Self {
        Self::Text { text: text.into(), keyboard: Some(keyboard) }
    }

    pub fn location(point: LatLon, keyboard: Option<InlineKeyboard>) -> Self {
        Self::Location { point, keyboard }
    }

    fn is_editable(&self) -> bool {
        matches!(self, Self::Text { .. })
    }
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    message_id: MessageId,
    editable: bool,
}

type ChatSlots = HashMap<SlotCategory, Slot>;

/// Slots of chats quiet for this long are forgotten; their next render sends
/// fresh messages.
const SLOT_IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Keeps at most one live bot message per category per chat.
///
/// Text replaces text in place. Anything else, including a failed edit,
/// deletes the old message and sends a new one. A slot is forgotten before
/// its message is deleted, so a failed send never leaves it pointing at a
/// message that is gone.
pub struct SlotManager {
    messenger: Arc<dyn Messenger>,
    chats: ChatMap<ChatSlots>,
}

impl SlotManager {
    pub fn new(messenger: Arc<dyn Messenger>) -> Self {
        Self { messenger, chats: ChatMap::new(SLOT_IDLE_TIMEOUT) }
    }

    pub fn messenger(&self) -> &Arc<dyn Messenger> {
        &self.messenger
    }

    fn chat_slots(&self, chat_id: ChatId) -> Arc<tokio::sync::Mutex<ChatSlots>> {
        self.chats.get(chat_id)
    }

    pub fn tracked_chats(&self) -> usize {
        self.chats.len()
    }

    pub async fn current(&self, chat_id: ChatId, category: SlotCategory) -> Option<MessageId> {
        let slots = self.chat_slots(chat_id);
        let slots = slots.lock().await;
        slots.get(&category).map(|slot| slot.message_id)
    }

    pub async fn present(
        &self,
        chat_id: ChatId,
        category: SlotCategory,
        content: SlotContent,
    ) -> Result<MessageId, MessengerError> {
        let slots = self.chat_slots(chat_id);
        let mut slots = slots.lock().await;

        if let Some(slot) = slots.get(&category).copied() {
            if slot.editable {
                if let SlotContent::Text { text, keyboard } = &content {
                    match self
                        .messenger
                        .edit_message(chat_id, slot.message_id, text, keyboard.as_ref())
                        .await
                    {
                        Ok(()) | Err(MessengerError::NotModified) => return Ok(slot.message_id),
                        Err(error) => {
                            warn!(
                                event_name = "slots.edit_failed",
                                chat_id = chat_id.0,
                                slot = category.as_str(),
                                message_id = slot.message_id.0,
                                error = %error,
                                "edit failed, replacing message"
                            );
                        }
                    }
                }
            }

            slots.remove(&category);
            self.delete_quietly(chat_id, slot.message_id, category).await;
        }

        let editable = content.is_editable();
        let message_id = match content {
            SlotContent::Text { text, keyboard } => {
                self.messenger.send_message(chat_id, &text, keyboard.as_ref()).await?
            }
            SlotContent::Location { point, keyboard } => {
                self.messenger.send_location(chat_id, point, keyboard.as_ref()).await?
            }
        };
        slots.insert(category, Slot { message_id, editable });
        Ok(message_id)
    }

    /// Deletes the slot's message if there is one. Clearing an empty slot is a no-op.
    pub async fn clear(&self, chat_id: ChatId, category: SlotCategory) {
        let slots = self.chat_slots(chat_id);
        let mut slots = slots.lock().await;
        if let Some(slot) = slots.remove(&category) {
            self.delete_quietly(chat_id, slot.message_id, category).await;
        }
    }

    /// Forgets the slot without touching its message, so the message stays
    /// until someone deletes it. Returns the message the slot pointed at.
    pub async fn release(&self, chat_id: ChatId, category: SlotCategory) -> Option<MessageId> {
        let slots = self.chat_slots(chat_id);
        let mut slots = slots.lock().await;
        slots.remove(&category).map(|slot| slot.message_id)
    }

    /// Deletes a user message after `delay` without blocking the caller.
    pub fn schedule_delete(&self, chat_id: ChatId, message_id: MessageId, delay: Duration) -> JoinHandle<()> {
        let messenger = self.messenger.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(error) = messenger.delete_message(chat_id, message_id).await {
                if !error.is_benign() {
                    warn!(
                        event_name = "slots.delayed_delete_failed",
                        chat_id = chat_id.0,
                        message_id = message_id.0,
                        error = %error,
                        "delayed delete failed"
                    );
                }
            }
        })
    }

    async fn delete_quietly(&self, chat_id: ChatId, message_id: MessageId, category: SlotCategory) {
        match self.messenger.delete_message(chat_id, message_id).await {
            Ok(()) => {}
            Err(error) if error.is_benign() => {
                debug!(
                    event_name = "slots.already_gone",
                    chat_id = chat_id.0,
                    slot = category.as_str(),
                    message_id = message_id.0,
                    "message already deleted"
                );
            }
            Err(error) => {
                warn!(
                    event_name = "slots.delete_failed",
                    chat_id = chat_id.0,
                    slot = category.as_str(),
                    message_id = message_id.0,
                    error = %error,
                    "delete failed, slot forgotten anyway"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use questpal_core::domain::chat::{ChatId, MessageId};
    use questpal_core::domain::geo::LatLon;

    use super::{SlotCategory, SlotContent, SlotManager};
    use crate::messenger::testing::{RecordingMessenger, SentCall};
    use crate::messenger::MessengerError;

    const CHAT: ChatId = ChatId(11);

    fn manager() -> (Arc<RecordingMessenger>, SlotManager) {
        let messenger = Arc::new(RecordingMessenger::new());
        (messenger.clone(), SlotManager::new(messenger))
    }

    #[tokio::test]
    async fn text_slot_is_edited_in_place() {
        let (messenger, slots) = manager();

        let first = slots.present(CHAT, SlotCategory::Main, SlotContent::text("a")).await.expect("send");
        let second = slots.present(CHAT, SlotCategory::Main, SlotContent::text("b")).await.expect("edit");

        assert_eq!(first, second);
        assert!(matches!(messenger.calls().last(), Some(SentCall::EditMessage { text, .. }) if text == "b"));
    }

    #[tokio::test]
    async fn not_modified_counts_as_success() {
        let (messenger, slots) = manager();
        let first = slots.present(CHAT, SlotCategory::Main, SlotContent::text("same")).await.expect("send");

        messenger.fail_next_edit(MessengerError::NotModified);
        let again = slots.present(CHAT, SlotCategory::Main, SlotContent::text("same")).await.expect("noop");

        assert_eq!(first, again);
        assert!(messenger.deleted().is_empty());
    }

    #[tokio::test]
    async fn failed_edit_replaces_message() {
        let (messenger, slots) = manager();
        let first = slots.present(CHAT, SlotCategory::Main, SlotContent::text("a")).await.expect("send");

        messenger.fail_next_edit(MessengerError::NotFound("gone".to_string()));
        let second = slots.present(CHAT, SlotCategory::Main, SlotContent::text("b")).await.expect("resend");

        assert_ne!(first, second);
        assert_eq!(messenger.deleted(), vec![first]);
        assert_eq!(slots.current(CHAT, SlotCategory::Main).await, Some(second));
    }

    #[tokio::test]
    async fn location_slot_is_always_replaced() {
        let (messenger, slots) = manager();
        let point = LatLon::new(1.0, 2.0);

        let first = slots
            .present(CHAT, SlotCategory::Location, SlotContent::location(point, None))
            .await
            .expect("pin");
        let second = slots
            .present(CHAT, SlotCategory::Location, SlotContent::location(point, None))
            .await
            .expect("pin again");

        assert_ne!(first, second);
        assert_eq!(messenger.deleted(), vec![first]);
    }

    #[tokio::test]
    async fn clear_is_idempotent_and_tolerates_missing_messages() {
        let (messenger, slots) = manager();
        let pin = slots
            .present(CHAT, SlotCategory::Location, SlotContent::location(LatLon::new(0.0, 0.0), None))
            .await
            .expect("pin");

        messenger.fail_next_delete(MessengerError::NotFound("already deleted".to_string()));
        slots.clear(CHAT, SlotCategory::Location).await;
        slots.clear(CHAT, SlotCategory::Location).await;

        assert_eq!(messenger.deleted(), vec![pin]);
        assert_eq!(slots.current(CHAT, SlotCategory::Location).await, None);
    }

    #[tokio::test]
    async fn slots_are_independent_per_chat_and_category() {
        let (_, slots) = manager();
        let main = slots.present(CHAT, SlotCategory::Main, SlotContent::text("x")).await.expect("main");
        let other = slots.present(ChatId(12), SlotCategory::Main, SlotContent::text("y")).await.expect("other");

        assert_ne!(main, other);
        assert_eq!(slots.current(CHAT, SlotCategory::Location).await, None);
        assert_eq!(slots.current(ChatId(12), SlotCategory::Main).await, Some(other));
    }

    #[tokio::test]
    async fn cleared_main_slot_is_sent_fresh_on_next_present() {
        let (messenger, slots) = manager();
        let first = slots.present(CHAT, SlotCategory::Main, SlotContent::text("menu")).await.expect("send");

        slots.clear(CHAT, SlotCategory::Main).await;
        let second = slots.present(CHAT, SlotCategory::Main, SlotContent::text("menu again")).await.expect("send");

        assert_ne!(first, second);
        assert_eq!(messenger.deleted(), vec![first]);
        assert!(!messenger.calls().iter().any(|call| matches!(call, SentCall::EditMessage { .. })));
        assert!(matches!(messenger.calls().last(), Some(SentCall::SendMessage { text, .. }) if text == "menu again"));
        assert_eq!(slots.current(CHAT, SlotCategory::Main).await, Some(second));
    }

    #[tokio::test]
    async fn released_slot_keeps_its_message() {
        let (messenger, slots) = manager();
        let notice = slots.present(CHAT, SlotCategory::Main, SlotContent::text("bye")).await.expect("send");

        assert_eq!(slots.release(CHAT, SlotCategory::Main).await, Some(notice));
        assert_eq!(slots.release(CHAT, SlotCategory::Main).await, None);

        assert!(messenger.deleted().is_empty());
        assert_eq!(slots.current(CHAT, SlotCategory::Main).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_chats_are_forgotten() {
        let (_, slots) = manager();
        slots.present(CHAT, SlotCategory::Main, SlotContent::text("x")).await.expect("send");
        assert_eq!(slots.tracked_chats(), 1);

        tokio::time::advance(Duration::from_secs(24 * 60 * 60 + 1)).await;
        slots.present(ChatId(12), SlotCategory::Main, SlotContent::text("y")).await.expect("send");

        assert_eq!(slots.tracked_chats(), 1);
        assert_eq!(slots.current(CHAT, SlotCategory::Main).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_delete_waits_for_delay() {
        let (messenger, slots) = manager();
        let handle = slots.schedule_delete(CHAT, MessageId(99), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(messenger.deleted().is_empty());

        handle.await.expect("join");
        assert_eq!(messenger.deleted(), vec![MessageId(99)]);
    }
}
