use std::time::Duration;

use tokio::sync::OwnedMutexGuard;

use questpal_core::domain::chat::ChatId;
use questpal_core::domain::geo::LatLon;
use questpal_core::domain::quest::Quest;
use questpal_core::flows::HuntState;
use questpal_core::hunt::HuntSession;
use questpal_telegram::chats::ChatMap;

/// A session untouched for a day can only hold a past day's progress, which
/// the next hunt would discard anyway.
const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// What is currently shown for the presented quest, kept so the same view can
/// be rendered again without re-running selection.
#[derive(Clone, Debug, PartialEq)]
pub struct Presentation {
    pub quest: Quest,
    pub distance_m: f64,
    pub open: usize,
    pub skipped: usize,
    pub deferred: bool,
}

/// Everything the engine tracks for one conversation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatState {
    pub hunt: HuntState,
    pub session: HuntSession,
    /// Resolved start point waiting for `BeginHunt`.
    pub start_point: Option<LatLon>,
    pub area_center: Option<LatLon>,
    pub area_radius_m: Option<u32>,
    pub presentation: Option<Presentation>,
}

/// Per-chat state behind an async mutex, so two updates for one chat never
/// interleave even when entry points are called outside the dispatcher.
pub struct SessionRegistry {
    chats: ChatMap<ChatState>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_idle_timeout(SESSION_IDLE_TIMEOUT)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self { chats: ChatMap::new(idle_timeout) }
    }

    pub async fn lock(&self, chat_id: ChatId) -> OwnedMutexGuard<ChatState> {
        self.chats.get(chat_id).lock_owned().await
    }

    pub async fn snapshot(&self, chat_id: ChatId) -> ChatState {
        self.lock(chat_id).await.clone()
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }
}
