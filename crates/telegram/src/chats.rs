use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use questpal_core::domain::chat::ChatId;

struct Entry<V> {
    value: Arc<tokio::sync::Mutex<V>>,
    last_used: Instant,
}

struct Entries<V> {
    by_chat: HashMap<ChatId, Entry<V>>,
    last_sweep: Instant,
}

/// Per-chat state behind an async mutex. Entries untouched for
/// `idle_timeout` are dropped on a later access unless someone still holds
/// them; a dropped chat starts again from `V::default()`.
pub struct ChatMap<V> {
    entries: Mutex<Entries<V>>,
    idle_timeout: Duration,
}

impl<V: Default> ChatMap<V> {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(Entries { by_chat: HashMap::new(), last_sweep: Instant::now() }),
            idle_timeout,
        }
    }

    pub fn get(&self, chat_id: ChatId) -> Arc<tokio::sync::Mutex<V>> {
        let now = Instant::now();
        let mut entries = self.lock();

        if now.duration_since(entries.last_sweep) >= self.idle_timeout {
            entries.last_sweep = now;
            let idle_timeout = self.idle_timeout;
            entries.by_chat.retain(|_, entry| {
                Arc::strong_count(&entry.value) > 1 || now.duration_since(entry.last_used) < idle_timeout
            });
        }

        let entry = entries
            .by_chat
            .entry(chat_id)
            .or_insert_with(|| Entry { value: Arc::default(), last_used: now });
        entry.last_used = now;
        entry.value.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().by_chat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Entries<V>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
