use std::collections::BTreeSet;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use tracing::info;

use crate::domain::quest::{Quest, QuestMap};

/// Read side of the quest table. Consumers only ever see immutable snapshots.
pub trait QuestCatalog: Send + Sync {
    fn snapshot(&self) -> Arc<CatalogSnapshot>;
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CatalogSnapshot {
    pub quests: QuestMap,
    pub pokemon_rewards: BTreeSet<u32>,
    pub item_rewards: BTreeSet<u32>,
}

impl CatalogSnapshot {
    /// Reward id sets always describe exactly the quests in the table; id 0
    /// means "unknown" and is never offered.
    fn from_quests(quests: QuestMap) -> Self {
        let pokemon_rewards =
            quests.values().filter_map(Quest::pokemon_id).filter(|id| *id != 0).collect();
        let item_rewards = quests.values().filter_map(Quest::item_id).filter(|id| *id != 0).collect();
        Self { quests, pokemon_rewards, item_rewards }
    }

    pub fn len(&self) -> usize {
        self.quests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quests.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub received: usize,
    pub stored: usize,
    pub discarded_stale: usize,
    pub total: usize,
}

/// Copy-on-write quest table. Writers build a new snapshot and swap it in, so
/// readers holding an older `Arc` are never affected.
#[derive(Default)]
pub struct InMemoryQuestCatalog {
    current: RwLock<Arc<CatalogSnapshot>>,
}

impl InMemoryQuestCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quests(quests: impl IntoIterator<Item = Quest>) -> Self {
        let catalog = Self::new();
        catalog.ingest(quests);
        catalog
    }

    /// Merges `quests` into the table. The copy, merge and swap happen under
    /// one write lock, so a concurrent `clear` is never undone.
    pub fn ingest(&self, quests: impl IntoIterator<Item = Quest>) -> IngestReport {
        let mut report = IngestReport::default();
        {
            let mut current = self.write();
            let mut next = QuestMap::clone(&current.quests);

            for quest in quests {
                report.received += 1;
                if let Some(existing) = next.get(&quest.stop_id) {
                    if !quest.supersedes(existing) {
                        report.discarded_stale += 1;
                        continue;
                    }
                }
                next.insert(quest.stop_id.clone(), quest);
                report.stored += 1;
            }
            report.total = next.len();

            *current = Arc::new(CatalogSnapshot::from_quests(next));
        }

        info!(
            event_name = "catalog.ingest.applied",
            received = report.received,
            stored = report.stored,
            discarded_stale = report.discarded_stale,
            total = report.total,
            "quest catalog updated"
        );
        report
    }

    pub fn clear(&self) {
        *self.write() = Arc::new(CatalogSnapshot::default());
        info!(event_name = "catalog.cleared", "all quests cleared");
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arc<CatalogSnapshot>> {
        match self.current.write() {
            Ok(current) => current,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl QuestCatalog for InMemoryQuestCatalog {
    fn snapshot(&self) -> Arc<CatalogSnapshot> {
        match self.current.read() {
            Ok(current) => Arc::clone(&current),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }
}
