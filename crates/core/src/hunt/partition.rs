use crate::domain::geo::LatLon;
use crate::domain::profile::{Area, RewardSelection};
use crate::domain::quest::QuestMap;
use crate::hunt::selector::{closest, ClosestQuest};
use crate::hunt::session::HuntSession;

/// Quests matching the reward selection whose stop lies within the area.
pub fn in_range(catalog: &QuestMap, area: &Area, rewards: &RewardSelection) -> QuestMap {
    catalog
        .iter()
        .filter(|(_, quest)| rewards.matches(quest) && area.contains(quest.location()))
        .map(|(stop_id, quest)| (stop_id.clone(), quest.clone()))
        .collect()
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuestQueues {
    pub active: QuestMap,
    pub skipped: QuestMap,
}

impl QuestQueues {
    pub fn open_count(&self) -> usize {
        self.active.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.active.is_empty() && self.skipped.is_empty()
    }
}

/// Splits in-range candidates against the session. Collected and ignored
/// stops are dropped, skipped stops go to their own queue. Session entries
/// that are no longer in the catalog are simply not matched.
pub fn partition(mut candidates: QuestMap, session: &HuntSession) -> QuestQueues {
    for stop_id in session.collected.iter().chain(session.ignored.iter()) {
        candidates.remove(stop_id);
    }

    let mut skipped = QuestMap::new();
    for stop_id in &session.skipped {
        if let Some(quest) = candidates.remove(stop_id) {
            skipped.insert(stop_id.clone(), quest);
        }
    }

    QuestQueues { active: candidates, skipped }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NextQuest {
    /// Nearest quest that was never deferred.
    Fresh(ClosestQuest),
    /// No fresh quest remains, so the nearest deferred one comes back.
    Deferred(ClosestQuest),
    Complete,
}

impl NextQuest {
    pub fn closest(&self) -> Option<&ClosestQuest> {
        match self {
            Self::Fresh(quest) | Self::Deferred(quest) => Some(quest),
            Self::Complete => None,
        }
    }
}

pub fn next_quest(queues: &QuestQueues, from: LatLon) -> NextQuest {
    if let Some(found) = closest(&queues.active, from) {
        return NextQuest::Fresh(found);
    }
    match closest(&queues.skipped, from) {
        Some(found) => NextQuest::Deferred(found),
        None => NextQuest::Complete,
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::geo::LatLon;
    use crate::domain::profile::{Area, RewardSelection};
    use crate::domain::quest::{Quest, QuestMap, Reward, StopId, TaskId};
    use crate::hunt::session::HuntSession;

    use super::{in_range, next_quest, partition, NextQuest};

    fn quest(stop: &str, latitude: f64, longitude: f64, pokemon_id: u32) -> Quest {
        Quest {
            stop_id: StopId::new(stop),
            stop_name: stop.to_owned(),
            latitude,
            longitude,
            timestamp: 0,
            reward: Reward::Pokemon { pokemon_id },
            task_id: TaskId::new("task"),
        }
    }

    fn catalog() -> QuestMap {
        [
            quest("a", 52.5201, 13.4050, 1),
            quest("b", 52.5210, 13.4050, 1),
            quest("c", 52.5220, 13.4050, 4),
            quest("far", 53.0, 13.4050, 1),
        ]
        .into_iter()
        .map(|quest| (quest.stop_id.clone(), quest))
        .collect()
    }

    fn selection(pokemon: &[u32]) -> RewardSelection {
        RewardSelection { pokemon: pokemon.to_vec(), ..RewardSelection::default() }
    }

    fn area() -> Area {
        Area::new(LatLon::new(52.52, 13.405), 1_000)
    }

    #[test]
    fn in_range_requires_reward_match_and_radius() {
        let found = in_range(&catalog(), &area(), &selection(&[1]));
        let ids: Vec<_> = found.keys().map(StopId::as_str).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn partition_drops_terminal_and_separates_skipped() {
        let mut session = HuntSession::new();
        session.mark_collected(&StopId::new("a"), None);
        session.skip(&StopId::new("b"));
        session.ignore(&StopId::new("far"));
        session.skip(&StopId::new("gone"));

        let queues = partition(in_range(&catalog(), &area(), &selection(&[1, 4])), &session);

        assert_eq!(queues.active.keys().map(StopId::as_str).collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(queues.skipped.keys().map(StopId::as_str).collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn skipped_quests_return_once_fresh_ones_run_out() {
        let mut session = HuntSession::new();
        session.skip(&StopId::new("a"));
        let from = LatLon::new(52.52, 13.405);

        let queues = partition(in_range(&catalog(), &area(), &selection(&[1])), &session);
        assert!(matches!(next_quest(&queues, from), NextQuest::Fresh(ref q) if q.stop_id.as_str() == "b"));

        session.mark_collected(&StopId::new("b"), None);
        let queues = partition(in_range(&catalog(), &area(), &selection(&[1])), &session);
        assert!(matches!(next_quest(&queues, from), NextQuest::Deferred(ref q) if q.stop_id.as_str() == "a"));

        session.mark_collected(&StopId::new("a"), None);
        let queues = partition(in_range(&catalog(), &area(), &selection(&[1])), &session);
        assert!(queues.is_exhausted());
        assert_eq!(next_quest(&queues, from), NextQuest::Complete);
    }
}
