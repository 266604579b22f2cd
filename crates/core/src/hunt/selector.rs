use crate::domain::geo::LatLon;
use crate::domain::quest::{QuestMap, StopId};

#[derive(Clone, Debug, PartialEq)]
pub struct ClosestQuest {
    pub stop_id: StopId,
    pub distance_m: f64,
}

/// Returns the candidate nearest to `from`, or `None` when there is none.
///
/// Candidates are scanned in stop-id order and only a strictly smaller
/// distance replaces the current best, so among equidistant quests the
/// lexicographically smallest stop id wins.
pub fn closest(candidates: &QuestMap, from: LatLon) -> Option<ClosestQuest> {
    let mut best: Option<ClosestQuest> = None;

    for (stop_id, quest) in candidates {
        let distance_m = from.distance_to(&quest.location());
        let closer = best.as_ref().map_or(true, |current| distance_m < current.distance_m);
        if closer {
            best = Some(ClosestQuest { stop_id: stop_id.clone(), distance_m });
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use crate::domain::geo::LatLon;
    use crate::domain::quest::{Quest, QuestMap, Reward, StopId, TaskId};

    use super::closest;

    fn quest(stop: &str, latitude: f64, longitude: f64) -> Quest {
        Quest {
            stop_id: StopId::new(stop),
            stop_name: stop.to_owned(),
            latitude,
            longitude,
            timestamp: 0,
            reward: Reward::Pokemon { pokemon_id: 1 },
            task_id: TaskId::new("t"),
        }
    }

    fn map(quests: Vec<Quest>) -> QuestMap {
        quests.into_iter().map(|quest| (quest.stop_id.clone(), quest)).collect()
    }

    #[test]
    fn empty_candidates_yield_no_quest() {
        assert_eq!(closest(&QuestMap::new(), LatLon::new(0.0, 0.0)), None);
    }

    #[test]
    fn picks_the_minimum_distance() {
        let from = LatLon::new(52.5200, 13.4050);
        let candidates = map(vec![
            quest("far", 52.5300, 13.4050),
            quest("near", 52.5205, 13.4050),
            quest("mid", 52.5250, 13.4050),
        ]);

        let found = closest(&candidates, from).expect("a candidate");
        assert_eq!(found.stop_id, StopId::new("near"));

        for quest in candidates.values() {
            assert!(found.distance_m <= from.distance_to(&quest.location()));
        }
    }

    #[test]
    fn ties_go_to_the_smallest_stop_id() {
        let from = LatLon::new(0.0, 0.0);
        let candidates = map(vec![quest("zeta", 0.0, 0.001), quest("alpha", 0.0, -0.001)]);

        let found = closest(&candidates, from).expect("a candidate");
        assert_eq!(found.stop_id, StopId::new("alpha"));
    }
}
