use serde::{Deserialize, Serialize};

use crate::domain::geo::LatLon;
use crate::domain::quest::{Quest, TaskId};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub center: LatLon,
    pub radius_m: u32,
}

impl Area {
    pub fn new(center: LatLon, radius_m: u32) -> Self {
        Self { center, radius_m }
    }

    pub fn contains(&self, point: LatLon) -> bool {
        self.center.distance_to(&point) <= f64::from(self.radius_m)
    }
}

/// The rewards a conversation is hunting for. Each list behaves as a set but
/// keeps insertion order for display.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSelection {
    #[serde(default)]
    pub pokemon: Vec<u32>,
    #[serde(default)]
    pub items: Vec<u32>,
    #[serde(default)]
    pub tasks: Vec<TaskId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Toggle {
    Added,
    Removed,
}

/// One reward to flip in a [`RewardSelection`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RewardChoice {
    Pokemon(u32),
    Item(u32),
    Task(TaskId),
}

impl RewardSelection {
    pub fn has_quests(&self) -> bool {
        !self.pokemon.is_empty() || !self.items.is_empty() || !self.tasks.is_empty()
    }

    pub fn matches(&self, quest: &Quest) -> bool {
        quest.pokemon_id().is_some_and(|id| self.pokemon.contains(&id))
            || quest.item_id().is_some_and(|id| self.items.contains(&id))
            || self.tasks.contains(&quest.task_id)
    }

    pub fn toggle(&mut self, choice: RewardChoice) -> Toggle {
        match choice {
            RewardChoice::Pokemon(pokemon_id) => self.toggle_pokemon(pokemon_id),
            RewardChoice::Item(item_id) => self.toggle_item(item_id),
            RewardChoice::Task(task_id) => self.toggle_task(task_id),
        }
    }

    pub fn toggle_pokemon(&mut self, pokemon_id: u32) -> Toggle {
        toggle(&mut self.pokemon, pokemon_id)
    }

    pub fn toggle_item(&mut self, item_id: u32) -> Toggle {
        toggle(&mut self.items, item_id)
    }

    pub fn toggle_task(&mut self, task_id: TaskId) -> Toggle {
        toggle(&mut self.tasks, task_id)
    }
}

fn toggle<T: PartialEq>(values: &mut Vec<T>, value: T) -> Toggle {
    if let Some(position) = values.iter().position(|existing| *existing == value) {
        values.remove(position);
        Toggle::Removed
    } else {
        values.push(value);
        Toggle::Added
    }
}

/// Per-conversation state that outlives a hunt.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub area: Option<Area>,
    #[serde(default)]
    pub rewards: RewardSelection,
}

impl Profile {
    pub fn has_area(&self) -> bool {
        self.area.is_some_and(|area| area.radius_m > 0)
    }

    pub fn has_quests(&self) -> bool {
        self.rewards.has_quests()
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::geo::LatLon;
    use crate::domain::quest::{Quest, Reward, StopId, TaskId};

    use super::{Area, Profile, RewardChoice, RewardSelection, Toggle};

    fn quest(reward: Reward, task: &str) -> Quest {
        Quest {
            stop_id: StopId::new("s"),
            stop_name: "Stop".to_owned(),
            latitude: 0.0,
            longitude: 0.0,
            timestamp: 0,
            reward,
            task_id: TaskId::new(task),
        }
    }

    #[test]
    fn toggling_twice_restores_selection_and_keeps_order() {
        let mut selection = RewardSelection::default();
        assert_eq!(selection.toggle_pokemon(25), Toggle::Added);
        assert_eq!(selection.toggle_pokemon(1), Toggle::Added);
        assert_eq!(selection.toggle_pokemon(4), Toggle::Added);
        assert_eq!(selection.pokemon, vec![25, 1, 4]);

        assert_eq!(selection.toggle_pokemon(1), Toggle::Removed);
        assert_eq!(selection.pokemon, vec![25, 4]);
    }

    #[test]
    fn has_quests_requires_any_non_empty_list() {
        let mut selection = RewardSelection::default();
        assert!(!selection.has_quests());

        assert_eq!(selection.toggle(RewardChoice::Task(TaskId::new("spin_10"))), Toggle::Added);
        assert!(selection.has_quests());
    }

    #[test]
    fn matches_on_pokemon_item_or_task() {
        let mut selection = RewardSelection::default();
        selection.toggle_item(701);

        assert!(selection.matches(&quest(Reward::Item { item_id: 701, amount: 1 }, "t")));
        assert!(!selection.matches(&quest(Reward::Pokemon { pokemon_id: 25 }, "t")));

        selection.toggle_task(TaskId::new("t"));
        assert!(selection.matches(&quest(Reward::Pokemon { pokemon_id: 25 }, "t")));
    }

    #[test]
    fn area_contains_points_within_radius() {
        let area = Area::new(LatLon::new(52.52, 13.405), 1_000);
        assert!(area.contains(LatLon::new(52.5205, 13.406)));
        assert!(!area.contains(LatLon::new(52.60, 13.405)));
    }

    #[test]
    fn zero_radius_area_does_not_count() {
        let profile = Profile {
            area: Some(Area::new(LatLon::new(1.0, 1.0), 0)),
            ..Profile::default()
        };
        assert!(!profile.has_area());
    }
}
