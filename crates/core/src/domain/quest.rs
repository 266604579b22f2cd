use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::geo::LatLon;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StopId(pub String);

impl StopId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reward {
    Pokemon { pokemon_id: u32 },
    Item { item_id: u32, amount: u32 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    pub stop_id: StopId,
    pub stop_name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Unix seconds at which the quest was assigned to the stop.
    pub timestamp: i64,
    pub reward: Reward,
    pub task_id: TaskId,
}

impl Quest {
    pub fn location(&self) -> LatLon {
        LatLon::new(self.latitude, self.longitude)
    }

    pub fn pokemon_id(&self) -> Option<u32> {
        match self.reward {
            Reward::Pokemon { pokemon_id } => Some(pokemon_id),
            Reward::Item { .. } => None,
        }
    }

    pub fn item_id(&self) -> Option<u32> {
        match self.reward {
            Reward::Item { item_id, .. } => Some(item_id),
            Reward::Pokemon { .. } => None,
        }
    }

    /// A record supersedes the stored one unless it was assigned earlier.
    pub fn supersedes(&self, existing: &Quest) -> bool {
        self.timestamp >= existing.timestamp
    }
}

/// Quests keyed by stop. Ordered so that iteration, and therefore nearest-quest
/// tie-breaking, is deterministic.
pub type QuestMap = BTreeMap<StopId, Quest>;
