pub mod partition;
pub mod selector;
pub mod session;

pub use partition::{in_range, next_quest, partition, NextQuest, QuestQueues};
pub use selector::{closest, ClosestQuest};
pub use session::HuntSession;
