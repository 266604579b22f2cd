pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod hunt;

pub use catalog::{CatalogSnapshot, InMemoryQuestCatalog, IngestReport, QuestCatalog};
pub use domain::chat::{ChatId, ChatKind, MessageId};
pub use domain::geo::{great_circle_meters, LatLon};
pub use domain::profile::{Area, Profile, RewardChoice, RewardSelection, Toggle};
pub use domain::quest::{Quest, QuestMap, Reward, StopId, TaskId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{FlowEngine, FlowTransitionError, HuntAction, HuntEvent, HuntState};
pub use hunt::{HuntSession, NextQuest, QuestQueues};
