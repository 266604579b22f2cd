use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::quest::StopId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowType {
    QuestHunt,
}

/// Where a conversation currently is. Hunt states carry the stop they refer
/// to so that stale buttons for another stop can be told apart.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HuntState {
    #[default]
    Idle,
    AwaitingAreaOrQuests,
    AwaitingContinueDecision,
    AwaitingStartLocation,
    /// Transient: the engine resolves it to a quest or to completion within
    /// the same update.
    SelectingQuest,
    PresentingQuest {
        stop_id: StopId,
    },
    AwaitingIgnoreConfirm {
        stop_id: StopId,
    },
    AwaitingEndConfirm,
    AwaitingAreaCenter,
    AwaitingAreaRadius,
}

impl HuntState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingAreaOrQuests => "awaiting_area_or_quests",
            Self::AwaitingContinueDecision => "awaiting_continue_decision",
            Self::AwaitingStartLocation => "awaiting_start_location",
            Self::SelectingQuest => "selecting_quest",
            Self::PresentingQuest { .. } => "presenting_quest",
            Self::AwaitingIgnoreConfirm { .. } => "awaiting_ignore_confirm",
            Self::AwaitingEndConfirm => "awaiting_end_confirm",
            Self::AwaitingAreaCenter => "awaiting_area_center",
            Self::AwaitingAreaRadius => "awaiting_area_radius",
        }
    }

    /// States that accept a free-text or location message.
    pub fn expects_input(&self) -> bool {
        matches!(self, Self::AwaitingStartLocation | Self::AwaitingAreaCenter | Self::AwaitingAreaRadius)
    }
}

impl fmt::Display for HuntState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputRejection {
    /// Neither a location nor text.
    Unsupported,
    /// Text that could not be resolved to a place.
    NotFound,
    /// A radius that is not a positive whole number of meters.
    InvalidRadius,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HuntEvent {
    StartRequested,
    ContinueChosen,
    ResetChosen,
    LocationResolved,
    LocationRejected { reason: InputRejection },
    QuestSelected { stop_id: StopId, deferred: bool },
    QueueExhausted,
    Collected { stop_id: StopId },
    Skipped { stop_id: StopId },
    IgnoreRequested { stop_id: StopId },
    IgnoreConfirmed { stop_id: StopId },
    /// "no" on either confirmation prompt.
    ContinueHunt,
    EnqueueSkipped,
    EndRequested { confirmed: bool },
    Cancelled,
    AreaSelectionRequested,
    AreaCenterResolved,
    AreaCenterRejected { reason: InputRejection },
    AreaRadiusAccepted,
    AreaRadiusRejected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HuntContext {
    pub has_area: bool,
    pub has_quests: bool,
    pub has_candidates: bool,
    pub resumable_today: bool,
    pub has_start_location: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptNotice {
    None,
    Continued,
    Reset,
    Rejected(InputRejection),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HuntAction {
    PromptSelectArea,
    PromptChooseQuests,
    ReportNoQuestsFound,
    PromptContinueOrReset,
    PromptStartLocation(PromptNotice),
    ResetProgress,
    BeginHunt,
    SelectNextQuest,
    PresentQuest { stop_id: StopId, deferred: bool },
    ReportComplete,
    RecordCollected(StopId),
    RecordSkipped(StopId),
    RecordIgnored(StopId),
    ReleaseSkipped,
    PromptIgnoreConfirm(StopId),
    PromptEndConfirm,
    ReportEndedEarly,
    ClearLocation,
    StopHunting,
    ShowOverview,
    PromptAreaCenter(PromptNotice),
    PromptAreaRadius(PromptNotice),
    StoreArea,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: HuntState,
    pub to: HuntState,
    pub event: HuntEvent,
    pub actions: Vec<HuntAction>,
}
