use std::fmt;

use thiserror::Error;

use questpal_core::domain::quest::{StopId, TaskId};

/// Telegram rejects inline buttons whose callback data exceeds this size.
pub const MAX_CALLBACK_DATA_BYTES: usize = 64;

/// Parsed inline button payload. The wire form is a verb followed by
/// whitespace-separated arguments, e.g. `quest_ignore yes <stop_id>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    Overview,
    BackToOverview,
    StartHunt,
    ContinuePreviousHunt,
    ResetPreviousHunt,
    QuestFetched(StopId),
    QuestSkip(StopId),
    QuestIgnore(StopId),
    QuestIgnoreConfirmed(StopId),
    ContinueHunt,
    EndHunt { confirmed: bool },
    EnqueueSkipped,
    SelectArea,
    ChooseQuestType,
    ChoosePokemon(Option<u32>),
    ChooseItem(Option<u32>),
    ChooseTask(Option<TaskId>),
    DeleteData { confirmed: bool },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CallbackParseError {
    #[error("callback data is empty")]
    Empty,
    #[error("unsupported callback `{0}`")]
    Unsupported(String),
    #[error("callback `{verb}` is missing its {argument}")]
    MissingArgument { verb: String, argument: &'static str },
    #[error("callback `{verb}` has an invalid argument `{value}`")]
    InvalidArgument { verb: String, value: String },
}

impl CallbackAction {
    pub fn parse(data: &str) -> Result<Self, CallbackParseError> {
        let mut parts = data.split_whitespace();
        let verb = parts.next().ok_or(CallbackParseError::Empty)?;
        let args: Vec<&str> = parts.collect();

        let action = match verb {
            "overview" => Self::Overview,
            "back_to_overview" => Self::BackToOverview,
            "start_hunt" => Self::StartHunt,
            "continue_previous_hunt" => Self::ContinuePreviousHunt,
            "reset_previous_hunt" => Self::ResetPreviousHunt,
            "quest_fetched" => Self::QuestFetched(stop_argument(verb, &args)?),
            "quest_skip" => Self::QuestSkip(stop_argument(verb, &args)?),
            "quest_ignore" => match args.as_slice() {
                ["yes", stop] => Self::QuestIgnoreConfirmed(StopId::new(*stop)),
                _ => Self::QuestIgnore(stop_argument(verb, &args)?),
            },
            "continue_hunt" => Self::ContinueHunt,
            "end_hunt" => Self::EndHunt { confirmed: args.first() == Some(&"yes") },
            "enqueue_skipped" => Self::EnqueueSkipped,
            "select_area" => Self::SelectArea,
            "choose_quest_type" => Self::ChooseQuestType,
            "choose_pokemon" => Self::ChoosePokemon(numeric_argument(verb, &args)?),
            "choose_item" => Self::ChooseItem(numeric_argument(verb, &args)?),
            "choose_task" => Self::ChooseTask(args.first().map(|task| TaskId::new(*task))),
            "delete_data" => Self::DeleteData { confirmed: args.first() == Some(&"yes") },
            other => return Err(CallbackParseError::Unsupported(other.to_string())),
        };

        Ok(action)
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::BackToOverview => "back_to_overview",
            Self::StartHunt => "start_hunt",
            Self::ContinuePreviousHunt => "continue_previous_hunt",
            Self::ResetPreviousHunt => "reset_previous_hunt",
            Self::QuestFetched(_) => "quest_fetched",
            Self::QuestSkip(_) => "quest_skip",
            Self::QuestIgnore(_) | Self::QuestIgnoreConfirmed(_) => "quest_ignore",
            Self::ContinueHunt => "continue_hunt",
            Self::EndHunt { .. } => "end_hunt",
            Self::EnqueueSkipped => "enqueue_skipped",
            Self::SelectArea => "select_area",
            Self::ChooseQuestType => "choose_quest_type",
            Self::ChoosePokemon(_) => "choose_pokemon",
            Self::ChooseItem(_) => "choose_item",
            Self::ChooseTask(_) => "choose_task",
            Self::DeleteData { .. } => "delete_data",
        }
    }
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = self.verb();
        match self {
            Self::QuestFetched(stop) | Self::QuestSkip(stop) | Self::QuestIgnore(stop) => {
                write!(f, "{verb} {stop}")
            }
            Self::QuestIgnoreConfirmed(stop) => write!(f, "{verb} yes {stop}"),
            Self::EndHunt { confirmed: true } | Self::DeleteData { confirmed: true } => {
                write!(f, "{verb} yes")
            }
            Self::ChoosePokemon(Some(id)) | Self::ChooseItem(Some(id)) => write!(f, "{verb} {id}"),
            Self::ChooseTask(Some(task)) => write!(f, "{verb} {task}"),
            _ => f.write_str(verb),
        }
    }
}

fn stop_argument(verb: &str, args: &[&str]) -> Result<StopId, CallbackParseError> {
    args.first().map(|stop| StopId::new(*stop)).ok_or_else(|| {
        CallbackParseError::MissingArgument { verb: verb.to_string(), argument: "stop id" }
    })
}

fn numeric_argument(verb: &str, args: &[&str]) -> Result<Option<u32>, CallbackParseError> {
    args.first()
        .map(|value| {
            value.parse::<u32>().map_err(|_| CallbackParseError::InvalidArgument {
                verb: verb.to_string(),
                value: (*value).to_string(),
            })
        })
        .transpose()
}
