use questpal_core::domain::quest::StopId;
use questpal_telegram::callbacks::CallbackAction;
use questpal_telegram::keyboard::{InlineKeyboard, KeyboardBuilder};

use crate::sessions::Presentation;
use crate::texts;

pub fn overview() -> InlineKeyboard {
    KeyboardBuilder::new()
        .button(texts::BUTTON_START_HUNT, CallbackAction::StartHunt)
        .row(|row| {
            row.button(texts::BUTTON_SELECT_AREA, CallbackAction::SelectArea)
                .button(texts::BUTTON_CHOOSE_QUESTS, CallbackAction::ChooseQuestType);
        })
        .button(texts::BUTTON_DELETE_DATA, CallbackAction::DeleteData { confirmed: false })
        .build()
}

pub fn confirm_delete_data() -> InlineKeyboard {
    KeyboardBuilder::new()
        .button(texts::BUTTON_DELETE_CONFIRM, CallbackAction::DeleteData { confirmed: true })
        .button(texts::BUTTON_OVERVIEW, CallbackAction::Overview)
        .build()
}

pub fn back_to_overview() -> InlineKeyboard {
    KeyboardBuilder::new().button(texts::BUTTON_OVERVIEW, CallbackAction::BackToOverview).build()
}

pub fn done() -> InlineKeyboard {
    KeyboardBuilder::new().button(texts::BUTTON_OVERVIEW, CallbackAction::Overview).build()
}

pub fn select_area_first() -> InlineKeyboard {
    KeyboardBuilder::new()
        .button(texts::BUTTON_SELECT_AREA, CallbackAction::SelectArea)
        .button(texts::BUTTON_OVERVIEW, CallbackAction::BackToOverview)
        .build()
}

pub fn choose_quests_first() -> InlineKeyboard {
    KeyboardBuilder::new()
        .button(texts::BUTTON_CHOOSE_QUESTS, CallbackAction::ChooseQuestType)
        .button(texts::BUTTON_OVERVIEW, CallbackAction::BackToOverview)
        .build()
}

pub fn continue_or_reset() -> InlineKeyboard {
    KeyboardBuilder::new()
        .row(|row| {
            row.button(texts::BUTTON_CONTINUE, CallbackAction::ContinuePreviousHunt)
                .button(texts::BUTTON_RESET, CallbackAction::ResetPreviousHunt);
        })
        .build()
}

/// Skip is offered only while something else would come next.
pub fn can_skip(presentation: &Presentation) -> bool {
    if presentation.deferred {
        presentation.skipped > 1
    } else {
        presentation.open > 1 || presentation.skipped > 0
    }
}

pub fn quest_actions(presentation: &Presentation) -> InlineKeyboard {
    let stop_id = &presentation.quest.stop_id;
    let release = !presentation.deferred && presentation.skipped > 0;

    KeyboardBuilder::new()
        .button(texts::BUTTON_FETCHED, CallbackAction::QuestFetched(stop_id.clone()))
        .row(|row| {
            if can_skip(presentation) {
                row.button(texts::BUTTON_SKIP, CallbackAction::QuestSkip(stop_id.clone()));
            }
            row.button(texts::BUTTON_IGNORE, CallbackAction::QuestIgnore(stop_id.clone()));
        })
        .button_if(
            release,
            texts::button_enqueue_skipped(presentation.skipped),
            CallbackAction::EnqueueSkipped,
        )
        .button(texts::BUTTON_END_HUNT, CallbackAction::EndHunt { confirmed: false })
        .build()
}

pub fn confirm_ignore(stop_id: &StopId) -> InlineKeyboard {
    KeyboardBuilder::new()
        .row(|row| {
            row.button(texts::BUTTON_YES, CallbackAction::QuestIgnoreConfirmed(stop_id.clone()))
                .button(texts::BUTTON_NO, CallbackAction::ContinueHunt);
        })
        .build()
}

pub fn confirm_end() -> InlineKeyboard {
    KeyboardBuilder::new()
        .row(|row| {
            row.button(texts::BUTTON_YES, CallbackAction::EndHunt { confirmed: true })
                .button(texts::BUTTON_NO, CallbackAction::ContinueHunt);
        })
        .build()
}

pub fn reward_menu() -> InlineKeyboard {
    KeyboardBuilder::new()
        .row(|row| {
            row.button(texts::BUTTON_POKEMON, CallbackAction::ChoosePokemon(None))
                .button(texts::BUTTON_ITEMS, CallbackAction::ChooseItem(None))
                .button(texts::BUTTON_TASKS, CallbackAction::ChooseTask(None));
        })
        .button(texts::BUTTON_OVERVIEW, CallbackAction::BackToOverview)
        .build()
}
