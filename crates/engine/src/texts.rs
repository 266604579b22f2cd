//! User-facing message texts. Everything is rendered with HTML parse mode, so
//! any value that came from the catalog or the user goes through [`escape`].

use questpal_core::domain::profile::{Area, RewardSelection};
use questpal_core::domain::quest::{Quest, Reward};
use questpal_core::flows::{InputRejection, PromptNotice};

pub const BUTTON_START_HUNT: &str = "🧭 Start hunt";
pub const BUTTON_SELECT_AREA: &str = "📍 Select area";
pub const BUTTON_CHOOSE_QUESTS: &str = "🎯 Choose quests";
pub const BUTTON_OVERVIEW: &str = "« Overview";
pub const BUTTON_CONTINUE: &str = "▶️ Continue";
pub const BUTTON_RESET: &str = "🔄 Start over";
pub const BUTTON_FETCHED: &str = "✅ Collected";
pub const BUTTON_SKIP: &str = "⏭ Skip";
pub const BUTTON_IGNORE: &str = "🚫 Ignore";
pub const BUTTON_END_HUNT: &str = "🏁 End hunt";
pub const BUTTON_YES: &str = "Yes";
pub const BUTTON_NO: &str = "No";
pub const BUTTON_POKEMON: &str = "Pokémon";
pub const BUTTON_ITEMS: &str = "Items";
pub const BUTTON_TASKS: &str = "Tasks";
pub const BUTTON_BACK: &str = "« Back";
pub const BUTTON_DELETE_DATA: &str = "🗑 Delete my data";
pub const BUTTON_DELETE_CONFIRM: &str = "Yes, delete everything";

pub fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    escaped
}

pub fn button_enqueue_skipped(skipped: usize) -> String {
    format!("↩️ Revisit skipped ({skipped})")
}

pub fn reward_label(reward: &Reward) -> String {
    match reward {
        Reward::Pokemon { pokemon_id } => format!("Pokémon #{pokemon_id}"),
        Reward::Item { item_id, amount } => format!("{amount}× item #{item_id}"),
    }
}

pub fn overview(area: Option<&Area>, rewards: &RewardSelection, in_range: Option<usize>) -> String {
    let mut text = String::from("<b>QuestPal</b>\n\n");
    match area {
        Some(area) => text.push_str(&format!(
            "Area: {:.5}, {:.5} within {} m\n",
            area.center.latitude, area.center.longitude, area.radius_m
        )),
        None => text.push_str("Area: <i>not set</i>\n"),
    }
    let chosen = rewards.pokemon.len() + rewards.items.len() + rewards.tasks.len();
    if chosen == 0 {
        text.push_str("Quests: <i>none chosen</i>\n");
    } else {
        text.push_str(&format!("Quests: {chosen} reward(s) chosen\n"));
    }
    if let Some(count) = in_range {
        text.push_str(&format!("\n{count} matching quest(s) in your area today."));
    } else {
        text.push_str("\nSet an area and choose quests to start hunting.");
    }
    text
}

pub fn select_area_first() -> String {
    "You have not selected an area yet. Pick one before starting a hunt.".to_string()
}

pub fn choose_quests_first() -> String {
    "You have not chosen any quests yet. Pick the rewards you are after before starting a hunt."
        .to_string()
}

pub fn no_quests_found(catalog_total: usize, map_url: Option<&str>) -> String {
    let mut text = format!(
        "No matching quests in your area right now ({catalog_total} quest(s) known in total). \
         Try a bigger area or more rewards."
    );
    if let Some(url) = map_url {
        text.push_str(&format!("\n\nAll quests on the map: {}", escape(url)));
    }
    text
}

pub fn continue_or_reset() -> String {
    "You already hunted today. Continue where you left off, or start over and see every quest again?"
        .to_string()
}

fn rejection(reason: InputRejection) -> &'static str {
    match reason {
        InputRejection::Unsupported => "⚠️ Please send a location or type an address.",
        InputRejection::NotFound => "⚠️ I could not find that place. Try again.",
        InputRejection::InvalidRadius => "⚠️ The radius must be a whole number of meters, e.g. 1500.",
    }
}

fn notice_line(notice: PromptNotice) -> Option<&'static str> {
    match notice {
        PromptNotice::None => None,
        PromptNotice::Continued => Some("Continuing today's hunt."),
        PromptNotice::Reset => Some("Progress cleared, starting over."),
        PromptNotice::Rejected(reason) => Some(rejection(reason)),
    }
}

fn with_notice(prompt: &str, notice: PromptNotice) -> String {
    match notice_line(notice) {
        Some(line) => format!("{line}\n\n{prompt}"),
        None => prompt.to_string(),
    }
}

pub fn start_location_prompt(notice: PromptNotice) -> String {
    with_notice(
        "Where are you starting from? Send your location or type an address.",
        notice,
    )
}

pub fn area_center_prompt(notice: PromptNotice) -> String {
    with_notice(
        "Send the center of your hunting area as a location, or type an address.",
        notice,
    )
}

pub fn area_radius_prompt(notice: PromptNotice) -> String {
    with_notice("How far around that point should I look? Reply with a radius in meters.", notice)
}

pub fn area_saved(area: &Area) -> String {
    format!(
        "Area saved: {:.5}, {:.5} within {} m.",
        area.center.latitude, area.center.longitude, area.radius_m
    )
}

pub struct QuestStatus<'a> {
    pub quest: &'a Quest,
    pub distance_m: f64,
    pub open: usize,
    pub skipped: usize,
    pub deferred: bool,
}

pub fn quest_status(status: &QuestStatus<'_>) -> String {
    let mut text = format!("Open quests: {} · Skipped: {}\n\n", status.open, status.skipped);
    if status.deferred {
        text.push_str("<i>No fresh quests left, revisiting a skipped one.</i>\n\n");
    }
    text.push_str(&format!(
        "<b>{}</b>\n{} · task <code>{}</code>\n{}",
        escape(&status.quest.stop_name),
        reward_label(&status.quest.reward),
        escape(status.quest.task_id.as_str()),
        distance(status.distance_m),
    ));
    text
}

fn distance(meters: f64) -> String {
    if meters >= 1_000.0 {
        format!("{:.1} km away", meters / 1_000.0)
    } else {
        format!("{} m away", meters.round() as i64)
    }
}

pub fn all_done(collected: usize) -> String {
    format!("🎉 All done! You collected {collected} quest(s) today. Nothing left in your area.")
}

pub fn ended_early(collected: usize) -> String {
    format!("Hunt ended. You collected {collected} quest(s) today.")
}

pub fn confirm_ignore(stop_name: Option<&str>) -> String {
    match stop_name {
        Some(name) => format!("Ignore <b>{}</b> for the rest of the day?", escape(name)),
        None => "Ignore this quest for the rest of the day?".to_string(),
    }
}

pub fn confirm_end() -> String {
    "Do you really want to end the hunt?".to_string()
}

pub fn confirm_delete_data() -> String {
    "<b>Delete my data</b>\n\n⚠️ This removes your area, your quest selection and today's hunt. \
     It cannot be undone."
        .to_string()
}

pub fn data_deleted() -> String {
    "<b>Delete my data</b>\n\nEverything stored for this chat is gone. Send /start to begin again.".to_string()
}

pub fn reward_menu(rewards: &RewardSelection) -> String {
    let mut text = String::from("<b>Your quests</b>\n");
    let list = |values: Vec<String>| if values.is_empty() { "—".to_string() } else { values.join(", ") };
    text.push_str(&format!(
        "Pokémon: {}\n",
        list(rewards.pokemon.iter().map(|id| format!("#{id}")).collect())
    ));
    text.push_str(&format!("Items: {}\n", list(rewards.items.iter().map(|id| format!("#{id}")).collect())));
    text.push_str(&format!(
        "Tasks: {}\n",
        list(rewards.tasks.iter().map(|task| escape(task.as_str())).collect())
    ));
    text.push_str("\nTap a category to add or remove rewards.");
    text
}

pub fn reward_submenu(kind: &str, offered: usize) -> String {
    if offered == 0 {
        format!("No {kind} rewards are on offer today.")
    } else {
        format!("Tap a {kind} reward to add or remove it. ✓ marks your picks.")
    }
}

#[cfg(test)]
mod tests {
    use questpal_core::flows::{InputRejection, PromptNotice};

    use super::{escape, no_quests_found, start_location_prompt};

    #[test]
    fn escapes_html_metacharacters() {
        assert_eq!(escape("Fish & <Chips>"), "Fish &amp; &lt;Chips&gt;");
    }

    #[test]
    fn rejected_prompt_carries_inline_warning() {
        let text = start_location_prompt(PromptNotice::Rejected(InputRejection::NotFound));
        assert!(text.starts_with("⚠️"));
        assert!(text.contains("Send your location"));
    }

    #[test]
    fn map_hint_is_optional() {
        assert!(!no_quests_found(12, None).contains("map"));
        assert!(no_quests_found(12, Some("https://map.example")).contains("https://map.example"));
    }
}
