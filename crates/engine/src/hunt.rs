//! The hunt engine: turns user input into flow events, applies them, and
//! performs the resulting actions against the profile store, the quest
//! catalog and the chat's UI slots.
//!
//! Every entry point locks the chat's [`ChatState`] for its whole run, so the
//! event loop below always sees a consistent session. Follow-up events
//! produced by actions (`QuestSelected`, `QueueExhausted`) are queued and
//! applied in the same run.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use questpal_core::catalog::QuestCatalog;
use questpal_core::config::HuntConfig;
use questpal_core::domain::chat::{ChatId, MessageId};
use questpal_core::domain::geo::LatLon;
use questpal_core::domain::profile::{Area, RewardChoice};
use questpal_core::domain::quest::{QuestMap, StopId, TaskId};
use questpal_core::errors::{ApplicationError, DomainError};
use questpal_core::flows::{
    FlowEngine, HuntAction, HuntContext, HuntEvent, HuntState, InputRejection, PromptNotice,
    QuestHuntFlow,
};
use questpal_core::hunt::{in_range, next_quest, partition, HuntSession, NextQuest};
use questpal_db::{ProfileRepository, RepositoryError};
use questpal_telegram::callbacks::CallbackAction;
use questpal_telegram::keyboard::{InlineButton, InlineKeyboard, KeyboardBuilder};
use questpal_telegram::slots::{SlotCategory, SlotContent, SlotManager};

use crate::clock::Clock;
use crate::geocode::Geocoder;
use crate::keyboards;
use crate::sessions::{ChatState, Presentation, SessionRegistry};
use crate::texts::{self, QuestStatus};

const REWARD_BUTTONS_PER_ROW: usize = 4;
/// How long the goodbye notice stays after a chat's data is deleted.
const DELETED_NOTICE_LIFETIME: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HuntSettings {
    /// How long a user's location or address message stays visible.
    pub input_delete_delay: Duration,
    pub quest_map_url: Option<String>,
}

impl HuntSettings {
    pub fn from_config(config: &HuntConfig) -> Self {
        Self {
            input_delete_delay: Duration::from_secs(config.input_delete_delay_secs),
            quest_map_url: config.quest_map_url.clone(),
        }
    }
}

impl Default for HuntSettings {
    fn default() -> Self {
        Self { input_delete_delay: Duration::from_secs(5), quest_map_url: None }
    }
}

/// Collaborators the engine talks to.
#[derive(Clone)]
pub struct EngineServices {
    pub profiles: Arc<dyn ProfileRepository>,
    pub catalog: Arc<dyn QuestCatalog>,
    pub slots: Arc<SlotManager>,
    pub geocoder: Arc<dyn Geocoder>,
    pub clock: Arc<dyn Clock>,
}

/// What the user sent while a prompt was waiting for a place or a number.
#[derive(Clone, Debug, PartialEq)]
pub enum LocationInput {
    Coordinates(LatLon),
    Text(String),
    Unsupported,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RewardKind {
    Pokemon,
    Item,
    Task,
}

impl RewardKind {
    fn label(self) -> &'static str {
        match self {
            Self::Pokemon => "Pokémon",
            Self::Item => "item",
            Self::Task => "task",
        }
    }
}

pub struct HuntEngine {
    flow: FlowEngine<QuestHuntFlow>,
    services: EngineServices,
    sessions: SessionRegistry,
    settings: HuntSettings,
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

fn invariant(chat_id: ChatId, message: impl Into<String>) -> ApplicationError {
    let message = message.into();
    error!(event_name = "hunt.invariant_violation", chat_id = chat_id.0, detail = %message, "hunt invariant violated");
    DomainError::InvariantViolation(message).into()
}

impl HuntEngine {
    pub fn new(services: EngineServices, settings: HuntSettings) -> Self {
        Self { flow: FlowEngine::default(), services, sessions: SessionRegistry::new(), settings }
    }

    pub fn slots(&self) -> &Arc<SlotManager> {
        &self.services.slots
    }

    pub async fn state(&self, chat_id: ChatId) -> HuntState {
        self.sessions.snapshot(chat_id).await.hunt
    }

    pub async fn session(&self, chat_id: ChatId) -> HuntSession {
        self.sessions.snapshot(chat_id).await.session
    }

    /// `Start hunt` pressed or `/hunt` typed.
    pub async fn start_hunt(
        &self,
        chat_id: ChatId,
        correlation_id: &str,
    ) -> Result<HuntState, ApplicationError> {
        let mut state = self.sessions.lock(chat_id).await;
        self.drive(chat_id, &mut state, HuntEvent::StartRequested, correlation_id).await?;
        Ok(state.hunt.clone())
    }

    /// `/start` or the overview button. While a hunt is running this asks
    /// whether to end it instead of dropping it silently.
    pub async fn show_overview(
        &self,
        chat_id: ChatId,
        correlation_id: &str,
    ) -> Result<HuntState, ApplicationError> {
        self.handle_callback(chat_id, CallbackAction::Overview, correlation_id).await
    }

    pub async fn handle_callback(
        &self,
        chat_id: ChatId,
        action: CallbackAction,
        correlation_id: &str,
    ) -> Result<HuntState, ApplicationError> {
        let mut state = self.sessions.lock(chat_id).await;

        let event = match action {
            CallbackAction::Overview => {
                if is_mid_hunt(&state) {
                    HuntEvent::EndRequested { confirmed: false }
                } else {
                    HuntEvent::Cancelled
                }
            }
            CallbackAction::BackToOverview => HuntEvent::Cancelled,
            CallbackAction::StartHunt => HuntEvent::StartRequested,
            CallbackAction::ContinuePreviousHunt => HuntEvent::ContinueChosen,
            CallbackAction::ResetPreviousHunt => HuntEvent::ResetChosen,
            CallbackAction::QuestFetched(stop_id) => HuntEvent::Collected { stop_id },
            CallbackAction::QuestSkip(stop_id) => HuntEvent::Skipped { stop_id },
            CallbackAction::QuestIgnore(stop_id) => HuntEvent::IgnoreRequested { stop_id },
            CallbackAction::QuestIgnoreConfirmed(stop_id) => HuntEvent::IgnoreConfirmed { stop_id },
            CallbackAction::ContinueHunt => HuntEvent::ContinueHunt,
            CallbackAction::EndHunt { confirmed } => HuntEvent::EndRequested { confirmed },
            CallbackAction::EnqueueSkipped => HuntEvent::EnqueueSkipped,
            CallbackAction::SelectArea => HuntEvent::AreaSelectionRequested,
            CallbackAction::ChooseQuestType => {
                self.show_reward_menu(chat_id).await?;
                return Ok(state.hunt.clone());
            }
            CallbackAction::ChoosePokemon(choice) => {
                let toggle = choice.map(RewardChoice::Pokemon);
                self.show_reward_submenu(chat_id, RewardKind::Pokemon, toggle).await?;
                return Ok(state.hunt.clone());
            }
            CallbackAction::ChooseItem(choice) => {
                let toggle = choice.map(RewardChoice::Item);
                self.show_reward_submenu(chat_id, RewardKind::Item, toggle).await?;
                return Ok(state.hunt.clone());
            }
            CallbackAction::ChooseTask(choice) => {
                let toggle = choice.map(RewardChoice::Task);
                self.show_reward_submenu(chat_id, RewardKind::Task, toggle).await?;
                return Ok(state.hunt.clone());
            }
            CallbackAction::DeleteData { confirmed: false } => {
                self.render_main(chat_id, texts::confirm_delete_data(), keyboards::confirm_delete_data()).await;
                return Ok(state.hunt.clone());
            }
            CallbackAction::DeleteData { confirmed: true } => {
                self.delete_data(chat_id, &mut state, correlation_id).await?;
                return Ok(state.hunt.clone());
            }
        };

        self.drive(chat_id, &mut state, event, correlation_id).await?;
        Ok(state.hunt.clone())
    }

    /// A location, a text message or anything else that is not a command or a
    /// button. Only states that prompt for input accept it; elsewhere the
    /// message is dropped.
    pub async fn handle_location_input(
        &self,
        chat_id: ChatId,
        input: LocationInput,
        message_id: Option<MessageId>,
        correlation_id: &str,
    ) -> Result<HuntState, ApplicationError> {
        let mut state = self.sessions.lock(chat_id).await;
        let current = state.hunt.clone();

        if !current.expects_input() {
            self.discard_unexpected(chat_id, message_id, &current, correlation_id).await;
            return Ok(current);
        }

        if let Some(message_id) = message_id {
            self.services.slots.schedule_delete(chat_id, message_id, self.settings.input_delete_delay);
        }

        let event = match current {
            HuntState::AwaitingStartLocation => match self.resolve_point(&input, correlation_id).await {
                Ok(point) => {
                    state.start_point = Some(point);
                    HuntEvent::LocationResolved
                }
                Err(reason) => HuntEvent::LocationRejected { reason },
            },
            HuntState::AwaitingAreaCenter => match self.resolve_point(&input, correlation_id).await {
                Ok(point) => {
                    state.area_center = Some(point);
                    HuntEvent::AreaCenterResolved
                }
                Err(reason) => HuntEvent::AreaCenterRejected { reason },
            },
            HuntState::AwaitingAreaRadius => match parse_radius(&input) {
                Some(radius_m) => {
                    state.area_radius_m = Some(radius_m);
                    HuntEvent::AreaRadiusAccepted
                }
                None => HuntEvent::AreaRadiusRejected,
            },
            other => {
                self.discard_unexpected(chat_id, None, &other, correlation_id).await;
                return Ok(other);
            }
        };

        self.drive(chat_id, &mut state, event, correlation_id).await?;
        Ok(state.hunt.clone())
    }

    /// Erases the stored profile and today's session. The goodbye notice is
    /// detached from its slot and removed after a short while, so the next
    /// `/start` begins with a fresh message.
    async fn delete_data(
        &self,
        chat_id: ChatId,
        state: &mut ChatState,
        correlation_id: &str,
    ) -> Result<(), ApplicationError> {
        let existed = self.services.profiles.delete_profile(chat_id).await.map_err(persistence)?;
        *state = ChatState::default();

        self.services.slots.clear(chat_id, SlotCategory::Location).await;
        self.render(chat_id, SlotCategory::Main, SlotContent::text(texts::data_deleted())).await;
        if let Some(notice) = self.services.slots.release(chat_id, SlotCategory::Main).await {
            self.services.slots.schedule_delete(chat_id, notice, DELETED_NOTICE_LIFETIME);
        }

        info!(
            event_name = "profile.deleted",
            correlation_id = %correlation_id,
            chat_id = chat_id.0,
            existed,
            "chat data deleted"
        );
        Ok(())
    }

    async fn drive(
        &self,
        chat_id: ChatId,
        state: &mut ChatState,
        event: HuntEvent,
        correlation_id: &str,
    ) -> Result<(), ApplicationError> {
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            let context = self.context_for(chat_id, state, &event).await?;
            let outcome = match self.flow.apply_logged(&state.hunt, &event, &context, correlation_id) {
                Ok(outcome) => outcome,
                Err(rejected) => {
                    self.rerender(chat_id, state).await?;
                    return Err(DomainError::from(rejected).into());
                }
            };

            state.hunt = outcome.to;
            for action in outcome.actions {
                if let Some(next) = self.perform(chat_id, state, action).await? {
                    pending.push_back(next);
                }
            }

            if let Err(violation) = state.session.check_invariants() {
                return Err(invariant(chat_id, violation.to_string()));
            }
        }

        Ok(())
    }

    async fn context_for(
        &self,
        chat_id: ChatId,
        state: &ChatState,
        event: &HuntEvent,
    ) -> Result<HuntContext, ApplicationError> {
        let mut context = HuntContext {
            has_start_location: state.session.is_hunting && state.session.user_location.is_some(),
            ..HuntContext::default()
        };

        if matches!(event, HuntEvent::StartRequested) {
            let profile = self.services.profiles.get_profile(chat_id).await.map_err(persistence)?;
            context.has_area = profile.has_area();
            context.has_quests = profile.has_quests();
            if let Some(area) = profile.area.as_ref() {
                let snapshot = self.services.catalog.snapshot();
                context.has_candidates = !in_range(&snapshot.quests, area, &profile.rewards).is_empty();
            }
            context.resumable_today = state.session.is_resumable(self.services.clock.today());
        }

        Ok(context)
    }

    async fn perform(
        &self,
        chat_id: ChatId,
        state: &mut ChatState,
        action: HuntAction,
    ) -> Result<Option<HuntEvent>, ApplicationError> {
        match action {
            HuntAction::PromptSelectArea => {
                self.render_main(chat_id, texts::select_area_first(), keyboards::select_area_first()).await;
            }
            HuntAction::PromptChooseQuests => {
                self.render_main(chat_id, texts::choose_quests_first(), keyboards::choose_quests_first())
                    .await;
            }
            HuntAction::ReportNoQuestsFound => {
                let total = self.services.catalog.snapshot().len();
                self.services.slots.clear(chat_id, SlotCategory::Location).await;
                self.services.slots.clear(chat_id, SlotCategory::Main).await;
                let text = texts::no_quests_found(total, self.settings.quest_map_url.as_deref());
                self.render_main(chat_id, text, keyboards::done()).await;
            }
            HuntAction::PromptContinueOrReset => {
                self.render_main(chat_id, texts::continue_or_reset(), keyboards::continue_or_reset()).await;
            }
            HuntAction::PromptStartLocation(notice) => {
                self.render_main(chat_id, texts::start_location_prompt(notice), keyboards::back_to_overview())
                    .await;
            }
            HuntAction::ResetProgress => {
                state.session.reset();
                state.presentation = None;
                info!(event_name = "hunt.progress_reset", chat_id = chat_id.0, "hunt progress reset");
            }
            HuntAction::BeginHunt => {
                let Some(start) = state.start_point.take() else {
                    return Err(invariant(chat_id, "hunt started without a resolved start location"));
                };
                state.session.begin(start);
                state.session.roll_over(self.services.clock.today());
                info!(event_name = "hunt.started", chat_id = chat_id.0, "hunt started");
            }
            HuntAction::SelectNextQuest => return self.select_next(chat_id, state).await.map(Some),
            HuntAction::PresentQuest { stop_id, deferred } => {
                self.present_quest(chat_id, state, &stop_id, deferred).await?;
            }
            HuntAction::ReportComplete => {
                state.presentation = None;
                let text = texts::all_done(state.session.collected.len());
                self.render_main(chat_id, text, keyboards::done()).await;
                info!(
                    event_name = "hunt.completed",
                    chat_id = chat_id.0,
                    collected = state.session.collected.len(),
                    "hunt completed"
                );
            }
            HuntAction::RecordCollected(stop_id) => {
                let location = self.services.catalog.snapshot().quests.get(&stop_id).map(|quest| quest.location());
                state.session.mark_collected(&stop_id, location);
            }
            HuntAction::RecordSkipped(stop_id) => {
                if !state.session.skip(&stop_id) {
                    debug!(event_name = "hunt.skip_repeated", chat_id = chat_id.0, stop_id = %stop_id, "stop already skipped");
                }
            }
            HuntAction::RecordIgnored(stop_id) => {
                state.session.ignore(&stop_id);
            }
            HuntAction::ReleaseSkipped => {
                let released = state.session.enqueue_skipped();
                debug!(event_name = "hunt.skipped_released", chat_id = chat_id.0, released, "skipped stops released");
            }
            HuntAction::PromptIgnoreConfirm(stop_id) => {
                let name = self.stop_name(state, &stop_id);
                self.render_main(chat_id, texts::confirm_ignore(name.as_deref()), keyboards::confirm_ignore(&stop_id))
                    .await;
            }
            HuntAction::PromptEndConfirm => {
                self.render_main(chat_id, texts::confirm_end(), keyboards::confirm_end()).await;
            }
            HuntAction::ReportEndedEarly => {
                state.presentation = None;
                let text = texts::ended_early(state.session.collected.len());
                self.render_main(chat_id, text, keyboards::done()).await;
            }
            HuntAction::ClearLocation => {
                self.services.slots.clear(chat_id, SlotCategory::Location).await;
            }
            HuntAction::StopHunting => {
                state.session.finish();
                state.start_point = None;
                state.presentation = None;
            }
            HuntAction::ShowOverview => {
                state.area_center = None;
                state.area_radius_m = None;
                self.render_overview(chat_id, None).await?;
            }
            HuntAction::PromptAreaCenter(notice) => {
                self.render_main(chat_id, texts::area_center_prompt(notice), keyboards::back_to_overview())
                    .await;
            }
            HuntAction::PromptAreaRadius(notice) => {
                self.render_main(chat_id, texts::area_radius_prompt(notice), keyboards::back_to_overview())
                    .await;
            }
            HuntAction::StoreArea => {
                let (Some(center), Some(radius_m)) = (state.area_center.take(), state.area_radius_m.take())
                else {
                    return Err(invariant(chat_id, "area stored without a center and a radius"));
                };
                let area = Area::new(center, radius_m);
                self.services.profiles.set_area(chat_id, area).await.map_err(persistence)?;
                info!(event_name = "profile.area_saved", chat_id = chat_id.0, radius_m, "area saved");
                self.render_overview(chat_id, Some(texts::area_saved(&area))).await?;
            }
        }

        Ok(None)
    }

    /// Recomputes the queues from the latest snapshot and picks the nearest
    /// quest. Stops that left the catalog simply stop appearing.
    async fn select_next(&self, chat_id: ChatId, state: &mut ChatState) -> Result<HuntEvent, ApplicationError> {
        if state.session.roll_over(self.services.clock.today()) {
            info!(event_name = "hunt.rolled_over", chat_id = chat_id.0, "hunt progress rolled over to a new day");
        }

        let Some(from) = state.session.user_location else {
            return Err(invariant(chat_id, "quest selection without a reference location"));
        };

        let profile = self.services.profiles.get_profile(chat_id).await.map_err(persistence)?;
        let snapshot = self.services.catalog.snapshot();
        let candidates = match profile.area.as_ref() {
            Some(area) => in_range(&snapshot.quests, area, &profile.rewards),
            None => QuestMap::new(),
        };
        let queues = partition(candidates, &state.session);

        let (closest, deferred) = match next_quest(&queues, from) {
            NextQuest::Fresh(closest) => (closest, false),
            NextQuest::Deferred(closest) => (closest, true),
            NextQuest::Complete => {
                state.presentation = None;
                return Ok(HuntEvent::QueueExhausted);
            }
        };

        let source = if deferred { &queues.skipped } else { &queues.active };
        let Some(quest) = source.get(&closest.stop_id).cloned() else {
            return Err(invariant(chat_id, format!("selected stop {} is not queued", closest.stop_id)));
        };

        debug!(
            event_name = "hunt.quest_selected",
            chat_id = chat_id.0,
            stop_id = %closest.stop_id,
            distance_m = closest.distance_m,
            open = queues.open_count(),
            skipped = queues.skipped_count(),
            deferred,
            "next quest selected"
        );

        state.presentation = Some(Presentation {
            quest,
            distance_m: closest.distance_m,
            open: queues.open_count(),
            skipped: queues.skipped_count(),
            deferred,
        });
        Ok(HuntEvent::QuestSelected { stop_id: closest.stop_id, deferred })
    }

    async fn present_quest(
        &self,
        chat_id: ChatId,
        state: &ChatState,
        stop_id: &StopId,
        deferred: bool,
    ) -> Result<(), ApplicationError> {
        let presentation = match state.presentation.as_ref() {
            Some(presentation) if &presentation.quest.stop_id == stop_id && presentation.deferred == deferred => {
                presentation
            }
            _ => return Err(invariant(chat_id, format!("no selection recorded for stop {stop_id}"))),
        };

        let status = QuestStatus {
            quest: &presentation.quest,
            distance_m: presentation.distance_m,
            open: presentation.open,
            skipped: presentation.skipped,
            deferred: presentation.deferred,
        };
        self.render(chat_id, SlotCategory::Main, SlotContent::text(texts::quest_status(&status))).await;
        self.render(
            chat_id,
            SlotCategory::Location,
            SlotContent::location(presentation.quest.location(), Some(keyboards::quest_actions(presentation))),
        )
        .await;
        Ok(())
    }

    /// Shows whatever the current state last showed, for a button that no
    /// longer fits.
    async fn rerender(&self, chat_id: ChatId, state: &mut ChatState) -> Result<(), ApplicationError> {
        let action = match &state.hunt {
            HuntState::Idle | HuntState::AwaitingAreaOrQuests | HuntState::SelectingQuest => {
                HuntAction::ShowOverview
            }
            HuntState::AwaitingContinueDecision => HuntAction::PromptContinueOrReset,
            HuntState::AwaitingStartLocation => HuntAction::PromptStartLocation(PromptNotice::None),
            HuntState::PresentingQuest { stop_id } => match state.presentation.as_ref() {
                Some(presentation) if &presentation.quest.stop_id == stop_id => {
                    HuntAction::PresentQuest { stop_id: stop_id.clone(), deferred: presentation.deferred }
                }
                _ => HuntAction::ShowOverview,
            },
            HuntState::AwaitingIgnoreConfirm { stop_id } => HuntAction::PromptIgnoreConfirm(stop_id.clone()),
            HuntState::AwaitingEndConfirm => HuntAction::PromptEndConfirm,
            HuntState::AwaitingAreaCenter => HuntAction::PromptAreaCenter(PromptNotice::None),
            HuntState::AwaitingAreaRadius => HuntAction::PromptAreaRadius(PromptNotice::None),
        };

        self.perform(chat_id, state, action).await.map(|_| ())
    }

    async fn resolve_point(&self, input: &LocationInput, correlation_id: &str) -> Result<LatLon, InputRejection> {
        match input {
            LocationInput::Coordinates(point) if point.is_valid() => Ok(*point),
            LocationInput::Coordinates(_) | LocationInput::Unsupported => Err(InputRejection::Unsupported),
            LocationInput::Text(text) if text.trim().is_empty() => Err(InputRejection::Unsupported),
            LocationInput::Text(text) => match self.services.geocoder.geocode(text.trim()).await {
                Ok(point) => Ok(point),
                Err(failure) => {
                    info!(
                        event_name = "hunt.geocode_failed",
                        correlation_id = %correlation_id,
                        error = %failure,
                        "address could not be resolved"
                    );
                    Err(InputRejection::NotFound)
                }
            },
        }
    }

    async fn discard_unexpected(
        &self,
        chat_id: ChatId,
        message_id: Option<MessageId>,
        state: &HuntState,
        correlation_id: &str,
    ) {
        info!(
            event_name = "hunt.unexpected_input",
            correlation_id = %correlation_id,
            chat_id = chat_id.0,
            state = %state,
            "input arrived while nothing was prompted"
        );
        if let Some(message_id) = message_id {
            if let Err(failure) = self.services.slots.messenger().delete_message(chat_id, message_id).await {
                debug!(event_name = "hunt.unexpected_input_kept", error = %failure, "could not delete input");
            }
        }
    }

    fn stop_name(&self, state: &ChatState, stop_id: &StopId) -> Option<String> {
        if let Some(presentation) = state.presentation.as_ref() {
            if &presentation.quest.stop_id == stop_id {
                return Some(presentation.quest.stop_name.clone());
            }
        }
        self.services.catalog.snapshot().quests.get(stop_id).map(|quest| quest.stop_name.clone())
    }

    async fn render_overview(&self, chat_id: ChatId, heading: Option<String>) -> Result<(), ApplicationError> {
        let profile = self.services.profiles.get_profile(chat_id).await.map_err(persistence)?;
        let in_range_count = match profile.area.as_ref() {
            Some(area) if profile.has_quests() => {
                Some(in_range(&self.services.catalog.snapshot().quests, area, &profile.rewards).len())
            }
            _ => None,
        };

        let overview = texts::overview(profile.area.as_ref(), &profile.rewards, in_range_count);
        let text = match heading {
            Some(heading) => format!("{heading}\n\n{overview}"),
            None => overview,
        };
        self.render_main(chat_id, text, keyboards::overview()).await;
        Ok(())
    }

    async fn show_reward_menu(&self, chat_id: ChatId) -> Result<(), ApplicationError> {
        let rewards = self.services.profiles.get_rewards(chat_id).await.map_err(persistence)?;
        self.render_main(chat_id, texts::reward_menu(&rewards), keyboards::reward_menu()).await;
        Ok(())
    }

    async fn show_reward_submenu(
        &self,
        chat_id: ChatId,
        kind: RewardKind,
        toggle: Option<RewardChoice>,
    ) -> Result<(), ApplicationError> {
        if let Some(choice) = toggle {
            let outcome = self.services.profiles.toggle_reward(chat_id, choice.clone()).await.map_err(persistence)?;
            info!(
                event_name = "profile.reward_toggled",
                chat_id = chat_id.0,
                choice = ?choice,
                outcome = ?outcome,
                "reward selection changed"
            );
        }

        let rewards = self.services.profiles.get_rewards(chat_id).await.map_err(persistence)?;
        let snapshot = self.services.catalog.snapshot();

        let buttons: Vec<InlineButton> = match kind {
            RewardKind::Pokemon => {
                let offered: BTreeSet<u32> = snapshot.pokemon_rewards.iter().chain(rewards.pokemon.iter()).copied().collect();
                offered
                    .into_iter()
                    .map(|id| {
                        let label = marked(rewards.pokemon.contains(&id), format!("#{id}"));
                        InlineButton::new(label, &CallbackAction::ChoosePokemon(Some(id)))
                    })
                    .collect()
            }
            RewardKind::Item => {
                let offered: BTreeSet<u32> = snapshot.item_rewards.iter().chain(rewards.items.iter()).copied().collect();
                offered
                    .into_iter()
                    .map(|id| {
                        let label = marked(rewards.items.contains(&id), format!("#{id}"));
                        InlineButton::new(label, &CallbackAction::ChooseItem(Some(id)))
                    })
                    .collect()
            }
            RewardKind::Task => {
                let offered: BTreeSet<TaskId> = snapshot
                    .quests
                    .values()
                    .map(|quest| quest.task_id.clone())
                    .chain(rewards.tasks.iter().cloned())
                    .collect();
                offered
                    .into_iter()
                    .map(|task| {
                        let label = marked(rewards.tasks.contains(&task), task.as_str().to_string());
                        InlineButton::new(label, &CallbackAction::ChooseTask(Some(task)))
                    })
                    .collect()
            }
        };

        let buttons: Vec<InlineButton> = buttons.into_iter().filter(InlineButton::fits).collect();
        let text = texts::reward_submenu(kind.label(), buttons.len());
        let keyboard = KeyboardBuilder::new()
            .grid(buttons, REWARD_BUTTONS_PER_ROW)
            .button(texts::BUTTON_BACK, CallbackAction::ChooseQuestType)
            .build();
        self.render_main(chat_id, text, keyboard).await;
        Ok(())
    }

    async fn render_main(&self, chat_id: ChatId, text: String, keyboard: InlineKeyboard) {
        self.render(chat_id, SlotCategory::Main, SlotContent::text_with_keyboard(text, keyboard)).await;
    }

    /// Rendering problems are logged and swallowed: the conversation state has
    /// already moved on and the next render replaces the slot anyway.
    async fn render(&self, chat_id: ChatId, category: SlotCategory, content: SlotContent) {
        if let Err(failure) = self.services.slots.present(chat_id, category, content).await {
            warn!(
                event_name = "hunt.render_failed",
                chat_id = chat_id.0,
                slot = category.as_str(),
                error = %failure,
                "could not render slot"
            );
        }
    }
}

fn is_mid_hunt(state: &ChatState) -> bool {
    state.session.is_hunting
        && !matches!(
            state.hunt,
            HuntState::Idle
                | HuntState::AwaitingAreaOrQuests
                | HuntState::AwaitingAreaCenter
                | HuntState::AwaitingAreaRadius
        )
}

fn marked(selected: bool, label: String) -> String {
    if selected {
        format!("✓ {label}")
    } else {
        label
    }
}

/// A radius is a positive whole number of meters; a trailing `m` is allowed.
pub fn parse_radius(input: &LocationInput) -> Option<u32> {
    let LocationInput::Text(text) = input else {
        return None;
    };
    let digits = text.trim().trim_end_matches('m').trim_end();
    digits.parse::<u32>().ok().filter(|radius| *radius > 0)
}
