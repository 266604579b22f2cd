use thiserror::Error;
use tracing::{info, warn};

use crate::flows::states::{
    FlowType, HuntAction, HuntContext, HuntEvent, HuntState, InputRejection, PromptNotice,
    TransitionOutcome,
};

pub trait FlowDefinition {
    fn flow_type(&self) -> FlowType;
    fn initial_state(&self) -> HuntState;
    fn transition(
        &self,
        current: &HuntState,
        event: &HuntEvent,
        context: &HuntContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct QuestHuntFlow;

impl FlowDefinition for QuestHuntFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::QuestHunt
    }

    fn initial_state(&self) -> HuntState {
        HuntState::Idle
    }

    fn transition(
        &self,
        current: &HuntState,
        event: &HuntEvent,
        context: &HuntContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_quest_hunt(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_state(&self) -> HuntState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &HuntState,
        event: &HuntEvent,
        context: &HuntContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    /// Same as [`FlowEngine::apply`] but records the outcome against the
    /// update's correlation id.
    pub fn apply_logged(
        &self,
        current: &HuntState,
        event: &HuntEvent,
        context: &HuntContext,
        correlation_id: &str,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => info!(
                event_name = "hunt.transition_applied",
                correlation_id = %correlation_id,
                from = %outcome.from,
                to = %outcome.to,
                event = ?outcome.event,
                "hunt transition applied"
            ),
            Err(error) => warn!(
                event_name = "hunt.transition_rejected",
                correlation_id = %correlation_id,
                error = %error,
                "hunt transition rejected"
            ),
        }
        result
    }
}

impl Default for FlowEngine<QuestHuntFlow> {
    fn default() -> Self {
        Self::new(QuestHuntFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: HuntState, event: HuntEvent },
}

fn transition_quest_hunt(
    current: &HuntState,
    event: &HuntEvent,
    context: &HuntContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use HuntAction::{
        BeginHunt, ClearLocation, PresentQuest, PromptAreaCenter, PromptAreaRadius,
        PromptChooseQuests, PromptContinueOrReset, PromptEndConfirm, PromptIgnoreConfirm,
        PromptSelectArea, PromptStartLocation, RecordCollected, RecordIgnored, RecordSkipped,
        ReleaseSkipped, ReportComplete, ReportEndedEarly, ReportNoQuestsFound, ResetProgress,
        SelectNextQuest, ShowOverview, StopHunting, StoreArea,
    };
    use HuntState::{
        AwaitingAreaCenter, AwaitingAreaOrQuests, AwaitingAreaRadius, AwaitingContinueDecision,
        AwaitingEndConfirm, AwaitingIgnoreConfirm, AwaitingStartLocation, Idle, PresentingQuest,
        SelectingQuest,
    };

    let invalid = || FlowTransitionError::InvalidTransition {
        state: current.clone(),
        event: event.clone(),
    };

    let (to, actions) = match (current, event) {
        (_, HuntEvent::StartRequested) => {
            if !context.has_area {
                (AwaitingAreaOrQuests, vec![PromptSelectArea])
            } else if !context.has_quests {
                (AwaitingAreaOrQuests, vec![PromptChooseQuests])
            } else if !context.has_candidates {
                (Idle, vec![ReportNoQuestsFound, StopHunting])
            } else if context.resumable_today {
                (AwaitingContinueDecision, vec![PromptContinueOrReset])
            } else {
                (AwaitingStartLocation, vec![ResetProgress, PromptStartLocation(PromptNotice::None)])
            }
        }
        (AwaitingContinueDecision, HuntEvent::ContinueChosen) => {
            (AwaitingStartLocation, vec![PromptStartLocation(PromptNotice::Continued)])
        }
        (AwaitingContinueDecision, HuntEvent::ResetChosen) => {
            (AwaitingStartLocation, vec![ResetProgress, PromptStartLocation(PromptNotice::Reset)])
        }
        (AwaitingStartLocation, HuntEvent::LocationRejected { reason }) => {
            (AwaitingStartLocation, vec![PromptStartLocation(PromptNotice::Rejected(*reason))])
        }
        (AwaitingStartLocation, HuntEvent::LocationResolved) => {
            (SelectingQuest, vec![BeginHunt, SelectNextQuest])
        }
        (SelectingQuest, HuntEvent::QuestSelected { stop_id, deferred }) => (
            PresentingQuest { stop_id: stop_id.clone() },
            vec![PresentQuest { stop_id: stop_id.clone(), deferred: *deferred }],
        ),
        (SelectingQuest, HuntEvent::QueueExhausted) => {
            (Idle, vec![ReportComplete, ClearLocation, StopHunting])
        }
        (PresentingQuest { stop_id: current_stop }, HuntEvent::Collected { stop_id })
            if current_stop == stop_id =>
        {
            (SelectingQuest, vec![RecordCollected(stop_id.clone()), SelectNextQuest])
        }
        (PresentingQuest { stop_id: current_stop }, HuntEvent::Skipped { stop_id })
            if current_stop == stop_id =>
        {
            (SelectingQuest, vec![RecordSkipped(stop_id.clone()), SelectNextQuest])
        }
        (PresentingQuest { stop_id: current_stop }, HuntEvent::IgnoreRequested { stop_id })
            if current_stop == stop_id =>
        {
            (
                AwaitingIgnoreConfirm { stop_id: stop_id.clone() },
                vec![PromptIgnoreConfirm(stop_id.clone()), ClearLocation],
            )
        }
        (PresentingQuest { .. }, HuntEvent::EnqueueSkipped) => {
            (SelectingQuest, vec![ReleaseSkipped, SelectNextQuest])
        }
        (AwaitingIgnoreConfirm { stop_id: pending }, HuntEvent::IgnoreConfirmed { stop_id })
            if pending == stop_id =>
        {
            (SelectingQuest, vec![RecordIgnored(stop_id.clone()), SelectNextQuest])
        }
        (AwaitingIgnoreConfirm { .. } | AwaitingEndConfirm, HuntEvent::ContinueHunt) => {
            if context.has_start_location {
                (SelectingQuest, vec![SelectNextQuest])
            } else {
                (AwaitingStartLocation, vec![PromptStartLocation(PromptNotice::None)])
            }
        }
        (Idle | AwaitingAreaOrQuests | AwaitingAreaCenter | AwaitingAreaRadius, HuntEvent::EndRequested { .. }) => {
            return Err(invalid());
        }
        (_, HuntEvent::EndRequested { confirmed: false }) => {
            (AwaitingEndConfirm, vec![PromptEndConfirm, ClearLocation])
        }
        (_, HuntEvent::EndRequested { confirmed: true }) => {
            (Idle, vec![ReportEndedEarly, ClearLocation, StopHunting])
        }
        (_, HuntEvent::Cancelled) => (Idle, vec![StopHunting, ClearLocation, ShowOverview]),
        (
            Idle | AwaitingAreaOrQuests | AwaitingAreaCenter | AwaitingAreaRadius,
            HuntEvent::AreaSelectionRequested,
        ) => (AwaitingAreaCenter, vec![PromptAreaCenter(PromptNotice::None)]),
        (AwaitingAreaCenter, HuntEvent::AreaCenterRejected { reason }) => {
            (AwaitingAreaCenter, vec![PromptAreaCenter(PromptNotice::Rejected(*reason))])
        }
        (AwaitingAreaCenter, HuntEvent::AreaCenterResolved) => {
            (AwaitingAreaRadius, vec![PromptAreaRadius(PromptNotice::None)])
        }
        (AwaitingAreaRadius, HuntEvent::AreaRadiusRejected) => (
            AwaitingAreaRadius,
            vec![PromptAreaRadius(PromptNotice::Rejected(InputRejection::InvalidRadius))],
        ),
        (AwaitingAreaRadius, HuntEvent::AreaRadiusAccepted) => (Idle, vec![StoreArea]),
        _ => return Err(invalid()),
    };

    Ok(TransitionOutcome { from: current.clone(), to, event: event.clone(), actions })
}

#[cfg(test)]
mod tests {
    use crate::domain::quest::StopId;
    use crate::flows::engine::{FlowEngine, FlowTransitionError};
    use crate::flows::states::{
        HuntAction, HuntContext, HuntEvent, HuntState, InputRejection, PromptNotice,
    };

    fn ready() -> HuntContext {
        HuntContext {
            has_area: true,
            has_quests: true,
            has_candidates: true,
            resumable_today: false,
            has_start_location: true,
        }
    }

    fn stop(id: &str) -> StopId {
        StopId::new(id)
    }

    #[test]
    fn start_checks_prerequisites_in_order() {
        let engine = FlowEngine::default();

        let no_area = HuntContext { has_area: false, has_quests: false, ..ready() };
        let outcome = engine.apply(&HuntState::Idle, &HuntEvent::StartRequested, &no_area).expect("start");
        assert_eq!(outcome.to, HuntState::AwaitingAreaOrQuests);
        assert_eq!(outcome.actions, vec![HuntAction::PromptSelectArea]);

        let no_quests = HuntContext { has_quests: false, ..ready() };
        let outcome = engine.apply(&HuntState::Idle, &HuntEvent::StartRequested, &no_quests).expect("start");
        assert_eq!(outcome.actions, vec![HuntAction::PromptChooseQuests]);

        let nothing_in_range = HuntContext { has_candidates: false, ..ready() };
        let outcome =
            engine.apply(&HuntState::Idle, &HuntEvent::StartRequested, &nothing_in_range).expect("start");
        assert_eq!(outcome.to, HuntState::Idle);
        assert!(outcome.actions.contains(&HuntAction::ReportNoQuestsFound));
    }

    #[test]
    fn same_day_hunt_offers_continue_and_both_choices_ask_for_location() {
        let engine = FlowEngine::default();
        let context = HuntContext { resumable_today: true, ..ready() };

        let asked = engine.apply(&HuntState::Idle, &HuntEvent::StartRequested, &context).expect("start");
        assert_eq!(asked.to, HuntState::AwaitingContinueDecision);

        let continued = engine.apply(&asked.to, &HuntEvent::ContinueChosen, &context).expect("continue");
        assert_eq!(continued.to, HuntState::AwaitingStartLocation);
        assert!(!continued.actions.contains(&HuntAction::ResetProgress));

        let reset = engine.apply(&asked.to, &HuntEvent::ResetChosen, &context).expect("reset");
        assert_eq!(reset.to, HuntState::AwaitingStartLocation);
        assert!(reset.actions.contains(&HuntAction::ResetProgress));
    }

    #[test]
    fn rejected_location_re_prompts_with_warning() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(
                &HuntState::AwaitingStartLocation,
                &HuntEvent::LocationRejected { reason: InputRejection::NotFound },
                &ready(),
            )
            .expect("self loop");

        assert_eq!(outcome.to, HuntState::AwaitingStartLocation);
        assert_eq!(
            outcome.actions,
            vec![HuntAction::PromptStartLocation(PromptNotice::Rejected(InputRejection::NotFound))]
        );
    }

    #[test]
    fn hunt_loop_presents_collects_and_completes() {
        let engine = FlowEngine::default();
        let context = ready();

        let selecting = engine
            .apply(&HuntState::AwaitingStartLocation, &HuntEvent::LocationResolved, &context)
            .expect("resolved");
        assert_eq!(selecting.to, HuntState::SelectingQuest);

        let presenting = engine
            .apply(
                &selecting.to,
                &HuntEvent::QuestSelected { stop_id: stop("a"), deferred: false },
                &context,
            )
            .expect("selected");
        assert_eq!(presenting.to, HuntState::PresentingQuest { stop_id: stop("a") });

        let collected = engine
            .apply(&presenting.to, &HuntEvent::Collected { stop_id: stop("a") }, &context)
            .expect("collected");
        assert_eq!(collected.actions[0], HuntAction::RecordCollected(stop("a")));

        let done = engine.apply(&collected.to, &HuntEvent::QueueExhausted, &context).expect("done");
        assert_eq!(done.to, HuntState::Idle);
        assert!(done.actions.contains(&HuntAction::StopHunting));
        assert!(done.actions.contains(&HuntAction::ClearLocation));
    }

    #[test]
    fn ignore_requires_confirmation_and_decline_does_not_record() {
        let engine = FlowEngine::default();
        let presenting = HuntState::PresentingQuest { stop_id: stop("a") };

        let asked = engine
            .apply(&presenting, &HuntEvent::IgnoreRequested { stop_id: stop("a") }, &ready())
            .expect("ask");
        assert_eq!(asked.to, HuntState::AwaitingIgnoreConfirm { stop_id: stop("a") });

        let declined = engine.apply(&asked.to, &HuntEvent::ContinueHunt, &ready()).expect("decline");
        assert_eq!(declined.actions, vec![HuntAction::SelectNextQuest]);

        let confirmed = engine
            .apply(&asked.to, &HuntEvent::IgnoreConfirmed { stop_id: stop("a") }, &ready())
            .expect("confirm");
        assert_eq!(confirmed.actions[0], HuntAction::RecordIgnored(stop("a")));
    }

    #[test]
    fn end_requires_confirmation_unless_confirmed_in_the_same_click() {
        let engine = FlowEngine::default();
        let presenting = HuntState::PresentingQuest { stop_id: stop("a") };

        let asked = engine
            .apply(&presenting, &HuntEvent::EndRequested { confirmed: false }, &ready())
            .expect("ask");
        assert_eq!(asked.to, HuntState::AwaitingEndConfirm);

        let ended = engine
            .apply(&asked.to, &HuntEvent::EndRequested { confirmed: true }, &ready())
            .expect("end");
        assert_eq!(ended.to, HuntState::Idle);
        assert!(ended.actions.contains(&HuntAction::ReportEndedEarly));
    }

    #[test]
    fn stale_buttons_for_other_stops_are_rejected() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(
                &HuntState::PresentingQuest { stop_id: stop("a") },
                &HuntEvent::Collected { stop_id: stop("b") },
                &ready(),
            )
            .expect_err("different stop");

        assert!(matches!(error, FlowTransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn area_selection_walks_center_then_radius() {
        let engine = FlowEngine::default();
        let context = HuntContext::default();

        let center = engine
            .apply(&HuntState::Idle, &HuntEvent::AreaSelectionRequested, &context)
            .expect("select area");
        assert_eq!(center.to, HuntState::AwaitingAreaCenter);

        let radius = engine.apply(&center.to, &HuntEvent::AreaCenterResolved, &context).expect("center");
        assert_eq!(radius.to, HuntState::AwaitingAreaRadius);

        let retry = engine.apply(&radius.to, &HuntEvent::AreaRadiusRejected, &context).expect("retry");
        assert_eq!(retry.to, HuntState::AwaitingAreaRadius);

        let stored = engine.apply(&retry.to, &HuntEvent::AreaRadiusAccepted, &context).expect("stored");
        assert_eq!(stored.to, HuntState::Idle);
        assert_eq!(stored.actions, vec![HuntAction::StoreArea]);
    }

    #[test]
    fn end_request_outside_a_hunt_is_invalid() {
        let engine = FlowEngine::default();
        assert!(engine
            .apply(&HuntState::Idle, &HuntEvent::EndRequested { confirmed: false }, &ready())
            .is_err());
    }
}
