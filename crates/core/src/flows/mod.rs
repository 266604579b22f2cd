pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, QuestHuntFlow};
pub use states::{
    FlowType, HuntAction, HuntContext, HuntEvent, HuntState, InputRejection, PromptNotice,
    TransitionOutcome,
};
