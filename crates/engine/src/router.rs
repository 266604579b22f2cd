use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use questpal_core::domain::chat::ChatId;
use questpal_core::errors::ApplicationError;
use questpal_telegram::callbacks::CallbackAction;
use questpal_telegram::events::{
    ChatEvent, EventHandlerError, HandlerResult, UpdateContext, UpdateEnvelope, UpdateHandler,
};

use crate::hunt::{HuntEngine, LocationInput};

/// Maps chat events onto [`HuntEngine`] entry points and answers button
/// presses once the engine is done with them.
pub struct HuntRouter {
    engine: Arc<HuntEngine>,
}

impl HuntRouter {
    pub fn new(engine: Arc<HuntEngine>) -> Self {
        Self { engine }
    }

    async fn route_command(
        &self,
        name: &str,
        envelope: &UpdateEnvelope,
        correlation_id: &str,
    ) -> Result<(), ApplicationError> {
        let chat_id = envelope.chat_id;
        let outcome = match name {
            "start" | "overview" => self.engine.show_overview(chat_id, correlation_id).await,
            "hunt" => self.engine.start_hunt(chat_id, correlation_id).await,
            _ => {
                self.engine
                    .handle_location_input(chat_id, LocationInput::Unsupported, envelope.message_id, correlation_id)
                    .await
            }
        };
        outcome.map(|_| ())
    }

    async fn route_callback(
        &self,
        chat_id: ChatId,
        callback_id: &str,
        data: &str,
        correlation_id: &str,
    ) -> Result<HandlerResult, EventHandlerError> {
        let action = match CallbackAction::parse(data) {
            Ok(action) => action,
            Err(error) => {
                warn!(
                    event_name = "ingress.telegram.callback_unparsed",
                    correlation_id = %correlation_id,
                    chat_id = chat_id.0,
                    data = %data,
                    error = %error,
                    "callback data not understood"
                );
                self.answer(callback_id, None).await;
                return Ok(HandlerResult::Ignored);
            }
        };

        match self.engine.handle_callback(chat_id, action, correlation_id).await {
            Ok(_) => {
                self.answer(callback_id, None).await;
                Ok(HandlerResult::Processed)
            }
            Err(error) if error.is_stale_input() => {
                let notice = error.into_interface(correlation_id);
                self.answer(callback_id, Some(notice.user_message())).await;
                Ok(HandlerResult::Processed)
            }
            Err(error) => {
                let notice = error.clone().into_interface(correlation_id);
                self.answer(callback_id, Some(notice.user_message())).await;
                Err(error.into())
            }
        }
    }

    async fn answer(&self, callback_id: &str, text: Option<&str>) {
        let messenger = self.engine.slots().messenger();
        if let Err(error) = messenger.answer_callback(callback_id, text, false).await {
            debug!(event_name = "ingress.telegram.callback_answer_failed", error = %error, "callback answer failed");
        }
    }
}

#[async_trait]
impl UpdateHandler for HuntRouter {
    async fn handle(
        &self,
        envelope: &UpdateEnvelope,
        ctx: &UpdateContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let chat_id = envelope.chat_id;
        let correlation_id = ctx.correlation_id.as_str();

        let input = match &envelope.event {
            ChatEvent::Callback { callback_id, data } => {
                return self.route_callback(chat_id, callback_id, data, correlation_id).await;
            }
            ChatEvent::Command { name, .. } => {
                self.route_command(name, envelope, correlation_id).await?;
                return Ok(HandlerResult::Processed);
            }
            ChatEvent::Text(text) => LocationInput::Text(text.clone()),
            ChatEvent::Location(point) => LocationInput::Coordinates(*point),
            ChatEvent::Other => LocationInput::Unsupported,
        };

        self.engine.handle_location_input(chat_id, input, envelope.message_id, correlation_id).await?;
        Ok(HandlerResult::Processed)
    }
}
