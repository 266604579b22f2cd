use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use questpal_core::config::TelegramConfig;
use questpal_core::domain::chat::{ChatId, MessageId};
use questpal_core::domain::geo::LatLon;

use crate::events::Update;
use crate::keyboard::InlineKeyboard;
use crate::messenger::{Messenger, MessengerError};
use crate::polling::{TransportError, UpdateSource};

/// Headroom on top of the long-poll timeout before the HTTP request is abandoned.
const POLL_GRACE: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Bot API over HTTPS. Message text is sent with HTML parse mode.
pub struct BotApiClient {
    client: Client,
    api_base_url: String,
    token: SecretString,
}

impl BotApiClient {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            client: Client::new(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base_url, self.token.expose_secret(), method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: Value,
        timeout: Duration,
    ) -> Result<T, MessengerError> {
        let response = self
            .client
            .post(self.method_url(method))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|error| MessengerError::Transport(error.without_url().to_string()))?;

        let status = response.status();
        let payload: ApiResponse<T> = response
            .json()
            .await
            .map_err(|error| MessengerError::Transport(error.without_url().to_string()))?;

        match payload {
            ApiResponse { ok: true, result: Some(result), .. } => Ok(result),
            ApiResponse { description, error_code, .. } => {
                let description = description.unwrap_or_else(|| format!("http status {status}"));
                debug!(
                    event_name = "telegram.api.request_failed",
                    method,
                    error_code = error_code.unwrap_or_default(),
                    description = %description,
                    "bot api request failed"
                );
                Err(classify_failure(error_code, &description))
            }
        }
    }
}

fn classify_failure(error_code: Option<i64>, description: &str) -> MessengerError {
    let normalized = description.to_ascii_lowercase();
    if normalized.contains("message is not modified") {
        MessengerError::NotModified
    } else if normalized.contains("message to edit not found")
        || normalized.contains("message to delete not found")
        || normalized.contains("message can't be edited")
    {
        MessengerError::NotFound(description.to_string())
    } else if matches!(error_code, Some(code) if code >= 500) {
        MessengerError::Transport(description.to_string())
    } else {
        MessengerError::Rejected(description.to_string())
    }
}

fn with_keyboard(mut body: Value, keyboard: Option<&InlineKeyboard>) -> Value {
    if let (Some(keyboard), Some(object)) = (keyboard, body.as_object_mut()) {
        object.insert("reply_markup".to_string(), json!(keyboard));
    }
    body
}

#[async_trait]
impl Messenger for BotApiClient {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageId, MessengerError> {
        let body = with_keyboard(
            json!({
                "chat_id": chat_id.0,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }),
            keyboard,
        );
        let sent: SentMessage = self.call("sendMessage", body, REQUEST_TIMEOUT).await?;
        Ok(MessageId(sent.message_id))
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), MessengerError> {
        let body = with_keyboard(
            json!({
                "chat_id": chat_id.0,
                "message_id": message_id.0,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }),
            keyboard,
        );
        let _: Value = self.call("editMessageText", body, REQUEST_TIMEOUT).await?;
        Ok(())
    }

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), MessengerError> {
        let body = json!({ "chat_id": chat_id.0, "message_id": message_id.0 });
        let _: bool = self.call("deleteMessage", body, REQUEST_TIMEOUT).await?;
        Ok(())
    }

    async fn send_location(
        &self,
        chat_id: ChatId,
        point: LatLon,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageId, MessengerError> {
        let body = with_keyboard(
            json!({
                "chat_id": chat_id.0,
                "latitude": point.latitude,
                "longitude": point.longitude,
            }),
            keyboard,
        );
        let sent: SentMessage = self.call("sendLocation", body, REQUEST_TIMEOUT).await?;
        Ok(MessageId(sent.message_id))
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), MessengerError> {
        let mut body = json!({ "callback_query_id": callback_id, "show_alert": show_alert });
        if let (Some(text), Some(object)) = (text, body.as_object_mut()) {
            object.insert("text".to_string(), json!(text));
        }
        let _: bool = self.call("answerCallbackQuery", body, REQUEST_TIMEOUT).await?;
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for BotApiClient {
    async fn fetch_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Option<Vec<Update>>, TransportError> {
        let mut body = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        if let (Some(offset), Some(object)) = (offset, body.as_object_mut()) {
            object.insert("offset".to_string(), json!(offset));
        }

        let timeout = Duration::from_secs(timeout_secs) + POLL_GRACE;
        match self.call::<Vec<Update>>("getUpdates", body, timeout).await {
            Ok(updates) => Ok(Some(updates)),
            Err(MessengerError::Transport(reason)) => Err(TransportError::Fetch(reason)),
            Err(other) => Err(TransportError::Rejected(other.to_string())),
        }
    }
}
