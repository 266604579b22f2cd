//! Telegram integration for questpal.
//!
//! - **Messenger** (`messenger`): the outbound capability the hunt engine talks to
//! - **Bot API** (`api`): HTTP client for `sendMessage`, `editMessageText`, `getUpdates`, ...
//! - **Dispatch limiter** (`limiter`): holds outbound operations until both flood
//!   windows have room, preserving order per conversation
//! - **Slots** (`slots`): one live `main` and one live `location` message per chat
//! - **Keyboards and callbacks** (`keyboard`, `callbacks`): inline buttons and their data
//! - **Events** (`events`): inbound update model and per-chat serializing dispatcher
//! - **Polling** (`polling`): `getUpdates` long polling with reconnect backoff
//! - **Chat map** (`chats`): per-chat async state that is dropped once a chat goes quiet
//!
//! # Architecture
//!
//! ```text
//! getUpdates → PollingRunner → ChatDispatcher ─(one queue per chat)→ UpdateHandler
//!                                                                        ↓
//!          Bot API ← DispatchLimiter ← ThrottledMessenger ← SlotManager ←┘
//! ```

pub mod api;
pub mod callbacks;
pub mod chats;
pub mod events;
pub mod keyboard;
mod lanes;
pub mod limiter;
pub mod messenger;
pub mod polling;
pub mod slots;

pub use api::BotApiClient;
pub use callbacks::{CallbackAction, CallbackParseError};
pub use chats::ChatMap;
pub use events::{ChatDispatcher, ChatEvent, UpdateContext, UpdateEnvelope, UpdateHandler};
pub use keyboard::{InlineButton, InlineKeyboard, KeyboardBuilder};
pub use limiter::{DispatchLimiter, Operation, OperationOutcome, Route, ThrottledMessenger};
pub use messenger::{Messenger, MessengerError};
pub use polling::{PollingRunner, ReconnectPolicy, UpdateSource};
pub use slots::{SlotCategory, SlotContent, SlotManager};
