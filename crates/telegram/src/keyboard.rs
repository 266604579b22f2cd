use serde::Serialize;
use tracing::warn;

use crate::callbacks::{CallbackAction, MAX_CALLBACK_DATA_BYTES};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, action: &CallbackAction) -> Self {
        Self { text: label.into(), callback_data: action.encode() }
    }

    /// Whether Telegram would accept the button's callback data.
    pub fn fits(&self) -> bool {
        self.callback_data.len() <= MAX_CALLBACK_DATA_BYTES
    }
}

/// Every button goes through here before it lands in a row. One oversized
/// payload would make Telegram reject the whole message.
fn admit(button: InlineButton) -> Option<InlineButton> {
    if button.fits() {
        return Some(button);
    }
    warn!(
        event_name = "keyboard.button_dropped",
        label = %button.text,
        bytes = button.callback_data.len(),
        "callback data exceeds the transport limit"
    );
    None
}

/// `reply_markup` payload for inline keyboards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn is_empty(&self) -> bool {
        self.inline_keyboard.iter().all(Vec::is_empty)
    }

    pub fn buttons(&self) -> impl Iterator<Item = &InlineButton> {
        self.inline_keyboard.iter().flatten()
    }

    /// Decoded actions in display order; undecodable data is skipped.
    pub fn actions(&self) -> Vec<CallbackAction> {
        self.buttons().filter_map(|button| CallbackAction::parse(&button.callback_data).ok()).collect()
    }
}

#[derive(Default)]
pub struct KeyboardBuilder {
    rows: Vec<Vec<InlineButton>>,
}

impl KeyboardBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-button row.
    pub fn button(self, label: impl Into<String>, action: CallbackAction) -> Self {
        self.row(|row| {
            row.button(label, action);
        })
    }

    pub fn button_if(self, condition: bool, label: impl Into<String>, action: CallbackAction) -> Self {
        if condition {
            self.button(label, action)
        } else {
            self
        }
    }

    pub fn row<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut RowBuilder),
    {
        let mut builder = RowBuilder::default();
        build(&mut builder);
        if !builder.buttons.is_empty() {
            self.rows.push(builder.buttons);
        }
        self
    }

    /// Lays out `buttons` in rows of at most `per_row`.
    pub fn grid(mut self, buttons: impl IntoIterator<Item = InlineButton>, per_row: usize) -> Self {
        let per_row = per_row.max(1);
        let mut current = Vec::with_capacity(per_row);
        for button in buttons.into_iter().filter_map(admit) {
            current.push(button);
            if current.len() == per_row {
                self.rows.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            self.rows.push(current);
        }
        self
    }

    pub fn build(self) -> InlineKeyboard {
        InlineKeyboard { inline_keyboard: self.rows }
    }
}

#[derive(Default)]
pub struct RowBuilder {
    buttons: Vec<InlineButton>,
}

impl RowBuilder {
    pub fn button(&mut self, label: impl Into<String>, action: CallbackAction) -> &mut Self {
        self.buttons.extend(admit(InlineButton::new(label, &action)));
        self
    }
}
