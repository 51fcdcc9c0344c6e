use chrono::{DateTime, Utc};

use crate::domain::{ChatId, MediaRef, MessageRef, SenderIdentity};

/// Cross-messenger incoming update model.
///
/// Telegram-specific fields live in the Telegram adapter.
#[derive(Clone, Debug)]
pub enum IncomingUpdate {
    Command(Command),
    Message(InboundMessage),
    Callback(CallbackQuery),
}

#[derive(Clone, Debug)]
pub struct Command {
    pub chat_id: ChatId,
    pub sender: SenderIdentity,
    /// Lower-cased command name without the leading `/` or `@botname` suffix.
    pub name: String,
    pub args: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub sender: SenderIdentity,
    pub content: Content,
    pub timestamp: DateTime<Utc>,
}

/// What a sender sent us.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Photo {
        media: MediaRef,
        caption: Option<String>,
    },
    Video {
        media: MediaRef,
        caption: Option<String>,
    },
    Document {
        media: MediaRef,
        file_name: Option<String>,
        caption: Option<String>,
    },
    Contact {
        name: String,
        phone_number: String,
    },
}

impl Content {
    pub fn kind(&self) -> &'static str {
        match self {
            Content::Text(_) => "text",
            Content::Photo { .. } => "photo",
            Content::Video { .. } => "video",
            Content::Document { .. } => "document",
            Content::Contact { .. } => "contact",
        }
    }

    /// Text subject to keyword/rate admission: the body for text, the caption for media.
    pub fn admission_text(&self) -> &str {
        match self {
            Content::Text(t) => t,
            Content::Photo { caption, .. }
            | Content::Video { caption, .. }
            | Content::Document { caption, .. } => caption.as_deref().unwrap_or(""),
            Content::Contact { .. } => "",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CallbackQuery {
    pub sender: SenderIdentity,
    pub callback_id: String,
    pub data: String,
    /// The message carrying the pressed button.
    pub message: Option<MessageRef>,
}

/// Outbound payload, already transformed for its target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Photo { media: MediaRef, caption: String },
    Video { media: MediaRef, caption: String },
    Document { media: MediaRef, caption: String },
}

/// Inline keyboard (buttons) used for delete/resend callbacks.
#[derive(Clone, Debug, Default)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    /// Convenience for a single row of buttons.
    pub fn single_row(buttons: Vec<InlineButton>) -> Self {
        Self {
            rows: vec![buttons],
        }
    }
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_edit: bool,
    pub supports_inline_keyboards: bool,
    pub max_message_len: usize,
}
