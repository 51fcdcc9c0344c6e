use async_trait::async_trait;

use crate::{
    domain::{ChatId, MediaRef, MessageRef},
    messaging::types::{InlineKeyboard, MessagingCapabilities, Payload},
    Result,
};

/// Cross-messenger transport port.
///
/// The engine only calls these primitives; connection lifecycle, polling and
/// token handling belong to the adapter.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    /// Wait until a call to `chat_id` (or any call, for `None`) may be issued.
    ///
    /// Callers await this before starting a send timeout, so time spent queueing for
    /// flood control never counts against the send itself.
    async fn throttle(&self, _chat_id: Option<ChatId>) {}

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;
    async fn send_photo(&self, chat_id: ChatId, media: &MediaRef, caption: &str)
        -> Result<MessageRef>;
    async fn send_video(&self, chat_id: ChatId, media: &MediaRef, caption: &str)
        -> Result<MessageRef>;
    async fn send_document(
        &self,
        chat_id: ChatId,
        media: &MediaRef,
        caption: &str,
    ) -> Result<MessageRef>;

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()>;
    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}

/// Send a transformed payload with the matching primitive.
pub async fn send_payload(
    messenger: &dyn MessagingPort,
    chat_id: ChatId,
    payload: &Payload,
) -> Result<MessageRef> {
    match payload {
        Payload::Text(text) => messenger.send_text(chat_id, text).await,
        Payload::Photo { media, caption } => messenger.send_photo(chat_id, media, caption).await,
        Payload::Video { media, caption } => messenger.send_video(chat_id, media, caption).await,
        Payload::Document { media, caption } => {
            messenger.send_document(chat_id, media, caption).await
        }
    }
}
