use std::sync::Arc;

use teloxide::prelude::*;
use tracing::debug;

use relaybot_core::{
    domain::{ChatId, MessageId, MessageRef},
    messaging::types::{CallbackQuery as CoreCallback, IncomingUpdate},
};

use crate::router::AppState;

use super::sender_identity;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let message = q.message.as_ref().map(|m| MessageRef {
        chat_id: ChatId(m.chat.id.0),
        message_id: MessageId(m.id.0),
    });

    let update = CoreCallback {
        sender: sender_identity(&q.from),
        callback_id: q.id.clone(),
        data: q.data.clone().unwrap_or_default(),
        message,
    };

    // The engine always answers the query, also for malformed data.
    let outcome = state.engine.handle(IncomingUpdate::Callback(update)).await;
    debug!(user = q.from.id.0, ?outcome, "callback handled");
    Ok(())
}
