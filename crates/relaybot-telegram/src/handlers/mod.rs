//! Telegram update handlers.
//!
//! Each handler is a small adapter that converts a teloxide update into the core
//! update model and hands it to the relay engine. Replies are sent by the engine
//! through the messaging port.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message, User},
};
use tracing::debug;

use relaybot_core::{
    domain::{ChatId, SenderIdentity},
    messaging::types::{IncomingUpdate, InboundMessage},
};

use crate::router::AppState;

mod callback;
mod commands;
mod content;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    callback::handle_callback(q, state).await
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let sender = sender_identity(user);
    let chat_id = ChatId(msg.chat.id.0);

    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            let cmd = commands::to_command(chat_id, sender, text, msg.date);
            state.engine.handle(IncomingUpdate::Command(cmd)).await;
            return Ok(());
        }
    }

    let Some(content) = content::extract(&msg) else {
        debug!(chat = chat_id.0, "ignoring unsupported message type");
        return Ok(());
    };

    let outcome = state
        .engine
        .handle(IncomingUpdate::Message(InboundMessage {
            chat_id,
            sender,
            content,
            timestamp: msg.date,
        }))
        .await;
    debug!(chat = chat_id.0, ?outcome, "message handled");
    Ok(())
}

/// Username when set, otherwise the full name, otherwise `"Unknown"`.
pub(crate) fn sender_identity(user: &User) -> SenderIdentity {
    let name = user
        .username
        .clone()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| user.full_name());
    let name = if name.trim().is_empty() {
        "Unknown".to_string()
    } else {
        name
    };
    SenderIdentity::new(user.id.0 as i64, name)
}
