use tracing::{debug, info, warn};

use super::RelayEngine;
use crate::{
    messaging::types::CallbackQuery,
    pending::{parse_callback_data, CallbackAction, PendingKey},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackOutcome {
    Deleted,
    Resent,
    ResendFailed,
    NotFound,
    Invalid,
    Unauthorized,
}

impl RelayEngine {
    /// Delete/resend buttons under a delivery confirmation.
    ///
    /// Only the original sender or the owner may press them.
    pub async fn handle_callback(&self, q: CallbackQuery) -> CallbackOutcome {
        let Some((action, key)) = parse_callback_data(&q.data) else {
            debug!(data = %q.data, "malformed callback data");
            self.answer(&q, "Invalid action").await;
            return CallbackOutcome::Invalid;
        };

        if q.sender.id != key.sender && !self.is_owner(q.sender.id).await {
            warn!(sender = %q.sender.id, owner_of = %key.sender, "unauthorized callback");
            self.answer(&q, "You are not allowed to do this.").await;
            return CallbackOutcome::Unauthorized;
        }

        match action {
            CallbackAction::Delete => self.delete_relayed(&q, &key).await,
            CallbackAction::Resend => self.resend_relayed(&q, &key).await,
        }
    }

    async fn delete_relayed(&self, q: &CallbackQuery, key: &PendingKey) -> CallbackOutcome {
        let Some(record) = self.pending.lock().await.remove(key) else {
            self.answer(q, "Message not found").await;
            return CallbackOutcome::NotFound;
        };

        for copy in &record.forwarded {
            let chat_id = copy.chat_id;
            if let Err(e) = self
                .with_timeout(chat_id, self.messenger.delete_message(*copy))
                .await
            {
                warn!(chat = chat_id.0, "failed to delete forwarded copy: {e}");
            }
        }

        if self.messenger.capabilities().supports_edit {
            if let Some(confirmation) = record.confirmation.or(q.message) {
                if let Err(e) = self
                    .with_timeout(
                        confirmation.chat_id,
                        self.messenger.edit_text(confirmation, "Message deleted."),
                    )
                    .await
                {
                    warn!(chat = confirmation.chat_id.0, "failed to edit confirmation: {e}");
                }
            }
        }

        info!(sender = %key.sender, at = %key.timestamp, "relayed message deleted");
        self.answer(q, "Message deleted").await;
        CallbackOutcome::Deleted
    }

    async fn resend_relayed(&self, q: &CallbackQuery, key: &PendingKey) -> CallbackOutcome {
        let record = self.pending.lock().await.get(key).cloned();
        let Some(record) = record else {
            self.answer(q, "Message not found").await;
            return CallbackOutcome::NotFound;
        };

        match self
            .deliver_one(record.primary_target, &record.payload)
            .await
        {
            Ok(copy) => {
                // Track the new copy so a later delete removes it as well.
                if let Some(stored) = self.pending.lock().await.get_mut(key) {
                    stored.forwarded.push(copy);
                }
                info!(
                    sender = %key.sender,
                    to = %record.primary_target,
                    "relayed message resent"
                );
                self.answer(q, "Message resent").await;
                CallbackOutcome::Resent
            }
            Err(e) => {
                warn!(sender = %key.sender, "resend failed: {e}");
                self.answer(q, "Resend failed, please try again.").await;
                CallbackOutcome::ResendFailed
            }
        }
    }

    async fn answer(&self, q: &CallbackQuery, text: &str) {
        let answered = self.with_global_timeout(
            q.sender.id,
            self.messenger.answer_callback_query(&q.callback_id, Some(text)),
        );
        if let Err(e) = answered.await {
            warn!("failed to answer callback query: {e}");
        }
    }
}
