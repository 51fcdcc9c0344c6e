//! Relay engine: admission, routing, payload transformation, delivery and acknowledgment.
//!
//! One `RelayEngine` is built per process and shared as `Arc<RelayEngine>`. All mutable
//! state sits behind its own lock, and no lock is held across a transport call, so
//! updates may be handled concurrently.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    address_book::{AddressBook, Registration},
    config::{Config, MediaRatePolicy},
    conversation::ConversationStore,
    domain::{ChatId, MessageRef, SenderIdentity, UserId},
    formatting::{
        attributed_text, contact_text, document_caption, media_caption, rate_limited_notice,
        truncate_chars,
    },
    history::{HistoryLog, HistoryRecord},
    messaging::{
        port::MessagingPort,
        types::{Content, IncomingUpdate, InboundMessage, InlineButton, InlineKeyboard, Payload},
    },
    pending::{callback_data, CallbackAction, PendingAction, PendingActionStore, PendingKey},
    rate_limit::{BlockedUntil, Decision, RateLimitPolicy, RateLimiter},
    routing::{Resolution, Router},
};

mod callbacks;
mod commands;
mod delivery;


pub use callbacks::CallbackOutcome;

/// Telegram caps media captions well below message length.
const MAX_CAPTION_LEN: usize = 1024;
const HISTORY_SUMMARY_LEN: usize = 200;

/// Terminal state of one handled update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Forwarded; `failed` counts targets that could not be reached.
    Delivered { delivered: usize, failed: usize },
    /// Every attempted delivery failed.
    DeliveryFailed { failed: usize },
    /// Owner content is never relayed.
    SelfMessage,
    /// Owner text consumed by a pending `/send` conversation.
    ConversationInput,
    RejectedSpam,
    RejectedRate(BlockedUntil),
    RejectedNoTarget,
    RejectedDocument,
    RejectedUnauthorized,
    /// A command ran and answered (including validation errors).
    CommandHandled,
    Callback(CallbackOutcome),
}

pub struct RelayEngine {
    cfg: Arc<Config>,
    messenger: Arc<dyn MessagingPort>,
    limiter: Mutex<RateLimiter>,
    router: Mutex<Router>,
    book: AddressBook,
    pending: Mutex<PendingActionStore>,
    history: Mutex<HistoryLog>,
    conversations: Mutex<ConversationStore>,
}

impl RelayEngine {
    pub fn new(cfg: Arc<Config>, messenger: Arc<dyn MessagingPort>, book: AddressBook) -> Self {
        Self {
            limiter: Mutex::new(RateLimiter::new(RateLimitPolicy::from_config(&cfg))),
            router: Mutex::new(Router::new(cfg.owner_id, cfg.routing_mode)),
            book,
            pending: Mutex::new(PendingActionStore::default()),
            history: Mutex::new(HistoryLog::new(cfg.history_capacity, cfg.history_window)),
            conversations: Mutex::new(ConversationStore::new(cfg.pending_input_timeout)),
            cfg,
            messenger,
        }
    }

    pub fn address_book(&self) -> &AddressBook {
        &self.book
    }

    pub async fn handle(&self, update: IncomingUpdate) -> Outcome {
        match update {
            IncomingUpdate::Message(msg) => self.handle_message(msg).await,
            IncomingUpdate::Command(cmd) => self.handle_command(cmd).await,
            IncomingUpdate::Callback(q) => Outcome::Callback(self.handle_callback(q).await),
        }
    }

    /// Inbound content pipeline: self guard → admission → routing → delivery → acknowledgment.
    pub async fn handle_message(&self, msg: InboundMessage) -> Outcome {
        let InboundMessage {
            chat_id,
            sender,
            content,
            timestamp: now,
        } = msg;

        let resolution = self.router.lock().await.resolve_targets(sender.id);
        if resolution == Resolution::SelfMessage {
            if let Content::Text(text) = &content {
                if let Some(outcome) = self.continue_conversation(chat_id, &sender, text, now).await
                {
                    return outcome;
                }
            }
            debug!(kind = content.kind(), "owner content is not relayed");
            return Outcome::SelfMessage;
        }

        let checked = matches!(content, Content::Text(_))
            || self.cfg.media_rate_policy == MediaRatePolicy::Checked;
        if checked {
            let decision =
                self.limiter
                    .lock()
                    .await
                    .admit(sender.id, content.admission_text(), now);
            match decision {
                Decision::Allow => {}
                Decision::RejectSpamKeyword { keyword } => {
                    warn!(sender = %sender.id, %keyword, "rejected message containing spam keyword");
                    self.reply(chat_id, "🚫 Your message was rejected by the spam filter.")
                        .await;
                    return Outcome::RejectedSpam;
                }
                Decision::RejectRateLimited { blocked_until } => {
                    warn!(sender = %sender.id, ?blocked_until, "rate limited sender");
                    self.reply(chat_id, &rate_limited_notice(blocked_until, now))
                        .await;
                    return Outcome::RejectedRate(blocked_until);
                }
            }
        }

        let targets = match resolution {
            Resolution::Targets(t) => t,
            Resolution::NoTarget => {
                info!(sender = %sender.id, "no forwarding target configured");
                self.reply(
                    chat_id,
                    "⚠️ No target configured. Your message could not be forwarded.",
                )
                .await;
                return Outcome::RejectedNoTarget;
            }
            Resolution::SelfMessage => return Outcome::SelfMessage,
        };

        let Some(payload) = self.transform(&sender, &content) else {
            info!(sender = %sender.id, "rejected document with disallowed extension");
            let allowed = self.cfg.allowed_document_extensions.join(", ");
            self.reply(
                chat_id,
                &format!("❌ Only these file types are accepted: {allowed}"),
            )
            .await;
            return Outcome::RejectedDocument;
        };

        self.register(&sender).await;

        let reports = self.fan_out(&targets, &payload).await;
        let delivered: Vec<MessageRef> = reports
            .iter()
            .filter_map(|r| r.result.as_ref().ok().copied())
            .collect();
        let failed = reports.len() - delivered.len();

        if delivered.is_empty() {
            self.reply(
                chat_id,
                "❌ Your message could not be delivered. Please try again later.",
            )
            .await;
            return Outcome::DeliveryFailed { failed };
        }

        self.history.lock().await.record(HistoryRecord {
            sender: sender.id,
            display_name: sender.display_name.clone(),
            kind: content.kind(),
            summary: truncate_chars(&history_summary(&content), HISTORY_SUMMARY_LEN),
            timestamp: now,
        });

        let primary = targets[0];
        let primary_ok = reports
            .first()
            .is_some_and(|r| r.target == primary && r.result.is_ok());
        let key = if primary_ok {
            let mut pending = self.pending.lock().await;
            let key = pending.next_key(sender.id, now);
            pending.record(PendingAction {
                key: key.clone(),
                payload,
                primary_target: primary,
                forwarded: delivered.clone(),
                confirmation: None,
            });
            Some(key)
        } else {
            None
        };

        self.acknowledge(chat_id, key.as_ref()).await;
        debug!(sender = %sender.id, delivered = delivered.len(), failed, "relayed message");
        Outcome::Delivered {
            delivered: delivered.len(),
            failed,
        }
    }

    /// Build the outbound payload; `None` for documents outside the allow-list.
    fn transform(&self, sender: &SenderIdentity, content: &Content) -> Option<Payload> {
        let max_len = self.messenger.capabilities().max_message_len;
        let payload = match content {
            Content::Text(body) => {
                Payload::Text(truncate_chars(&attributed_text(sender, body), max_len))
            }
            Content::Photo { media, caption } => Payload::Photo {
                media: media.clone(),
                caption: truncate_chars(
                    &media_caption("Photo", sender, caption.as_deref()),
                    MAX_CAPTION_LEN,
                ),
            },
            Content::Video { media, caption } => Payload::Video {
                media: media.clone(),
                caption: truncate_chars(
                    &media_caption("Video", sender, caption.as_deref()),
                    MAX_CAPTION_LEN,
                ),
            },
            Content::Document {
                media, file_name, ..
            } => {
                let name = file_name.as_deref().unwrap_or("");
                if !self.is_allowed_document(name) {
                    return None;
                }
                Payload::Document {
                    media: media.clone(),
                    caption: truncate_chars(&document_caption(sender, name), MAX_CAPTION_LEN),
                }
            }
            Content::Contact { name, phone_number } => Payload::Text(truncate_chars(
                &contact_text(sender, name, phone_number),
                max_len,
            )),
        };
        Some(payload)
    }

    fn is_allowed_document(&self, file_name: &str) -> bool {
        let lower = file_name.trim().to_lowercase();
        !lower.is_empty()
            && self
                .cfg
                .allowed_document_extensions
                .iter()
                .any(|ext| lower.ends_with(ext.as_str()))
    }

    async fn register(&self, sender: &SenderIdentity) {
        match self.book.register(sender).await {
            Ok(Registration::New) => info!(sender = %sender.id, "registered new sender"),
            Ok(Registration::Renamed) => {
                debug!(sender = %sender.id, name = %sender.display_name, "updated display name")
            }
            Ok(Registration::Unchanged) => {}
            Err(e) => warn!(sender = %sender.id, "failed to persist address book: {e}"),
        }
    }

    async fn acknowledge(&self, chat_id: ChatId, key: Option<&PendingKey>) {
        const DELIVERED: &str = "✅ Message delivered.";

        let Some(key) = key.filter(|_| self.messenger.capabilities().supports_inline_keyboards)
        else {
            self.reply(chat_id, DELIVERED).await;
            return;
        };

        let keyboard = InlineKeyboard::single_row(vec![
            InlineButton {
                label: "🗑 Delete".to_string(),
                callback_data: callback_data(CallbackAction::Delete, key),
            },
            InlineButton {
                label: "🔁 Resend".to_string(),
                callback_data: callback_data(CallbackAction::Resend, key),
            },
        ]);

        let sent = self
            .with_timeout(
                chat_id,
                self.messenger
                    .send_inline_keyboard(chat_id, DELIVERED, keyboard),
            )
            .await;
        match sent {
            Ok(msg) => self.pending.lock().await.set_confirmation(key, msg),
            Err(e) => warn!(chat = chat_id.0, "failed to send confirmation: {e}"),
        }
    }

    /// Best-effort text reply; failures are logged.
    pub(crate) async fn reply(&self, chat_id: ChatId, text: &str) -> Option<MessageRef> {
        match self
            .with_timeout(chat_id, self.messenger.send_text(chat_id, text))
            .await
        {
            Ok(msg) => Some(msg),
            Err(e) => {
                warn!(chat = chat_id.0, "failed to reply: {e}");
                None
            }
        }
    }

    /// Notify the owner that the service is up. Best-effort.
    pub async fn notify_startup(&self) {
        let known = self.book.len().await;
        let text = format!(
            "✅ Relay service started. Routing: {}. Known users: {known}.",
            self.cfg.routing_mode.as_str()
        );
        self.reply(self.cfg.owner_id.into(), &text).await;
    }

    /// Notify the owner that the service is going down. Best-effort, bounded by the send timeout.
    pub async fn notify_shutdown(&self) {
        self.reply(self.cfg.owner_id.into(), "🛑 Relay service is stopping.")
            .await;
    }

    /// Periodic housekeeping: idle rate states and expired conversations.
    pub async fn sweep(&self, now: DateTime<Utc>) {
        let evicted = self
            .limiter
            .lock()
            .await
            .evict_idle(now, self.cfg.rate_state_idle);
        let expired = self.conversations.lock().await.sweep(now);
        if evicted > 0 || expired > 0 {
            debug!(evicted, expired, "sweep finished");
        }
    }

    pub(crate) async fn is_owner(&self, user: UserId) -> bool {
        self.router.lock().await.authorize(user)
    }
}

fn history_summary(content: &Content) -> String {
    match content {
        Content::Text(t) => t.clone(),
        Content::Photo { caption, .. } | Content::Video { caption, .. } => {
            caption.clone().unwrap_or_default()
        }
        Content::Document { file_name, .. } => file_name.clone().unwrap_or_default(),
        Content::Contact { name, phone_number } => format!("{name} {phone_number}"),
    }
}
