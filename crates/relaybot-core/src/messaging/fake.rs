use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicI32, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MediaRef, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities},
    },
    Result,
};

#[derive(Clone, Debug)]
pub struct Sent {
    pub chat_id: ChatId,
    pub kind: &'static str,
    pub text: String,
    pub media: Option<MediaRef>,
    pub keyboard: Option<InlineKeyboard>,
    pub msg: MessageRef,
}

/// Recording messenger for tests. Chats in `failing` error, chats in `hanging` never answer.
#[derive(Default)]
pub struct FakeMessenger {
    next_id: AtomicI32,
    sent: Mutex<Vec<Sent>>,
    edits: Mutex<Vec<(MessageRef, String)>>,
    deletes: Mutex<Vec<MessageRef>>,
    answers: Mutex<Vec<(String, Option<String>)>>,
    failing: Mutex<HashSet<i64>>,
    hanging: Mutex<HashSet<i64>>,
    no_keyboards: bool,
}

impl FakeMessenger {
    pub fn without_keyboards() -> Self {
        Self {
            no_keyboards: true,
            ..Self::default()
        }
    }

    pub fn fail_chat(&self, chat_id: i64) {
        self.failing.lock().unwrap().insert(chat_id);
    }

    pub fn hang_chat(&self, chat_id: i64) {
        self.hanging.lock().unwrap().insert(chat_id);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| s.chat_id.0 == chat_id)
            .collect()
    }

    pub fn texts_to(&self, chat_id: i64) -> Vec<String> {
        self.sent_to(chat_id).into_iter().map(|s| s.text).collect()
    }

    pub fn edits(&self) -> Vec<(MessageRef, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<MessageRef> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn answers(&self) -> Vec<(String, Option<String>)> {
        self.answers.lock().unwrap().clone()
    }

    async fn record(
        &self,
        chat_id: ChatId,
        kind: &'static str,
        text: &str,
        media: Option<&MediaRef>,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<MessageRef> {
        if self.hanging.lock().unwrap().contains(&chat_id.0) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing.lock().unwrap().contains(&chat_id.0) {
            return Err(Error::External(format!(
                "telegram error: Forbidden: bot was blocked by the user {}",
                chat_id.0
            )));
        }

        let msg = MessageRef {
            chat_id,
            message_id: MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
        };
        self.sent.lock().unwrap().push(Sent {
            chat_id,
            kind,
            text: text.to_string(),
            media: media.cloned(),
            keyboard,
            msg,
        });
        Ok(msg)
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_edit: true,
            supports_inline_keyboards: !self.no_keyboards,
            max_message_len: 4096,
        }
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.record(chat_id, "text", text, None, None).await
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        media: &MediaRef,
        caption: &str,
    ) -> Result<MessageRef> {
        self.record(chat_id, "photo", caption, Some(media), None).await
    }

    async fn send_video(
        &self,
        chat_id: ChatId,
        media: &MediaRef,
        caption: &str,
    ) -> Result<MessageRef> {
        self.record(chat_id, "video", caption, Some(media), None).await
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        media: &MediaRef,
        caption: &str,
    ) -> Result<MessageRef> {
        self.record(chat_id, "document", caption, Some(media), None)
            .await
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.edits.lock().unwrap().push((msg, text.to_string()));
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.deletes.lock().unwrap().push(msg);
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.record(chat_id, "keyboard", text, None, Some(keyboard))
            .await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.answers
            .lock()
            .unwrap()
            .push((callback_id.to_string(), text.map(|s| s.to_string())));
        Ok(())
    }
}
