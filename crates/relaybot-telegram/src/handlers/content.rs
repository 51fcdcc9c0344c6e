use teloxide::types::Message;

use relaybot_core::{domain::MediaRef, messaging::types::Content};

/// Map a Telegram message to relayable content. `None` for types the relay does not carry.
pub(super) fn extract(msg: &Message) -> Option<Content> {
    let caption = msg.caption().map(str::to_string);

    if let Some(text) = msg.text() {
        return Some(Content::Text(text.to_string()));
    }

    // Telegram sends several sizes; the last one is the largest.
    if let Some(best) = msg.photo().and_then(|sizes| sizes.last()) {
        return Some(Content::Photo {
            media: MediaRef(best.file.id.clone()),
            caption,
        });
    }

    if let Some(video) = msg.video() {
        return Some(Content::Video {
            media: MediaRef(video.file.id.clone()),
            caption,
        });
    }

    if let Some(doc) = msg.document() {
        return Some(Content::Document {
            media: MediaRef(doc.file.id.clone()),
            file_name: doc.file_name.clone(),
            caption,
        });
    }

    if let Some(contact) = msg.contact() {
        let name = match &contact.last_name {
            Some(last) => format!("{} {last}", contact.first_name),
            None => contact.first_name.clone(),
        };
        return Some(Content::Contact {
            name,
            phone_number: contact.phone_number.clone(),
        });
    }

    None
}
