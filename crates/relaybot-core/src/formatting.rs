//! Plain-text rendering of relayed content and replies.
//!
//! Everything is sent without a parse mode, so display names and bodies need no escaping.

use chrono::{DateTime, Utc};

use crate::{domain::SenderIdentity, rate_limit::BlockedUntil};

/// `"{display_name} (ID:{id})"`.
pub fn attribution(sender: &SenderIdentity) -> String {
    format!("{} (ID:{})", sender.display_name, sender.id)
}

/// Forwarded text: `"{display_name} (ID:{id}): {body}"`.
pub fn attributed_text(sender: &SenderIdentity, body: &str) -> String {
    format!("{}: {body}", attribution(sender))
}

/// Caption for forwarded photos/videos, with the sender's own caption appended.
pub fn media_caption(label: &str, sender: &SenderIdentity, caption: Option<&str>) -> String {
    let head = format!("{label} from {}", attribution(sender));
    match caption.map(str::trim).filter(|c| !c.is_empty()) {
        Some(c) => format!("{head}\n{c}"),
        None => head,
    }
}

pub fn document_caption(sender: &SenderIdentity, file_name: &str) -> String {
    format!("Document from {}: {file_name}", attribution(sender))
}

pub fn contact_text(sender: &SenderIdentity, name: &str, phone: &str) -> String {
    format!("{} shared a contact: {name} {phone}", attribution(sender))
}

/// Truncate to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    format!("{}...", s.chars().take(keep).collect::<String>())
}

pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        return format!("{hours}h {mins}m {secs}s");
    }
    if mins > 0 {
        return format!("{mins}m {secs}s");
    }
    format!("{secs}s")
}

/// Reply shown to a rate-limited sender.
pub fn rate_limited_notice(blocked_until: BlockedUntil, now: DateTime<Utc>) -> String {
    match blocked_until {
        BlockedUntil::Permanent => {
            "⛔ You have been blocked for sending too many messages.".to_string()
        }
        BlockedUntil::At(until) => format!(
            "⏳ Too many messages. Please wait {} before sending again.",
            format_duration((until - now).num_seconds())
        ),
    }
}

/// Join lines into messages of at most `limit` bytes; over-long lines are hard-split.
pub fn split_chunks<'a>(lines: impl IntoIterator<Item = &'a str>, limit: usize) -> Vec<String> {
    let limit = limit.max(16);
    let mut out = Vec::new();
    let mut chunk = String::new();

    for line in lines {
        let needed = if chunk.is_empty() {
            line.len()
        } else {
            chunk.len() + 1 + line.len()
        };
        if needed <= limit {
            if !chunk.is_empty() {
                chunk.push('\n');
            }
            chunk.push_str(line);
            continue;
        }

        if !chunk.is_empty() {
            out.push(std::mem::take(&mut chunk));
        }

        let mut rest = line;
        while rest.len() > limit {
            let (head, tail) = split_utf8_prefix(rest, limit);
            out.push(head.to_string());
            rest = tail;
        }
        chunk.push_str(rest);
    }

    if !chunk.is_empty() {
        out.push(chunk);
    }
    out
}

fn split_utf8_prefix(s: &str, max_bytes: usize) -> (&str, &str) {
    if s.len() <= max_bytes {
        return (s, "");
    }
    let mut idx = 0usize;
    for (i, _) in s.char_indices() {
        if i > max_bytes {
            break;
        }
        idx = i;
    }
    if idx == 0 {
        // Shouldn't happen (valid UTF-8), but avoid infinite loops.
        let next = s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len());
        return (&s[..next], &s[next..]);
    }
    (&s[..idx], &s[idx..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn alice() -> SenderIdentity {
        SenderIdentity::new(111, "alice")
    }

    #[test]
    fn text_attribution_matches_relay_format() {
        assert_eq!(attributed_text(&alice(), "hello"), "alice (ID:111): hello");
    }

    #[test]
    fn media_caption_appends_sender_caption() {
        assert_eq!(
            media_caption("Photo", &alice(), None),
            "Photo from alice (ID:111)"
        );
        assert_eq!(
            media_caption("Video", &alice(), Some("  look ")),
            "Video from alice (ID:111)\nlook"
        );
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("héllo", 5), "héllo");
        assert_eq!(truncate_chars("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn rate_notice_shows_remaining_time() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let until = now + chrono::Duration::seconds(300);
        assert!(rate_limited_notice(BlockedUntil::At(until), now).contains("5m 0s"));
        assert!(rate_limited_notice(BlockedUntil::Permanent, now).contains("blocked"));
    }

    #[test]
    fn chunks_stay_under_limit() {
        let long = "x".repeat(100);
        let lines = vec!["short one", long.as_str(), "tail"];
        let chunks = split_chunks(lines, 40);
        assert!(chunks.iter().all(|c| c.len() <= 40));
        assert_eq!(chunks.first().map(String::as_str), Some("short one"));
        assert_eq!(chunks.concat().matches('x').count(), 100);
    }

    #[test]
    fn keeps_short_lines_together() {
        let chunks = split_chunks(vec!["a", "b", "c"], 4000);
        assert_eq!(chunks, vec!["a\nb\nc".to_string()]);
    }
}
