use chrono::{DateTime, Utc};

use relaybot_core::{
    domain::{ChatId, SenderIdentity},
    messaging::types::Command,
};

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub(super) fn to_command(
    chat_id: ChatId,
    sender: SenderIdentity,
    text: &str,
    timestamp: DateTime<Utc>,
) -> Command {
    let (name, args) = parse_command(text);
    Command {
        chat_id,
        sender,
        name,
        args,
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_command_strips_bot_suffix() {
        let (c, a) = parse_command("/Send@RelayBot 222 hello there");
        assert_eq!(c, "send");
        assert_eq!(a, "222 hello there");
    }

    #[test]
    fn parse_command_without_args() {
        let (c, a) = parse_command("/history");
        assert_eq!(c, "history");
        assert_eq!(a, "");
    }

    #[test]
    fn spaced_send_all_keeps_subcommand_in_args() {
        let (c, a) = parse_command("/send all  Hello everyone ");
        assert_eq!(c, "send");
        assert_eq!(a, "all  Hello everyone");
    }

    #[test]
    fn to_command_carries_sender_and_time() {
        let now = Utc::now();
        let cmd = to_command(
            ChatId(5),
            SenderIdentity::new(5, "alice"),
            "/start",
            now,
        );
        assert_eq!(cmd.name, "start");
        assert_eq!(cmd.sender.display_name, "alice");
        assert_eq!(cmd.timestamp, now);
    }
}
