use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{Outcome, RelayEngine};
use crate::{
    conversation::PendingInput,
    domain::{ChatId, SenderIdentity, UserId},
    errors::Error,
    formatting::split_chunks,
    messaging::types::{Command, Payload},
    Result,
};

const NOT_AUTHORIZED: &str = "You are not authorized to use this command.";
const SEND_USAGE: &str = "Usage: /send <user_id> <message>";

const PUBLIC_HELP: &str = "/start - Register to receive messages from the owner\n\
/help - Show this help message\n\n\
Anything else you send is forwarded to the owner.";

const OWNER_HELP: &str = "📋 Commands:\n\
/send <user_id> <message> - Send a message to one user\n\
/send - Send step by step\n\
/send_all <message> - Send a message to every known user\n\
/history [user_id] - Show recently relayed messages\n\
/settarget <user_id> - Forward incoming messages to this user\n\
/cleartarget - Clear the forwarding target\n\
/addtarget <user_id> - Add a forwarding target\n\
/removetarget <user_id> - Remove a forwarding target\n\
/targets - Show routing mode and targets\n\
/cancel - Cancel a pending /send\n\
/help - Show this help message";

impl RelayEngine {
    pub async fn handle_command(&self, cmd: Command) -> Outcome {
        let Command {
            chat_id,
            sender,
            name,
            args,
            timestamp: now,
        } = cmd;

        match name.as_str() {
            "start" => return self.start(chat_id, &sender).await,
            "help" => {
                let text = if self.is_owner(sender.id).await {
                    OWNER_HELP
                } else {
                    PUBLIC_HELP
                };
                self.reply(chat_id, text).await;
                return Outcome::CommandHandled;
            }
            _ => {}
        }

        if !is_known(&name) {
            self.reply(chat_id, &format!("Unknown command: /{name}")).await;
            return Outcome::CommandHandled;
        }

        if !self.is_owner(sender.id).await {
            warn!(sender = %sender.id, command = %name, "unauthorized command");
            self.reply(chat_id, NOT_AUTHORIZED).await;
            return Outcome::RejectedUnauthorized;
        }

        let result = match name.as_str() {
            "send" => match split_first_word(&args) {
                ("", _) => self.begin_send(chat_id, sender.id, now).await,
                ("all", rest) => self.send_all(chat_id, rest).await,
                _ => self.send_direct_command(chat_id, &args).await,
            },
            "send_all" | "sendall" | "all" => self.send_all(chat_id, &args).await,
            "history" => self.history(chat_id, &args, now).await,
            "settarget" | "set_target" => self.set_target(chat_id, sender.id, &args).await,
            "cleartarget" | "clear_target" => self.clear_target(chat_id, sender.id).await,
            "addtarget" | "add_target" => self.add_target(chat_id, sender.id, &args).await,
            "removetarget" | "remove_target" => {
                self.remove_target(chat_id, sender.id, &args).await
            }
            "targets" => self.show_targets(chat_id).await,
            "cancel" => self.cancel(chat_id, sender.id).await,
            _ => Ok(Outcome::CommandHandled),
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.reply(chat_id, &error_reply(&e)).await;
                match e {
                    Error::Unauthorized(_) => Outcome::RejectedUnauthorized,
                    _ => Outcome::CommandHandled,
                }
            }
        }
    }

    async fn start(&self, chat_id: ChatId, sender: &SenderIdentity) -> Outcome {
        self.register(sender).await;
        let mut text =
            "Hello! You're now registered to receive messages from the owner.".to_string();
        if self.is_owner(sender.id).await {
            text.push_str("\n\n");
            text.push_str(OWNER_HELP);
        }
        self.reply(chat_id, &text).await;
        Outcome::CommandHandled
    }

    async fn begin_send(
        &self,
        chat_id: ChatId,
        owner: UserId,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        self.conversations
            .lock()
            .await
            .begin(owner, PendingInput::AwaitingTargetId, now);
        self.reply(chat_id, "Enter the target user ID:").await;
        Ok(Outcome::CommandHandled)
    }

    /// Feed owner text into a pending `/send` conversation, if there is one.
    pub(crate) async fn continue_conversation(
        &self,
        chat_id: ChatId,
        owner: &SenderIdentity,
        text: &str,
        now: DateTime<Utc>,
    ) -> Option<Outcome> {
        enum Step {
            AskBody,
            BadTarget,
            Send(UserId),
        }

        // Read and advance the state under one lock so each input is consumed once.
        let step = {
            let mut conversations = self.conversations.lock().await;
            match conversations.current(owner.id, now)? {
                PendingInput::AwaitingTargetId => match parse_user_id(text) {
                    Some(target) => {
                        conversations.begin(
                            owner.id,
                            PendingInput::AwaitingMessageBody { target },
                            now,
                        );
                        Step::AskBody
                    }
                    None => Step::BadTarget,
                },
                PendingInput::AwaitingMessageBody { target } => {
                    conversations.cancel(owner.id);
                    Step::Send(target)
                }
            }
        };

        match step {
            Step::AskBody => {
                self.reply(chat_id, "Enter the message:").await;
            }
            Step::BadTarget => {
                self.reply(
                    chat_id,
                    "Invalid user ID. Send a numeric ID, or /cancel to stop.",
                )
                .await;
            }
            Step::Send(target) => {
                self.send_direct(chat_id, target, text.trim()).await;
            }
        }
        Some(Outcome::ConversationInput)
    }

    async fn send_direct_command(&self, chat_id: ChatId, args: &str) -> Result<Outcome> {
        let (target, message) = parse_send_args(args)?;
        Ok(self.send_direct(chat_id, target, message).await)
    }

    async fn send_direct(&self, chat_id: ChatId, target: UserId, message: &str) -> Outcome {
        if message.is_empty() {
            self.reply(chat_id, "Please provide a message.").await;
            return Outcome::CommandHandled;
        }

        match self
            .deliver_one(target, &Payload::Text(message.to_string()))
            .await
        {
            Ok(_) => {
                info!(user = %target, "owner sent direct message");
                self.reply(chat_id, &format!("✅ Message sent to {target}."))
                    .await;
                Outcome::Delivered {
                    delivered: 1,
                    failed: 0,
                }
            }
            Err(e) => {
                warn!(user = %target, "direct send failed: {e}");
                self.reply(
                    chat_id,
                    &format!("❌ Failed to send message to {target}: {e}"),
                )
                .await;
                Outcome::DeliveryFailed { failed: 1 }
            }
        }
    }

    async fn send_all(&self, chat_id: ChatId, message: &str) -> Result<Outcome> {
        let message = message.trim();
        if message.is_empty() {
            return Err(Error::Validation(
                "Please provide a message to send to all users.".to_string(),
            ));
        }

        let known = self.book.entries().await.into_iter().map(|s| s.id);
        let targets = self.router.lock().await.broadcast_targets(known);
        if targets.is_empty() {
            self.reply(chat_id, "No registered users to send to.").await;
            return Ok(Outcome::CommandHandled);
        }

        let reports = self
            .fan_out(&targets, &Payload::Text(message.to_string()))
            .await;
        let failed = reports.iter().filter(|r| r.result.is_err()).count();
        info!(
            recipients = targets.len(),
            failed, "broadcast finished"
        );

        self.reply(
            chat_id,
            &format!("Message sent to {} users.", targets.len()),
        )
        .await;
        Ok(Outcome::Delivered {
            delivered: reports.len() - failed,
            failed,
        })
    }

    async fn history(&self, chat_id: ChatId, args: &str, now: DateTime<Utc>) -> Result<Outcome> {
        let filter = match args.trim() {
            "" => None,
            raw => Some(parse_user_id(raw).ok_or_else(|| {
                Error::Validation("Invalid user ID. Usage: /history [user_id]".to_string())
            })?),
        };

        let records = self.history.lock().await.query(filter, now);
        if records.is_empty() {
            let text = match filter {
                Some(id) => format!("No history found for {id}."),
                None => "No history found.".to_string(),
            };
            self.reply(chat_id, &text).await;
            return Ok(Outcome::CommandHandled);
        }

        let noun = if records.len() == 1 { "message" } else { "messages" };
        let header = format!("📜 History ({} {noun}):", records.len());
        let lines: Vec<String> = std::iter::once(header)
            .chain(records.iter().map(|r| r.render()))
            .collect();
        let limit = self.messenger.capabilities().max_message_len;
        for chunk in split_chunks(lines.iter().map(String::as_str), limit) {
            self.reply(chat_id, &chunk).await;
        }
        Ok(Outcome::CommandHandled)
    }

    async fn set_target(&self, chat_id: ChatId, actor: UserId, args: &str) -> Result<Outcome> {
        let target = require_user_id(args, "/settarget <user_id>")?;
        self.router.lock().await.set_target(actor, target)?;
        info!(user = %target, "forwarding target set");
        self.reply(chat_id, &format!("✅ Forwarding target set to {target}."))
            .await;
        Ok(Outcome::CommandHandled)
    }

    async fn clear_target(&self, chat_id: ChatId, actor: UserId) -> Result<Outcome> {
        self.router.lock().await.clear_target(actor)?;
        info!("forwarding target cleared");
        self.reply(chat_id, "✅ Forwarding target cleared.").await;
        Ok(Outcome::CommandHandled)
    }

    async fn add_target(&self, chat_id: ChatId, actor: UserId, args: &str) -> Result<Outcome> {
        let target = require_user_id(args, "/addtarget <user_id>")?;
        let added = self.router.lock().await.add_target(actor, target)?;
        let text = if added {
            format!("✅ Added {target} to targets.")
        } else {
            format!("{target} is already a target.")
        };
        self.reply(chat_id, &text).await;
        Ok(Outcome::CommandHandled)
    }

    async fn remove_target(&self, chat_id: ChatId, actor: UserId, args: &str) -> Result<Outcome> {
        let target = require_user_id(args, "/removetarget <user_id>")?;
        let removed = self.router.lock().await.remove_target(actor, target)?;
        let text = if removed {
            format!("✅ Removed {target} from targets.")
        } else {
            format!("{target} is not a target.")
        };
        self.reply(chat_id, &text).await;
        Ok(Outcome::CommandHandled)
    }

    async fn show_targets(&self, chat_id: ChatId) -> Result<Outcome> {
        let (mode, targets) = {
            let router = self.router.lock().await;
            (router.mode(), router.current_targets())
        };
        let list = if targets.is_empty() {
            "(none)".to_string()
        } else {
            targets
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        self.reply(
            chat_id,
            &format!("Routing mode: {}\nTargets: {list}", mode.as_str()),
        )
        .await;
        Ok(Outcome::CommandHandled)
    }

    async fn cancel(&self, chat_id: ChatId, owner: UserId) -> Result<Outcome> {
        let text = if self.conversations.lock().await.cancel(owner) {
            "Cancelled."
        } else {
            "Nothing to cancel."
        };
        self.reply(chat_id, text).await;
        Ok(Outcome::CommandHandled)
    }
}

fn is_known(name: &str) -> bool {
    matches!(
        name,
        "send"
            | "send_all"
            | "sendall"
            | "all"
            | "history"
            | "settarget"
            | "set_target"
            | "cleartarget"
            | "clear_target"
            | "addtarget"
            | "add_target"
            | "removetarget"
            | "remove_target"
            | "targets"
            | "cancel"
    )
}

fn split_first_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (s, ""),
    }
}

fn parse_user_id(raw: &str) -> Option<UserId> {
    raw.trim().parse::<i64>().ok().map(UserId)
}

fn require_user_id(args: &str, usage: &str) -> Result<UserId> {
    parse_user_id(split_first_word(args).0)
        .ok_or_else(|| Error::Validation(format!("Invalid user ID. Usage: {usage}")))
}

/// `<user_id> <message>`; both parts required.
fn parse_send_args(args: &str) -> Result<(UserId, &str)> {
    let (id, message) = split_first_word(args);
    let target = parse_user_id(id)
        .ok_or_else(|| Error::Validation(format!("Invalid user ID. {SEND_USAGE}")))?;
    if message.is_empty() {
        return Err(Error::Validation(format!(
            "Please provide a message. {SEND_USAGE}"
        )));
    }
    Ok((target, message))
}

fn error_reply(e: &Error) -> String {
    match e {
        Error::Validation(msg) => msg.clone(),
        Error::Unauthorized(_) => NOT_AUTHORIZED.to_string(),
        other => format!("❌ {other}"),
    }
}
