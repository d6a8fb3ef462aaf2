//! Thin command router over Telegram long polling.
//!
//! Parses slash commands and hands control to the service. Authorization
//! (sudo membership) is resolved here, before the engine is reached; the
//! engine itself never checks permissions. First contact from a group chat
//! registers it.

use quizcast_core::error::QuizcastError;
use quizcast_core::QuizTransport;
use quizcast_engine::QuizService;
use quizcast_telegram::{TelegramMessage, TelegramTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub async fn run(
    service: Arc<QuizService>,
    transport: Arc<TelegramTransport>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("📡 command router started");
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            updates = transport.get_updates() => match updates {
                Ok(batch) => {
                    for update in batch {
                        if let Some(msg) = update.message {
                            handle_message(&service, &transport, msg).await;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("polling failed: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            },
        }
    }
    tracing::info!("📡 command router stopped");
}

async fn handle_message(
    service: &QuizService,
    transport: &TelegramTransport,
    msg: TelegramMessage,
) {
    let Some(from) = msg.from.clone() else { return };
    if from.is_bot {
        return;
    }

    // Any message from a group chat keeps it registered.
    if msg.chat.is_group()
        && let Err(e) = service
            .register_group(msg.chat.id, msg.chat.title.as_deref())
            .await
    {
        tracing::warn!("failed to register chat {}: {e}", msg.chat.id);
    }

    let Some(text) = msg.text.clone() else { return };
    let Some(command) = text.strip_prefix('/') else {
        return;
    };
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or("");
    // Commands in groups arrive as /cmd@BotName.
    let name = name.split('@').next().unwrap_or(name);
    let args: Vec<&str> = parts.collect();

    let is_sudo = service.sudo().is_sudo(from.id).await.unwrap_or(false);
    if let Some(reply) = dispatch(service, name, &args, &msg, from.id, is_sudo).await {
        use quizcast_core::types::SendResult;
        if let SendResult::Transient(e) | SendResult::Permanent(e) =
            transport.send_text(msg.chat.id, &reply).await
        {
            tracing::warn!("failed to reply in chat {}: {e}", msg.chat.id);
        }
    }
}

async fn dispatch(
    service: &QuizService,
    name: &str,
    args: &[&str],
    msg: &TelegramMessage,
    user_id: i64,
    is_sudo: bool,
) -> Option<String> {
    match name {
        "start" | "help" => Some(
            "Quizcast delivers quiz polls on a schedule.\n\
             /rquiz — send a quiz here now\n\
             /stats — engagement numbers\n\
             /setdelay <2h|30m|default> — quiz interval for this group\n\
             /reset — forget which quizzes this group has seen\n\
             /broadcast <text> — message all active groups\n\
             /addsudo <id>, /delsudo <id> — manage admins"
                .to_string(),
        ),
        "rquiz" => {
            if !msg.chat.is_group() {
                return Some("This command only works in group chats.".into());
            }
            if !is_sudo {
                return Some("Only sudo users can trigger a quiz.".into());
            }
            match service.trigger_manual_send(msg.chat.id).await {
                // The quiz poll itself is the reply.
                Ok(_) => None,
                Err(QuizcastError::Exhausted) => {
                    Some("No quizzes available yet — add some first.".into())
                }
                // A send is already on its way; the poll will show up.
                Err(QuizcastError::SendInFlight(_)) => None,
                Err(e) => {
                    tracing::warn!("manual send to chat {} failed: {e}", msg.chat.id);
                    Some("Could not send a quiz right now, try again later.".into())
                }
            }
        }
        "stats" => {
            if !is_sudo {
                return None;
            }
            let scope = msg.chat.is_group().then_some(msg.chat.id);
            match service.stats(scope).await {
                Ok(report) => Some(format!(
                    "📊 Quizzes: {} ({} active)\n\
                     Groups: {} ({} active)\n\
                     Sends: {} ({} delivered, {} failed)\n\
                     Triggers: {} auto / {} manual",
                    report.quizzes_total,
                    report.quizzes_active,
                    report.groups_total,
                    report.groups_active,
                    report.sends_total,
                    report.delivered,
                    report.failed,
                    report.auto_sends,
                    report.manual_sends,
                )),
                Err(e) => {
                    tracing::warn!("stats failed: {e}");
                    None
                }
            }
        }
        "setdelay" => {
            if !msg.chat.is_group() {
                return Some("This command only works in group chats.".into());
            }
            if !is_sudo {
                return None;
            }
            match args.first().copied() {
                Some("default") => match service.registry().set_interval(msg.chat.id, None).await {
                    Ok(()) => Some("Quiz interval reset to the default.".into()),
                    Err(e) => {
                        tracing::warn!("setdelay failed: {e}");
                        None
                    }
                },
                Some(input) => match parse_duration(input) {
                    Some(secs) => {
                        match service.registry().set_interval(msg.chat.id, Some(secs)).await {
                            Ok(()) => Some(format!(
                                "Quiz interval for this group set to {}.",
                                humanize(secs)
                            )),
                            Err(e) => {
                                tracing::warn!("setdelay failed: {e}");
                                None
                            }
                        }
                    }
                    None => Some("Could not parse that. Try 2h, 30m, or 1.5h.".into()),
                },
                None => Some("Usage: /setdelay <2h|30m|default>".into()),
            }
        }
        "reset" => {
            if !msg.chat.is_group() || !is_sudo {
                return None;
            }
            match service.bank().reset_history(msg.chat.id).await {
                Ok(()) => Some("Quiz history cleared — all quizzes are fresh again.".into()),
                Err(e) => {
                    tracing::warn!("reset failed: {e}");
                    None
                }
            }
        }
        "broadcast" => {
            if !is_sudo {
                return None;
            }
            let text = args.join(" ");
            if text.is_empty() {
                return Some("Usage: /broadcast <message>".into());
            }
            match service.broadcast(&text).await {
                Ok(report) => Some(format!(
                    "Broadcast sent to {} group(s), {} failed.",
                    report.sent, report.failed
                )),
                Err(e) => {
                    tracing::warn!("broadcast failed: {e}");
                    None
                }
            }
        }
        "addsudo" => {
            if !is_sudo {
                return None;
            }
            match args.first().and_then(|a| a.parse::<i64>().ok()) {
                Some(id) => match service.sudo().grant(id, user_id).await {
                    Ok(_) => Some(format!("User {id} is now sudo.")),
                    Err(e) => {
                        tracing::warn!("addsudo failed: {e}");
                        None
                    }
                },
                None => Some("Usage: /addsudo <user id>".into()),
            }
        }
        "delsudo" => {
            if !is_sudo {
                return None;
            }
            match args.first().and_then(|a| a.parse::<i64>().ok()) {
                Some(id) => match service.sudo().revoke(id).await {
                    Ok(true) => Some(format!("User {id} is no longer sudo.")),
                    Ok(false) => Some(format!("User {id} was not sudo.")),
                    Err(e) => {
                        tracing::warn!("delsudo failed: {e}");
                        None
                    }
                },
                None => Some("Usage: /delsudo <user id>".into()),
            }
        }
        _ => None,
    }
}

/// Parse interval inputs like `2h`, `30m`, `1.5h`, `90m`. Bare numbers are
/// hours. Rejects anything under a second.
pub fn parse_duration(input: &str) -> Option<u64> {
    let s = input.trim().to_ascii_lowercase();
    let split = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let value: f64 = number.parse().ok()?;
    let secs = match unit.trim() {
        "" | "h" | "hr" | "hour" | "hours" => value * 3600.0,
        "m" | "min" | "minute" | "minutes" => value * 60.0,
        _ => return None,
    };
    (secs >= 1.0 && secs.is_finite()).then_some(secs as u64)
}

fn humanize(secs: u64) -> String {
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_formats() {
        assert_eq!(parse_duration("2h"), Some(7200));
        assert_eq!(parse_duration("30m"), Some(1800));
        assert_eq!(parse_duration("1.5h"), Some(5400));
        assert_eq!(parse_duration("90m"), Some(5400));
        assert_eq!(parse_duration("90 min"), Some(5400));
        // Bare numbers default to hours.
        assert_eq!(parse_duration("2"), Some(7200));
        assert_eq!(parse_duration("  1H "), Some(3600));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("2d"), None);
        assert_eq!(parse_duration("0m"), None);
        assert_eq!(parse_duration("-5m"), None);
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize(7200), "2h");
        assert_eq!(humanize(1800), "30m");
        assert_eq!(humanize(90), "90s");
    }
}
