//! CLI host — stdin/stdout stand-in for a chat platform.
//!
//! Each line is one event:
//!
//! ```text
//! <group> <sender> [text...]   human message in a group
//! /dm <sender> [text...]       private message
//! /stats <group>               show the bot's standing in a group
//! /reset                       clear every tally
//! /quit                        exit
//! ```
//!
//! When the guard lets a message through, the host "replies" and then fires
//! the after-send hook, as a real platform would.

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt, stream};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::guard::{Decision, DragonLordGuard, GroupMessage, IgnoreReason};

/// Stream of parsed CLI commands.
pub type CommandStream = Pin<Box<dyn Stream<Item = CliCommand> + Send>>;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Group {
        group_id: String,
        sender_id: String,
        text: String,
    },
    Private {
        sender_id: String,
        text: String,
    },
    Stats {
        group_id: String,
    },
    Reset,
    Quit,
    Invalid(String),
}

impl CliCommand {
    /// Parse a line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let mut parts = line.splitn(3, char::is_whitespace);
        let first = parts.next().unwrap_or_default();
        let second = parts.next().map(str::trim).filter(|s| !s.is_empty());
        let rest = parts.next().unwrap_or_default().trim().to_string();

        let cmd = match (first, second) {
            ("/quit", _) | ("/exit", _) => Self::Quit,
            ("/reset", _) => Self::Reset,
            ("/stats", Some(group)) => Self::Stats {
                group_id: group.to_string(),
            },
            ("/dm", Some(sender)) => Self::Private {
                sender_id: sender.to_string(),
                text: rest,
            },
            (cmd, _) if cmd.starts_with('/') => Self::Invalid(format!("unknown command: {line}")),
            (group, Some(sender)) => Self::Group {
                group_id: group.to_string(),
                sender_id: sender.to_string(),
                text: rest,
            },
            (_, None) => Self::Invalid(format!("expected '<group> <sender> [text]': {line}")),
        };
        Some(cmd)
    }
}

/// Reads stdin and drives a [`DragonLordGuard`].
pub struct CliHost {
    guard: Arc<DragonLordGuard>,
    self_id: String,
}

impl CliHost {
    pub fn new(guard: Arc<DragonLordGuard>, self_id: impl Into<String>) -> Self {
        Self {
            guard,
            self_id: self_id.into(),
        }
    }

    /// Start reading commands from stdin.
    pub fn start(&self) -> CommandStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Some(cmd) = CliCommand::parse(&line) else {
                            continue;
                        };
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|cmd| (cmd, rx))
        });

        Box::pin(stream)
    }

    /// Consume commands until `/quit` or end of input.
    pub async fn run(&self, mut commands: CommandStream) {
        eprint!("> ");
        while let Some(cmd) = commands.next().await {
            if cmd == CliCommand::Quit {
                break;
            }
            for line in self.handle(cmd).await {
                println!("{line}");
            }
            eprint!("> ");
        }
    }

    /// Apply one command and return the lines to print.
    pub async fn handle(&self, cmd: CliCommand) -> Vec<String> {
        match cmd {
            CliCommand::Group {
                group_id,
                sender_id,
                text,
            } => {
                let mut event = GroupMessage::new(&group_id, &sender_id, &self.self_id, &text);
                self.deliver(&mut event).await
            }
            CliCommand::Private { sender_id, text } => {
                let mut event = GroupMessage::private(&sender_id, &self.self_id, &text);
                self.deliver(&mut event).await
            }
            CliCommand::Stats { group_id } => {
                let s = self.guard.standing(&group_id, &self.self_id).await;
                vec![format!(
                    "{group_id}: bot {} / max {} (effective {})",
                    s.bot_count, s.max_count, s.effective_max
                )]
            }
            CliCommand::Reset => {
                if self.guard.store().reset_all().await {
                    vec!["all tallies cleared".to_string()]
                } else {
                    vec!["reset failed, see log".to_string()]
                }
            }
            CliCommand::Quit => Vec::new(),
            CliCommand::Invalid(msg) => vec![msg],
        }
    }

    async fn deliver(&self, event: &mut GroupMessage) -> Vec<String> {
        match self.guard.on_group_message(event).await {
            Decision::Suppress(s) => vec![format!(
                "({} stays quiet: {} >= {})",
                self.self_id, s.bot_count, s.effective_max
            )],
            Decision::Ignored(IgnoreReason::NotGroupMessage) => {
                vec![format!("[{}] (private) {}", self.self_id, echo(&event.content))]
            }
            Decision::Allow(_) | Decision::Ignored(IgnoreReason::GroupNotAllowed) => {
                let reply = format!("[{}] {}", self.self_id, echo(&event.content));
                let sent =
                    GroupMessage::sent_by_self(&event.group_id, &self.self_id, &event.content);
                self.guard.on_message_sent(&sent).await;
                vec![reply]
            }
        }
    }
}

fn echo(text: &str) -> String {
    if text.is_empty() {
        "...".to_string()
    } else {
        format!("re: {text}")
    }
}
