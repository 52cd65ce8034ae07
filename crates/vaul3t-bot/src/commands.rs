//! Bot command names, gated command kinds, and the help text.

use vaul3t_lookup::OsintOperation;

/// Callback payload of the inline button that restarts credential capture.
pub const SET_TOKEN_CALLBACK: &str = "set_token";

/// Commands that pass admission and then collect one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    InstagramLookup,
    InstagramReport,
}

impl CommandKind {
    pub fn operation(self) -> OsintOperation {
        match self {
            Self::InstagramLookup => OsintOperation::InstagramLookup,
            Self::InstagramReport => OsintOperation::InstagramReport,
        }
    }

    pub fn command_name(self) -> &'static str {
        match self {
            Self::InstagramLookup => "instagram",
            Self::InstagramReport => "report",
        }
    }

    pub fn argument_prompt(self) -> &'static str {
        match self {
            Self::InstagramLookup => "Please enter the Instagram username to search for:",
            Self::InstagramReport => "Please enter the Instagram user ID to report:",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Cancel,
    Help,
    Connect,
    Gated(CommandKind),
    Unknown(String),
}

pub fn parse_bot_command(name: &str) -> BotCommand {
    match name {
        "start" => BotCommand::Start,
        "cancel" => BotCommand::Cancel,
        "help" => BotCommand::Help,
        "connect" => BotCommand::Connect,
        "instagram" => BotCommand::Gated(CommandKind::InstagramLookup),
        "report" => BotCommand::Gated(CommandKind::InstagramReport),
        other => BotCommand::Unknown(other.to_string()),
    }
}

pub fn bot_command_usage() -> String {
    [
        "Supported commands:",
        "/start - set your VAUL3T API token",
        "/instagram - look up an Instagram username",
        "/report - report an Instagram user ID (linked account)",
        "/connect - link your VAUL3T account",
        "/cancel - cancel the current request",
        "/help - show this message",
    ]
    .join("\n")
}
