//! Telegram front end for vaul3t gated lookups.
//!
//! Inbound updates become [`InboundEvent`]s, the [`GatedDispatcher`] admits
//! gated commands and drives each identity's conversation, and replies go out
//! through a [`MessagingChannel`].

pub mod admission;
pub mod bootstrap_helpers;
pub mod channel;
pub mod cli_args;
pub mod commands;
pub mod conversation;
pub mod dispatcher;
pub mod events;
pub mod startup;
pub mod telegram;
pub mod telegram_runtime;

pub use admission::{
    Admission, AdmissionGate, AdmissionGates, AdmissionGrant, AdmissionPolicies, AdmissionPolicy,
    AdmissionRejection, CredentialGate, LinkedAccountGate,
};
pub use bootstrap_helpers::{bootstrap_state_dir, init_tracing};
pub use channel::{
    ButtonAction, ChannelError, InlineButton, MessageRef, MessagingChannel, OutboundMessage,
    ReplyFormat,
};
pub use cli_args::{Cli, CliAdmissionPolicy};
pub use commands::{parse_bot_command, BotCommand, CommandKind, SET_TOKEN_CALLBACK};
pub use conversation::{
    transition, ConversationBook, ConversationEvent, ConversationState, PendingArgument,
    TransitionError,
};
pub use dispatcher::{DispatchOutcome, DispatcherConfig, GatedDispatcher};
pub use events::{parse_telegram_update, EventPayload, InboundEvent};
pub use startup::{build_dispatcher, run_bot};
pub use telegram::{TelegramApiClient, TelegramClientConfig};
pub use telegram_runtime::{PollCycleReport, TelegramRuntime, TelegramRuntimeConfig};
