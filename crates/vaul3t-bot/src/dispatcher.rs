//! Gated command dispatcher.
//!
//! Entry point for every inbound event. Commands are admitted through the
//! [`AdmissionGates`], flows advance through the [`ConversationBook`], and the
//! remote call runs only once an argument arrives. Every failure is turned
//! into a reply here; `handle` itself never fails.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};
use vaul3t_access::{ConnectionRegistry, CredentialStore, Identity, LinkOutcome};
use vaul3t_core::seconds_until;
use vaul3t_lookup::{render_report, OsintApi, RenderedReport};

use crate::admission::{Admission, AdmissionGates, AdmissionGrant, AdmissionRejection};
use crate::channel::{ChannelError, InlineButton, MessagingChannel, OutboundMessage};
use crate::commands::{
    bot_command_usage, parse_bot_command, BotCommand, CommandKind, SET_TOKEN_CALLBACK,
};
use crate::conversation::{ConversationBook, ConversationEvent, ConversationState, PendingArgument};
use crate::events::{EventPayload, InboundEvent};

pub const START_PROMPT: &str =
    "Hello, Please enter a valid VAUL3T API token , this will be used to make your request .";
pub const DASHBOARD_BUTTON_LABEL: &str = "I dont own one";
pub const TOKEN_ACCEPTED_REPLY: &str = "API Token Set, Use commands to search for user";
pub const TOKEN_INVALID_REPLY: &str =
    "Token invalid. Please enter a valid token or visit the dashboard (button).";
pub const PLEASE_WAIT_REPLY: &str = "Please wait....";
pub const GENERIC_FAILURE_REPLY: &str = "Error, contact Admin";
pub const CANCELED_REPLY: &str = "Canceled.";
pub const NOTHING_TO_CANCEL_REPLY: &str = "Nothing to cancel.";
pub const NOT_LINKED_REPLY: &str =
    "This command needs a linked VAUL3T account. Use /connect to link one.";
pub const ALREADY_CONNECTED_REPLY: &str = "Your VAUL3T account is already connected.";
pub const UNKNOWN_COMMAND_REPLY: &str = "Unknown command. Use /help to see what I can do.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Ignored,
    CredentialPrompted,
    CredentialAccepted,
    CredentialRejected,
    ArgumentPrompted(CommandKind),
    AdmissionRejected(AdmissionRejection),
    ReportDelivered(CommandKind),
    RemoteFailed(CommandKind),
    Cancelled,
    NothingToCancel,
    LinkIssued,
    AlreadyConnected,
    HelpShown,
    UnknownCommand,
    /// Storage or delivery failed; the user got the generic failure reply.
    Failed,
}

impl DispatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::CredentialPrompted => "credential_prompted",
            Self::CredentialAccepted => "credential_accepted",
            Self::CredentialRejected => "credential_rejected",
            Self::ArgumentPrompted(_) => "argument_prompted",
            Self::AdmissionRejected(AdmissionRejection::QuotaExceeded { .. }) => "quota_exceeded",
            Self::AdmissionRejected(AdmissionRejection::NotLinked) => "not_linked",
            Self::ReportDelivered(_) => "report_delivered",
            Self::RemoteFailed(_) => "remote_failed",
            Self::Cancelled => "cancelled",
            Self::NothingToCancel => "nothing_to_cancel",
            Self::LinkIssued => "link_issued",
            Self::AlreadyConnected => "already_connected",
            Self::HelpShown => "help_shown",
            Self::UnknownCommand => "unknown_command",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub dashboard_url: String,
}

pub struct GatedDispatcher {
    credentials: Arc<CredentialStore>,
    connections: Arc<ConnectionRegistry>,
    gates: AdmissionGates,
    conversations: ConversationBook,
    api: Arc<dyn OsintApi>,
    dashboard_url: String,
}

impl GatedDispatcher {
    pub fn new(
        config: DispatcherConfig,
        credentials: Arc<CredentialStore>,
        connections: Arc<ConnectionRegistry>,
        gates: AdmissionGates,
        api: Arc<dyn OsintApi>,
    ) -> Self {
        Self {
            credentials,
            connections,
            gates,
            conversations: ConversationBook::new(),
            api,
            dashboard_url: config.dashboard_url.trim().to_string(),
        }
    }

    pub fn conversation_state(&self, identity: &Identity) -> ConversationState {
        self.conversations.state(identity)
    }

    pub async fn handle(
        &self,
        channel: &dyn MessagingChannel,
        event: InboundEvent,
        now_unix: u64,
    ) -> DispatchOutcome {
        let kind_label = event.kind_label();
        let identity = event.identity.clone();
        let chat_id = event.chat_id;
        let result = match event.payload {
            EventPayload::Command { name, args } => {
                self.handle_command(channel, &identity, chat_id, &name, &args, now_unix)
                    .await
            }
            EventPayload::Text(text) => self.handle_text(channel, &identity, chat_id, &text).await,
            EventPayload::Button { callback_id, data } => {
                if let Err(error) = channel.acknowledge_button(&callback_id).await {
                    debug!(identity = %identity, error = %error, "button acknowledgement failed");
                }
                self.handle_button(channel, &identity, chat_id, &data).await
            }
        };

        match result {
            Ok(outcome) => {
                info!(
                    identity = %identity,
                    event = kind_label,
                    outcome = outcome.label(),
                    "dispatched inbound event"
                );
                outcome
            }
            Err(error) => {
                warn!(
                    identity = %identity,
                    event = kind_label,
                    error = %error,
                    "inbound event handling failed"
                );
                if let Err(error) = channel
                    .send(chat_id, &OutboundMessage::plain(GENERIC_FAILURE_REPLY))
                    .await
                {
                    warn!(identity = %identity, error = %error, "failed to deliver failure reply");
                }
                DispatchOutcome::Failed
            }
        }
    }

    async fn handle_command(
        &self,
        channel: &dyn MessagingChannel,
        identity: &Identity,
        chat_id: i64,
        name: &str,
        args: &str,
        now_unix: u64,
    ) -> Result<DispatchOutcome> {
        match parse_bot_command(name) {
            BotCommand::Start => self.begin_credential_capture(channel, identity, chat_id).await,
            BotCommand::Cancel => self.cancel(channel, identity, chat_id).await,
            BotCommand::Help => {
                let message = OutboundMessage::plain(bot_command_usage())
                    .with_button(InlineButton::callback("Set API token", SET_TOKEN_CALLBACK))
                    .with_button(InlineButton::url("Dashboard", &self.dashboard_url));
                channel.send(chat_id, &message).await?;
                Ok(DispatchOutcome::HelpShown)
            }
            BotCommand::Connect => self.begin_link(channel, identity, chat_id, now_unix).await,
            BotCommand::Gated(kind) => {
                self.admit_gated(channel, identity, chat_id, kind, args, now_unix)
                    .await
            }
            BotCommand::Unknown(name) => {
                debug!(identity = %identity, command = name.as_str(), "unknown command");
                channel
                    .send(chat_id, &OutboundMessage::plain(UNKNOWN_COMMAND_REPLY))
                    .await?;
                Ok(DispatchOutcome::UnknownCommand)
            }
        }
    }

    async fn handle_button(
        &self,
        channel: &dyn MessagingChannel,
        identity: &Identity,
        chat_id: i64,
        data: &str,
    ) -> Result<DispatchOutcome> {
        if data == SET_TOKEN_CALLBACK {
            return self.begin_credential_capture(channel, identity, chat_id).await;
        }
        debug!(identity = %identity, data, "ignoring unknown button payload");
        Ok(DispatchOutcome::Ignored)
    }

    async fn handle_text(
        &self,
        channel: &dyn MessagingChannel,
        identity: &Identity,
        chat_id: i64,
        text: &str,
    ) -> Result<DispatchOutcome> {
        match self.conversations.state(identity) {
            ConversationState::Idle => Ok(DispatchOutcome::Ignored),
            ConversationState::AwaitingCredential => {
                self.receive_credential(channel, identity, chat_id, text.trim())
                    .await
            }
            ConversationState::AwaitingArgument(kind) if text.trim().is_empty() => {
                channel
                    .send(chat_id, &OutboundMessage::plain(kind.argument_prompt()))
                    .await?;
                Ok(DispatchOutcome::ArgumentPrompted(kind))
            }
            ConversationState::AwaitingArgument(_) => {
                let pending = self.conversations.take_argument(identity)?;
                self.run_remote_call(channel, identity, chat_id, pending, text.trim())
                    .await
            }
        }
    }

    async fn begin_credential_capture(
        &self,
        channel: &dyn MessagingChannel,
        identity: &Identity,
        chat_id: i64,
    ) -> Result<DispatchOutcome> {
        self.conversations
            .apply(identity, ConversationEvent::CredentialRequested)?;
        channel
            .send(chat_id, &self.with_dashboard_button(START_PROMPT))
            .await?;
        Ok(DispatchOutcome::CredentialPrompted)
    }

    async fn receive_credential(
        &self,
        channel: &dyn MessagingChannel,
        identity: &Identity,
        chat_id: i64,
        token: &str,
    ) -> Result<DispatchOutcome> {
        if !self.credentials.validate(token) {
            self.conversations
                .apply(identity, ConversationEvent::CredentialRejected)?;
            channel
                .send(chat_id, &self.with_dashboard_button(TOKEN_INVALID_REPLY))
                .await?;
            return Ok(DispatchOutcome::CredentialRejected);
        }

        self.credentials.store(identity, token)?;
        self.conversations
            .apply(identity, ConversationEvent::CredentialAccepted)?;
        channel
            .send(chat_id, &OutboundMessage::plain(TOKEN_ACCEPTED_REPLY))
            .await?;
        Ok(DispatchOutcome::CredentialAccepted)
    }

    async fn cancel(
        &self,
        channel: &dyn MessagingChannel,
        identity: &Identity,
        chat_id: i64,
    ) -> Result<DispatchOutcome> {
        if self.conversations.state(identity).is_idle() {
            channel
                .send(chat_id, &OutboundMessage::plain(NOTHING_TO_CANCEL_REPLY))
                .await?;
            return Ok(DispatchOutcome::NothingToCancel);
        }
        self.conversations
            .apply(identity, ConversationEvent::Cancel)?;
        channel
            .send(chat_id, &OutboundMessage::plain(CANCELED_REPLY))
            .await?;
        Ok(DispatchOutcome::Cancelled)
    }

    async fn begin_link(
        &self,
        channel: &dyn MessagingChannel,
        identity: &Identity,
        chat_id: i64,
        now_unix: u64,
    ) -> Result<DispatchOutcome> {
        match self.connections.begin_link(identity, now_unix)? {
            LinkOutcome::AlreadyConnected { .. } => {
                channel
                    .send(chat_id, &OutboundMessage::plain(ALREADY_CONNECTED_REPLY))
                    .await?;
                Ok(DispatchOutcome::AlreadyConnected)
            }
            LinkOutcome::Pending { handshake_url, .. } => {
                let message = OutboundMessage::plain(
                    "Open the link below to connect your VAUL3T account, then run your command again.",
                )
                .with_button(InlineButton::url("Connect account", handshake_url));
                channel.send(chat_id, &message).await?;
                Ok(DispatchOutcome::LinkIssued)
            }
        }
    }

    async fn admit_gated(
        &self,
        channel: &dyn MessagingChannel,
        identity: &Identity,
        chat_id: i64,
        kind: CommandKind,
        inline_argument: &str,
        now_unix: u64,
    ) -> Result<DispatchOutcome> {
        let replaced = self.conversations.reset(identity);
        if !replaced.is_idle() {
            debug!(
                identity = %identity,
                replaced = replaced.label(),
                command = kind.command_name(),
                "new command replaced pending flow"
            );
        }

        let gate = self.gates.gate_for(kind);
        let grant = match gate.admit(identity, now_unix)? {
            Admission::Granted(grant) => grant,
            Admission::Rejected(rejection) => {
                let reply = rejection_reply(rejection, now_unix);
                channel.send(chat_id, &OutboundMessage::plain(reply)).await?;
                return Ok(DispatchOutcome::AdmissionRejected(rejection));
            }
        };

        if grant.free_tier_provisioned {
            // Provisioning and the quota charge are already persisted here.
            if let Err(error) = channel
                .send(chat_id, &OutboundMessage::plain(free_tier_notice(&grant)))
                .await
            {
                warn!(identity = %identity, error = %error, "free-tier notice delivery failed");
            }
        }
        self.conversations
            .admit(identity, kind, grant.credential)?;

        if inline_argument.is_empty() {
            channel
                .send(chat_id, &OutboundMessage::plain(kind.argument_prompt()))
                .await?;
            return Ok(DispatchOutcome::ArgumentPrompted(kind));
        }
        let pending = self.conversations.take_argument(identity)?;
        self.run_remote_call(channel, identity, chat_id, pending, inline_argument)
            .await
    }

    /// Runs the single remote call of an argument flow. The flow is already
    /// back at idle when this starts.
    async fn run_remote_call(
        &self,
        channel: &dyn MessagingChannel,
        identity: &Identity,
        chat_id: i64,
        pending: PendingArgument,
        argument: &str,
    ) -> Result<DispatchOutcome> {
        let PendingArgument { kind, credential } = pending;
        let operation = kind.operation();
        let placeholder = match channel
            .send(chat_id, &OutboundMessage::plain(PLEASE_WAIT_REPLY))
            .await
        {
            Ok(reference) => Some(reference),
            Err(error) => {
                debug!(identity = %identity, error = %error, "placeholder delivery failed");
                None
            }
        };

        let result = self.api.call(operation, &credential, argument).await;

        if let Some(reference) = placeholder {
            if let Err(error) = channel.delete(&reference).await {
                debug!(identity = %identity, error = %error, "placeholder delete failed");
            }
        }

        match result {
            Ok(payload) => {
                let report = render_report(operation, &payload);
                deliver_report(channel, chat_id, &report).await?;
                Ok(DispatchOutcome::ReportDelivered(kind))
            }
            Err(error) => {
                warn!(
                    identity = %identity,
                    operation = operation.as_str(),
                    error = %error,
                    "remote call failed"
                );
                channel
                    .send(chat_id, &OutboundMessage::plain(GENERIC_FAILURE_REPLY))
                    .await?;
                Ok(DispatchOutcome::RemoteFailed(kind))
            }
        }
    }

    fn with_dashboard_button(&self, text: &str) -> OutboundMessage {
        OutboundMessage::plain(text)
            .with_button(InlineButton::url(DASHBOARD_BUTTON_LABEL, &self.dashboard_url))
    }
}

/// Sends the report as MarkdownV2, resending it as plain text when the
/// channel rejects the formatting.
async fn deliver_report(
    channel: &dyn MessagingChannel,
    chat_id: i64,
    report: &RenderedReport,
) -> Result<(), ChannelError> {
    match channel
        .send(chat_id, &OutboundMessage::markdown_v2(report.markdown_v2()))
        .await
    {
        Ok(_) => Ok(()),
        Err(ChannelError::FormattingRejected(reason)) => {
            debug!(reason = reason.as_str(), "markdown rejected; sending plain report");
            channel
                .send(chat_id, &OutboundMessage::plain(report.plain_text()))
                .await
                .map(|_| ())
        }
        Err(error) => Err(error),
    }
}

fn free_tier_notice(grant: &AdmissionGrant) -> String {
    let remaining = grant.remaining_quota.unwrap_or_default();
    format!(
        "No API token set, free tier activated: {remaining} requests left in the current window. Use /start to set your own VAUL3T token."
    )
}

fn rejection_reply(rejection: AdmissionRejection, now_unix: u64) -> String {
    match rejection {
        AdmissionRejection::QuotaExceeded { reset_at } => format!(
            "Free tier limit reached. Try again in {} seconds or set your own token with /start.",
            seconds_until(reset_at, now_unix)
        ),
        AdmissionRejection::NotLinked => NOT_LINKED_REPLY.to_string(),
    }
}
