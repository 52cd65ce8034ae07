//! Outbound messaging seam used by the dispatcher.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyFormat {
    #[default]
    Plain,
    MarkdownV2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    Url(String),
    Callback(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub action: ButtonAction,
}

impl InlineButton {
    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Url(url.into()),
        }
    }

    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Callback(data.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutboundMessage {
    pub text: String,
    pub format: ReplyFormat,
    pub buttons: Vec<InlineButton>,
}

impl OutboundMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: ReplyFormat::Plain,
            buttons: Vec::new(),
        }
    }

    pub fn markdown_v2(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: ReplyFormat::MarkdownV2,
            buttons: Vec::new(),
        }
    }

    pub fn with_button(mut self, button: InlineButton) -> Self {
        self.buttons.push(button);
        self
    }
}

/// Handle to a delivered message, used to delete it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel refused the rich formatting; the same text may succeed as plain.
    #[error("channel rejected formatted message: {0}")]
    FormattingRejected(String),
    #[error("channel delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait MessagingChannel: Send + Sync {
    async fn send(&self, chat_id: i64, message: &OutboundMessage)
        -> Result<MessageRef, ChannelError>;

    async fn delete(&self, message: &MessageRef) -> Result<(), ChannelError>;

    /// Clears the loading indicator of a pressed inline button.
    async fn acknowledge_button(&self, callback_id: &str) -> Result<(), ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::{ButtonAction, InlineButton, OutboundMessage, ReplyFormat};

    #[test]
    fn unit_outbound_builders_set_format_and_buttons() {
        let message = OutboundMessage::plain("hello")
            .with_button(InlineButton::url("Dashboard", "https://example.test"));
        assert_eq!(message.format, ReplyFormat::Plain);
        assert_eq!(
            message.buttons[0].action,
            ButtonAction::Url("https://example.test".to_string())
        );

        let rich = OutboundMessage::markdown_v2("```\nx\n```");
        assert_eq!(rich.format, ReplyFormat::MarkdownV2);
        assert!(rich.buttons.is_empty());
    }
}
