//! Normalization of Telegram updates into inbound bot events.

use serde_json::{Map, Value};
use vaul3t_access::Identity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    /// A leading-slash message. `name` is lowercase, without the slash or any
    /// `@botname` suffix.
    Command { name: String, args: String },
    Text(String),
    Button { callback_id: String, data: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub identity: Identity,
    pub chat_id: i64,
    pub payload: EventPayload,
}

impl InboundEvent {
    pub fn command(identity: Identity, chat_id: i64, name: &str, args: &str) -> Self {
        Self {
            identity,
            chat_id,
            payload: EventPayload::Command {
                name: name.to_string(),
                args: args.to_string(),
            },
        }
    }

    pub fn text(identity: Identity, chat_id: i64, text: &str) -> Self {
        Self {
            identity,
            chat_id,
            payload: EventPayload::Text(text.to_string()),
        }
    }

    pub fn button(identity: Identity, chat_id: i64, callback_id: &str, data: &str) -> Self {
        Self {
            identity,
            chat_id,
            payload: EventPayload::Button {
                callback_id: callback_id.to_string(),
                data: data.to_string(),
            },
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self.payload {
            EventPayload::Command { .. } => "command",
            EventPayload::Text(_) => "text",
            EventPayload::Button { .. } => "button",
        }
    }
}

/// Parses one `getUpdates` entry. Updates without a sender, chat, or usable
/// content (stickers, edits, joins) yield `None`.
pub fn parse_telegram_update(update: &Value) -> Option<InboundEvent> {
    let update = update.as_object()?;
    if let Some(message) = update.get("message").and_then(Value::as_object) {
        return parse_message(message);
    }
    if let Some(callback) = update.get("callback_query").and_then(Value::as_object) {
        return parse_callback_query(callback);
    }
    None
}

fn parse_message(message: &Map<String, Value>) -> Option<InboundEvent> {
    let identity = sender_identity(message)?;
    let chat_id = chat_id_of(message)?;
    let text = optional_string_field(message, "text").filter(|text| !text.is_empty())?;
    let payload = if detect_command(&text) {
        parse_command_text(&text)?
    } else {
        EventPayload::Text(text)
    };
    Some(InboundEvent {
        identity,
        chat_id,
        payload,
    })
}

fn parse_callback_query(callback: &Map<String, Value>) -> Option<InboundEvent> {
    let identity = sender_identity(callback)?;
    let callback_id = optional_string_field(callback, "id")?;
    let chat_id = callback
        .get("message")
        .and_then(Value::as_object)
        .and_then(chat_id_of)?;
    let data = optional_string_field(callback, "data").unwrap_or_default();
    Some(InboundEvent {
        identity,
        chat_id,
        payload: EventPayload::Button { callback_id, data },
    })
}

fn sender_identity(object: &Map<String, Value>) -> Option<Identity> {
    let from = object.get("from").and_then(Value::as_object)?;
    optional_string_field(from, "id")
        .filter(|id| !id.is_empty())
        .map(Identity::from)
}

fn chat_id_of(message: &Map<String, Value>) -> Option<i64> {
    let chat = message.get("chat").and_then(Value::as_object)?;
    match chat.get("id")? {
        Value::Number(raw) => raw.as_i64(),
        Value::String(raw) => raw.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn detect_command(text: &str) -> bool {
    text.trim_start().starts_with('/')
}

/// Splits `/name@bot rest of line` into a command payload.
pub(crate) fn parse_command_text(text: &str) -> Option<EventPayload> {
    let trimmed = text.trim();
    let body = trimmed.strip_prefix('/')?;
    let mut parts = body.splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or_default();
    let args = parts.next().unwrap_or_default().trim();
    let name = head.split('@').next().unwrap_or_default().to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }
    Some(EventPayload::Command {
        name,
        args: args.to_string(),
    })
}

fn optional_string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(raw) => Some(raw.trim().to_string()),
        Value::Number(raw) => Some(raw.to_string()),
        _ => None,
    }
}
