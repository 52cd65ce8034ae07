//! Fixed-order projection of remote payloads into reply reports.
//!
//! Every known field is always emitted; missing or null values render as
//! [`MISSING_FIELD_PLACEHOLDER`]. Booleans render as `True`/`False`, matching
//! the reports users of the bot already receive.

use serde_json::{Map, Value};

use crate::types::OsintOperation;

pub const MISSING_FIELD_PLACEHOLDER: &str = "N/A";

const INSTAGRAM_RECOVERY_FIELDS: [&str; 11] = [
    "autosend_disabled",
    "can_email_reset",
    "can_flashcall_reset",
    "can_p2s_reset",
    "can_sms_reset",
    "can_wa_reset",
    "fb_login_option",
    "has_valid_phone",
    "obfuscated_email",
    "obfuscated_phone",
    "wa_account_recovery_type",
];

const INSTAGRAM_USER_FIELDS: [&str; 7] = [
    "is_private",
    "is_threads_only_user",
    "is_verified",
    "full_name",
    "id",
    "fbid_v2",
    "username",
];

const REPORT_CONFIRMATION_FIELDS: [&str; 3] = ["type", "ok", "reported"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    lines: Vec<String>,
}

impl RenderedReport {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn plain_text(&self) -> String {
        self.lines.join("\n")
    }

    /// The report wrapped in a MarkdownV2 pre block.
    pub fn markdown_v2(&self) -> String {
        format!("```\n{}\n```", escape_markdown_v2_pre(&self.plain_text()))
    }
}

pub fn render_report(operation: OsintOperation, payload: &Value) -> RenderedReport {
    let data = payload.get("data").and_then(Value::as_object);
    let lines = match operation {
        OsintOperation::InstagramLookup => render_instagram_lookup(data),
        OsintOperation::InstagramReport => render_instagram_report(data),
    };
    RenderedReport { lines }
}

fn render_instagram_lookup(data: Option<&Map<String, Value>>) -> Vec<String> {
    let mut lines = INSTAGRAM_RECOVERY_FIELDS
        .iter()
        .map(|field| format!("{field}: {}", render_field_value(field_of(data, field))))
        .collect::<Vec<_>>();

    let user = field_of(data, "user").and_then(Value::as_object);
    lines.push(String::new());
    lines.push("user:".to_string());
    lines.extend(
        INSTAGRAM_USER_FIELDS
            .iter()
            .map(|field| format!(" {field}: {}", render_field_value(field_of(user, field)))),
    );
    lines
}

fn render_instagram_report(data: Option<&Map<String, Value>>) -> Vec<String> {
    REPORT_CONFIRMATION_FIELDS
        .iter()
        .map(|field| format!("{field}: {}", render_field_value(field_of(data, field))))
        .collect()
}

fn field_of<'a>(object: Option<&'a Map<String, Value>>, key: &str) -> Option<&'a Value> {
    object.and_then(|object| object.get(key))
}

pub fn render_field_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => MISSING_FIELD_PLACEHOLDER.to_string(),
        Some(Value::Bool(true)) => "True".to_string(),
        Some(Value::Bool(false)) => "False".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(other) => other.to_string(),
    }
}

fn escape_markdown_v2_pre(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch == '`' || ch == '\\' {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
