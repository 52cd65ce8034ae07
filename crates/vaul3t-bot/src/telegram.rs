//! Telegram Bot API client: long polling plus the outbound calls the
//! dispatcher needs.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::channel::{
    ButtonAction, ChannelError, InlineButton, MessageRef, MessagingChannel, OutboundMessage,
    ReplyFormat,
};

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_POLL_TIMEOUT_SECONDS: u64 = 25;

const POLL_REQUEST_GRACE_SECONDS: u64 = 10;
const ERROR_DESCRIPTION_MAX_CHARS: usize = 240;

#[derive(Debug, Clone)]
pub struct TelegramClientConfig {
    pub api_base: String,
    pub bot_token: String,
    pub request_timeout_ms: u64,
}

#[derive(Clone)]
pub struct TelegramApiClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl TelegramApiClient {
    pub fn new(config: TelegramClientConfig) -> Result<Self> {
        let api_base = config.api_base.trim().trim_end_matches('/').to_string();
        if api_base.is_empty() {
            bail!("telegram api base cannot be empty");
        }
        let bot_token = config.bot_token.trim().to_string();
        if bot_token.is_empty() {
            bail!("telegram bot token cannot be empty");
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("vaul3t-bot"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create telegram api client")?;

        Ok(Self {
            http,
            api_base,
            bot_token,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Long-polls `getUpdates` from `offset`. The request timeout is stretched
    /// past the poll timeout so an empty poll is not reported as a failure.
    pub async fn get_updates(&self, offset: u64, timeout_seconds: u64) -> Result<Vec<Value>> {
        let response = self
            .http
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout_seconds.to_string()),
            ])
            .timeout(Duration::from_secs(
                timeout_seconds.saturating_add(POLL_REQUEST_GRACE_SECONDS),
            ))
            .send()
            .await
            .context("telegram getUpdates request failed")?;
        let status = response.status();
        let body = response
            .text()
            .await
            .context("failed to read telegram getUpdates body")?;
        let payload = serde_json::from_str::<Value>(&body)
            .with_context(|| format!("telegram getUpdates returned invalid json (status {status})"))?;
        if !status.is_success() || payload.get("ok").and_then(Value::as_bool) != Some(true) {
            bail!(
                "telegram getUpdates failed with status {}: {}",
                status.as_u16(),
                describe_failure(&payload)
            );
        }
        payload
            .get("result")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| anyhow!("telegram getUpdates response missing result[]"))
    }

    async fn call_method(
        &self,
        method: &str,
        body: &Value,
        formatted: bool,
    ) -> Result<Value, ChannelError> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|error| ChannelError::Delivery(format!("telegram {method}: {error}")))?;
        let status = response.status();
        let payload = response
            .json::<Value>()
            .await
            .unwrap_or_else(|_| Value::Object(Map::new()));
        debug!(method, status = status.as_u16(), "telegram api responded");

        if status.is_success() && payload.get("ok").and_then(Value::as_bool) == Some(true) {
            return Ok(payload.get("result").cloned().unwrap_or(Value::Null));
        }
        let description = describe_failure(&payload);
        if formatted && status == StatusCode::BAD_REQUEST {
            return Err(ChannelError::FormattingRejected(description));
        }
        Err(ChannelError::Delivery(format!(
            "telegram {method} failed with status {}: {description}",
            status.as_u16()
        )))
    }
}

#[async_trait]
impl MessagingChannel for TelegramApiClient {
    async fn send(
        &self,
        chat_id: i64,
        message: &OutboundMessage,
    ) -> Result<MessageRef, ChannelError> {
        let body = send_message_body(chat_id, message);
        let formatted = message.format == ReplyFormat::MarkdownV2;
        let result = self.call_method("sendMessage", &body, formatted).await?;
        let message_id = result
            .get("message_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                ChannelError::Delivery("telegram sendMessage result missing message_id".to_string())
            })?;
        Ok(MessageRef {
            chat_id,
            message_id,
        })
    }

    async fn delete(&self, message: &MessageRef) -> Result<(), ChannelError> {
        let body = json!({
            "chat_id": message.chat_id,
            "message_id": message.message_id,
        });
        self.call_method("deleteMessage", &body, false)
            .await
            .map(|_| ())
    }

    async fn acknowledge_button(&self, callback_id: &str) -> Result<(), ChannelError> {
        let body = json!({ "callback_query_id": callback_id });
        self.call_method("answerCallbackQuery", &body, false)
            .await
            .map(|_| ())
    }
}

pub(crate) fn send_message_body(chat_id: i64, message: &OutboundMessage) -> Value {
    let mut body = json!({
        "chat_id": chat_id,
        "text": message.text,
    });
    if message.format == ReplyFormat::MarkdownV2 {
        body["parse_mode"] = json!("MarkdownV2");
    }
    if !message.buttons.is_empty() {
        let rows = message
            .buttons
            .iter()
            .map(|button| json!([inline_button_json(button)]))
            .collect::<Vec<_>>();
        body["reply_markup"] = json!({ "inline_keyboard": rows });
    }
    body
}

fn inline_button_json(button: &InlineButton) -> Value {
    match &button.action {
        ButtonAction::Url(url) => json!({"text": button.label, "url": url}),
        ButtonAction::Callback(data) => json!({"text": button.label, "callback_data": data}),
    }
}

fn describe_failure(payload: &Value) -> String {
    let description = payload
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    description.chars().take(ERROR_DESCRIPTION_MAX_CHARS).collect()
}
