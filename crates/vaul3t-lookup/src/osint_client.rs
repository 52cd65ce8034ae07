//! HTTP client for the remote OSINT lookup and report endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::types::{OsintApi, OsintOperation, RemoteCallError};

pub const DEFAULT_OSINT_API_BASE: &str = "https://api.vaul3t.org";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

const ERROR_BODY_MAX_CHARS: usize = 320;

#[derive(Debug, Clone)]
pub struct OsintApiConfig {
    pub api_base: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct OsintApiClient {
    http: reqwest::Client,
    api_base: String,
}

impl OsintApiClient {
    pub fn new(config: OsintApiConfig) -> Result<Self, RemoteCallError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("vaul3t-bot"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base.trim().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, operation: OsintOperation) -> String {
        format!("{}/{}", self.api_base, operation.endpoint_path())
    }
}

#[async_trait]
impl OsintApi for OsintApiClient {
    async fn call(
        &self,
        operation: OsintOperation,
        credential: &str,
        argument: &str,
    ) -> Result<Value, RemoteCallError> {
        let authorization =
            HeaderValue::from_str(credential).map_err(|_| RemoteCallError::InvalidCredential)?;
        let response = self
            .http
            .get(self.endpoint(operation))
            .header(AUTHORIZATION, authorization)
            .query(&[(operation.query_param(), argument)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(
            operation = operation.as_str(),
            status = status.as_u16(),
            bytes = body.len(),
            "osint api responded"
        );
        if status != StatusCode::OK {
            return Err(RemoteCallError::HttpStatus {
                status: status.as_u16(),
                body: truncate_for_error(&body, ERROR_BODY_MAX_CHARS),
            });
        }

        let payload = serde_json::from_str::<Value>(&body)
            .map_err(|error| RemoteCallError::Decode(error.to_string()))?;
        if !payload.is_object() {
            return Err(RemoteCallError::Decode(
                "response body must be a JSON object".to_string(),
            ));
        }
        Ok(payload)
    }
}

fn truncate_for_error(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let mut truncated = body.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
