use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
/// Remote operations a gated command can invoke.
pub enum OsintOperation {
    InstagramLookup,
    InstagramReport,
}

impl OsintOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InstagramLookup => "instagram_lookup",
            Self::InstagramReport => "instagram_report",
        }
    }

    /// Path below the API base, without a leading slash.
    pub fn endpoint_path(self) -> &'static str {
        match self {
            Self::InstagramLookup => "v1/osint/instagram",
            Self::InstagramReport => "v1/osint/instagram/report_user",
        }
    }

    /// Query parameter carrying the user-supplied argument.
    pub fn query_param(self) -> &'static str {
        match self {
            Self::InstagramLookup => "username",
            Self::InstagramReport => "userID",
        }
    }
}

/// Hard failures of a single remote call. No partial data survives any of them.
#[derive(Debug, Error)]
pub enum RemoteCallError {
    #[error("osint api request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("osint api returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("osint api returned an unparsable body: {0}")]
    Decode(String),
    #[error("credential cannot be sent as an authorization header")]
    InvalidCredential,
}

#[async_trait]
/// Remote lookup/report API seam used by the gated dispatcher.
pub trait OsintApi: Send + Sync {
    /// Issues exactly one request authorized by `credential`. Never retries.
    async fn call(
        &self,
        operation: OsintOperation,
        credential: &str,
        argument: &str,
    ) -> Result<Value, RemoteCallError>;
}
