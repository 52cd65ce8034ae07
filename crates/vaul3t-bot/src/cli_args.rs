use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use vaul3t_access::{
    StateLayout, DEFAULT_FREE_TIER_TOKEN, DEFAULT_STATE_DIR, FREE_TIER_QUOTA,
    FREE_TIER_WINDOW_SECONDS,
};
use vaul3t_lookup::{DEFAULT_OSINT_API_BASE, DEFAULT_REQUEST_TIMEOUT_MS};

use crate::admission::{AdmissionPolicies, AdmissionPolicy};
use crate::telegram::{DEFAULT_POLL_TIMEOUT_SECONDS, DEFAULT_TELEGRAM_API_BASE};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u32(value: &str) -> Result<u32, String> {
    let parsed = value
        .parse::<u32>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_non_empty(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("value cannot be empty".to_string());
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliAdmissionPolicy {
    Credential,
    LinkedAccount,
}

impl From<CliAdmissionPolicy> for AdmissionPolicy {
    fn from(value: CliAdmissionPolicy) -> Self {
        match value {
            CliAdmissionPolicy::Credential => AdmissionPolicy::Credential,
            CliAdmissionPolicy::LinkedAccount => AdmissionPolicy::LinkedAccount,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "vaul3t-bot",
    about = "Telegram bot gating VAUL3T OSINT lookups behind API tokens and a free tier",
    version
)]
pub struct Cli {
    #[arg(
        long = "telegram-bot-token",
        env = "VAUL3T_TELEGRAM_BOT_TOKEN",
        value_parser = parse_non_empty,
        hide_env_values = true,
        help = "Telegram bot token used for polling and replies"
    )]
    pub telegram_bot_token: String,

    #[arg(
        long = "telegram-api-base",
        env = "VAUL3T_TELEGRAM_API_BASE",
        default_value = DEFAULT_TELEGRAM_API_BASE,
        help = "Base URL for the Telegram Bot API"
    )]
    pub telegram_api_base: String,

    #[arg(
        long = "poll-timeout-seconds",
        env = "VAUL3T_POLL_TIMEOUT_SECONDS",
        default_value_t = DEFAULT_POLL_TIMEOUT_SECONDS,
        help = "Long-poll timeout passed to getUpdates"
    )]
    pub poll_timeout_seconds: u64,

    #[arg(
        long = "poll-error-backoff-ms",
        env = "VAUL3T_POLL_ERROR_BACKOFF_MS",
        default_value_t = 3_000,
        value_parser = parse_positive_u64,
        help = "Delay before polling again after a failed getUpdates call"
    )]
    pub poll_error_backoff_ms: u64,

    #[arg(
        long = "lookup-api-base",
        env = "VAUL3T_LOOKUP_API_BASE",
        default_value = DEFAULT_OSINT_API_BASE,
        help = "Base URL for the remote lookup and report API"
    )]
    pub lookup_api_base: String,

    #[arg(
        long = "request-timeout-ms",
        env = "VAUL3T_REQUEST_TIMEOUT_MS",
        default_value_t = DEFAULT_REQUEST_TIMEOUT_MS,
        value_parser = parse_positive_u64,
        help = "Timeout for remote lookup calls and outbound Telegram requests"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "site-base",
        env = "VAUL3T_SITE_BASE",
        default_value = "https://vaul3t.org",
        help = "Site that completes account link handshakes"
    )]
    pub site_base: String,

    #[arg(
        long = "dashboard-url",
        env = "VAUL3T_DASHBOARD_URL",
        default_value = "https://vaul3t.org/dashboard",
        help = "Dashboard link offered to users without a token"
    )]
    pub dashboard_url: String,

    #[arg(
        long = "link-provider",
        env = "VAUL3T_LINK_PROVIDER",
        default_value = "telegram",
        help = "Provider name embedded in account link handshake URLs"
    )]
    pub link_provider: String,

    #[arg(
        long = "state-dir",
        env = "VAUL3T_STATE_DIR",
        default_value = DEFAULT_STATE_DIR,
        help = "Directory holding the credential, connection and rate-limit tables"
    )]
    pub state_dir: PathBuf,

    #[arg(
        long = "registry-path",
        env = "VAUL3T_REGISTRY_PATH",
        help = "Known-valid token registry (defaults to <state-dir>/user_map.json)"
    )]
    pub registry_path: Option<PathBuf>,

    #[arg(
        long = "tokens-path",
        env = "VAUL3T_TOKENS_PATH",
        help = "Credential table (defaults to <state-dir>/tokens/user_tokens.json)"
    )]
    pub tokens_path: Option<PathBuf>,

    #[arg(
        long = "connections-path",
        env = "VAUL3T_CONNECTIONS_PATH",
        help = "Linked account table (defaults to <state-dir>/connections.json)"
    )]
    pub connections_path: Option<PathBuf>,

    #[arg(
        long = "pending-connections-path",
        env = "VAUL3T_PENDING_CONNECTIONS_PATH",
        help = "Pending link secret table (defaults to <state-dir>/pending_connections.json)"
    )]
    pub pending_connections_path: Option<PathBuf>,

    #[arg(
        long = "rate-limits-path",
        env = "VAUL3T_RATE_LIMITS_PATH",
        help = "Free-tier ledger table (defaults to <state-dir>/rate_limits.json)"
    )]
    pub rate_limits_path: Option<PathBuf>,

    #[arg(
        long = "default-token",
        env = "VAUL3T_DEFAULT_TOKEN",
        default_value = DEFAULT_FREE_TIER_TOKEN,
        value_parser = parse_non_empty,
        hide_env_values = true,
        help = "Free-tier token provisioned for identities without their own token"
    )]
    pub default_token: String,

    #[arg(
        long = "free-tier-quota",
        env = "VAUL3T_FREE_TIER_QUOTA",
        default_value_t = FREE_TIER_QUOTA,
        value_parser = parse_positive_u32,
        help = "Free-tier requests allowed per window"
    )]
    pub free_tier_quota: u32,

    #[arg(
        long = "free-tier-window-seconds",
        env = "VAUL3T_FREE_TIER_WINDOW_SECONDS",
        default_value_t = FREE_TIER_WINDOW_SECONDS,
        value_parser = parse_positive_u64,
        help = "Length of the fixed free-tier window"
    )]
    pub free_tier_window_seconds: u64,

    #[arg(
        long = "lookup-admission",
        env = "VAUL3T_LOOKUP_ADMISSION",
        value_enum,
        default_value_t = CliAdmissionPolicy::Credential,
        help = "Admission policy for /instagram"
    )]
    pub lookup_admission: CliAdmissionPolicy,

    #[arg(
        long = "report-admission",
        env = "VAUL3T_REPORT_ADMISSION",
        value_enum,
        default_value_t = CliAdmissionPolicy::LinkedAccount,
        help = "Admission policy for /report"
    )]
    pub report_admission: CliAdmissionPolicy,
}

impl Cli {
    /// Table locations under `--state-dir` with per-table overrides applied.
    pub fn state_layout(&self) -> StateLayout {
        let mut layout = StateLayout::for_state_dir(&self.state_dir);
        if let Some(path) = &self.registry_path {
            layout.registry_path = path.clone();
        }
        if let Some(path) = &self.tokens_path {
            layout.tokens_path = path.clone();
        }
        if let Some(path) = &self.connections_path {
            layout.connections_path = path.clone();
        }
        if let Some(path) = &self.pending_connections_path {
            layout.pending_connections_path = path.clone();
        }
        if let Some(path) = &self.rate_limits_path {
            layout.rate_limits_path = path.clone();
        }
        layout
    }

    pub fn admission_policies(&self) -> AdmissionPolicies {
        AdmissionPolicies {
            lookup: self.lookup_admission.into(),
            report: self.report_admission.into(),
        }
    }
}
