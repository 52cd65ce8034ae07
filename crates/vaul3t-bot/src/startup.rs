//! Wiring from parsed CLI flags to a running bot.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use vaul3t_access::{
    ConnectionRegistry, ConnectionRegistryConfig, CredentialStore, CredentialStoreConfig,
    RateLimitLedger, RateLimitPolicy,
};
use vaul3t_lookup::{OsintApiClient, OsintApiConfig};

use crate::admission::AdmissionGates;
use crate::bootstrap_helpers::bootstrap_state_dir;
use crate::cli_args::Cli;
use crate::dispatcher::{DispatcherConfig, GatedDispatcher};
use crate::telegram::{TelegramApiClient, TelegramClientConfig};
use crate::telegram_runtime::{TelegramRuntime, TelegramRuntimeConfig};

/// Builds the stores and dispatcher described by `cli`, bootstrapping the
/// state dir on the way.
pub fn build_dispatcher(cli: &Cli) -> Result<GatedDispatcher> {
    let layout = cli.state_layout();
    let credentials = Arc::new(CredentialStore::new(CredentialStoreConfig {
        tokens_path: layout.tokens_path.clone(),
        registry_path: layout.registry_path.clone(),
        default_token: cli.default_token.clone(),
    }));
    bootstrap_state_dir(&layout, &credentials)?;

    let connections = Arc::new(ConnectionRegistry::new(ConnectionRegistryConfig {
        connections_path: layout.connections_path.clone(),
        pending_path: layout.pending_connections_path.clone(),
        site_base: cli.site_base.clone(),
        provider: cli.link_provider.clone(),
    }));
    let ledger = Arc::new(RateLimitLedger::new(
        layout.rate_limits_path.clone(),
        RateLimitPolicy {
            quota: cli.free_tier_quota,
            window_seconds: cli.free_tier_window_seconds,
        },
    ));
    let policies = cli.admission_policies();
    let gates = AdmissionGates::new(policies, &credentials, &connections, &ledger);
    let api = OsintApiClient::new(OsintApiConfig {
        api_base: cli.lookup_api_base.clone(),
        request_timeout_ms: cli.request_timeout_ms,
    })
    .context("failed to create lookup api client")?;

    info!(
        state_dir = %layout.state_dir.display(),
        lookup_admission = policies.lookup.as_str(),
        report_admission = policies.report.as_str(),
        "vaul3t dispatcher ready"
    );
    Ok(GatedDispatcher::new(
        DispatcherConfig {
            dashboard_url: cli.dashboard_url.clone(),
        },
        credentials,
        connections,
        gates,
        Arc::new(api),
    ))
}

pub async fn run_bot(cli: Cli) -> Result<()> {
    let dispatcher = Arc::new(build_dispatcher(&cli)?);
    let client = TelegramApiClient::new(TelegramClientConfig {
        api_base: cli.telegram_api_base.clone(),
        bot_token: cli.telegram_bot_token.clone(),
        request_timeout_ms: cli.request_timeout_ms,
    })?;
    let mut runtime = TelegramRuntime::new(
        Arc::new(client),
        dispatcher,
        TelegramRuntimeConfig {
            poll_timeout_seconds: cli.poll_timeout_seconds,
            error_backoff: Duration::from_millis(cli.poll_error_backoff_ms),
        },
    );
    runtime.run().await
}
