use anyhow::{Context, Result};
use tracing::level_filters::LevelFilter;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vaul3t_access::{CredentialStore, StateLayout};

pub fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

/// Creates the state directories and an empty credential table when missing.
/// The registry is never created here; it is owned by the remote site.
pub fn bootstrap_state_dir(layout: &StateLayout, credentials: &CredentialStore) -> Result<()> {
    layout
        .create_dirs()
        .with_context(|| format!("failed to prepare state dir {}", layout.state_dir.display()))?;
    credentials
        .ensure_table()
        .with_context(|| format!("failed to create {}", layout.tokens_path.display()))?;
    if !layout.registry_path.exists() {
        info!(
            path = %layout.registry_path.display(),
            "token registry not found; only the free-tier token will validate"
        );
    }
    Ok(())
}
