//! Per-identity credential storage and validation against the known-valid registry.

use std::path::PathBuf;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info};
use vaul3t_core::FlatTable;

use crate::identity::Identity;

/// Fixed fallback credential granting rate-limited free-tier access.
pub const DEFAULT_FREE_TIER_TOKEN: &str = "vaul3t-free-tier";

const REGISTRY_CREDENTIAL_FIELD: &str = "api_key";

/// Read-only view of the external `{account_id -> {api_key, ...}}` map.
///
/// Reloaded on every lookup; membership is a linear scan in file order with no
/// index, so validation cost grows with the registry.
#[derive(Debug)]
pub struct ValidCredentialRegistry {
    table: FlatTable<Value>,
}

impl ValidCredentialRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            table: FlatTable::open(path),
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.table.load_raw().values().any(|record| {
            record
                .get(REGISTRY_CREDENTIAL_FIELD)
                .and_then(Value::as_str)
                .is_some_and(|candidate| candidate == token)
        })
    }

    /// The `api_key` recorded for one external account, if any.
    pub fn credential_for_account(&self, external_account_id: &str) -> Option<String> {
        self.table
            .get(external_account_id)?
            .get(REGISTRY_CREDENTIAL_FIELD)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    }
}

/// File locations and default token used by [`CredentialStore`].
#[derive(Debug, Clone)]
pub struct CredentialStoreConfig {
    pub tokens_path: PathBuf,
    pub registry_path: PathBuf,
    pub default_token: String,
}

/// Credential resolved for one gated command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    pub token: String,
    /// True when the default token was written for this identity just now.
    pub provisioned: bool,
    /// True when `token` is the default free-tier token.
    pub free_tier: bool,
}

/// Durable `identity -> token` map. At most one token per identity;
/// writes overwrite, and two identities may hold the same token.
#[derive(Debug)]
pub struct CredentialStore {
    tokens: FlatTable<String>,
    registry: ValidCredentialRegistry,
    default_token: String,
}

impl CredentialStore {
    pub fn new(config: CredentialStoreConfig) -> Self {
        Self {
            tokens: FlatTable::open(config.tokens_path),
            registry: ValidCredentialRegistry::new(config.registry_path),
            default_token: config.default_token,
        }
    }

    pub fn registry(&self) -> &ValidCredentialRegistry {
        &self.registry
    }

    pub fn is_default_token(&self, token: &str) -> bool {
        token == self.default_token
    }

    /// True for the default token or any `api_key` present in the registry.
    pub fn validate(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        self.is_default_token(token) || self.registry.contains(token)
    }

    pub fn store(&self, identity: &Identity, token: &str) -> Result<()> {
        self.tokens.upsert(identity.as_str(), token.to_string())?;
        info!(identity = %identity, free_tier = self.is_default_token(token), "stored credential");
        Ok(())
    }

    pub fn fetch(&self, identity: &Identity) -> Option<String> {
        self.tokens.get(identity.as_str())
    }

    /// Returns the stored token, writing the default token first when the
    /// identity has none.
    pub fn fetch_or_provision_default(&self, identity: &Identity) -> Result<ResolvedCredential> {
        if let Some(token) = self.fetch(identity) {
            return Ok(self.resolved(token, false));
        }
        let (token, provisioned) = self.tokens.update(identity.as_str(), |current| match current {
            Some(existing) => (existing.clone(), (existing, false)),
            None => (
                self.default_token.clone(),
                (self.default_token.clone(), true),
            ),
        })?;
        if provisioned {
            info!(identity = %identity, "provisioned free-tier credential");
        } else {
            debug!(identity = %identity, "credential appeared while provisioning");
        }
        Ok(self.resolved(token, provisioned))
    }

    pub fn ensure_table(&self) -> Result<()> {
        self.tokens.ensure_exists()
    }

    fn resolved(&self, token: String, provisioned: bool) -> ResolvedCredential {
        let free_tier = self.is_default_token(&token);
        ResolvedCredential {
            token,
            provisioned,
            free_tier,
        }
    }
}
