//! Pluggable admission checks for gated commands.
//!
//! Each command kind is bound to one [`AdmissionGate`]. The credential gate
//! admits anyone holding a token and provisions the free-tier token on first
//! use; free-tier holders pay one ledger slot per admission. The linked-account
//! gate additionally requires an external account link.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;
use vaul3t_access::{ConnectionRegistry, CredentialStore, Identity, QuotaDecision, RateLimitLedger};

use crate::commands::CommandKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPolicy {
    Credential,
    LinkedAccount,
}

impl AdmissionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Credential => "credential",
            Self::LinkedAccount => "linked-account",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionGrant {
    pub credential: String,
    /// The free-tier token was written for this identity by this admission.
    pub free_tier_provisioned: bool,
    /// Free-tier slots left in the current window; `None` for personal tokens.
    pub remaining_quota: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionRejection {
    QuotaExceeded { reset_at: u64 },
    NotLinked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Granted(AdmissionGrant),
    Rejected(AdmissionRejection),
}

pub trait AdmissionGate: Send + Sync {
    fn policy(&self) -> AdmissionPolicy;

    fn admit(&self, identity: &Identity, now_unix: u64) -> Result<Admission>;
}

pub struct CredentialGate {
    credentials: Arc<CredentialStore>,
    ledger: Arc<RateLimitLedger>,
}

impl CredentialGate {
    pub fn new(credentials: Arc<CredentialStore>, ledger: Arc<RateLimitLedger>) -> Self {
        Self {
            credentials,
            ledger,
        }
    }
}

impl AdmissionGate for CredentialGate {
    fn policy(&self) -> AdmissionPolicy {
        AdmissionPolicy::Credential
    }

    fn admit(&self, identity: &Identity, now_unix: u64) -> Result<Admission> {
        let resolved = self.credentials.fetch_or_provision_default(identity)?;
        if !resolved.free_tier {
            return Ok(Admission::Granted(AdmissionGrant {
                credential: resolved.token,
                free_tier_provisioned: false,
                remaining_quota: None,
            }));
        }

        match self.ledger.try_consume(identity, now_unix)? {
            QuotaDecision::Allowed { remaining, .. } => Ok(Admission::Granted(AdmissionGrant {
                credential: resolved.token,
                free_tier_provisioned: resolved.provisioned,
                remaining_quota: Some(remaining),
            })),
            QuotaDecision::Exceeded { reset_at } => Ok(Admission::Rejected(
                AdmissionRejection::QuotaExceeded { reset_at },
            )),
        }
    }
}

pub struct LinkedAccountGate {
    connections: Arc<ConnectionRegistry>,
    credentials: Arc<CredentialStore>,
    fallback: CredentialGate,
}

impl LinkedAccountGate {
    pub fn new(
        connections: Arc<ConnectionRegistry>,
        credentials: Arc<CredentialStore>,
        ledger: Arc<RateLimitLedger>,
    ) -> Self {
        Self {
            connections,
            fallback: CredentialGate::new(Arc::clone(&credentials), ledger),
            credentials,
        }
    }
}

impl AdmissionGate for LinkedAccountGate {
    fn policy(&self) -> AdmissionPolicy {
        AdmissionPolicy::LinkedAccount
    }

    /// Linked identities use the account's registry key when one exists and
    /// otherwise fall back to their own credential.
    fn admit(&self, identity: &Identity, now_unix: u64) -> Result<Admission> {
        let Some(account) = self.connections.linked_account(identity) else {
            return Ok(Admission::Rejected(AdmissionRejection::NotLinked));
        };
        if let Some(credential) = self.credentials.registry().credential_for_account(&account) {
            debug!(identity = %identity, account = account.as_str(), "admitted with linked account key");
            return Ok(Admission::Granted(AdmissionGrant {
                credential,
                free_tier_provisioned: false,
                remaining_quota: None,
            }));
        }
        self.fallback.admit(identity, now_unix)
    }
}

/// Admission policy chosen for each gated command kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicies {
    pub lookup: AdmissionPolicy,
    pub report: AdmissionPolicy,
}

impl Default for AdmissionPolicies {
    fn default() -> Self {
        Self {
            lookup: AdmissionPolicy::Credential,
            report: AdmissionPolicy::LinkedAccount,
        }
    }
}

/// Gate selection per command kind.
pub struct AdmissionGates {
    lookup: Arc<dyn AdmissionGate>,
    report: Arc<dyn AdmissionGate>,
}

impl AdmissionGates {
    pub fn new(
        policies: AdmissionPolicies,
        credentials: &Arc<CredentialStore>,
        connections: &Arc<ConnectionRegistry>,
        ledger: &Arc<RateLimitLedger>,
    ) -> Self {
        Self {
            lookup: gate_for_policy(policies.lookup, credentials, connections, ledger),
            report: gate_for_policy(policies.report, credentials, connections, ledger),
        }
    }

    /// Replaces the gate bound to `kind`.
    pub fn with_gate(mut self, kind: CommandKind, gate: Arc<dyn AdmissionGate>) -> Self {
        match kind {
            CommandKind::InstagramLookup => self.lookup = gate,
            CommandKind::InstagramReport => self.report = gate,
        }
        self
    }

    pub fn gate_for(&self, kind: CommandKind) -> &dyn AdmissionGate {
        match kind {
            CommandKind::InstagramLookup => self.lookup.as_ref(),
            CommandKind::InstagramReport => self.report.as_ref(),
        }
    }
}

/// Builds the gate for one policy over the shared stores.
pub fn gate_for_policy(
    policy: AdmissionPolicy,
    credentials: &Arc<CredentialStore>,
    connections: &Arc<ConnectionRegistry>,
    ledger: &Arc<RateLimitLedger>,
) -> Arc<dyn AdmissionGate> {
    match policy {
        AdmissionPolicy::Credential => Arc::new(CredentialGate::new(
            Arc::clone(credentials),
            Arc::clone(ledger),
        )),
        AdmissionPolicy::LinkedAccount => Arc::new(LinkedAccountGate::new(
            Arc::clone(connections),
            Arc::clone(credentials),
            Arc::clone(ledger),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use serde_json::json;
    use tempfile::tempdir;
    use vaul3t_access::{
        ConnectionRegistry, ConnectionRegistryConfig, CredentialStore, CredentialStoreConfig,
        Identity, RateLimitLedger, RateLimitPolicy, StateLayout, DEFAULT_FREE_TIER_TOKEN,
    };

    use super::{
        Admission, AdmissionGate, AdmissionGates, AdmissionGrant, AdmissionPolicies,
        AdmissionPolicy, AdmissionRejection, CredentialGate, LinkedAccountGate,
    };
    use crate::commands::CommandKind;

    struct Stores {
        credentials: Arc<CredentialStore>,
        connections: Arc<ConnectionRegistry>,
        ledger: Arc<RateLimitLedger>,
    }

    fn stores_in(root: &Path, quota: u32) -> Stores {
        let layout = StateLayout::for_state_dir(root);
        Stores {
            credentials: Arc::new(CredentialStore::new(CredentialStoreConfig {
                tokens_path: layout.tokens_path.clone(),
                registry_path: layout.registry_path.clone(),
                default_token: DEFAULT_FREE_TIER_TOKEN.to_string(),
            })),
            connections: Arc::new(ConnectionRegistry::new(ConnectionRegistryConfig {
                connections_path: layout.connections_path.clone(),
                pending_path: layout.pending_connections_path.clone(),
                site_base: "https://vaul3t.example".to_string(),
                provider: "telegram".to_string(),
            })),
            ledger: Arc::new(RateLimitLedger::new(
                layout.rate_limits_path,
                RateLimitPolicy {
                    quota,
                    window_seconds: 3_600,
                },
            )),
        }
    }

    #[test]
    fn functional_credential_gate_provisions_then_spends_quota() {
        let temp = tempdir().expect("tempdir");
        let stores = stores_in(temp.path(), 2);
        let gate = CredentialGate::new(stores.credentials.clone(), stores.ledger.clone());
        let identity = Identity::from(42_i64);

        assert_eq!(
            gate.admit(&identity, 100).expect("first"),
            Admission::Granted(AdmissionGrant {
                credential: DEFAULT_FREE_TIER_TOKEN.to_string(),
                free_tier_provisioned: true,
                remaining_quota: Some(1),
            })
        );
        assert_eq!(
            gate.admit(&identity, 101).expect("second"),
            Admission::Granted(AdmissionGrant {
                credential: DEFAULT_FREE_TIER_TOKEN.to_string(),
                free_tier_provisioned: false,
                remaining_quota: Some(0),
            })
        );
        assert_eq!(
            gate.admit(&identity, 102).expect("third"),
            Admission::Rejected(AdmissionRejection::QuotaExceeded { reset_at: 3_700 })
        );
    }

    #[test]
    fn unit_personal_credentials_bypass_the_ledger() {
        let temp = tempdir().expect("tempdir");
        let stores = stores_in(temp.path(), 1);
        let identity = Identity::from(7_i64);
        stores
            .credentials
            .store(&identity, "key-alpha")
            .expect("store");
        let gate = CredentialGate::new(stores.credentials.clone(), stores.ledger.clone());

        for now in 0..5 {
            assert!(matches!(
                gate.admit(&identity, now).expect("admit"),
                Admission::Granted(AdmissionGrant {
                    remaining_quota: None,
                    ..
                })
            ));
        }
        assert_eq!(stores.ledger.entry(&identity), None);
    }

    #[test]
    fn functional_linked_account_gate_requires_link_and_prefers_account_key() {
        let temp = tempdir().expect("tempdir");
        let stores = stores_in(temp.path(), 5);
        std::fs::write(
            temp.path().join("user_map.json"),
            json!({"acct-1": {"api_key": "key-linked"}}).to_string(),
        )
        .expect("registry");
        let gate = LinkedAccountGate::new(
            stores.connections.clone(),
            stores.credentials.clone(),
            stores.ledger.clone(),
        );
        let identity = Identity::from(42_i64);

        assert_eq!(
            gate.admit(&identity, 10).expect("unlinked"),
            Admission::Rejected(AdmissionRejection::NotLinked)
        );
        assert_eq!(stores.credentials.fetch(&identity), None);

        std::fs::write(
            temp.path().join("connections.json"),
            json!({"acct-1": {"identity": 42, "linked_at": 5}}).to_string(),
        )
        .expect("connections");
        assert_eq!(
            gate.admit(&identity, 11).expect("linked"),
            Admission::Granted(AdmissionGrant {
                credential: "key-linked".to_string(),
                free_tier_provisioned: false,
                remaining_quota: None,
            })
        );
    }

    #[test]
    fn regression_linked_account_without_registry_key_falls_back_to_credential_gate() {
        let temp = tempdir().expect("tempdir");
        let stores = stores_in(temp.path(), 5);
        std::fs::write(
            temp.path().join("connections.json"),
            json!({"acct-9": {"identity": "42"}}).to_string(),
        )
        .expect("connections");
        let gate = LinkedAccountGate::new(
            stores.connections.clone(),
            stores.credentials.clone(),
            stores.ledger.clone(),
        );

        assert_eq!(
            gate.admit(&Identity::from(42_i64), 10).expect("admit"),
            Admission::Granted(AdmissionGrant {
                credential: DEFAULT_FREE_TIER_TOKEN.to_string(),
                free_tier_provisioned: true,
                remaining_quota: Some(4),
            })
        );
    }

    #[test]
    fn unit_gates_follow_configured_policies() {
        let temp = tempdir().expect("tempdir");
        let stores = stores_in(temp.path(), 5);
        let gates = AdmissionGates::new(
            AdmissionPolicies::default(),
            &stores.credentials,
            &stores.connections,
            &stores.ledger,
        );
        assert_eq!(
            gates.gate_for(CommandKind::InstagramLookup).policy(),
            AdmissionPolicy::Credential
        );
        assert_eq!(
            gates.gate_for(CommandKind::InstagramReport).policy(),
            AdmissionPolicy::LinkedAccount
        );

        let swapped = gates.with_gate(
            CommandKind::InstagramLookup,
            Arc::new(LinkedAccountGate::new(
                stores.connections.clone(),
                stores.credentials.clone(),
                stores.ledger.clone(),
            )),
        );
        assert_eq!(
            swapped.gate_for(CommandKind::InstagramLookup).policy(),
            AdmissionPolicy::LinkedAccount
        );
    }
}
