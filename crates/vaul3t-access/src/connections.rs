//! Linked external accounts and one-time link secrets.
//!
//! `connections.json` maps external account ids to the identity that linked
//! them. It is written by the remote site when a handshake completes; this
//! crate only reads it, lazily, on each check. `pending_connections.json`
//! holds the secrets issued by [`ConnectionRegistry::begin_link`]. Pending
//! secrets never expire here.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;
use vaul3t_core::FlatTable;

use crate::identity::Identity;

pub const LINK_SECRET_BYTES: usize = 20;

/// Completed link written by the remote site, keyed by external account id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub identity: Identity,
    #[serde(default)]
    pub linked_at: u64,
}

/// Link handshake started by an identity, keyed by its secret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingConnection {
    pub identity: Identity,
    pub created_at: u64,
}

#[derive(Debug, Clone)]
pub struct ConnectionRegistryConfig {
    pub connections_path: PathBuf,
    pub pending_path: PathBuf,
    pub site_base: String,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    AlreadyConnected {
        external_account_id: String,
    },
    Pending {
        secret: String,
        handshake_url: String,
    },
}

#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: FlatTable<ConnectionRecord>,
    pending: FlatTable<PendingConnection>,
    site_base: String,
    provider: String,
}

impl ConnectionRegistry {
    pub fn new(config: ConnectionRegistryConfig) -> Self {
        Self {
            connections: FlatTable::open(config.connections_path),
            pending: FlatTable::open(config.pending_path),
            site_base: config.site_base.trim().trim_end_matches('/').to_string(),
            provider: config.provider.trim().to_string(),
        }
    }

    /// External account linked to `identity`, found by linear scan.
    pub fn linked_account(&self, identity: &Identity) -> Option<String> {
        let mut matches = self
            .connections
            .entries()
            .into_iter()
            .filter(|(_, record)| &record.identity == identity)
            .map(|(account_id, _)| account_id);
        let first = matches.next()?;
        let extra = matches.count();
        if extra > 0 {
            warn!(
                identity = %identity,
                account = first.as_str(),
                extra,
                "identity linked to more than one external account; using the first"
            );
        }
        Some(first)
    }

    pub fn is_linked(&self, identity: &Identity) -> bool {
        self.linked_account(identity).is_some()
    }

    /// Issues a fresh link secret unless the identity is already linked.
    pub fn begin_link(&self, identity: &Identity, now_unix: u64) -> Result<LinkOutcome> {
        if let Some(external_account_id) = self.linked_account(identity) {
            return Ok(LinkOutcome::AlreadyConnected {
                external_account_id,
            });
        }

        let secret = generate_link_secret();
        let handshake_url = self.handshake_url(&secret)?;
        self.pending.upsert(
            &secret,
            PendingConnection {
                identity: identity.clone(),
                created_at: now_unix,
            },
        )?;
        info!(identity = %identity, "issued link secret");
        Ok(LinkOutcome::Pending {
            secret,
            handshake_url,
        })
    }

    /// Pending secrets issued to `identity`, in issue order.
    pub fn pending_links(&self, identity: &Identity) -> Vec<(String, PendingConnection)> {
        self.pending
            .entries()
            .into_iter()
            .filter(|(_, pending)| &pending.identity == identity)
            .collect()
    }

    pub fn handshake_url(&self, secret: &str) -> Result<String> {
        if self.site_base.is_empty() {
            bail!("link site base cannot be empty");
        }
        let mut url = Url::parse(&format!("{}/connect/account", self.site_base))
            .with_context(|| format!("invalid link site base '{}'", self.site_base))?;
        url.query_pairs_mut()
            .append_pair("provider", &self.provider)
            .append_pair("sha", secret);
        Ok(url.to_string())
    }
}

fn generate_link_secret() -> String {
    let mut bytes = [0_u8; LINK_SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
