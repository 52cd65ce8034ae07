//! Free-tier quota ledger with a fixed wall-clock window per identity.
//!
//! The window is not sliding: it restarts lazily on the first access after
//! `reset_at`, so a burst straddling the boundary can reach `2 * quota`
//! requests in a short span. Clock skew is not compensated.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vaul3t_core::is_past_deadline;
use vaul3t_core::FlatTable;

use crate::identity::Identity;

pub const FREE_TIER_QUOTA: u32 = 5;
pub const FREE_TIER_WINDOW_SECONDS: u64 = 3_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub quota: u32,
    pub window_seconds: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            quota: FREE_TIER_QUOTA,
            window_seconds: FREE_TIER_WINDOW_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed { remaining: u32, reset_at: u64 },
    Exceeded { reset_at: u64 },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[derive(Debug)]
pub struct RateLimitLedger {
    table: FlatTable<RateLimitEntry>,
    policy: RateLimitPolicy,
}

impl RateLimitLedger {
    pub fn new(path: impl Into<PathBuf>, policy: RateLimitPolicy) -> Self {
        Self {
            table: FlatTable::open(path),
            policy,
        }
    }

    /// Consumes one request from the identity's window if any remain.
    ///
    /// Read, reset, check and increment happen under the table lock, so two
    /// calls for the same identity can never both take the last slot.
    pub fn try_consume(&self, identity: &Identity, now_unix: u64) -> Result<QuotaDecision> {
        let policy = self.policy;
        let decision = self.table.update(identity.as_str(), |current| {
            apply_consume(current, policy, now_unix)
        })?;
        debug!(identity = %identity, ?decision, "free-tier quota check");
        Ok(decision)
    }

    pub fn entry(&self, identity: &Identity) -> Option<RateLimitEntry> {
        self.table.get(identity.as_str())
    }
}

fn apply_consume(
    current: Option<RateLimitEntry>,
    policy: RateLimitPolicy,
    now_unix: u64,
) -> (RateLimitEntry, QuotaDecision) {
    let fresh = RateLimitEntry {
        count: 0,
        reset_at: now_unix.saturating_add(policy.window_seconds),
    };
    let mut entry = match current {
        Some(entry) if !is_past_deadline(entry.reset_at, now_unix) => entry,
        _ => fresh,
    };

    if entry.count >= policy.quota {
        return (
            entry,
            QuotaDecision::Exceeded {
                reset_at: entry.reset_at,
            },
        );
    }
    entry.count = entry.count.saturating_add(1);
    (
        entry,
        QuotaDecision::Allowed {
            remaining: policy.quota.saturating_sub(entry.count),
            reset_at: entry.reset_at,
        },
    )
}
