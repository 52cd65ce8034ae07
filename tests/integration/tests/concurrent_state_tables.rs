use std::sync::Arc;
use std::thread;

use tempfile::tempdir;
use vaul3t_access::{
    CredentialStore, CredentialStoreConfig, Identity, QuotaDecision, RateLimitLedger,
    RateLimitPolicy, StateLayout, DEFAULT_FREE_TIER_TOKEN,
};

const NOW: u64 = 1_700_000_000;

fn credential_store(layout: &StateLayout) -> CredentialStore {
    CredentialStore::new(CredentialStoreConfig {
        tokens_path: layout.tokens_path.clone(),
        registry_path: layout.registry_path.clone(),
        default_token: DEFAULT_FREE_TIER_TOKEN.to_string(),
    })
}

#[test]
fn integration_concurrent_stores_for_distinct_identities_are_all_kept() {
    let temp = tempdir().expect("tempdir");
    let layout = StateLayout::for_state_dir(temp.path());
    layout.create_dirs().expect("dirs");
    let store = Arc::new(credential_store(&layout));

    let workers = (0..16_i64)
        .map(|index| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store
                    .store(&Identity::from(index), &format!("token-{index}"))
                    .expect("store");
            })
        })
        .collect::<Vec<_>>();
    for worker in workers {
        worker.join().expect("worker");
    }

    let reopened = credential_store(&layout);
    for index in 0..16_i64 {
        assert_eq!(
            reopened.fetch(&Identity::from(index)),
            Some(format!("token-{index}"))
        );
    }
}

#[test]
fn integration_concurrent_provisioning_hands_out_one_default_token() {
    let temp = tempdir().expect("tempdir");
    let layout = StateLayout::for_state_dir(temp.path());
    layout.create_dirs().expect("dirs");
    let store = Arc::new(credential_store(&layout));
    let identity = Identity::from(42_i64);

    let workers = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let identity = identity.clone();
            thread::spawn(move || {
                store
                    .fetch_or_provision_default(&identity)
                    .expect("provision")
            })
        })
        .collect::<Vec<_>>();
    let resolved = workers
        .into_iter()
        .map(|worker| worker.join().expect("worker"))
        .collect::<Vec<_>>();

    assert_eq!(resolved.iter().filter(|entry| entry.provisioned).count(), 1);
    assert!(resolved
        .iter()
        .all(|entry| entry.token == DEFAULT_FREE_TIER_TOKEN));
}

#[test]
fn integration_concurrent_free_tier_requests_never_exceed_quota() {
    let temp = tempdir().expect("tempdir");
    let layout = StateLayout::for_state_dir(temp.path());
    layout.create_dirs().expect("dirs");
    let ledger = Arc::new(RateLimitLedger::new(
        layout.rate_limits_path.clone(),
        RateLimitPolicy::default(),
    ));
    let identity = Identity::from(7_i64);

    let workers = (0..12)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            let identity = identity.clone();
            thread::spawn(move || ledger.try_consume(&identity, NOW).expect("consume"))
        })
        .collect::<Vec<_>>();
    let decisions = workers
        .into_iter()
        .map(|worker| worker.join().expect("worker"))
        .collect::<Vec<_>>();

    assert_eq!(decisions.iter().filter(|d| d.is_allowed()).count(), 5);
    assert!(decisions
        .iter()
        .filter(|d| !d.is_allowed())
        .all(|d| *d == QuotaDecision::Exceeded { reset_at: NOW + 3_600 }));
    assert_eq!(ledger.entry(&identity).map(|entry| entry.count), Some(5));
}
