//! Long-polling runtime that feeds Telegram updates into the dispatcher.
//!
//! Each poll batch is grouped per identity. One task runs each identity's
//! events in arrival order and is chained behind that identity's previous
//! task, so a slow remote call only delays its own identity.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vaul3t_access::Identity;
use vaul3t_core::current_unix_timestamp;

use crate::dispatcher::GatedDispatcher;
use crate::events::{parse_telegram_update, InboundEvent};
use crate::telegram::TelegramApiClient;

#[derive(Debug, Clone)]
pub struct TelegramRuntimeConfig {
    pub poll_timeout_seconds: u64,
    pub error_backoff: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollCycleReport {
    pub updates: usize,
    pub dispatched: usize,
    pub skipped: usize,
}

pub struct TelegramRuntime {
    client: Arc<TelegramApiClient>,
    dispatcher: Arc<GatedDispatcher>,
    config: TelegramRuntimeConfig,
    next_offset: u64,
    tails: HashMap<Identity, JoinHandle<()>>,
}

impl TelegramRuntime {
    pub fn new(
        client: Arc<TelegramApiClient>,
        dispatcher: Arc<GatedDispatcher>,
        config: TelegramRuntimeConfig,
    ) -> Self {
        Self {
            client,
            dispatcher,
            config,
            next_offset: 0,
            tails: HashMap::new(),
        }
    }

    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Polls until ctrl-c, then waits for in-flight events to finish.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            poll_timeout_seconds = self.config.poll_timeout_seconds,
            "telegram polling started"
        );
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("telegram polling shutdown requested");
                    break;
                }
                result = self.poll_once() => {
                    match result {
                        Ok(report) if report.updates > 0 => {
                            debug!(?report, "telegram poll cycle");
                        }
                        Ok(_) => {}
                        Err(error) => {
                            warn!(error = %error, "telegram poll failed");
                            tokio::select! {
                                _ = tokio::signal::ctrl_c() => {
                                    info!("telegram polling shutdown requested");
                                    break;
                                }
                                _ = tokio::time::sleep(self.config.error_backoff) => {}
                            }
                        }
                    }
                }
            }
        }
        self.drain().await;
        Ok(())
    }

    /// Fetches one batch, advances the offset past it, and schedules its events.
    pub async fn poll_once(&mut self) -> Result<PollCycleReport> {
        let updates = self
            .client
            .get_updates(self.next_offset, self.config.poll_timeout_seconds)
            .await?;
        self.next_offset = next_offset_after(self.next_offset, &updates);

        let mut report = PollCycleReport {
            updates: updates.len(),
            ..PollCycleReport::default()
        };
        let mut events = Vec::with_capacity(updates.len());
        for update in &updates {
            match parse_telegram_update(update) {
                Some(event) => events.push(event),
                None => {
                    report.skipped = report.skipped.saturating_add(1);
                    let update_id = update.get("update_id").and_then(Value::as_u64);
                    debug!(?update_id, "skipping unsupported telegram update");
                }
            }
        }
        report.dispatched = events.len();
        self.schedule(events);
        Ok(report)
    }

    /// Waits for every scheduled identity task.
    pub async fn drain(&mut self) {
        for (identity, handle) in self.tails.drain() {
            if let Err(error) = handle.await {
                warn!(identity = %identity, error = %error, "identity task failed");
            }
        }
    }

    fn schedule(&mut self, events: Vec<InboundEvent>) {
        self.tails.retain(|_, handle| !handle.is_finished());
        for (identity, batch) in group_by_identity(events) {
            let previous = self.tails.remove(&identity);
            let client = Arc::clone(&self.client);
            let dispatcher = Arc::clone(&self.dispatcher);
            let task_identity = identity.clone();
            let handle = tokio::spawn(async move {
                if let Some(previous) = previous {
                    if let Err(error) = previous.await {
                        warn!(identity = %task_identity, error = %error, "previous identity task failed");
                    }
                }
                for event in batch {
                    dispatcher
                        .handle(&*client, event, current_unix_timestamp())
                        .await;
                }
            });
            self.tails.insert(identity, handle);
        }
    }
}

/// Groups events per identity, keeping first-seen identity order and
/// per-identity arrival order.
pub fn group_by_identity(events: Vec<InboundEvent>) -> Vec<(Identity, Vec<InboundEvent>)> {
    let mut groups: Vec<(Identity, Vec<InboundEvent>)> = Vec::new();
    for event in events {
        match groups
            .iter_mut()
            .find(|(identity, _)| identity == &event.identity)
        {
            Some((_, batch)) => batch.push(event),
            None => groups.push((event.identity.clone(), vec![event])),
        }
    }
    groups
}

fn next_offset_after(current: u64, updates: &[Value]) -> u64 {
    updates
        .iter()
        .filter_map(|update| update.get("update_id").and_then(Value::as_u64))
        .map(|update_id| update_id.saturating_add(1))
        .fold(current, u64::max)
}
