//! # Delivery bridge
//!
//! Moves stored, undelivered messages into running agents' mailboxes. Runs as
//! one background loop; [`DeliveryBridge::tick`] is a single pass and can be
//! driven directly.
//!
//! Delivery is at-least-once: a message is marked delivered only after it sits
//! in the mailbox. Agents drop the duplicates this can produce.

use colony_config::BridgeConfig;
use colony_core::{AgentId, ColonyError, Event};
use colony_store::retry_with_backoff;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::supervisor::Runtime;

/// Outcome of one bridge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Messages placed into mailboxes.
    pub delivered: usize,
    /// Messages loaded but left pending for a later pass.
    pub deferred: usize,
    /// Store calls that failed after retries.
    pub failed: usize,
}

pub struct DeliveryBridge {
    runtime: Runtime,
    interval: Duration,
    batch_size: usize,
    /// Agents currently refusing deliveries; warned about once per run.
    saturated: Mutex<HashSet<AgentId>>,
    store_failing: AtomicBool,
}

impl DeliveryBridge {
    pub fn new(runtime: Runtime, config: &BridgeConfig) -> Self {
        Self {
            runtime,
            interval: config.interval(),
            batch_size: config.batch_size.max(1),
            saturated: Mutex::new(HashSet::new()),
            store_failing: AtomicBool::new(false),
        }
    }

    /// Run until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_ms = self.interval.as_millis() as u64,
            batch_size = self.batch_size,
            "delivery bridge started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    if report.delivered > 0 || report.deferred > 0 {
                        debug!(
                            delivered = report.delivered,
                            deferred = report.deferred,
                            failed = report.failed,
                            "bridge pass"
                        );
                    }
                }
            }
        }

        info!("delivery bridge stopped");
    }

    /// One pass over every running agent.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        let mut store_error: Option<ColonyError> = None;
        let store = self.runtime.store();
        let policy = self.runtime.retry_policy();

        for agent_id in self.runtime.running_agents() {
            let Some(epoch) = self.runtime.backlog_epoch(&agent_id) else {
                continue;
            };

            let pending = match retry_with_backoff("load_pending_messages", policy, || {
                store.load_pending_messages(&agent_id, self.batch_size)
            })
            .await
            {
                Ok(pending) => pending,
                Err(e) => {
                    report.failed += 1;
                    store_error = Some(e);
                    continue;
                }
            };

            let loaded = pending.len();
            let mut placed = 0;
            let mut refused: Option<ColonyError> = None;
            for message in pending {
                let message_id = message.id;
                if let Err(e) = self.runtime.deliver(&agent_id, message) {
                    refused = Some(e);
                    break;
                }
                placed += 1;
                if let Err(e) =
                    retry_with_backoff("mark_delivered", policy, || store.mark_delivered(message_id))
                        .await
                {
                    report.failed += 1;
                    store_error = Some(e);
                }
                self.runtime.events().publish(Event::MessageDelivered {
                    message_id,
                    receiver: agent_id.clone(),
                });
            }

            let remaining = loaded - placed;
            report.delivered += placed;
            report.deferred += remaining;
            self.runtime.note_delivered(&agent_id, placed);

            match refused {
                Some(e) => {
                    self.runtime.hold_backlog(&agent_id, remaining);
                    self.note_saturated(&agent_id, remaining, &e);
                }
                None => {
                    self.note_clear(&agent_id);
                    if loaded < self.batch_size {
                        self.runtime.backlog_drained(&agent_id, epoch);
                    }
                }
            }
        }

        self.note_store_health(store_error);
        report
    }

    fn note_saturated(&self, agent_id: &str, remaining: usize, cause: &ColonyError) {
        if !self.saturated.lock().insert(agent_id.to_string()) {
            return;
        }
        warn!(agent_id, pending = remaining, error = %cause, "agent not accepting deliveries");
        self.runtime.events().publish(Event::DeliverySaturated {
            agent_id: agent_id.to_string(),
            pending: remaining,
        });
    }

    fn note_clear(&self, agent_id: &str) {
        if self.saturated.lock().remove(agent_id) {
            info!(agent_id, "agent accepting deliveries again");
        }
    }

    fn note_store_health(&self, error: Option<ColonyError>) {
        match error {
            Some(e) => {
                if !self.store_failing.swap(true, Ordering::Relaxed) {
                    error!(error = %e, "delivery bridge cannot reach the store");
                }
            }
            None => {
                if self.store_failing.swap(false, Ordering::Relaxed) {
                    info!("delivery bridge store access recovered");
                }
            }
        }
    }
}
