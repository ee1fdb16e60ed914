//! # Runtime
//!
//! The supervisor: tracks every registered agent, owns the live execution
//! units, and routes messages. A [`Runtime`] is a cheap handle; clone it
//! wherever agents, the bridge, or an admin surface need it.
//!
//! The registry is the only shared mutable state. Its lock is never held
//! across an `.await`.

use colony_config::RuntimeConfig;
use colony_core::{
    AgentId, AgentKind, AgentRecord, AgentStatus, ColonyError, Event, EventBus, Message, MessageId,
    Result,
};
use colony_llm::Reasoner;
use colony_store::{RetryPolicy, Store, retry_with_backoff};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{AgentState, AgentWorker, BdiSnapshot};
use crate::deliberation::{ReasonerTimeouts, strategy_for};
use crate::mailbox::{Mailbox, mailbox};
use crate::metrics::{AgentMetrics, AgentMetricsSnapshot};

/// Summary row returned by [`Runtime::list`].
#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub id: AgentId,
    pub name: String,
    pub kind: AgentKind,
    pub status: AgentStatus,
    pub mailbox_depth: usize,
}

struct AgentEntry {
    record: AgentRecord,
    status: AgentStatus,
    /// Bumped on every start; stale workers cannot touch a newer unit.
    generation: u64,
    mailbox: Option<Mailbox>,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
    /// Stored messages may be waiting for the bridge. While set, `send` leaves
    /// new messages in the store so they queue behind the older ones.
    backlog: bool,
    /// Bumped whenever something may have added to the backlog.
    backlog_epoch: u64,
    /// Estimate of messages waiting for the bridge.
    deferred: usize,
    metrics: Arc<AgentMetrics>,
    snapshot: Arc<RwLock<BdiSnapshot>>,
}

impl AgentEntry {
    fn new(record: AgentRecord) -> Self {
        let snapshot = BdiSnapshot::initial(&record);
        Self {
            record,
            status: AgentStatus::Idle,
            generation: 0,
            mailbox: None,
            cancel: None,
            handle: None,
            backlog: true,
            backlog_epoch: 0,
            deferred: 0,
            metrics: Arc::new(AgentMetrics::new()),
            snapshot: Arc::new(RwLock::new(snapshot)),
        }
    }

    fn set_status(&mut self, status: AgentStatus) {
        self.status = status;
        self.record.status = status;
    }

    fn queue_backlog(&mut self) {
        self.backlog = true;
        self.backlog_epoch += 1;
        self.deferred += 1;
    }

    fn mailbox_depth(&self) -> usize {
        self.mailbox.as_ref().map(Mailbox::depth).unwrap_or(0)
    }
}

struct RuntimeInner {
    config: RuntimeConfig,
    store: Arc<dyn Store>,
    events: EventBus,
    reasoner: Option<Arc<dyn Reasoner>>,
    timeouts: ReasonerTimeouts,
    retry: RetryPolicy,
    entries: Mutex<HashMap<AgentId, AgentEntry>>,
}

/// Builder for a [`Runtime`].
pub struct RuntimeBuilder {
    store: Arc<dyn Store>,
    config: RuntimeConfig,
    reasoner: Option<Arc<dyn Reasoner>>,
    timeouts: ReasonerTimeouts,
    retry: RetryPolicy,
    events: Option<EventBus>,
}

impl RuntimeBuilder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            config: RuntimeConfig::default(),
            reasoner: None,
            timeouts: ReasonerTimeouts::default(),
            retry: RetryPolicy::default(),
            events: None,
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn reasoner(mut self, reasoner: Arc<dyn Reasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    pub fn timeouts(mut self, timeouts: ReasonerTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Runtime {
        let events = self
            .events
            .unwrap_or_else(|| EventBus::new(self.config.event_capacity.max(16)));
        Runtime {
            inner: Arc::new(RuntimeInner {
                config: self.config,
                store: self.store,
                events,
                reasoner: self.reasoner,
                timeouts: self.timeouts,
                retry: self.retry,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }
}

/// Handle to the agent supervisor.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    pub fn builder(store: Arc<dyn Store>) -> RuntimeBuilder {
        RuntimeBuilder::new(store)
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// Track a new agent without starting it.
    pub async fn register(&self, record: AgentRecord) -> Result<()> {
        {
            let mut entries = self.inner.entries.lock();
            if entries.contains_key(&record.id) {
                return Err(ColonyError::AlreadyRegistered(record.id));
            }
            entries.insert(record.id.clone(), AgentEntry::new(record.clone()));
        }
        info!(agent_id = %record.id, kind = %record.kind, "agent registered");
        self.inner.events.publish(Event::AgentRegistered {
            agent_id: record.id.clone(),
            agent_kind: record.kind,
        });
        self.persist(&record).await;
        Ok(())
    }

    /// Start (or restart) an agent, registering it first if needed.
    pub async fn start(&self, record: AgentRecord) -> Result<()> {
        if record.kind == AgentKind::Cognitive && self.inner.reasoner.is_none() {
            return Err(ColonyError::ReasonerUnavailable(record.id));
        }
        let id = record.id.clone();

        let (newly_registered, epoch, persisted) = {
            let mut entries = self.inner.entries.lock();
            if let Some(existing) = entries.get(&id)
                && existing.status.is_live()
            {
                return Err(ColonyError::AlreadyRunning(id));
            }
            let newly_registered = !entries.contains_key(&id);
            let entry = entries
                .entry(id.clone())
                .or_insert_with(|| AgentEntry::new(record.clone()));

            entry.record = record;
            entry.generation += 1;
            entry.set_status(AgentStatus::Running);
            entry.backlog = true;
            entry.backlog_epoch += 1;
            entry.metrics = Arc::new(AgentMetrics::new());
            entry.snapshot = Arc::new(RwLock::new(BdiSnapshot::initial(&entry.record)));

            let (tx, rx) = mailbox(id.clone(), self.inner.config.mailbox_capacity);
            let cancel = CancellationToken::new();
            let worker = self.worker(entry, rx, cancel.clone());
            entry.mailbox = Some(tx);
            entry.cancel = Some(cancel);
            entry.handle = Some(tokio::spawn(worker.run()));

            (newly_registered, entry.backlog_epoch, entry.record.clone())
        };

        if newly_registered {
            self.inner.events.publish(Event::AgentRegistered {
                agent_id: id.clone(),
                agent_kind: persisted.kind,
            });
        }
        self.inner.events.publish(Event::AgentStarted {
            agent_id: id.clone(),
        });

        // Messages stored while the agent was down stay queued for the bridge.
        let store = self.store();
        match retry_with_backoff("pending_count", self.inner.retry, || store.pending_count(&id))
            .await
        {
            Ok(0) => self.backlog_drained(&id, epoch),
            Ok(n) => {
                debug!(agent_id = %id, pending = n, "agent has stored messages awaiting delivery");
                if let Some(entry) = self.inner.entries.lock().get_mut(&id) {
                    entry.deferred = n;
                }
            }
            Err(e) => warn!(agent_id = %id, error = %e, "could not count pending messages"),
        }

        self.persist(&persisted).await;
        Ok(())
    }

    fn worker(
        &self,
        entry: &AgentEntry,
        rx: tokio::sync::mpsc::Receiver<Message>,
        cancel: CancellationToken,
    ) -> AgentWorker {
        let config = &self.inner.config;
        let strategy = strategy_for(
            entry.record.kind,
            self.inner.reasoner.clone(),
            config,
            self.inner.timeouts,
        );
        AgentWorker {
            record: entry.record.clone(),
            generation: entry.generation,
            state: AgentState::from_record(&entry.record),
            rx,
            runtime: self.clone(),
            strategy,
            reasoner: self.inner.reasoner.clone(),
            timeouts: self.inner.timeouts,
            config: config.clone(),
            metrics: entry.metrics.clone(),
            snapshot: entry.snapshot.clone(),
            cancel,
        }
    }

    /// Stop a running agent, aborting it if it overruns the grace period.
    pub async fn stop(&self, id: &str) -> Result<()> {
        let (cancel, handle) = {
            let mut entries = self.inner.entries.lock();
            let entry = entries
                .get_mut(id)
                .filter(|e| e.status == AgentStatus::Running)
                .ok_or_else(|| ColonyError::NotRunning(id.to_string()))?;
            entry.set_status(AgentStatus::Stopping);
            (entry.cancel.take(), entry.handle.take())
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }

        let mut forced = false;
        if let Some(mut handle) = handle {
            match tokio::time::timeout(self.inner.config.stop_grace(), &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(agent_id = %id, error = %e, "agent worker ended abnormally"),
                Err(_) => {
                    warn!(
                        agent_id = %id,
                        grace_ms = self.inner.config.stop_grace_ms,
                        "agent ignored cancellation, aborting"
                    );
                    handle.abort();
                    // Resolves once the task is gone; the only error left is the cancellation.
                    let _ = handle.await;
                    forced = true;
                }
            }
        }

        let record = {
            let mut entries = self.inner.entries.lock();
            entries.get_mut(id).map(|entry| {
                entry.set_status(AgentStatus::Stopped);
                entry.mailbox = None;
                entry.backlog = true;
                entry.backlog_epoch += 1;
                entry.record.clone()
            })
        };

        info!(agent_id = %id, forced, "agent stopped");
        self.inner.events.publish(Event::AgentStopped {
            agent_id: id.to_string(),
            forced,
        });
        if let Some(record) = record {
            self.persist(&record).await;
        }
        Ok(())
    }

    /// Stop every running agent concurrently. Returns how many were stopped.
    pub async fn stop_all(&self) -> usize {
        let ids = self.running_agents();
        let results = futures::future::join_all(ids.iter().map(|id| self.stop(id))).await;
        results.into_iter().filter(Result::is_ok).count()
    }

    /// Stop everything and announce the shutdown.
    pub async fn shutdown(&self) {
        let stopped = self.stop_all().await;
        info!(stopped, "runtime shut down");
        self.inner.events.publish(Event::Shutdown);
    }

    /// Called by a worker whose error budget ran out.
    pub(crate) async fn mark_failed(&self, id: &str, generation: u64, reason: String) {
        let record = {
            let mut entries = self.inner.entries.lock();
            match entries.get_mut(id) {
                Some(entry)
                    if entry.generation == generation && entry.status == AgentStatus::Running =>
                {
                    entry.set_status(AgentStatus::Error);
                    entry.mailbox = None;
                    entry.cancel = None;
                    entry.handle = None;
                    entry.backlog = true;
                    entry.backlog_epoch += 1;
                    Some(entry.record.clone())
                }
                _ => None,
            }
        };
        let Some(record) = record else {
            return;
        };
        self.inner.events.publish(Event::AgentFailed {
            agent_id: id.to_string(),
            reason,
        });
        self.persist(&record).await;
    }

    async fn persist(&self, record: &AgentRecord) {
        let store = self.store();
        if let Err(e) =
            retry_with_backoff("save_agent", self.inner.retry, || store.save_agent(record)).await
        {
            warn!(agent_id = %record.id, error = %e, "could not persist agent record");
        }
    }

    // ── Messaging ──────────────────────────────────────────────

    /// Send `message` from `from` to `to`.
    ///
    /// The message is stored first. A running receiver with no backlog gets it
    /// placed right away; otherwise it waits in the store for the bridge.
    pub async fn send(&self, from: &str, to: &str, mut message: Message) -> Result<MessageId> {
        if !self.inner.entries.lock().contains_key(to) {
            return Err(ColonyError::UnknownReceiver(to.to_string()));
        }
        message.sender = from.to_string();
        message.receiver = to.to_string();
        message.delivered = false;
        let id = message.id;

        let store = self.store();
        retry_with_backoff("save_message", self.inner.retry, || store.save_message(&message))
            .await?;

        let placed = {
            let mut entries = self.inner.entries.lock();
            let entry = entries
                .get_mut(to)
                .ok_or_else(|| ColonyError::UnknownReceiver(to.to_string()))?;
            let direct = match (&entry.mailbox, entry.status, entry.backlog) {
                (Some(mailbox), AgentStatus::Running, false) => {
                    match mailbox.try_deliver(message) {
                        Ok(()) => true,
                        Err(e) => {
                            debug!(receiver = %to, error = %e, "direct placement failed, queueing");
                            false
                        }
                    }
                }
                _ => false,
            };
            if !direct {
                entry.queue_backlog();
            }
            direct
        };

        if placed {
            if let Err(e) =
                retry_with_backoff("mark_delivered", self.inner.retry, || store.mark_delivered(id))
                    .await
            {
                warn!(message_id = %id, error = %e, "placed message could not be marked delivered");
            }
            self.inner.events.publish(Event::MessageDelivered {
                message_id: id,
                receiver: to.to_string(),
            });
        } else {
            self.inner.events.publish(Event::MessageQueued {
                message_id: id,
                receiver: to.to_string(),
            });
        }
        Ok(id)
    }

    /// Place a stored message into a running agent's mailbox.
    pub(crate) fn deliver(&self, id: &str, message: Message) -> Result<()> {
        let entries = self.inner.entries.lock();
        match entries.get(id) {
            Some(AgentEntry {
                status: AgentStatus::Running,
                mailbox: Some(mailbox),
                ..
            }) => mailbox.try_deliver(message),
            _ => Err(ColonyError::NotRunning(id.to_string())),
        }
    }

    pub(crate) fn backlog_epoch(&self, id: &str) -> Option<u64> {
        self.inner.entries.lock().get(id).map(|e| e.backlog_epoch)
    }

    /// The bridge found nothing left in the store for `id`. Ignored when
    /// something was queued since `epoch` was read.
    pub(crate) fn backlog_drained(&self, id: &str, epoch: u64) {
        if let Some(entry) = self.inner.entries.lock().get_mut(id)
            && entry.backlog_epoch == epoch
            && entry.status == AgentStatus::Running
        {
            entry.backlog = false;
            entry.deferred = 0;
        }
    }

    /// The bridge left `remaining` stored messages behind; later sends queue after them.
    pub(crate) fn hold_backlog(&self, id: &str, remaining: usize) {
        if let Some(entry) = self.inner.entries.lock().get_mut(id) {
            entry.backlog = true;
            entry.backlog_epoch += 1;
            entry.deferred = entry.deferred.max(remaining);
        }
    }

    pub(crate) fn note_delivered(&self, id: &str, n: usize) {
        if let Some(entry) = self.inner.entries.lock().get_mut(id) {
            entry.deferred = entry.deferred.saturating_sub(n);
        }
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn list(&self) -> Vec<AgentInfo> {
        let entries = self.inner.entries.lock();
        let mut infos: Vec<AgentInfo> = entries
            .values()
            .map(|e| AgentInfo {
                id: e.record.id.clone(),
                name: e.record.name.clone(),
                kind: e.record.kind,
                status: e.status,
                mailbox_depth: e.mailbox_depth(),
            })
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    pub fn status(&self, id: &str) -> Option<AgentStatus> {
        self.inner.entries.lock().get(id).map(|e| e.status)
    }

    /// Latest committed BDI state of an agent.
    pub fn snapshot(&self, id: &str) -> Option<BdiSnapshot> {
        let snapshot = self.inner.entries.lock().get(id).map(|e| e.snapshot.clone())?;
        let copy = snapshot.read().clone();
        Some(copy)
    }

    pub fn metrics(&self) -> Vec<AgentMetricsSnapshot> {
        let entries = self.inner.entries.lock();
        let mut all: Vec<AgentMetricsSnapshot> = entries
            .values()
            .map(|e| {
                e.metrics
                    .snapshot(&e.record.id, e.status, e.mailbox_depth(), e.deferred)
            })
            .collect();
        all.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        all
    }

    pub fn metrics_for(&self, id: &str) -> Option<AgentMetricsSnapshot> {
        self.inner
            .entries
            .lock()
            .get(id)
            .map(|e| e.metrics.snapshot(id, e.status, e.mailbox_depth(), e.deferred))
    }

    /// Agents with a live execution unit (running or stopping).
    pub fn live_count(&self) -> usize {
        self.inner
            .entries
            .lock()
            .values()
            .filter(|e| e.status.is_live())
            .count()
    }

    pub fn running_agents(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self
            .inner
            .entries
            .lock()
            .values()
            .filter(|e| e.status == AgentStatus::Running)
            .map(|e| e.record.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.inner.store.clone()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.retry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }
}
