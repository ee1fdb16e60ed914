#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use colony_config::{BridgeConfig, RuntimeConfig};
    use colony_core::{
        AgentKind, AgentRecord, Event, Message, MessageId, Performative, Priority, Result, Task,
    };
    use colony_llm::{DecisionPayload, Reasoner, ReasonerContext, ReasoningTier};
    use colony_runtime::{DeliveryBridge, Runtime, TickReport};
    use colony_store::{MemoryStore, RetryPolicy, Store};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::{Notify, broadcast};
    use tokio_util::sync::CancellationToken;

    /// Blocks inside its first decision until released.
    struct GateReasoner {
        entered: Notify,
        release: Notify,
        calls: AtomicUsize,
    }

    impl GateReasoner {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                entered: Notify::new(),
                release: Notify::new(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Reasoner for GateReasoner {
        async fn decide(&self, _ctx: &ReasonerContext, _tier: ReasoningTier) -> Result<DecisionPayload> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(DecisionPayload(Value::Null))
        }

        async fn reflect(&self, _ctx: &ReasonerContext) -> Result<DecisionPayload> {
            Ok(DecisionPayload::empty())
        }
    }

    fn setup(
        mailbox_capacity: usize,
        batch_size: usize,
        reasoner: Arc<GateReasoner>,
    ) -> (Runtime, Arc<MemoryStore>, Arc<DeliveryBridge>) {
        let store = Arc::new(MemoryStore::new());
        let config = RuntimeConfig {
            mailbox_capacity,
            tick_interval_ms: 10,
            stop_grace_ms: 1_000,
            reflect_every: 0,
            ..Default::default()
        };
        let runtime = Runtime::builder(store.clone())
            .config(config)
            .reasoner(reasoner)
            .retry_policy(RetryPolicy::none())
            .build();
        let bridge = DeliveryBridge::new(
            runtime.clone(),
            &BridgeConfig {
                interval_ms: 10,
                batch_size,
                ..Default::default()
            },
        );
        (runtime, store, Arc::new(bridge))
    }

    /// Start a cognitive agent and wait until it is stuck in its first reasoner call.
    async fn start_blocked(runtime: &Runtime, store: &MemoryStore, reasoner: &GateReasoner, id: &str) {
        let kickoff = Task::new("test", "kickoff", Priority::Low).assigned(id);
        store.save_task(&kickoff).await.unwrap();
        runtime
            .start(AgentRecord::new(id, AgentKind::Cognitive))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), reasoner.entered.notified())
            .await
            .expect("agent never reached the reasoner");
    }

    async fn store_messages(store: &MemoryStore, to: &str, n: usize) -> Vec<MessageId> {
        let mut ids = Vec::with_capacity(n);
        for i in 0..n {
            let msg = Message::new("src", to, Performative::Inform, json!({"n": i}));
            store.save_message(&msg).await.unwrap();
            ids.push(msg.id);
        }
        ids
    }

    async fn next_matching(
        rx: &mut broadcast::Receiver<Event>,
        mut pred: impl FnMut(&Event) -> bool,
    ) -> Event {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Ok(event) if pred(&event) => return event,
                    Ok(_) => continue,
                    Err(e) => panic!("event bus closed: {e}"),
                }
            }
        })
        .await
        .expect("expected event was not published")
    }

    // ── Backpressure ───────────────────────────────────────────

    mod backpressure {
        use super::*;

        #[tokio::test]
        async fn test_full_mailbox_leaves_rest_pending() {
            let reasoner = GateReasoner::new();
            let (rt, store, bridge) = setup(100, 150, reasoner.clone());
            let mut events = rt.events().subscribe();
            start_blocked(&rt, &store, &reasoner, "busy").await;

            store_messages(&store, "busy", 150).await;
            let report = bridge.tick().await;

            assert_eq!(
                report,
                TickReport {
                    delivered: 100,
                    deferred: 50,
                    failed: 0
                }
            );
            assert_eq!(store.pending_count("busy").await.unwrap(), 50);
            assert_eq!(rt.metrics_for("busy").unwrap().mailbox_depth, 100);

            let event = next_matching(&mut events, |e| matches!(e, Event::DeliverySaturated { .. })).await;
            assert!(matches!(event, Event::DeliverySaturated { pending: 50, .. }));

            // Still saturated: nothing new placed.
            let again = bridge.tick().await;
            assert_eq!(again.delivered, 0);
            assert_eq!(again.deferred, 50);

            reasoner.release.notify_one();
            rt.shutdown().await;
        }

        #[tokio::test]
        async fn test_backlog_preserves_send_order() {
            let reasoner = GateReasoner::new();
            let (rt, store, bridge) = setup(5, 100, reasoner.clone());
            let mut events = rt.events().subscribe();
            start_blocked(&rt, &store, &reasoner, "sink").await;

            let mut expected = store_messages(&store, "sink", 8).await;
            let first = bridge.tick().await;
            assert_eq!((first.delivered, first.deferred), (5, 3));

            // A fresh send must queue behind the stored backlog.
            let late = Message::new("src", "sink", Performative::Inform, json!({"n": "late"}));
            let late_id = rt.send("src", "sink", late).await.unwrap();
            expected.push(late_id);
            let queued = next_matching(&mut events, |e| {
                matches!(e, Event::MessageQueued { message_id, .. } | Event::MessageDelivered { message_id, .. } if *message_id == late_id)
            })
            .await;
            assert!(matches!(queued, Event::MessageQueued { .. }));

            let cancel = CancellationToken::new();
            let runner = {
                let bridge = bridge.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { bridge.run(cancel).await })
            };
            reasoner.release.notify_one();

            let mut consumed = Vec::new();
            while consumed.len() < expected.len() {
                let event = next_matching(&mut events, |e| matches!(e, Event::MessageConsumed { .. })).await;
                if let Event::MessageConsumed { message_id, .. } = event {
                    consumed.push(message_id);
                }
            }
            assert_eq!(consumed, expected);

            cancel.cancel();
            runner.await.unwrap();

            // Store drained: the next pass clears the backlog and sends go direct again.
            assert_eq!(store.pending_count("sink").await.unwrap(), 0);
            bridge.tick().await;
            let direct = Message::new("src", "sink", Performative::Inform, json!({"n": "direct"}));
            let direct_id = rt.send("src", "sink", direct).await.unwrap();
            let event = next_matching(&mut events, |e| {
                matches!(e, Event::MessageQueued { message_id, .. } | Event::MessageDelivered { message_id, .. } if *message_id == direct_id)
            })
            .await;
            assert!(matches!(event, Event::MessageDelivered { .. }));

            rt.shutdown().await;
        }
    }

    // ── Agent state ────────────────────────────────────────────

    mod agent_state {
        use super::*;

        #[tokio::test]
        async fn test_stopped_agents_are_skipped() {
            let reasoner = GateReasoner::new();
            let (rt, store, bridge) = setup(10, 50, reasoner);
            rt.register(AgentRecord::new("idle", AgentKind::Reflexive)).await.unwrap();
            store_messages(&store, "idle", 3).await;

            assert_eq!(bridge.tick().await, TickReport::default());
            assert_eq!(store.pending_count("idle").await.unwrap(), 3);
        }

        #[tokio::test]
        async fn test_messages_stored_while_down_arrive_after_start() {
            let reasoner = GateReasoner::new();
            let (rt, store, bridge) = setup(10, 50, reasoner);
            rt.register(AgentRecord::new("late", AgentKind::Reflexive)).await.unwrap();
            let msg = Message::new("src", "late", Performative::Inform, json!({"greeting": "hi"}));
            let id = rt.send("src", "late", msg).await.unwrap();

            let mut events = rt.events().subscribe();
            rt.start(AgentRecord::new("late", AgentKind::Reflexive)).await.unwrap();
            let report = bridge.tick().await;
            assert_eq!(report.delivered, 1);

            let event = next_matching(&mut events, |e| matches!(e, Event::MessageConsumed { .. })).await;
            assert!(matches!(event, Event::MessageConsumed { message_id, .. } if message_id == id));
            assert_eq!(store.pending_count("late").await.unwrap(), 0);
            rt.shutdown().await;
        }
    }
}
