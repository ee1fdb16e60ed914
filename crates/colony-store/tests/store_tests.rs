#[cfg(test)]
mod tests {
    use colony_core::{
        AgentKind, AgentRecord, ColonyError, Message, Performative, Priority, Task, TaskStatus,
    };
    use colony_store::{MemoryStore, RetryPolicy, SqliteStore, Store, retry_with_backoff};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn msg(from: &str, to: &str, n: u32) -> Message {
        Message::new(from, to, Performative::Inform, json!({"n": n}))
    }

    fn backends() -> Vec<(&'static str, Box<dyn Store>)> {
        vec![
            ("memory", Box::new(MemoryStore::new())),
            ("sqlite", Box::new(SqliteStore::open_in_memory().unwrap())),
        ]
    }

    // ── Messages ───────────────────────────────────────────────

    mod messages {
        use super::*;

        #[tokio::test]
        async fn test_pending_messages_oldest_first() {
            for (name, store) in backends() {
                for n in 0..5 {
                    store.save_message(&msg("a", "b", n)).await.unwrap();
                }
                store.save_message(&msg("a", "c", 99)).await.unwrap();

                let pending = store.load_pending_messages("b", 10).await.unwrap();
                let order: Vec<u64> = pending.iter().map(|m| m.content["n"].as_u64().unwrap()).collect();
                assert_eq!(order, vec![0, 1, 2, 3, 4], "backend {name}");

                let limited = store.load_pending_messages("b", 2).await.unwrap();
                assert_eq!(limited.len(), 2, "backend {name}");
                assert_eq!(store.pending_count("c").await.unwrap(), 1, "backend {name}");
            }
        }

        #[tokio::test]
        async fn test_mark_delivered_removes_from_pending() {
            for (name, store) in backends() {
                let first = msg("a", "b", 1);
                let second = msg("a", "b", 2);
                store.save_message(&first).await.unwrap();
                store.save_message(&second).await.unwrap();

                assert!(store.mark_delivered(first.id).await.unwrap(), "backend {name}");
                // Second call is a no-op
                assert!(!store.mark_delivered(first.id).await.unwrap(), "backend {name}");

                let pending = store.load_pending_messages("b", 10).await.unwrap();
                assert_eq!(pending.len(), 1, "backend {name}");
                assert_eq!(pending[0].id, second.id, "backend {name}");
                assert_eq!(store.pending_count("b").await.unwrap(), 1, "backend {name}");

                let loaded = store.load_message(first.id).await.unwrap().unwrap();
                assert!(loaded.delivered, "backend {name}");
            }
        }

        #[tokio::test]
        async fn test_duplicate_save_is_noop() {
            for (name, store) in backends() {
                let m = msg("a", "b", 1);
                store.save_message(&m).await.unwrap();
                store.save_message(&m).await.unwrap();
                assert_eq!(store.pending_count("b").await.unwrap(), 1, "backend {name}");
            }
        }

        #[tokio::test]
        async fn test_message_fields_survive_storage() {
            for (name, store) in backends() {
                let original = Message::new("a", "b", Performative::Propose, json!({"price": 10}));
                let reply = original.reply(Performative::AcceptProposal, json!("ok"));
                store.save_message(&reply).await.unwrap();

                let loaded = store.load_message(reply.id).await.unwrap().unwrap();
                assert_eq!(loaded.sender, "b", "backend {name}");
                assert_eq!(loaded.performative, Performative::AcceptProposal, "backend {name}");
                assert_eq!(loaded.content, json!("ok"), "backend {name}");
                assert_eq!(loaded.conversation_id, original.conversation_id, "backend {name}");
                assert_eq!(loaded.in_reply_to, Some(original.id), "backend {name}");
            }
        }

        #[tokio::test]
        async fn test_mark_unknown_message() {
            for (name, store) in backends() {
                assert!(!store.mark_delivered(uuid::Uuid::new_v4()).await.unwrap(), "backend {name}");
            }
        }
    }

    // ── Tasks ──────────────────────────────────────────────────

    mod tasks {
        use super::*;

        #[tokio::test]
        async fn test_load_due_tasks_claims_by_priority() {
            for (name, store) in backends() {
                let low = Task::new("boss", "chore", Priority::Low).assigned("w1");
                let critical = Task::new("boss", "outage", Priority::Critical).assigned("w1");
                let other = Task::new("boss", "chore", Priority::High).assigned("w2");
                for t in [&low, &critical, &other] {
                    store.save_task(t).await.unwrap();
                }

                let due = store.load_due_tasks("w1", 10).await.unwrap();
                assert_eq!(due.len(), 2, "backend {name}");
                assert_eq!(due[0].id, critical.id, "backend {name}");
                assert!(due.iter().all(|t| t.status == TaskStatus::InProgress), "backend {name}");

                // Claimed tasks are not returned again
                assert!(store.load_due_tasks("w1", 10).await.unwrap().is_empty(), "backend {name}");
                let stored = store.get_task(low.id).await.unwrap().unwrap();
                assert_eq!(stored.status, TaskStatus::InProgress, "backend {name}");
            }
        }

        #[tokio::test]
        async fn test_load_due_tasks_respects_limit() {
            for (name, store) in backends() {
                for _ in 0..4 {
                    store
                        .save_task(&Task::new("boss", "chore", Priority::Medium).assigned("w"))
                        .await
                        .unwrap();
                }
                assert_eq!(store.load_due_tasks("w", 3).await.unwrap().len(), 3, "backend {name}");
                assert_eq!(store.load_due_tasks("w", 3).await.unwrap().len(), 1, "backend {name}");
            }
        }

        #[tokio::test]
        async fn test_save_task_result_once() {
            for (name, store) in backends() {
                let task = Task::new("boss", "report", Priority::High).assigned("w");
                store.save_task(&task).await.unwrap();

                let done = store
                    .save_task_result(task.id, json!({"rows": 3}), TaskStatus::Completed)
                    .await
                    .unwrap();
                assert_eq!(done.status, TaskStatus::Completed, "backend {name}");
                assert_eq!(done.result, Some(json!({"rows": 3})), "backend {name}");

                let err = store
                    .save_task_result(task.id, json!("again"), TaskStatus::Failed)
                    .await
                    .unwrap_err();
                assert!(matches!(err, ColonyError::TaskAlreadyTerminal { .. }), "backend {name}");

                let stored = store.get_task(task.id).await.unwrap().unwrap();
                assert_eq!(stored.result, Some(json!({"rows": 3})), "backend {name}");
            }
        }

        #[tokio::test]
        async fn test_save_task_result_unknown_task() {
            for (name, store) in backends() {
                let err = store
                    .save_task_result(uuid::Uuid::new_v4(), json!(null), TaskStatus::Completed)
                    .await
                    .unwrap_err();
                assert!(matches!(err, ColonyError::TaskNotFound(_)), "backend {name}");
            }
        }
    }

    // ── Agents ─────────────────────────────────────────────────

    mod agents {
        use super::*;

        #[tokio::test]
        async fn test_save_and_load_agents() {
            for (name, store) in backends() {
                let mut a = AgentRecord::new("alpha", AgentKind::Hybrid).with_threshold(0.4);
                store.save_agent(&a).await.unwrap();
                store.save_agent(&AgentRecord::new("beta", AgentKind::Reflexive)).await.unwrap();

                a.desires.push("explore".into());
                store.save_agent(&a).await.unwrap();

                let agents = store.load_agents().await.unwrap();
                assert_eq!(agents.len(), 2, "backend {name}");
                assert_eq!(agents[0].id, "alpha", "backend {name}");
                assert_eq!(agents[0].desires, vec!["explore".to_string()], "backend {name}");
                assert_eq!(agents[0].cognitive_threshold, 0.4, "backend {name}");
            }
        }
    }

    // ── SQLite persistence ─────────────────────────────────────

    #[tokio::test]
    async fn test_sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("colony.db");
        let m = msg("a", "b", 7);
        {
            let store = SqliteStore::open(&path).unwrap();
            store.save_message(&m).await.unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let pending = store.load_pending_messages("b", 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, m.id);
    }

    // ── Retry ──────────────────────────────────────────────────

    #[tokio::test]
    async fn test_retry_recovers_from_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff("flaky", RetryPolicy::new(3, Duration::from_millis(1)), || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ColonyError::Store("database is locked".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: colony_core::Result<()> =
            retry_with_backoff("down", RetryPolicy::new(2, Duration::from_millis(1)), || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(ColonyError::Store("disk I/O error".into()))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_skips_permanent_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: colony_core::Result<()> =
            retry_with_backoff("missing", RetryPolicy::default(), || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(ColonyError::TaskNotFound(uuid::Uuid::nil()))
                }
            })
            .await;
        assert!(matches!(result, Err(ColonyError::TaskNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
