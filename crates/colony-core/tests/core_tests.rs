#[cfg(test)]
mod tests {
    use colony_core::payload::coerce_string_list;
    use colony_core::*;
    use serde_json::json;

    // ── Message tests ──────────────────────────────────────────

    #[test]
    fn test_message_new_starts_conversation() {
        let msg = Message::new("alice", "bob", Performative::Request, json!({"type": "ping"}));
        assert_eq!(msg.sender, "alice");
        assert_eq!(msg.receiver, "bob");
        assert!(!msg.delivered);
        assert!(msg.in_reply_to.is_none());
    }

    #[test]
    fn test_message_reply_keeps_conversation() {
        let msg = Message::new("alice", "bob", Performative::Query, json!("status?"));
        let reply = msg.reply(Performative::Inform, json!({"status": "ok"}));
        assert_eq!(reply.sender, "bob");
        assert_eq!(reply.receiver, "alice");
        assert_eq!(reply.conversation_id, msg.conversation_id);
        assert_eq!(reply.in_reply_to, Some(msg.id));
    }

    #[test]
    fn test_message_stimulus_layers_envelope() {
        let msg = Message::new("alice", "bob", Performative::Inform, json!({"type": "greeting", "id": "spoofed"}));
        let stimulus = msg.to_stimulus();
        assert_eq!(stimulus["type"], json!("greeting"));
        assert_eq!(stimulus["id"], json!(msg.id.to_string()));
        assert_eq!(stimulus["sender"], json!("alice"));
        assert_eq!(stimulus["performative"], json!("inform"));
    }

    #[test]
    fn test_message_stimulus_wraps_scalar_content() {
        let msg = Message::new("alice", "bob", Performative::Inform, json!("just text"));
        let stimulus = msg.to_stimulus();
        assert_eq!(stimulus["value"], json!("just text"));
    }

    #[test]
    fn test_message_serde_roundtrip() {
        let msg = Message::new("a", "b", Performative::Propose, json!({"price": 10}));
        let json = serde_json::to_string(&msg).unwrap();
        let restored: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.id, msg.id);
        assert_eq!(restored.performative, Performative::Propose);
        assert_eq!(restored.content["price"], json!(10));
    }

    #[test]
    fn test_performative_parse() {
        assert_eq!("inform".parse::<Performative>().unwrap(), Performative::Inform);
        assert_eq!("Accept_Proposal".parse::<Performative>().unwrap(), Performative::AcceptProposal);
        assert!("shout".parse::<Performative>().is_err());
        assert!(Performative::Propose.is_negotiation());
        assert!(!Performative::Inform.is_negotiation());
    }

    // ── Task tests ─────────────────────────────────────────────

    #[test]
    fn test_task_defaults() {
        let task = Task::new("ops", "analysis", Priority::High).assigned("bob");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.assigned_to.as_deref(), Some("bob"));
        assert!(task.result.is_none());
    }

    #[test]
    fn test_task_terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_task_stimulus() {
        let task = Task::new("ops", "report", Priority::Low).with_payload(json!({"region": "eu"}));
        let stimulus = task.to_stimulus();
        assert_eq!(stimulus["type"], json!("report"));
        assert_eq!(stimulus["region"], json!("eu"));
        assert_eq!(stimulus["priority"], json!("low"));
    }

    #[test]
    fn test_priority_weights_ordered() {
        assert!(Priority::Low.weight() < Priority::Medium.weight());
        assert!(Priority::High.weight() < Priority::Critical.weight());
        assert!(Priority::Low < Priority::Critical);
    }

    // ── Agent record tests ─────────────────────────────────────

    #[test]
    fn test_agent_record_deserialize_defaults() {
        let record: AgentRecord = serde_json::from_value(json!({
            "id": "greeter",
            "name": "Greeter",
            "kind": "hybrid"
        }))
        .unwrap();
        assert_eq!(record.kind, AgentKind::Hybrid);
        assert_eq!(record.status, AgentStatus::Idle);
        assert_eq!(record.cognitive_threshold, 0.7);
        assert!(record.rules.is_empty());
    }

    #[test]
    fn test_rule_new_coerces_condition() {
        let rule = Rule::new(json!("greeting"), json!({"type": "respond"}));
        assert_eq!(rule.condition["value"], json!("greeting"));
    }

    #[test]
    fn test_agent_kind_capabilities() {
        assert!(!AgentKind::Reflexive.uses_reasoner());
        assert!(AgentKind::Cognitive.uses_reasoner());
        assert!(AgentKind::Hybrid.uses_reasoner());
        assert!(AgentStatus::Stopping.is_live());
        assert!(!AgentStatus::Error.is_live());
    }

    #[test]
    fn test_string_list_coercion() {
        assert_eq!(coerce_string_list(&json!("one")), vec!["one".to_string()]);
        assert_eq!(coerce_string_list(&json!(["a", 2, null])), vec!["a".to_string(), "2".to_string()]);
        assert!(coerce_string_list(&json!(null)).is_empty());
    }

    // ── Error tests ────────────────────────────────────────────

    #[test]
    fn test_error_display() {
        let err = ColonyError::UnknownReceiver("ghost".into());
        assert!(err.to_string().contains("ghost"));
        assert!(err.is_registry());
    }

    #[test]
    fn test_error_mailbox_full() {
        let err = ColonyError::MailboxFull { agent_id: "bob".into(), capacity: 100 };
        assert!(err.to_string().contains("100"));
        assert!(err.is_transient());
    }

    #[test]
    fn test_error_transient_classification() {
        assert!(ColonyError::Store("locked".into()).is_transient());
        assert!(ColonyError::LlmProvider("HTTP 503: busy".into()).is_transient());
        assert!(!ColonyError::LlmProvider("HTTP 401: bad key".into()).is_transient());
        assert!(!ColonyError::AlreadyRunning("a".into()).is_transient());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ColonyError = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    // ── Event Bus tests ────────────────────────────────────────

    #[test]
    fn test_event_bus_pub_sub() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(Event::AgentStarted { agent_id: "a".into() });
        let event = rx.try_recv().unwrap();
        assert_eq!(event.agent_id(), Some("a"));
    }

    #[test]
    fn test_event_bus_no_subscribers() {
        let bus = EventBus::new(4);
        bus.publish(Event::Shutdown);
    }

    #[test]
    fn test_event_serde_tag() {
        let event = Event::AgentFailed { agent_id: "a".into(), reason: "too many errors".into() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], json!("agent_failed"));
    }
}
