#[cfg(test)]
mod tests {
    use colony_config::ConfigLoader;
    use colony_config::schema::*;
    use colony_core::{AgentKind, AgentRecord, Rule};
    use std::io::Write;

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_runtime_config_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.mailbox_capacity, 100);
        assert_eq!(config.perceive_batch, 10);
        assert_eq!(config.task_batch, 5);
        assert_eq!(config.reflect_every, 10);
        assert_eq!(config.max_intentions, 3);
        assert_eq!(config.hysteresis_band, 0.05);
        assert_eq!(config.mixed_policy, MixedPolicy::RulesFirst);
        assert_eq!(config.stop_grace().as_millis(), 5000);
    }

    #[test]
    fn test_complexity_weights_defaults() {
        let w = ComplexityWeights::default();
        assert_eq!(w.message_cap, 5.0);
        assert_eq!(w.task_cap, 2.0);
        assert!(w.complex_task_types.iter().any(|t| t == "negotiation"));
        let total = w.message_weight + w.task_weight + w.complex_type_weight + w.negotiation_weight;
        assert!(total >= 1.0);
    }

    #[test]
    fn test_bridge_config_defaults() {
        let config = BridgeConfig::default();
        assert!(config.enabled);
        assert_eq!(config.interval().as_secs(), 1);
        assert_eq!(config.batch_size, 50);
    }

    #[test]
    fn test_reasoner_config_defaults() {
        let config = ReasonerConfig::default();
        assert_eq!(config.provider, "mock");
        assert_eq!(config.max_retries, 3);
        assert!(config.simple_timeout() < config.deep_timeout());
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "pretty");
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ColonyConfig::default();
        assert!(config.validate().is_ok());
    }

    // ── TOML tests ─────────────────────────────────────────────

    #[test]
    fn test_config_toml_roundtrip() {
        let config = ColonyConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: ColonyConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.runtime.mailbox_capacity, config.runtime.mailbox_capacity);
        assert_eq!(restored.reasoner.model, config.reasoner.model);
        assert_eq!(restored.store.path, config.store.path);
    }

    #[test]
    fn test_partial_toml_applies_defaults() {
        let toml_str = r#"
[runtime]
mailbox_capacity = 8
mixed_policy = "reasoner_first"

[reasoner]
provider = "none"
"#;
        let config = ConfigLoader::parse(toml_str).unwrap();
        assert_eq!(config.runtime.mailbox_capacity, 8);
        assert_eq!(config.runtime.mixed_policy, MixedPolicy::ReasonerFirst);
        assert_eq!(config.reasoner.provider, "none");
        // Defaults should fill in
        assert_eq!(config.runtime.perceive_batch, 10);
        assert_eq!(config.bridge.batch_size, 50);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_agents_deserialize() {
        let toml_str = r#"
[[agents]]
id = "greeter"
name = "Greeter"
kind = "reflexive"

[[agents.rules]]
condition = { type = "greeting" }
action = { type = "send_message", receiver = "{sender}", content = "hello {sender}" }

[[agents]]
id = "planner"
name = "Planner"
kind = "hybrid"
cognitive_threshold = 0.6
desires = ["keep inventory", "answer queries"]
"#;
        let config = ConfigLoader::parse(toml_str).unwrap();
        assert_eq!(config.agents.len(), 2);

        let greeter = &config.agents[0];
        assert_eq!(greeter.kind, AgentKind::Reflexive);
        assert_eq!(greeter.rules.len(), 1);
        assert_eq!(greeter.rules[0].condition["type"], "greeting");
        assert_eq!(greeter.cognitive_threshold, 0.7);

        let planner = &config.agents[1];
        assert_eq!(planner.kind, AgentKind::Hybrid);
        assert_eq!(planner.cognitive_threshold, 0.6);
        assert_eq!(planner.desires.len(), 2);
        assert!(planner.rules.is_empty());
    }

    #[test]
    fn test_unknown_mixed_policy_rejected() {
        let toml_str = r#"
[runtime]
mixed_policy = "coin_flip"
"#;
        assert!(ConfigLoader::parse(toml_str).is_err());
    }

    // ── Validation tests ───────────────────────────────────────

    #[test]
    fn test_validate_zero_mailbox_capacity() {
        let mut config = ColonyConfig::default();
        config.runtime.mailbox_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.contains("runtime.mailbox_capacity"));
    }

    #[test]
    fn test_validate_threshold_out_of_range() {
        let mut config = ColonyConfig::default();
        let mut agent = AgentRecord::new("a1", AgentKind::Hybrid);
        agent.cognitive_threshold = 1.5;
        config.agents.push(agent);
        let err = config.validate().unwrap_err();
        assert!(err.contains("cognitive_threshold"));
    }

    #[test]
    fn test_validate_duplicate_agent_ids() {
        let mut config = ColonyConfig::default();
        config.agents.push(AgentRecord::new("dup", AgentKind::Cognitive));
        config.agents.push(AgentRecord::new("dup", AgentKind::Cognitive));
        let err = config.validate().unwrap_err();
        assert!(err.contains("duplicate agent id 'dup'"));
    }

    #[test]
    fn test_validate_empty_model() {
        let mut config = ColonyConfig::default();
        config.reasoner.model = String::new();
        assert!(config.validate().is_err());

        // No model is needed without a reasoner
        config.reasoner.provider = "none".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_warnings_are_not_errors() {
        let mut config = ColonyConfig::default();
        config.reasoner.provider = "none".into();
        config.agents.push(AgentRecord::new("thinker", AgentKind::Cognitive));
        config.agents.push(AgentRecord::new("idle", AgentKind::Reflexive));
        config.logging.format = "fancy".into();

        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.field == "agents.thinker.kind"));
        assert!(warnings.iter().any(|w| w.field == "agents.idle.rules"));
        assert!(warnings.iter().any(|w| w.field == "logging.format"));
        assert!(warnings.iter().all(|w| w.severity != WarningSeverity::Error));
    }

    #[test]
    fn test_validate_reflexive_with_rules_has_no_warning() {
        let mut config = ColonyConfig::default();
        config.agents.push(
            AgentRecord::new("greeter", AgentKind::Reflexive).with_rule(Rule::new(
                serde_json::json!({"type": "greeting"}),
                serde_json::json!({"type": "execute"}),
            )),
        );
        let warnings = config.validate().unwrap();
        assert!(!warnings.iter().any(|w| w.field.starts_with("agents.")));
    }

    #[test]
    fn test_warning_display_includes_hint() {
        let w = ConfigWarning {
            field: "bridge.interval_ms".into(),
            message: "slow".into(),
            severity: WarningSeverity::Warning,
            hint: Some("lower it".into()),
        };
        let text = w.to_string();
        assert!(text.starts_with("[warning] bridge.interval_ms: slow"));
        assert!(text.contains("lower it"));
    }

    // ── ConfigLoader tests ─────────────────────────────────────

    #[test]
    fn test_config_loader_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("colony.toml");
        let mut f = std::fs::File::create(&config_path).unwrap();
        writeln!(
            f,
            r#"
[runtime]
mailbox_capacity = 32
tick_interval_ms = 50

[bridge]
batch_size = 10

[store]
backend = "memory"
"#
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        let config = loader.get();
        assert_eq!(config.runtime.mailbox_capacity, 32);
        assert_eq!(config.runtime.tick_interval_ms, 50);
        assert_eq!(config.bridge.batch_size, 10);
        assert_eq!(config.store.backend, "memory");
        assert_eq!(loader.path(), config_path.as_path());
    }

    #[test]
    fn test_config_loader_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("absent.toml");
        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        assert_eq!(loader.get().runtime.mailbox_capacity, 100);
    }

    #[test]
    fn test_config_loader_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("colony.toml");
        std::fs::write(&config_path, "[runtime]\nperceive_batch = 0\n").unwrap();
        assert!(ConfigLoader::load(Some(config_path.as_path())).is_err());
    }

    #[test]
    fn test_config_loader_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("colony.toml");

        std::fs::write(&config_path, "[bridge]\nbatch_size = 5\n").unwrap();
        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        assert_eq!(loader.get().bridge.batch_size, 5);

        std::fs::write(&config_path, "[bridge]\nbatch_size = 25\n").unwrap();
        loader.reload().unwrap();
        assert_eq!(loader.get().bridge.batch_size, 25);
        assert_eq!(loader.shared().read().bridge.batch_size, 25);
    }

    #[test]
    fn test_config_loader_reload_keeps_config_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("colony.toml");

        std::fs::write(&config_path, "[bridge]\nbatch_size = 5\n").unwrap();
        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();

        std::fs::write(&config_path, "[bridge]\nbatch_size = 0\n").unwrap();
        assert!(loader.reload().is_err());
        assert_eq!(loader.get().bridge.batch_size, 5);
    }

    #[test]
    fn test_store_path_resolution() {
        let mut config = ColonyConfig::default();
        config.store.path = "/var/lib/colony/colony.db".into();
        assert_eq!(
            ConfigLoader::store_path(&config),
            std::path::PathBuf::from("/var/lib/colony/colony.db")
        );

        config.store.path = "colony.db".into();
        let resolved = ConfigLoader::store_path(&config);
        assert!(resolved.ends_with(".colony/colony.db"));
    }

    // ── JSON roundtrip ─────────────────────────────────────────

    #[test]
    fn test_config_json_roundtrip() {
        let mut config = ColonyConfig::default();
        config.agents.push(AgentRecord::new("a1", AgentKind::Hybrid).with_threshold(0.4));
        let json = serde_json::to_string(&config).unwrap();
        let restored: ColonyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.agents.len(), 1);
        assert_eq!(restored.agents[0].cognitive_threshold, 0.4);
        assert_eq!(restored.runtime.mixed_policy, config.runtime.mixed_policy);
    }
}
