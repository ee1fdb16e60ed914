use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use colony_config::{ColonyConfig, ConfigLoader};
use colony_core::{ColonyError, Event};
use colony_llm::{LlmProvider, LlmReasoner, MockProvider, OpenAiProvider, Reasoner};
use colony_runtime::{DeliveryBridge, ReasonerTimeouts, Runtime};
use colony_store::{MemoryStore, RetryPolicy, SqliteStore, Store};

pub(super) async fn cmd_run(config: ColonyConfig, no_bridge: bool) -> colony_core::Result<()> {
    println!("🐜 Colony v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "   Reasoner: {} ({})",
        config.reasoner.provider, config.reasoner.model
    );
    println!("   Store: {}", config.store.backend);
    println!();

    let store = open_store(&config)?;
    let mut builder = Runtime::builder(store)
        .config(config.runtime.clone())
        .timeouts(ReasonerTimeouts {
            simple: config.reasoner.simple_timeout(),
            deep: config.reasoner.deep_timeout(),
        })
        .retry_policy(RetryPolicy::new(
            config.store.retry_attempts,
            Duration::from_millis(config.store.retry_base_delay_ms),
        ));
    if let Some(reasoner) = build_reasoner(&config)? {
        builder = builder.reasoner(reasoner);
    }
    let runtime = builder.build();

    // Log failures as they happen; the runtime keeps going without the agent.
    let mut events = runtime.events().subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(Event::AgentFailed { agent_id, reason }) => {
                    eprintln!("❌ Agent {agent_id} failed: {reason}");
                }
                Ok(Event::Shutdown) | Err(RecvError::Closed) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => debug!(skipped = n, "event listener lagged"),
            }
        }
    });

    let mut started = 0usize;
    for record in &config.agents {
        match runtime.start(record.clone()).await {
            Ok(()) => {
                started += 1;
                println!("   ▶ {} ({})", record.id, record.kind);
            }
            Err(e) => {
                error!(agent_id = %record.id, error = %e, "failed to start agent");
                eprintln!("⚠️  {}: {e}", record.id);
            }
        }
    }
    if started == 0 {
        warn!("no agents running; add [[agents]] to colony.toml");
    }

    let cancel = CancellationToken::new();
    let bridge_task = if config.bridge.enabled && !no_bridge {
        let bridge = DeliveryBridge::new(runtime.clone(), &config.bridge);
        let cancel = cancel.clone();
        Some(tokio::spawn(async move { bridge.run(cancel).await }))
    } else {
        info!("delivery bridge disabled");
        None
    };

    println!();
    println!("   {started} agent(s) running. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;

    println!();
    println!("   Shutting down...");
    cancel.cancel();
    if let Some(task) = bridge_task
        && let Err(e) = task.await
    {
        warn!(error = %e, "delivery bridge ended abnormally");
    }
    runtime.shutdown().await;

    for m in runtime.metrics() {
        info!(
            agent_id = %m.agent_id,
            cycles = m.cycles,
            messages = m.messages_processed,
            actions = m.actions_executed,
            errors = m.cycle_errors,
            "final agent metrics"
        );
    }
    Ok(())
}

/// Open the configured store backend.
pub(super) fn open_store(config: &ColonyConfig) -> colony_core::Result<Arc<dyn Store>> {
    match config.store.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "sqlite" => {
            let path = ConfigLoader::store_path(config);
            info!(path = %path.display(), "opening store");
            Ok(Arc::new(SqliteStore::open(&path)?))
        }
        other => Err(ColonyError::Config(format!("unknown store backend '{other}'"))),
    }
}

/// Build the LLM provider named by `reasoner.provider`, if any.
pub(super) fn build_provider(config: &ColonyConfig) -> colony_core::Result<Option<Arc<dyn LlmProvider>>> {
    let rc = &config.reasoner;
    let provider: Arc<dyn LlmProvider> = match rc.provider.as_str() {
        "none" => return Ok(None),
        "mock" => Arc::new(MockProvider::new("mock")),
        "openai" => {
            let key = rc.api_key.clone().ok_or_else(|| {
                ColonyError::Config(
                    "reasoner.provider is 'openai' but no API key is set (reasoner.api_key or OPENAI_API_KEY)"
                        .into(),
                )
            })?;
            Arc::new(OpenAiProvider::new(key).with_base_url(rc.base_url.clone(), "openai"))
        }
        other => {
            return Err(ColonyError::Config(format!(
                "unknown reasoner provider '{other}'"
            )));
        }
    };
    Ok(Some(provider))
}

/// Build the reasoner for the configured provider, if any.
fn build_reasoner(config: &ColonyConfig) -> colony_core::Result<Option<Arc<dyn Reasoner>>> {
    let Some(provider) = build_provider(config)? else {
        return Ok(None);
    };
    if provider.name() == "mock" {
        warn!("using the mock reasoner; agents will receive canned decisions");
    }

    let rc = &config.reasoner;
    let mut reasoner = LlmReasoner::new(provider, rc.model.clone())
        .with_limits(rc.max_tokens, rc.temperature)
        .with_retries(rc.max_retries, Duration::from_millis(1_000));
    if let Some(prompt) = &rc.system_prompt {
        reasoner = reasoner.with_system_prompt(prompt.clone());
    }
    Ok(Some(Arc::new(reasoner)))
}
