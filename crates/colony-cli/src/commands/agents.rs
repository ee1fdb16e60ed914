use colony_config::ColonyConfig;
use colony_core::AgentStatus;
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

#[derive(Serialize)]
struct AgentRow {
    id: String,
    name: String,
    kind: String,
    rules: usize,
    desires: Vec<String>,
    threshold: f64,
    /// Status last persisted by a run, if the store knows the agent.
    last_status: Option<AgentStatus>,
}

pub(super) async fn cmd_agents(config: ColonyConfig, json: bool) -> colony_core::Result<()> {
    let persisted: HashMap<String, AgentStatus> = match super::run::open_store(&config) {
        Ok(store) => match store.load_agents().await {
            Ok(records) => records.into_iter().map(|r| (r.id, r.status)).collect(),
            Err(e) => {
                warn!(error = %e, "could not read persisted agents");
                HashMap::new()
            }
        },
        Err(e) => {
            warn!(error = %e, "could not open store");
            HashMap::new()
        }
    };

    let rows: Vec<AgentRow> = config
        .agents
        .iter()
        .map(|a| AgentRow {
            id: a.id.clone(),
            name: a.name.clone(),
            kind: a.kind.to_string(),
            rules: a.rules.len(),
            desires: a.desires.clone(),
            threshold: a.cognitive_threshold,
            last_status: persisted.get(&a.id).copied(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No agents configured. Add [[agents]] entries to colony.toml.");
        return Ok(());
    }

    println!(
        "\x1b[1m{:<20} {:<10} {:>5} {:>9}  {:<10}\x1b[0m",
        "ID", "KIND", "RULES", "THRESHOLD", "LAST"
    );
    println!("{}", "-".repeat(60));
    for row in &rows {
        let last = row
            .last_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<20} {:<10} {:>5} {:>9.2}  {:<10}",
            row.id, row.kind, row.rules, row.threshold, last
        );
    }
    Ok(())
}
