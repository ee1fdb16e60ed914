use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::path::PathBuf;

use colony_config::{ColonyConfig, ConfigLoader, WarningSeverity};
use colony_core::ColonyError;

mod agents;
mod run;

/// 🐜 Colony: multi-agent BDI runtime
#[derive(Parser)]
#[command(name = "colony", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to colony.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the configured agents and the delivery bridge; Ctrl-C stops everything
    Run {
        /// Don't start the delivery bridge
        #[arg(long)]
        no_bridge: bool,
    },
    /// Show the effective configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List configured agents and their last known status
    Agents {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate the configuration and print every warning
    Doctor,
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    pub async fn run(self) -> colony_core::Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // Resolve log level: --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level
                .as_deref()
                .unwrap_or(config.logging.level.as_str())
        };
        init_tracing(&config, log_level);

        match self.command {
            Commands::Run { no_bridge } => run::cmd_run(config, no_bridge).await,
            Commands::Config { json } => Self::cmd_config(config, json),
            Commands::Agents { json } => agents::cmd_agents(config, json).await,
            Commands::Doctor => Self::cmd_doctor(config_loader.path(), config).await,
            Commands::Completions { shell } => Self::cmd_completions(shell),
        }
    }

    fn cmd_config(config: ColonyConfig, json: bool) -> colony_core::Result<()> {
        let mut config = config;
        if config.reasoner.api_key.is_some() {
            config.reasoner.api_key = Some("********".into());
        }
        if json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(&config).map_err(|e| ColonyError::Config(e.to_string()))?
            );
        }
        Ok(())
    }

    async fn cmd_doctor(path: &std::path::Path, config: ColonyConfig) -> colony_core::Result<()> {
        println!("🩺 Colony Doctor — {}", path.display());
        println!();

        let warnings = match config.validate() {
            Ok(w) => w,
            Err(e) => {
                println!("{e}");
                return Err(ColonyError::Config("configuration is invalid".into()));
            }
        };

        let mut warn_count = 0;
        let mut info_count = 0;
        for w in &warnings {
            println!("  {w}");
            match w.severity {
                WarningSeverity::Warning => warn_count += 1,
                WarningSeverity::Info => info_count += 1,
                WarningSeverity::Error => {}
            }
        }

        println!();
        match run::build_provider(&config) {
            Ok(None) => println!("  💡 no reasoner configured; cognitive agents cannot start"),
            Ok(Some(provider)) => {
                let check = tokio::time::timeout(
                    config.reasoner.simple_timeout(),
                    provider.health_check(),
                )
                .await;
                match check {
                    Ok(Ok(())) => println!("  ✅ reasoner '{}' is reachable", provider.name()),
                    Ok(Err(e)) => {
                        warn_count += 1;
                        println!("  ⚠️  reasoner '{}': {e}", provider.name());
                    }
                    Err(_) => {
                        warn_count += 1;
                        println!("  ⚠️  reasoner '{}' health check timed out", provider.name());
                    }
                }
            }
            Err(e) => {
                warn_count += 1;
                println!("  ⚠️  {e}");
            }
        }

        println!();
        println!(
            "  ✅ {} agents configured, ⚠️  {warn_count} warnings, 💡 {info_count} suggestions",
            config.agents.len()
        );
        Ok(())
    }

    fn cmd_completions(shell: Shell) -> colony_core::Result<()> {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "colony", &mut std::io::stdout());
        Ok(())
    }
}

fn init_tracing(config: &ColonyConfig, log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
