use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use colony_core::ColonyError;

use crate::schema::ColonyConfig;

/// Loads and reloads the colony configuration.
pub struct ConfigLoader {
    config: Arc<RwLock<ColonyConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > COLONY_CONFIG env > ~/.colony/colony.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("COLONY_CONFIG") {
            return PathBuf::from(p);
        }
        Self::home_dir().join("colony.toml")
    }

    /// `~/.colony`, or the working directory when no home is known.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".colony")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> colony_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            Self::read_file(&config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            ColonyConfig::default()
        };

        let config = Self::apply_env_overrides(config);
        Self::check(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Parse a TOML document without touching the environment.
    pub fn parse(raw: &str) -> colony_core::Result<ColonyConfig> {
        toml::from_str::<ColonyConfig>(raw)
            .map_err(|e| ColonyError::Config(format!("failed to parse config: {}", e)))
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> ColonyConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<ColonyConfig>> {
        Arc::clone(&self.config)
    }

    /// Path the config was loaded from.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Where the SQLite store lives. Relative paths resolve under ~/.colony/.
    pub fn store_path(config: &ColonyConfig) -> PathBuf {
        if config.store.path.is_absolute() {
            config.store.path.clone()
        } else {
            Self::home_dir().join(&config.store.path)
        }
    }

    /// Apply env var overrides (COLONY_REASONER_MODEL, COLONY_LOG_LEVEL, etc.)
    pub fn apply_env_overrides(mut config: ColonyConfig) -> ColonyConfig {
        if let Ok(v) = std::env::var("COLONY_REASONER_MODEL") {
            config.reasoner.model = v;
        }
        if let Ok(v) = std::env::var("COLONY_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("COLONY_STORE_PATH") {
            config.store.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("COLONY_BRIDGE_INTERVAL_MS")
            && let Ok(ms) = v.parse::<u64>()
        {
            config.bridge.interval_ms = ms;
        }
        // Config file takes priority, env is the fallback.
        if config.reasoner.api_key.is_none()
            && let Ok(v) = std::env::var("OPENAI_API_KEY")
        {
            config.reasoner.api_key = Some(v);
        }
        config
    }

    /// Reload the config from disk. The current config is kept when the new one is invalid.
    pub fn reload(&self) -> colony_core::Result<()> {
        if !self.config_path.exists() {
            return Err(ColonyError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = Self::apply_env_overrides(Self::read_file(&self.config_path)?);
        Self::check(&new_config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }

    fn read_file(path: &Path) -> colony_core::Result<ColonyConfig> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str::<ColonyConfig>(&raw).map_err(|e| {
            ColonyError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Validate config: log warnings and fail on errors.
    fn check(config: &ColonyConfig) -> colony_core::Result<()> {
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
                Ok(())
            }
            Err(e) => Err(ColonyError::Config(e)),
        }
    }
}
