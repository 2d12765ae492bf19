use anyhow::{Context, Result, anyhow, bail};
use code_workspace::{EngineConfig, RunOrdering};
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration, read from the environment at startup
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub engine: EngineConfig,
    /// Directory for the persisted file snapshot; in-memory storage when unset
    pub data_dir: Option<PathBuf>,
    pub default_language: String,
    pub run_ordering: RunOrdering,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = lookup("PORT")
            .map(|port| port.parse::<u16>())
            .transpose()
            .context("PORT must be a valid port number")?
            .unwrap_or(3000);

        let engine_url = lookup("EXECUTION_ENGINE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| anyhow!("EXECUTION_ENGINE_URL environment variable is required"))?;
        let mut engine = EngineConfig::new(engine_url);
        if let Some(secs) = lookup("EXECUTION_ENGINE_TIMEOUT_SECS") {
            let secs = secs
                .parse::<u64>()
                .context("EXECUTION_ENGINE_TIMEOUT_SECS must be a whole number of seconds")?;
            engine = engine.with_timeout(Duration::from_secs(secs));
        }

        let run_ordering = match lookup("RUN_ORDERING").as_deref() {
            None | Some("last_resolved") => RunOrdering::LastResolvedWins,
            Some("latest_issued") => RunOrdering::LatestIssuedWins,
            Some(other) => bail!(
                "RUN_ORDERING must be `latest_issued` or `last_resolved`, got `{}`",
                other
            ),
        };

        Ok(Self {
            port,
            engine,
            data_dir: lookup("WORKSPACE_DATA_DIR").map(PathBuf::from),
            default_language: lookup("DEFAULT_LANGUAGE").unwrap_or_else(|| "python".to_string()),
            run_ordering,
        })
    }
}
