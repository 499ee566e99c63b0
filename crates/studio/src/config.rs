use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub runner: RunnerBackend,
    pub runner_url: Option<String>,
    pub request_timeout_secs: u64,
    pub poll_initial_ms: u64,
    pub poll_max_ms: u64,
    pub poll_multiplier: f64,
    pub job_timeout_secs: u64,
    pub simulated_polls_to_complete: u32,
    pub activity_log_capacity: usize,
    pub recent_jobs_limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerBackend {
    Simulated,
    Http,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            runner: RunnerBackend::Simulated,
            runner_url: None,
            request_timeout_secs: 10,
            poll_initial_ms: 500,
            poll_max_ms: 5_000,
            poll_multiplier: 1.5,
            job_timeout_secs: 900, // 15 minutes
            simulated_polls_to_complete: 3,
            activity_log_capacity: 200,
            recent_jobs_limit: 8,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<StudioConfig> {
    let config = if let Some(config_path) = path {
        if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

            toml::from_str::<StudioConfig>(&contents)
                .map_err(|e| anyhow::anyhow!("Failed to parse TOML config: {}", e))?
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", config_path);
            StudioConfig::default()
        }
    } else {
        tracing::info!("No config path provided, using defaults");
        StudioConfig::default()
    };

    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &StudioConfig) -> Result<()> {
    if config.runner == RunnerBackend::Http
        && config
            .runner_url
            .as_deref()
            .map_or(true, |url| url.trim().is_empty())
    {
        anyhow::bail!("runner_url is required when runner = \"http\"");
    }

    if config.request_timeout_secs == 0 {
        anyhow::bail!("request_timeout_secs must be at least 1");
    }

    if config.poll_initial_ms == 0 {
        anyhow::bail!("poll_initial_ms must be at least 1");
    }

    if config.poll_max_ms < config.poll_initial_ms {
        anyhow::bail!("poll_max_ms must not be smaller than poll_initial_ms");
    }

    if !config.poll_multiplier.is_finite() || config.poll_multiplier < 1.0 {
        anyhow::bail!("poll_multiplier must be a finite number >= 1.0");
    }

    if config.job_timeout_secs == 0 {
        anyhow::bail!("job_timeout_secs must be at least 1");
    }

    if config.simulated_polls_to_complete == 0 {
        anyhow::bail!("simulated_polls_to_complete must be at least 1");
    }

    if config.activity_log_capacity == 0 {
        anyhow::bail!("activity_log_capacity must be at least 1");
    }

    Ok(())
}
