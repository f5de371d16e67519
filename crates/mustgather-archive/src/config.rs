use std::fs;
use std::path::Path;

use tracing::debug;

use mustgather_logs::PipelineConfig;

use crate::error::{ArchiveError, Result};

/// Load the pipeline configuration.
///
/// Reads `path` as TOML when given, otherwise starts from the defaults,
/// then applies the `OPCT_MUSTGATHER_RATELIMIT` override.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => {
            debug!("Loading pipeline configuration from {}", path.display());
            let content = fs::read_to_string(path)?;
            parse_config(&content)?
        }
        None => PipelineConfig::default(),
    };
    Ok(config.with_env_override())
}

/// Parse and validate a TOML pipeline configuration
pub fn parse_config(content: &str) -> Result<PipelineConfig> {
    let config: PipelineConfig =
        toml::from_str(content).map_err(|e| ArchiveError::Config(e.to_string()))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &PipelineConfig) -> Result<()> {
    if config.concurrency == 0 {
        return Err(ArchiveError::Config("concurrency must be at least 1".into()));
    }
    if config.queue_size == 0 {
        return Err(ArchiveError::Config("queue_size must be at least 1".into()));
    }
    if config.rate_limit_interval_ms == 0 {
        return Err(ArchiveError::Config(
            "rate_limit_interval_ms must be at least 1".into(),
        ));
    }
    Ok(())
}
