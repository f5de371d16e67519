use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use mustgather_archive::{MustGather, extract_must_gather, load_config};

/// Arguments of the `process` subcommand
pub struct ProcessArgs {
    pub archive: PathBuf,
    pub save_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub results: bool,
    pub verbose_logs: bool,
}

/// Process one archive and print the aggregate as JSON on stdout
pub async fn run(args: ProcessArgs) -> Result<()> {
    let config = load_config(args.config.as_deref()).context("Failed to load pipeline configuration")?;
    debug!("Pipeline configuration: {:?}", config);

    let data = tokio::fs::read(&args.archive)
        .await
        .with_context(|| format!("Failed to read archive: {}", args.archive.display()))?;

    let mut must_gather = if args.results {
        let must_gather = tokio::task::spawn_blocking(move || extract_must_gather(data.as_slice()))
            .await?
            .with_context(|| format!("Failed to read results archive: {}", args.archive.display()))?;
        MustGather::load_or_empty(must_gather, args.save_dir, config).await
    } else {
        let mut must_gather = MustGather::new(args.save_dir, config);
        must_gather
            .process(data)
            .await
            .with_context(|| format!("Failed to process must-gather: {}", args.archive.display()))?;
        must_gather
    };

    if !args.verbose_logs {
        must_gather.namespace_errors.clear();
    }

    let output = serde_json::to_string_pretty(&must_gather).context("Failed to serialize results")?;
    println!("{}", output);
    Ok(())
}
