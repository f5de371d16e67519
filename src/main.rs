use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use mustgather_logs::GroupBy;

/// opct-mustgather - error counters and etcd latency statistics from
/// OpenShift must-gather archives
#[derive(Parser, Debug)]
#[command(name = "opct-mustgather")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process a must-gather archive and print the findings as JSON
    Process {
        /// Must-gather `.tar.xz`, or a results `.tar.gz` with --results
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// Directory extracted files are saved to (in-memory only when unset)
        #[arg(long, value_name = "DIR")]
        save_dir: Option<PathBuf>,

        /// Pipeline configuration file (TOML)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Read the must-gather out of a conformance results tarball
        #[arg(long)]
        results: bool,

        /// Include every pod log with findings in the output
        #[arg(long)]
        verbose_logs: bool,
    },

    /// Parse etcd logs from a must-gather directory or stdin
    ParseEtcdLogs {
        /// Extracted must-gather directory (reads stdin when omitted)
        #[arg(value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Aggregator. Valid: all, day, hour, minute
        #[arg(long, default_value = "hour")]
        aggregator: String,

        /// Skip calculation of the error counters
        #[arg(long)]
        skip_error_counter: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr, stdout carries the report
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match args.command {
        Command::Process {
            archive,
            save_dir,
            config,
            results,
            verbose_logs,
        } => {
            commands::process::run(commands::process::ProcessArgs {
                archive,
                save_dir,
                config,
                results,
                verbose_logs,
            })
            .await
        }
        Command::ParseEtcdLogs {
            dir,
            aggregator,
            skip_error_counter,
        } => commands::parse_etcd_logs::run(
            dir.as_deref(),
            GroupBy::from(aggregator.as_str()),
            skip_error_counter,
        ),
    };

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}
