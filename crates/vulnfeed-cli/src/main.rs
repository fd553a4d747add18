mod adapter;
mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vulnfeed_engine::config::types::OutputFormat;

#[derive(Parser)]
#[command(
    name = "vulnfeed",
    version,
    about = "Convert vendor security advisory feeds into NVD CVE records"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, convert and emit advisories, then advance the checkpoint
    Run {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
        /// Start from this Unix timestamp instead of the stored checkpoint
        #[arg(long)]
        since: Option<i64>,
        /// Write output to this file instead of the configured output
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output format (feed, ndjson)
        #[arg(long)]
        format: Option<OutputFormat>,
        /// Override the adapter's API base URL
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Download raw vendor advisories as a snapshot without converting
    Download {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
        /// Snapshot file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Start from this Unix timestamp instead of the stored checkpoint
        #[arg(long)]
        since: Option<i64>,
        /// Override the adapter's API base URL
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Convert a vendor snapshot file ("-" for stdin)
    Convert {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
        /// Snapshot to convert
        input: PathBuf,
        /// Write output to this file instead of the configured output
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output format (feed, ndjson)
        #[arg(long)]
        format: Option<OutputFormat>,
    },
    /// Validate configuration, credential and checkpoint store
    Check {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run {
            pipeline,
            since,
            output,
            format,
            base_url,
        } => {
            let overrides = commands::Overrides {
                since,
                output,
                format,
                base_url,
            };
            commands::run::execute(&pipeline, &overrides).await
        }
        Commands::Download {
            pipeline,
            output,
            since,
            base_url,
        } => {
            let overrides = commands::Overrides {
                since,
                base_url,
                ..commands::Overrides::default()
            };
            commands::download::execute(&pipeline, output.as_deref(), &overrides).await
        }
        Commands::Convert {
            pipeline,
            input,
            output,
            format,
        } => {
            let overrides = commands::Overrides {
                output,
                format,
                ..commands::Overrides::default()
            };
            commands::convert::execute(&pipeline, &input, &overrides).await
        }
        Commands::Check { pipeline } => commands::check::execute(&pipeline).await,
    }
}
