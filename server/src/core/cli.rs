use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::constants::{
    ENV_CONFIG, ENV_ELIDE_LABELS, ENV_HOST, ENV_INGEST_MAX_BODY_BYTES, ENV_INGEST_TIMEOUT_SECS,
    ENV_PARTITION_HEADER, ENV_PARTITION_LABEL, ENV_PORT, ENV_STORE_TTL_SECS, ENV_WHITELIST,
    ENV_WRITE_INTERVAL_SECS,
};

#[derive(Parser)]
#[command(name = "pushgate")]
#[command(version, about = "Prometheus metrics push gateway", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server host address
    #[arg(long, short = 'H', global = true, env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', global = true, env = ENV_PORT)]
    pub port: Option<u16>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Upload deadline in seconds
    #[arg(long, global = true, env = ENV_INGEST_TIMEOUT_SECS)]
    pub timeout_secs: Option<u64>,

    /// Maximum request body size in bytes
    #[arg(long, global = true, env = ENV_INGEST_MAX_BODY_BYTES)]
    pub max_body_bytes: Option<usize>,

    /// Request header carrying the partition key
    #[arg(long, global = true, env = ENV_PARTITION_HEADER)]
    pub partition_header: Option<String>,

    /// Label stamped with the partition key on every sample
    #[arg(long, global = true, env = ENV_PARTITION_LABEL)]
    pub partition_label: Option<String>,

    /// Labels removed from every sample (comma-separated)
    #[arg(long, global = true, env = ENV_ELIDE_LABELS, value_delimiter = ',')]
    pub elide_labels: Option<Vec<String>>,

    /// Selector rule a sample must match to be kept (repeatable)
    #[arg(long = "whitelist", global = true, env = ENV_WHITELIST)]
    pub whitelist: Option<Vec<String>>,

    /// Minimum seconds between writes for one partition (0 = unlimited)
    #[arg(long, global = true, env = ENV_WRITE_INTERVAL_SECS)]
    pub write_interval_secs: Option<u64>,

    /// Seconds before an idle partition is dropped (0 = keep forever)
    #[arg(long, global = true, env = ENV_STORE_TTL_SECS)]
    pub store_ttl_secs: Option<u64>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the server (default command)
    Start,
    /// Load and validate configuration, print it, and exit
    Check,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub max_body_bytes: Option<usize>,
    pub partition_header: Option<String>,
    pub partition_label: Option<String>,
    pub elide_labels: Option<Vec<String>>,
    pub whitelist: Option<Vec<String>>,
    pub write_interval_secs: Option<u64>,
    pub store_ttl_secs: Option<u64>,
}

impl From<Cli> for CliConfig {
    fn from(cli: Cli) -> Self {
        Self {
            host: cli.host,
            port: cli.port,
            config: cli.config,
            timeout_secs: cli.timeout_secs,
            max_body_bytes: cli.max_body_bytes,
            partition_header: cli.partition_header,
            partition_label: cli.partition_label,
            elide_labels: cli.elide_labels,
            whitelist: cli.whitelist,
            write_interval_secs: cli.write_interval_secs,
            store_ttl_secs: cli.store_ttl_secs,
        }
    }
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let mut cli = Cli::parse();
    let command = cli.command.take();
    (cli.into(), command)
}
