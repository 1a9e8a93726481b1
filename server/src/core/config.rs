use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::HeaderName;
use serde::Deserialize;

use crate::domain::metrics::transform::Whitelist;

use super::cli::CliConfig;
use super::constants::{
    CONFIG_FILE_NAME, DEFAULT_HOST, DEFAULT_INGEST_TIMEOUT_SECS, DEFAULT_MAX_BODY_BYTES,
    DEFAULT_PARTITION_HEADER, DEFAULT_PARTITION_LABEL, DEFAULT_PORT, DEFAULT_STORE_TTL_SECS,
    DEFAULT_WRITE_INTERVAL_SECS,
};

// =============================================================================
// File Config Structs (JSON deserialization)
// =============================================================================

/// Server configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Ingest configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct IngestFileConfig {
    pub timeout_secs: Option<u64>,
    pub max_body_bytes: Option<usize>,
    pub partition_header: Option<String>,
    pub partition_label: Option<String>,
}

/// Transform configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TransformFileConfig {
    pub elide_labels: Option<Vec<String>>,
    pub whitelist: Option<Vec<String>>,
}

/// Store configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct StoreFileConfig {
    pub write_interval_secs: Option<u64>,
    pub ttl_secs: Option<u64>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<ServerFileConfig>,
    pub ingest: Option<IngestFileConfig>,
    pub transform: Option<TransformFileConfig>,
    pub store: Option<StoreFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    fn unknown_fields(&self) -> Vec<&str> {
        match &self.extra {
            serde_json::Value::Object(map) => map.keys().map(|k| k.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        let unknown = self.unknown_fields();
        if !unknown.is_empty() {
            tracing::warn!(
                fields = %unknown.join(", "),
                "Unknown fields in config file (possible typos)"
            );
        }
    }
}

// =============================================================================
// Runtime Config Structs (final merged configuration)
// =============================================================================

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Upload handling configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Deadline for one upload
    pub timeout: Duration,
    pub max_body_bytes: usize,
    /// Header carrying the partition key
    pub partition_header: String,
    /// Label stamped with the partition key
    pub partition_label: String,
}

/// Process-wide transform configuration
#[derive(Debug, Clone, Default)]
pub struct TransformConfig {
    pub elide_labels: Vec<String>,
    /// Selector rules; empty keeps everything
    pub whitelist: Vec<String>,
}

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Minimum gap between writes per partition (zero disables)
    pub write_interval: Duration,
    /// Idle partitions older than this are pruned (zero disables)
    pub ttl: Duration,
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ingest: IngestConfig,
    pub transform: TransformConfig,
    pub store: StoreConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Local directory config OR CLI-specified config path
    /// 3. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let config_path = if let Some(ref path) = cli.config {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Some(path.clone())
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        let file_config = match config_path {
            Some(path) => {
                let config = FileConfig::load_from_file(&path)?;
                config.warn_unknown_fields();
                tracing::debug!(path = %path.display(), "Config file loaded");
                config
            }
            None => FileConfig::default(),
        };

        let config = Self::layer(cli, file_config);
        config.validate()?;

        tracing::debug!(
            host = %config.server.host,
            port = config.server.port,
            timeout_secs = config.ingest.timeout.as_secs(),
            max_body_bytes = config.ingest.max_body_bytes,
            partition_header = %config.ingest.partition_header,
            partition_label = %config.ingest.partition_label,
            elide_labels = ?config.transform.elide_labels,
            whitelist_rules = config.transform.whitelist.len(),
            write_interval_secs = config.store.write_interval.as_secs(),
            ttl_secs = config.store.ttl.as_secs(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Layer configs: defaults -> file config -> CLI/env overrides
    fn layer(cli: &CliConfig, file_config: FileConfig) -> Self {
        let file_server = file_config.server.unwrap_or_default();
        let file_ingest = file_config.ingest.unwrap_or_default();
        let file_transform = file_config.transform.unwrap_or_default();
        let file_store = file_config.store.unwrap_or_default();

        let server = ServerConfig {
            host: cli
                .host
                .clone()
                .or(file_server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.port.or(file_server.port).unwrap_or(DEFAULT_PORT),
        };

        let timeout_secs = cli
            .timeout_secs
            .or(file_ingest.timeout_secs)
            .unwrap_or(DEFAULT_INGEST_TIMEOUT_SECS);
        let ingest = IngestConfig {
            timeout: Duration::from_secs(timeout_secs),
            max_body_bytes: cli
                .max_body_bytes
                .or(file_ingest.max_body_bytes)
                .unwrap_or(DEFAULT_MAX_BODY_BYTES),
            partition_header: cli
                .partition_header
                .clone()
                .or(file_ingest.partition_header)
                .unwrap_or_else(|| DEFAULT_PARTITION_HEADER.to_string()),
            partition_label: cli
                .partition_label
                .clone()
                .or(file_ingest.partition_label)
                .unwrap_or_else(|| DEFAULT_PARTITION_LABEL.to_string()),
        };

        // Lists replace rather than extend. Blank entries (a trailing comma in
        // the env var) are dropped.
        let transform = TransformConfig {
            elide_labels: non_blank(
                cli.elide_labels
                    .clone()
                    .or(file_transform.elide_labels)
                    .unwrap_or_default(),
            ),
            whitelist: non_blank(
                cli.whitelist
                    .clone()
                    .or(file_transform.whitelist)
                    .unwrap_or_default(),
            ),
        };

        let store = StoreConfig {
            write_interval: Duration::from_secs(
                cli.write_interval_secs
                    .or(file_store.write_interval_secs)
                    .unwrap_or(DEFAULT_WRITE_INTERVAL_SECS),
            ),
            ttl: Duration::from_secs(
                cli.store_ttl_secs
                    .or(file_store.ttl_secs)
                    .unwrap_or(DEFAULT_STORE_TTL_SECS),
            ),
        };

        Self {
            server,
            ingest,
            transform,
            store,
        }
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Configuration error: server.host must not be empty");
        }
        if self.server.port == 0 {
            anyhow::bail!("Configuration error: server.port must be greater than 0");
        }

        if self.ingest.timeout.is_zero() {
            anyhow::bail!("Configuration error: ingest.timeout_secs must be greater than 0");
        }
        if self.ingest.max_body_bytes == 0 {
            anyhow::bail!("Configuration error: ingest.max_body_bytes must be greater than 0");
        }
        if self.ingest.partition_header.trim().is_empty() {
            anyhow::bail!("Configuration error: ingest.partition_header must not be empty");
        }
        self.partition_header_name()?;
        if self.ingest.partition_label.trim().is_empty() {
            anyhow::bail!("Configuration error: ingest.partition_label must not be empty");
        }

        Whitelist::parse(&self.transform.whitelist)
            .context("Configuration error: invalid transform.whitelist rule")?;

        if self.store.ttl.is_zero() {
            tracing::warn!("store.ttl_secs is 0, stored partitions are never pruned");
        } else if !self.store.write_interval.is_zero() && self.store.ttl < self.store.write_interval
        {
            tracing::warn!(
                ttl_secs = self.store.ttl.as_secs(),
                write_interval_secs = self.store.write_interval.as_secs(),
                "store.ttl_secs is shorter than store.write_interval_secs, partitions may vanish between pushes"
            );
        }

        if is_all_interfaces(&self.server.host) {
            tracing::warn!(
                host = %self.server.host,
                "Binding to all network interfaces. Uploads are not authenticated."
            );
        }

        Ok(())
    }

    /// Parsed partition header name
    pub fn partition_header_name(&self) -> Result<HeaderName> {
        HeaderName::from_bytes(self.ingest.partition_header.trim().as_bytes()).with_context(|| {
            format!(
                "Configuration error: ingest.partition_header is not a valid header name: {}",
                self.ingest.partition_header
            )
        })
    }
}

fn non_blank(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Check if host binds to all network interfaces
pub(crate) fn is_all_interfaces(host: &str) -> bool {
    matches!(host, "0.0.0.0" | "::" | "[::]")
}
