//! Core application

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::ApiServer;
use crate::core::banner;
use crate::core::cli::{self, CliConfig, Commands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::data::store::{MemoryStore, RateLimitedStore, Store};
use crate::domain::metrics::transform::{
    DropInvalid, ElideLabels, MultiTransformer, Transformer, Whitelist,
};
use crate::domain::{HeaderValidator, Validator};

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    /// Backing store, also read by the federation endpoint
    pub memory: Arc<MemoryStore>,
    /// Write path; `memory` behind the rate limiter when one is configured
    pub store: Arc<dyn Store>,
    pub limiter: Option<Arc<RateLimitedStore<Arc<MemoryStore>>>>,
    pub validator: Arc<dyn Validator>,
    /// Process-wide transform pass shared by every request
    pub transformer: Arc<dyn Transformer>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        match command {
            Some(Commands::Check) => Self::check(&cli_config),
            Some(Commands::Start) | None => {
                let app = Self::init(&cli_config)?;
                Self::start_server(app).await
            }
        }
    }

    fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        Self::from_config(config)
    }

    /// Build services from a loaded configuration
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let memory = Arc::new(MemoryStore::new());
        let limiter = (!config.store.write_interval.is_zero()).then(|| {
            Arc::new(RateLimitedStore::new(
                memory.clone(),
                config.store.write_interval,
            ))
        });
        let store: Arc<dyn Store> = match &limiter {
            Some(limiter) => limiter.clone(),
            None => memory.clone(),
        };

        let validator: Arc<dyn Validator> = Arc::new(HeaderValidator::new(
            config.partition_header_name()?,
            config.ingest.partition_label.clone(),
            config.ingest.max_body_bytes,
        ));

        let transformer = Arc::new(Self::build_transformer(&config)?);
        tracing::debug!(passes = transformer.len(), "Transform chain built");

        Ok(Self {
            shutdown: ShutdownService::new(),
            config,
            memory,
            store,
            limiter,
            validator,
            transformer,
        })
    }

    fn build_transformer(config: &AppConfig) -> Result<MultiTransformer> {
        let mut chain = MultiTransformer::new().with(Arc::new(DropInvalid));

        let elide = ElideLabels::new(config.transform.elide_labels.iter().cloned());
        if !elide.is_empty() {
            chain = chain.with(Arc::new(elide));
        }

        let whitelist = Whitelist::parse(&config.transform.whitelist)
            .context("Failed to parse transform.whitelist")?;
        if !whitelist.is_empty() {
            chain = chain.with(Arc::new(whitelist));
        }

        Ok(chain)
    }

    /// Validate configuration and print the effective values
    fn check(cli: &CliConfig) -> Result<()> {
        let config = AppConfig::load(cli)?;
        let chain = Self::build_transformer(&config)?;

        println!("Configuration OK");
        println!("  server:    {}:{}", config.server.host, config.server.port);
        println!(
            "  ingest:    timeout {}s, max body {} bytes, key header {}, key label {}",
            config.ingest.timeout.as_secs(),
            config.ingest.max_body_bytes,
            config.ingest.partition_header,
            config.ingest.partition_label
        );
        println!(
            "  transform: {} pass(es), elide {:?}, {} whitelist rule(s)",
            chain.len(),
            config.transform.elide_labels,
            config.transform.whitelist.len()
        );
        println!(
            "  store:     write interval {}s, ttl {}s",
            config.store.write_interval.as_secs(),
            config.store.ttl.as_secs()
        );
        Ok(())
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_server(app: Self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        app.shutdown.install_signal_handlers();

        app.start_background_tasks().await;

        banner::print_banner(&app.config);

        let server = ApiServer::new(app);
        let app = server.start().await?;
        app.shutdown.shutdown().await;

        Ok(())
    }

    pub async fn start_background_tasks(&self) {
        let ttl = self.config.store.ttl;
        if ttl.is_zero() {
            tracing::debug!("Partition pruning disabled");
        } else {
            self.shutdown
                .register(
                    Arc::clone(&self.memory).start_prune_task(ttl, self.shutdown.subscribe()),
                )
                .await;
        }

        if let Some(limiter) = &self.limiter {
            self.shutdown
                .register(Arc::clone(limiter).start_prune_task(self.shutdown.subscribe()))
                .await;
        }

        tracing::debug!("Background tasks started");
    }
}
