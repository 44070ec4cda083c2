//! testdeck server entrypoint
//!
//! Thin orchestrator: load configuration, initialize logging, open the
//! storage backend, stand up the change-feed registry and suite
//! repository, then run until a termination signal arrives. The HTTP
//! surface that would sit on top of the repository is wired by the
//! embedding deployment; this binary owns the core lifecycle.

use anyhow::{Context, Result};
use log::info;
use std::env;
use std::path::Path;
use std::sync::Arc;
use testdeck::config::ServerConfig;
use testdeck::logging;
use testdeck_core::{SuiteRepo, WatcherRegistry};
use testdeck_store::{MemoryBackend, RocksDBBackend, StorageBackend};
use testdeck_store::suite_store::{AGG_PARTITION, START_INDEX_PARTITION, SUITES_PARTITION};

fn open_backend(config: &ServerConfig) -> Result<Arc<dyn StorageBackend>> {
    match config.storage.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryBackend::new())),
        _ => {
            let backend = RocksDBBackend::open(
                Path::new(&config.storage.data_dir),
                &[SUITES_PARTITION, START_INDEX_PARTITION, AGG_PARTITION],
            )
            .with_context(|| {
                format!("Failed to open RocksDB at {}", config.storage.data_dir)
            })?;
            Ok(Arc::new(backend))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let config_path = args.get(1).map(String::as_str).unwrap_or("testdeck.toml");

    // Missing config file is fine; defaults plus env overrides apply.
    let config = if Path::new(config_path).exists() {
        match ServerConfig::from_file(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("FATAL: Failed to load {}: {}", config_path, e);
                std::process::exit(1);
            }
        }
    } else {
        let mut cfg = ServerConfig::default();
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        cfg
    };

    // Logging before any other side effects
    let server_log_path = format!("{}/server.log", config.logging.logs_path);
    logging::init_logging(
        &config.logging.level,
        &server_log_path,
        config.logging.log_to_console,
        Some(&config.logging.targets),
        &config.logging.format,
    )?;

    info!(
        "testdeck v{} starting: backend={}, data_dir={}",
        env!("CARGO_PKG_VERSION"),
        config.storage.backend,
        config.storage.data_dir
    );
    info!("Host: {}  Port: {}", config.server.host, config.server.port);

    let backend = open_backend(&config)?;
    let registry = WatcherRegistry::new(backend.clone());
    let _repo = SuiteRepo::new(backend, registry.clone())
        .context("Failed to initialize suite repository")?;

    info!(
        "Change feed ready (max window padding: {})",
        config.changefeed.max_pad
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received");
    registry.shutdown();
    info!("testdeck stopped");
    Ok(())
}
