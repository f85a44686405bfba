//! Folder session daemon behind a markdown book editor.
//!
//! Binds real directories to lightweight sessions, serves filtered and
//! ordered structure snapshots of them, and drives an external static-site
//! build tool whose output it relocates into durable per-session storage.

pub mod config;
pub mod error;
pub mod export;
pub mod files;
pub mod fsops;
pub mod locks;
pub mod registry;
pub mod rest;
pub mod scaffold;
pub mod scan;
pub mod storage;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context as _, Result};

use crate::config::ServerConfig;
use crate::export::ExportPipeline;
use crate::files::FileManager;
use crate::registry::SessionRegistry;
use crate::scaffold::Scaffolder;
use crate::storage::Storage;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<SessionRegistry>,
    pub scaffolder: Arc<Scaffolder>,
    pub exporter: Arc<ExportPipeline>,
    pub files: Arc<FileManager>,
    pub started_at: Instant,
}

impl AppContext {
    /// Open storage, create the daemon-owned directories and wire up the
    /// service singletons.
    pub async fn init(config: ServerConfig) -> Result<Self> {
        let config = Arc::new(config);

        for dir in [
            config.sites_dir(),
            config.artifacts_dir(),
            config.images_dir(),
        ] {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }

        let storage = Arc::new(Storage::open(&config.data_dir).await?);
        let registry = Arc::new(SessionRegistry::new(storage, config.scan_options()));
        let scaffolder = Arc::new(Scaffolder::new(config.clone()));
        let exporter = Arc::new(ExportPipeline::new(config.clone(), registry.clone()));
        let files = Arc::new(FileManager::new(config.clone())?);

        Ok(Self {
            config,
            registry,
            scaffolder,
            exporter,
            files,
            started_at: Instant::now(),
        })
    }
}
