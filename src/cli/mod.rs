//! Command-line interface for fintrack-sync.

pub mod args;
pub mod commands;

use std::sync::Arc;

use crate::config::{ColorSetting, Config, Paths};
use crate::error::Result;
use crate::features::sync::{HttpExecutor, SqliteQueue, SyncService};
use crate::storage::Database;

use args::{Cli, OutputFormat};

/// Resolved configuration shared by every command.
pub struct Context {
    pub config: Config,
    pub paths: Paths,
    pub format: OutputFormat,
}

impl Context {
    /// Resolve paths and load config, applying command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the data root cannot be determined or the config
    /// file exists but cannot be parsed.
    pub fn load(cli: &Cli) -> Result<Self> {
        let paths = Paths::new()?;
        let config_file = cli.config.clone().unwrap_or_else(|| paths.config_file.clone());
        let mut config = Config::load_from_path(&config_file)?;

        if let Some(token) = &cli.token {
            config.api.token = Some(token.clone());
        }

        match config.general.color {
            ColorSetting::Auto => {}
            ColorSetting::Always => colored::control::set_override(true),
            ColorSetting::Never => colored::control::set_override(false),
        }

        let format = cli.output.unwrap_or(config.general.default_output);
        Ok(Self {
            config,
            paths,
            format,
        })
    }

    /// Open the queue database, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open_queue(&self) -> Result<Arc<SqliteQueue>> {
        self.paths.ensure_dirs()?;
        let db = Database::open_at(&self.paths.database)?;
        let queue = SqliteQueue::with_database(db)?.with_capacity(self.config.queue.max_operations);
        Ok(Arc::new(queue))
    }

    /// Build a sync service that replays over HTTP.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn sync_service(&self, queue: Arc<SqliteQueue>) -> Result<SyncService> {
        let executor = HttpExecutor::new(self.config.api.clone())?;
        Ok(SyncService::new(
            queue,
            Arc::new(executor),
            self.config.sync.clone(),
        ))
    }
}
