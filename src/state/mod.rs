mod file;

pub use file::JsonFileStore;

use crate::config::{Config, StorageBackend};
use crate::db::Database;
use crate::error::Result;
use crate::logic::suppression::{should_suppress, Suppression};
use crate::models::{recent_executions, IrrigationLogEntry, StatusSummary};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;

/// Persistent log of recommendations and executions
pub trait StateStore: Send + Sync {
    /// Record a watering recommendation as pending
    fn log_recommendation(&self, amount: f64, reason: &str) -> Result<IrrigationLogEntry>;

    /// Mark the most recent pending recommendation as executed.
    ///
    /// A missing or non-positive amount means the recommended amount was
    /// applied. Without a pending recommendation a manual entry is recorded.
    fn mark_executed(&self, amount: Option<f64>, notes: Option<String>)
        -> Result<IrrigationLogEntry>;

    /// All entries, oldest first
    fn entries(&self) -> Result<Vec<IrrigationLogEntry>>;

    fn clear(&self) -> Result<()>;

    fn backend_name(&self) -> &'static str;

    /// Executed entries within `hours` before `now`, most recent first
    fn recent_irrigation(&self, hours: i64, now: DateTime<Utc>) -> Result<Vec<IrrigationLogEntry>> {
        Ok(recent_executions(&self.entries()?, hours, now))
    }

    fn status_summary(&self, now: DateTime<Utc>) -> Result<StatusSummary> {
        Ok(StatusSummary::from_entries(&self.entries()?, now))
    }

    fn suppression(&self, window_hours: i64, now: DateTime<Utc>) -> Result<Suppression> {
        Ok(should_suppress(&self.entries()?, window_hours, now))
    }
}

/// Treat zero or negative amounts as "not reported"
pub(crate) fn reported_amount(amount: Option<f64>) -> Option<f64> {
    amount.filter(|a| *a > 0.0)
}

/// Open the backend selected in config
pub fn open_store(config: &Config, data_dir: Option<&PathBuf>) -> Result<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match config.storage.backend {
        StorageBackend::Json => Arc::new(JsonFileStore::open(
            Config::state_file_path(data_dir)?,
            config.advisor.max_log_entries,
        )?),
        StorageBackend::Sqlite => Arc::new(
            Database::open(&Config::db_path(data_dir)?)?
                .with_max_events(config.advisor.max_log_entries),
        ),
    };
    tracing::debug!(backend = store.backend_name(), "Opened state store");
    Ok(store)
}
