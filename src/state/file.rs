use super::{reported_amount, StateStore};
use crate::error::{AdvisorError, Result};
use crate::models::IrrigationLogEntry;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const STATE_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileState {
    last_recommendation: Option<IrrigationLogEntry>,
    irrigation_log: Vec<IrrigationLogEntry>,
    version: String,
    #[serde(default)]
    next_id: i64,
}

impl Default for FileState {
    fn default() -> Self {
        Self {
            last_recommendation: None,
            irrigation_log: Vec::new(),
            version: STATE_VERSION.to_string(),
            next_id: 1,
        }
    }
}

/// State kept in a single JSON document.
///
/// The file is re-read at the start of every operation, since the HTTP
/// service and the MQTT listener may run as separate processes on it.
pub struct JsonFileStore {
    path: PathBuf,
    max_entries: usize,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open the state file, starting fresh when it is missing or unreadable
    pub fn open(path: impl Into<PathBuf>, max_entries: usize) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            tracing::info!(path = %path.display(), "Creating new state file");
        }

        Ok(Self {
            path,
            max_entries: max_entries.max(1),
            write_lock: Mutex::new(()),
        })
    }

    /// Serialize operations in this process and load the current file
    fn lock(&self) -> (MutexGuard<'_, ()>, FileState) {
        let guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        (guard, load_state(&self.path))
    }

    fn save(&self, state: &FileState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Write then rename so a crash never leaves half a file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(state)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn push(&self, state: &mut FileState, mut entry: IrrigationLogEntry) -> IrrigationLogEntry {
        entry.id = Some(state.next_id);
        state.next_id += 1;
        state.irrigation_log.push(entry.clone());

        if state.irrigation_log.len() > self.max_entries {
            let excess = state.irrigation_log.len() - self.max_entries;
            state.irrigation_log.drain(..excess);
        }
        entry
    }
}

fn load_state(path: &Path) -> FileState {
    if !path.exists() {
        return FileState::default();
    }

    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|s| serde_json::from_str::<FileState>(&s).map_err(|e| e.to_string()));

    match parsed {
        Ok(mut state) => {
            // Older files have no id counter
            let max_id = state
                .irrigation_log
                .iter()
                .filter_map(|e| e.id)
                .max()
                .unwrap_or(0);
            state.next_id = state.next_id.max(max_id + 1);
            tracing::debug!(
                path = %path.display(),
                entries = state.irrigation_log.len(),
                "State loaded"
            );
            state
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Unreadable state file, starting fresh");
            FileState::default()
        }
    }
}

impl StateStore for JsonFileStore {
    fn log_recommendation(&self, amount: f64, reason: &str) -> Result<IrrigationLogEntry> {
        let (_guard, mut state) = self.lock();
        let entry = self.push(&mut state, IrrigationLogEntry::recommendation(amount, reason));
        state.last_recommendation = Some(entry.clone());
        self.save(&state)?;

        tracing::info!(amount, reason, "Recommendation logged");
        Ok(entry)
    }

    fn mark_executed(
        &self,
        amount: Option<f64>,
        notes: Option<String>,
    ) -> Result<IrrigationLogEntry> {
        let amount = reported_amount(amount);
        let (_guard, mut state) = self.lock();

        let pending = state
            .irrigation_log
            .iter_mut()
            .rev()
            .find(|e| e.is_pending());

        let entry = match pending {
            Some(entry) => {
                entry.mark_executed(amount, notes, Utc::now());
                let entry = entry.clone();
                if state
                    .last_recommendation
                    .as_ref()
                    .is_some_and(|last| last.id == entry.id)
                {
                    state.last_recommendation = Some(entry.clone());
                }
                entry
            }
            None => {
                let Some(amount) = amount else {
                    return Err(AdvisorError::InvalidData(
                        "no pending recommendation and no amount given".into(),
                    ));
                };
                tracing::info!(amount, "No pending recommendation, recording manual irrigation");
                self.push(&mut state, IrrigationLogEntry::manual(amount, notes))
            }
        };

        self.save(&state)?;
        tracing::info!(
            amount = entry.applied_amount(),
            kind = entry.kind.as_str(),
            "Irrigation marked as executed"
        );
        Ok(entry)
    }

    fn entries(&self) -> Result<Vec<IrrigationLogEntry>> {
        let (_guard, state) = self.lock();
        Ok(state.irrigation_log)
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.save(&FileState::default())?;
        tracing::info!(path = %self.path.display(), "State cleared");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn temp_path() -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "irrigation-advisor-state-{}-{}.json",
            std::process::id(),
            n
        ))
    }

    #[test]
    fn log_and_mark_executed() {
        let path = temp_path();
        let store = JsonFileStore::open(&path, 50).unwrap();

        let logged = store.log_recommendation(12.0, "dry").unwrap();
        assert_eq!(logged.id, Some(1));

        let executed = store.mark_executed(Some(10.0), Some("evening".into())).unwrap();
        assert_eq!(executed.id, Some(1));
        assert_eq!(executed.actual_amount, Some(10.0));
        assert_eq!(executed.kind, EntryKind::Advisor);

        let summary = store.status_summary(Utc::now()).unwrap();
        assert!(summary.last_recommendation.executed);
        assert_eq!(summary.pending_recommendations, 0);
        assert_eq!(summary.recent_24h.total_amount, 10.0);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn non_positive_amount_means_recommended() {
        let path = temp_path();
        let store = JsonFileStore::open(&path, 50).unwrap();
        store.log_recommendation(14.0, "dry").unwrap();

        let executed = store.mark_executed(Some(0.0), None).unwrap();
        assert_eq!(executed.actual_amount, Some(14.0));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn no_pending_records_manual_entry() {
        let path = temp_path();
        let store = JsonFileStore::open(&path, 50).unwrap();

        let entry = store.mark_executed(Some(6.0), None).unwrap();
        assert_eq!(entry.kind, EntryKind::Manual);
        assert_eq!(store.entries().unwrap()[0].kind, EntryKind::Manual);

        let suppression = store.suppression(6, Utc::now()).unwrap();
        assert!(suppression.suppress);
        assert_eq!(suppression.recent_total_mm, 6.0);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn no_pending_and_no_amount_is_an_error() {
        let path = temp_path();
        let store = JsonFileStore::open(&path, 50).unwrap();
        let err = store.mark_executed(None, None).unwrap_err();
        assert!(matches!(err, AdvisorError::InvalidData(_)));
    }

    #[test]
    fn state_survives_reopen() {
        let path = temp_path();
        {
            let store = JsonFileStore::open(&path, 50).unwrap();
            store.log_recommendation(8.0, "light").unwrap();
            store.log_recommendation(15.0, "hot").unwrap();
        }

        let store = JsonFileStore::open(&path, 50).unwrap();
        let entries = store.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].reason, "hot");

        // ids keep counting after reopen
        let next = store.log_recommendation(5.0, "again").unwrap();
        assert_eq!(next.id, Some(3));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn keeps_only_last_entries() {
        let path = temp_path();
        let store = JsonFileStore::open(&path, 3).unwrap();
        for i in 0..5 {
            store.log_recommendation(f64::from(i), &format!("r{}", i)).unwrap();
        }
        let entries = store.entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].reason, "r2");

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn corrupt_file_is_replaced() {
        let path = temp_path();
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::open(&path, 50).unwrap();
        assert!(store.entries().unwrap().is_empty());
        store.log_recommendation(8.0, "fresh").unwrap();

        let reopened = JsonFileStore::open(&path, 50).unwrap();
        assert_eq!(reopened.entries().unwrap().len(), 1);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn stores_on_same_file_see_each_other() {
        let path = temp_path();
        let server = JsonFileStore::open(&path, 50).unwrap();
        let listener = JsonFileStore::open(&path, 50).unwrap();

        listener.mark_executed(Some(10.0), None).unwrap();

        let suppression = server.suppression(6, Utc::now()).unwrap();
        assert!(suppression.suppress);
        assert_eq!(suppression.recent_total_mm, 10.0);

        // A write from one store keeps what the other one recorded
        server.log_recommendation(8.0, "dry").unwrap();
        let entries = JsonFileStore::open(&path, 50).unwrap().entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::Manual);
        assert_eq!(entries[0].actual_amount, Some(10.0));
        assert_eq!(entries[1].recommended_amount, 8.0);
        assert_eq!(entries[1].id, Some(2));

        listener.mark_executed(None, None).unwrap();
        assert_eq!(server.status_summary(Utc::now()).unwrap().pending_recommendations, 0);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn clear_empties_log() {
        let path = temp_path();
        let store = JsonFileStore::open(&path, 50).unwrap();
        store.log_recommendation(8.0, "light").unwrap();
        store.clear().unwrap();
        assert!(store.entries().unwrap().is_empty());
        assert!(store
            .status_summary(Utc::now())
            .unwrap()
            .last_recommendation
            .time
            .is_none());

        std::fs::remove_file(path).ok();
    }
}
