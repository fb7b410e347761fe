use crate::db::Database;
use crate::error::{AdvisorError, Result};
use crate::models::{EntryKind, IrrigationLogEntry};
use crate::state::{reported_amount, StateStore};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::warn;

// Irrigation Event Queries

impl Database {
    pub fn insert_event(&self, entry: &IrrigationLogEntry) -> Result<i64> {
        self.with_conn(|conn| insert_event(conn, entry))
    }

    pub fn list_events(&self) -> Result<Vec<IrrigationLogEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM irrigation_events ORDER BY id")?;
            let events = stmt
                .query_map([], row_to_event)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(events)
        })
    }

    pub fn delete_all_events(&self) -> Result<usize> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM irrigation_events", [])?))
    }
}

fn insert_event(conn: &Connection, entry: &IrrigationLogEntry) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO irrigation_events
            (timestamp, recommended_amount, actual_amount, reason, executed,
             execution_timestamp, notes, kind)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            entry.timestamp.to_rfc3339(),
            entry.recommended_amount,
            entry.actual_amount,
            entry.reason,
            entry.executed,
            entry.execution_timestamp.map(|t| t.to_rfc3339()),
            entry.notes,
            entry.kind.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Drop all but the newest `keep` events
fn trim_events(conn: &Connection, keep: Option<usize>) -> Result<usize> {
    let Some(keep) = keep else {
        return Ok(0);
    };
    let deleted = conn.execute(
        r#"
        DELETE FROM irrigation_events
        WHERE id NOT IN (SELECT id FROM irrigation_events ORDER BY id DESC LIMIT ?1)
        "#,
        params![keep as i64],
    )?;
    if deleted > 0 {
        tracing::debug!(deleted, keep, "Trimmed irrigation events");
    }
    Ok(deleted)
}

fn latest_pending(conn: &Connection) -> Result<Option<IrrigationLogEntry>> {
    conn.query_row(
        r#"
        SELECT * FROM irrigation_events
        WHERE executed = 0 AND kind = 'advisor'
        ORDER BY id DESC LIMIT 1
        "#,
        [],
        row_to_event,
    )
    .optional()
    .map_err(Into::into)
}

fn row_to_event(row: &Row) -> rusqlite::Result<IrrigationLogEntry> {
    let timestamp_str: String = row.get("timestamp")?;
    let execution_str: Option<String> = row.get("execution_timestamp")?;
    let kind_str: String = row.get("kind")?;

    let kind = EntryKind::from_str(&kind_str).unwrap_or_else(|| {
        warn!(kind = %kind_str, "Unknown event kind in database, defaulting to advisor");
        EntryKind::Advisor
    });

    Ok(IrrigationLogEntry {
        id: Some(row.get("id")?),
        timestamp: parse_timestamp(&timestamp_str),
        recommended_amount: row.get("recommended_amount")?,
        actual_amount: row.get("actual_amount")?,
        reason: row.get("reason")?,
        executed: row.get("executed")?,
        execution_timestamp: execution_str.as_deref().map(parse_timestamp),
        notes: row.get("notes")?,
        kind,
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            warn!(timestamp = %s, "Unparseable timestamp in database");
            Utc::now()
        })
}

impl StateStore for Database {
    fn log_recommendation(&self, amount: f64, reason: &str) -> Result<IrrigationLogEntry> {
        let mut entry = IrrigationLogEntry::recommendation(amount, reason);
        entry.id = Some(self.with_conn(|conn| {
            let id = insert_event(conn, &entry)?;
            trim_events(conn, self.max_events)?;
            Ok(id)
        })?);

        tracing::info!(amount, reason, "Recommendation logged");
        Ok(entry)
    }

    fn mark_executed(
        &self,
        amount: Option<f64>,
        notes: Option<String>,
    ) -> Result<IrrigationLogEntry> {
        let amount = reported_amount(amount);

        let entry = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let entry = match latest_pending(&tx)? {
                Some(mut entry) => {
                    entry.mark_executed(amount, notes, Utc::now());
                    tx.execute(
                        r#"
                        UPDATE irrigation_events SET
                            actual_amount = ?1, executed = 1, execution_timestamp = ?2, notes = ?3
                        WHERE id = ?4
                        "#,
                        params![
                            entry.actual_amount,
                            entry.execution_timestamp.map(|t| t.to_rfc3339()),
                            entry.notes,
                            entry.id,
                        ],
                    )?;
                    entry
                }
                None => {
                    let amount = amount.ok_or_else(|| {
                        AdvisorError::InvalidData(
                            "no pending recommendation and no amount given".into(),
                        )
                    })?;
                    tracing::info!(amount, "No pending recommendation, recording manual irrigation");
                    let mut entry = IrrigationLogEntry::manual(amount, notes);
                    entry.id = Some(insert_event(&tx, &entry)?);
                    trim_events(&tx, self.max_events)?;
                    entry
                }
            };
            tx.commit()?;
            Ok(entry)
        })?;

        tracing::info!(
            amount = entry.applied_amount(),
            kind = entry.kind.as_str(),
            "Irrigation marked as executed"
        );
        Ok(entry)
    }

    fn entries(&self) -> Result<Vec<IrrigationLogEntry>> {
        self.list_events()
    }

    fn clear(&self) -> Result<()> {
        let deleted = self.delete_all_events()?;
        tracing::info!(deleted, "State cleared");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

trait OptionalExt<T> {
    fn optional(self) -> rusqlite::Result<Option<T>>;
}

impl<T> OptionalExt<T> for rusqlite::Result<T> {
    fn optional(self) -> rusqlite::Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
