// 🗄️ Audit trail + roster import
//
// Every successful mutation in eTour/SMOS becomes an Event ("every change is
// an event"). Events live in memory during a run and can be flushed to a
// SQLite database in WAL mode.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex};

// ============================================================================
// EVENT
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// IN-MEMORY AUDIT TRAIL
// ============================================================================

/// Shared, append-only list of events recorded during a run
#[derive(Clone, Default)]
pub struct AuditTrail {
    events: Arc<Mutex<Vec<Event>>>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: Event) {
        // Events are plain data, so a poisoned lock is still usable
        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn for_entity(&self, entity_type: &str, entity_id: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every recorded event, leaving the trail empty
    pub fn drain(&self) -> Vec<Event> {
        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *events)
    }
}

// ============================================================================
// SQLITE
// ============================================================================

pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open audit database {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS audit_events (
             seq         INTEGER PRIMARY KEY AUTOINCREMENT,
             event_id    TEXT UNIQUE NOT NULL,
             recorded_at TEXT NOT NULL,
             kind        TEXT NOT NULL,
             entity_type TEXT NOT NULL,
             entity_id   TEXT NOT NULL,
             payload     TEXT NOT NULL,
             actor       TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_events(entity_type, entity_id);
         CREATE INDEX IF NOT EXISTS idx_audit_recorded ON audit_events(recorded_at);",
    )?;

    Ok(())
}

const INSERT_EVENT: &str = "INSERT OR IGNORE INTO audit_events
     (event_id, recorded_at, kind, entity_type, entity_id, payload, actor)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

const SELECT_EVENTS: &str = "SELECT event_id, recorded_at, kind, entity_type, entity_id, payload, actor
     FROM audit_events";

/// Returns 1 when the event was new, 0 when its id was already stored
fn write_event(stmt: &mut rusqlite::Statement<'_>, event: &Event) -> Result<usize> {
    let payload = serde_json::to_string(&event.data)?;
    let written = stmt.execute(params![
        &event.event_id,
        event.timestamp.to_rfc3339(),
        &event.event_type,
        &event.entity_type,
        &event.entity_id,
        payload,
        &event.actor,
    ])?;
    Ok(written)
}

pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let mut stmt = conn.prepare_cached(INSERT_EVENT)?;
    write_event(&mut stmt, event)?;
    Ok(())
}

/// Insert a batch in one SQLite transaction, returning how many were new
pub fn insert_events(conn: &mut Connection, events: &[Event]) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut inserted = 0;
    {
        let mut stmt = tx.prepare(INSERT_EVENT)?;
        for event in events {
            inserted += write_event(&mut stmt, event)?;
        }
    }
    tx.commit()?;
    Ok(inserted)
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let recorded_at: String = row.get(1)?;
    let payload: String = row.get(5)?;

    Ok(Event {
        event_id: row.get(0)?,
        timestamp: DateTime::parse_from_rfc3339(&recorded_at)
            .map_err(|e| conversion_error(1, e))?
            .with_timezone(&Utc),
        event_type: row.get(2)?,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        data: serde_json::from_str(&payload).map_err(|e| conversion_error(5, e))?,
        actor: row.get(6)?,
    })
}

/// History of one entity, newest first
pub fn get_events_for_entity(conn: &Connection, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
    let sql = format!(
        "{} WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY recorded_at DESC, seq DESC",
        SELECT_EVENTS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![entity_type, entity_id], row_to_event)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Most recent events across all entities
pub fn get_recent_events(conn: &Connection, limit: usize) -> Result<Vec<Event>> {
    let sql = format!("{} ORDER BY recorded_at DESC, seq DESC LIMIT ?1", SELECT_EVENTS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![limit as i64], row_to_event)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn count_events(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM audit_events", [], |row| row.get(0))?)
}

// ============================================================================
// ROSTER CSV
// ============================================================================

/// One line of a class roster export
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RosterRow {
    pub student_id: String,
    pub name: String,
    pub surname: String,
    pub parent_email: String,
    pub class_name: String,
}

pub fn load_roster_csv(path: &Path) -> Result<Vec<RosterRow>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open roster {}", path.display()))?;
    load_roster_reader(file)
}

pub fn load_roster_reader<R: Read>(reader: R) -> Result<Vec<RosterRow>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut rows = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let row: RosterRow =
            result.with_context(|| format!("Failed to parse roster row {}", line + 2))?;
        rows.push(row);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(entity_id: &str, event_type: &str) -> Event {
        Event::new(
            event_type,
            "banner",
            entity_id,
            serde_json::json!({"image": "sunset.png"}),
            "operator",
        )
    }

    #[test]
    fn test_event_log() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let event = Event::new(
            "absence_recorded",
            "absence",
            "abs_123",
            serde_json::json!({"student": "S001"}),
            "admin",
        );

        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "absence", "abs_123").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "absence_recorded");
        assert_eq!(events[0].actor, "admin");
        assert_eq!(events[0].data["student"], "S001");
    }

    #[test]
    fn test_insert_events_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let events = vec![sample_event("b1", "banner_inserted"), sample_event("b1", "banner_modified")];

        assert_eq!(insert_events(&mut conn, &events).unwrap(), 2);
        // Same event ids again: nothing new
        assert_eq!(insert_events(&mut conn, &events).unwrap(), 0);
        assert_eq!(count_events(&conn).unwrap(), 2);
    }

    #[test]
    fn test_recent_events_limit() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let events: Vec<Event> = (0..5).map(|i| sample_event(&format!("b{}", i), "banner_inserted")).collect();
        insert_events(&mut conn, &events).unwrap();

        assert_eq!(get_recent_events(&conn, 3).unwrap().len(), 3);
    }

    #[test]
    fn test_audit_trail_drain() {
        let trail = AuditTrail::new();
        let handle = trail.clone();

        trail.record(sample_event("b1", "banner_inserted"));
        handle.record(sample_event("b2", "banner_inserted"));

        assert_eq!(trail.len(), 2);
        assert_eq!(trail.for_entity("banner", "b2").len(), 1);

        let drained = handle.drain();
        assert_eq!(drained.len(), 2);
        assert!(trail.is_empty());
    }

    #[test]
    fn test_load_roster() {
        let data = "student_id,name,surname,parent_email,class_name\n\
                    S001, John ,Smith,parent.smith@example.com,3A\n\
                    S002,Emma,Johnson,emma.parent@example.com,3B\n";

        let rows = load_roster_reader(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "John");
        assert_eq!(rows[1].class_name, "3B");
    }

    #[test]
    fn test_load_roster_reports_bad_row() {
        let data = "student_id,name,surname\nS001,John,Smith\n";
        let err = load_roster_reader(data.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }
}
