//! SQLite-backed event store

use chrono::DateTime;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{EventFilter, EventId, EventStore, StoreError, WeightEvent};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS weight_events (
    id TEXT PRIMARY KEY,
    timestamp_us INTEGER NOT NULL,
    starting_weight REAL NOT NULL,
    final_weight REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_weight_events_ts ON weight_events (timestamp_us);
";

/// Event store persisted to a SQLite database file.
///
/// `rusqlite::Connection` is `!Sync`, so access is serialised by a Mutex.
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
}

impl SqliteEventStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        // WAL so readers (event queries) don't block the reader loop's inserts
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA synchronous=NORMAL;")?;

        debug!("weight event store opened at {:?}", path);
        Self::with_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn insert(&self, event: &WeightEvent) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT INTO weight_events (id, timestamp_us, starting_weight, final_weight)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                event.id.to_string(),
                event.timestamp.timestamp_micros(),
                event.starting_weight,
                event.final_weight
            ],
        )?;
        Ok(())
    }
}

type EventRow = (String, i64, f64, f64);

fn row_to_event(row: EventRow) -> Result<WeightEvent, StoreError> {
    let (id, timestamp_us, starting_weight, final_weight) = row;
    let id = Uuid::parse_str(&id)
        .map_err(|e| StoreError::CorruptRow(format!("id '{}': {}", id, e)))?;
    let timestamp = DateTime::from_timestamp_micros(timestamp_us)
        .ok_or_else(|| StoreError::CorruptRow(format!("timestamp {}", timestamp_us)))?;
    Ok(WeightEvent {
        id,
        timestamp,
        starting_weight,
        final_weight,
    })
}

impl EventStore for SqliteEventStore {
    fn append(&self, starting_weight: f64, final_weight: f64) -> Result<EventId, StoreError> {
        let event = WeightEvent::new(starting_weight, final_weight);
        self.insert(&event)?;
        Ok(event.id)
    }

    fn query(&self, filter: &EventFilter) -> Result<Vec<WeightEvent>, StoreError> {
        let mut sql = String::from(
            "SELECT id, timestamp_us, starting_weight, final_weight FROM weight_events WHERE 1=1",
        );
        let mut args: Vec<SqlValue> = Vec::new();

        if let Some(min) = filter.min_weight {
            sql.push_str(" AND final_weight >= ?");
            args.push(SqlValue::Real(min));
        }
        if let Some(max) = filter.max_weight {
            sql.push_str(" AND final_weight <= ?");
            args.push(SqlValue::Real(max));
        }
        if let Some(start) = filter.start {
            sql.push_str(" AND timestamp_us >= ?");
            args.push(SqlValue::Integer(start.timestamp_micros()));
        }
        if let Some(end) = filter.end {
            sql.push_str(" AND timestamp_us <= ?");
            args.push(SqlValue::Integer(end.timestamp_micros()));
        }
        sql.push_str(" ORDER BY timestamp_us DESC, rowid DESC");

        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<Vec<EventRow>, _>>()?;

        rows.into_iter().map(row_to_event).collect()
    }
}
