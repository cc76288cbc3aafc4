//! Durable SQLite-backed device record store.
//!
//! One row per device identifier. The conditional upsert runs inside a
//! single immediate transaction, so the manual-mode guard on the valve
//! column and the column writes commit atomically with respect to any
//! concurrent writer on the same row.
//!
//! Boolean-like columns (`valve`, `manual_mode`, `is_final`) are stored
//! as integers, matching the backing-store representation the rest of the
//! system coerces from. `updated_at` is stored as UNIX microseconds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::device::{DeviceId, DeviceRecord, Location, StoredFlag};
use crate::error::{Error, Result};
use crate::store::{next_stamp, DevicePatch, DeviceStore, UpsertMode, UpsertOutcome, ValveWrite};

/// SQLite-backed implementation of [`DeviceStore`].
///
/// rusqlite calls block, so every trait method hops to the blocking
/// thread pool; async worker threads never hold the connection lock.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating if necessary) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::store_with_source("failed to open device database", e))?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory database (tests and local development).
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be initialized.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::store_with_source("failed to open in-memory database", e))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS devices (
                mac_address     TEXT PRIMARY KEY,
                name            TEXT,
                salinity        REAL NOT NULL DEFAULT 0,
                target_salinity REAL NOT NULL DEFAULT 100,
                valve           INTEGER NOT NULL DEFAULT 0,
                manual_mode     INTEGER NOT NULL DEFAULT 0,
                is_final        INTEGER NOT NULL DEFAULT 0,
                lat             REAL NOT NULL DEFAULT 0,
                lng             REAL NOT NULL DEFAULT 0,
                address         TEXT,
                updated_at      INTEGER NOT NULL
            )",
        )
        .map_err(|e| Error::store_with_source("failed to initialize device schema", e))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn lock_conn(conn: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| Error::Internal {
        message: "lock poisoned".into(),
    })
}

async fn on_blocking_pool<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Internal {
            message: format!("store task failed: {e}"),
        })?
}

/// Builds the fixed-column SET clause for a patch.
///
/// Column names are compile-time constants; only values are bound.
fn set_clause(patch: &DevicePatch, stamp: i64) -> (String, Vec<Value>) {
    let mut sets: Vec<&'static str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(name) = &patch.name {
        sets.push("name = ?");
        values.push(match name {
            Some(name) => Value::Text(name.clone()),
            None => Value::Null,
        });
    }
    if let Some(salinity) = patch.salinity {
        sets.push("salinity = ?");
        values.push(Value::Real(salinity));
    }
    if let Some(target) = patch.target_salinity {
        sets.push("target_salinity = ?");
        values.push(Value::Real(target));
    }
    match patch.valve {
        Some(ValveWrite::Force(value)) => {
            sets.push("valve = ?");
            values.push(Value::Integer(i64::from(value)));
        }
        Some(ValveWrite::UnlessManual(value)) => {
            // The CASE expression reads the pre-update row, so the guard
            // holds even when the same statement also sets manual_mode.
            sets.push("valve = CASE WHEN manual_mode = 1 THEN valve ELSE ? END");
            values.push(Value::Integer(i64::from(value)));
        }
        None => {}
    }
    if let Some(enabled) = patch.manual_mode {
        sets.push("manual_mode = ?");
        values.push(Value::Integer(i64::from(enabled)));
    }
    if let Some(is_final) = patch.is_final {
        sets.push("is_final = ?");
        values.push(Value::Integer(i64::from(is_final)));
    }
    if let Some(location) = patch.location {
        sets.push("lat = ?");
        values.push(Value::Real(location.lat));
        sets.push("lng = ?");
        values.push(Value::Real(location.lng));
    }
    if let Some(address) = &patch.address {
        sets.push("address = ?");
        values.push(Value::Text(address.clone()));
    }

    sets.push("updated_at = ?");
    values.push(Value::Integer(stamp));

    (sets.join(", "), values)
}

fn read_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeviceRecord> {
    let updated_at_micros: i64 = row.get(10)?;
    Ok(DeviceRecord {
        id: DeviceId::new_unchecked(row.get::<_, String>(0)?),
        name: row.get(1)?,
        salinity: row.get(2)?,
        target_salinity: row.get(3)?,
        valve: StoredFlag(row.get(4)?),
        manual_mode: StoredFlag(row.get(5)?),
        is_final: StoredFlag(row.get(6)?),
        location: Location::new(row.get(7)?, row.get(8)?),
        address: row.get(9)?,
        updated_at: DateTime::from_timestamp_micros(updated_at_micros).unwrap_or_default(),
    })
}

const SELECT_COLUMNS: &str = "mac_address, name, salinity, target_salinity, valve, \
     manual_mode, is_final, lat, lng, address, updated_at";

#[async_trait]
impl DeviceStore for SqliteStore {
    async fn conditional_upsert(
        &self,
        id: &DeviceId,
        patch: DevicePatch,
        mode: UpsertMode,
    ) -> Result<UpsertOutcome> {
        let conn = Arc::clone(&self.conn);
        let id = id.clone();
        on_blocking_pool(move || {
            let mut conn = lock_conn(&conn)?;
            upsert_row(&mut conn, &id, &patch, mode)
        })
        .await
    }

    async fn get(&self, id: &DeviceId) -> Result<Option<DeviceRecord>> {
        let conn = Arc::clone(&self.conn);
        let id = id.clone();
        on_blocking_pool(move || {
            let conn = lock_conn(&conn)?;
            conn.query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM devices WHERE mac_address = ?"),
                [id.as_str()],
                read_record,
            )
            .optional()
            .map_err(|e| Error::store_with_source("failed to read device row", e))
        })
        .await
    }

    async fn list_all(&self) -> Result<Vec<DeviceRecord>> {
        let conn = Arc::clone(&self.conn);
        on_blocking_pool(move || {
            let conn = lock_conn(&conn)?;
            let mut stmt = conn
                .prepare(&format!("SELECT {SELECT_COLUMNS} FROM devices"))
                .map_err(|e| Error::store_with_source("failed to prepare device listing", e))?;
            let rows = stmt
                .query_map([], read_record)
                .map_err(|e| Error::store_with_source("failed to list device rows", e))?;

            let mut records = Vec::new();
            for row in rows {
                records.push(
                    row.map_err(|e| Error::store_with_source("failed to read device row", e))?,
                );
            }
            Ok(records)
        })
        .await
    }
}

fn upsert_row(
    conn: &mut Connection,
    id: &DeviceId,
    patch: &DevicePatch,
    mode: UpsertMode,
) -> Result<UpsertOutcome> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| Error::store_with_source("failed to begin transaction", e))?;

    let existing_stamp: Option<i64> = tx
        .query_row(
            "SELECT updated_at FROM devices WHERE mac_address = ?",
            [id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::store_with_source("failed to read device row", e))?;

    let created = existing_stamp.is_none();
    if created && mode == UpsertMode::ExistingOnly {
        return Ok(UpsertOutcome::NoMatch);
    }

    let now = Utc::now();
    let previous = existing_stamp.and_then(DateTime::from_timestamp_micros);
    let stamp = next_stamp(now, previous).timestamp_micros();

    if created {
        tx.execute(
            "INSERT INTO devices (mac_address, updated_at) VALUES (?, ?)",
            rusqlite::params![id.as_str(), stamp],
        )
        .map_err(|e| Error::store_with_source("failed to create device row", e))?;
    }

    let (sets, mut values) = set_clause(patch, stamp);
    values.push(Value::Text(id.as_str().to_string()));
    tx.execute(
        &format!("UPDATE devices SET {sets} WHERE mac_address = ?"),
        rusqlite::params_from_iter(values),
    )
    .map_err(|e| Error::store_with_source("failed to update device row", e))?;

    tx.commit()
        .map_err(|e| Error::store_with_source("failed to commit device write", e))?;

    Ok(if created {
        UpsertOutcome::Created
    } else {
        UpsertOutcome::Updated
    })
}
