//! Device record store abstraction.
//!
//! This module defines the store contract the core components share:
//! - Atomic per-row conditional upsert with a tagged created/updated result
//! - Point reads and full-fleet listing
//!
//! The conditional valve write is the one place with a real race surface:
//! a sync report (`ValveWrite::UnlessManual`) and an operator edit
//! (`ValveWrite::Force`, possibly flipping `manual_mode`) may target the
//! same record concurrently. Backends must evaluate the manual-mode guard
//! and apply the patch as a single atomic operation against the row, never
//! as a separate read followed by a separate write.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::device::{DeviceId, DeviceRecord, Location, StoredFlag};
use crate::error::{Error, Result};

/// A valve write together with its control-regime guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValveWrite {
    /// Persist the value regardless of control regime (operator path).
    Force(bool),
    /// Persist the value only while the record is not in manual mode
    /// (device sync path). Evaluated against the record's `manual_mode`
    /// as it was before this patch.
    UnlessManual(bool),
}

/// Row-creation behavior of a conditional upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    /// Create the row with table defaults when absent, then apply the patch.
    CreateIfMissing,
    /// Match zero rows when absent; the store is left untouched.
    ExistingOnly,
}

/// Result of a conditional upsert.
///
/// Creation is reported explicitly rather than inferred from a subsequent
/// read; the reconciliation engine branches on it for the bootstrap echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The row did not exist and was created with defaults plus the patch.
    Created,
    /// The row existed and the patch was applied.
    Updated,
    /// An `ExistingOnly` upsert matched no row; nothing was written.
    NoMatch,
}

/// A typed partial update for a device record.
///
/// The editable fields are a fixed enumerated set; there is no dynamic
/// field-name construction anywhere in the write path.
#[derive(Debug, Clone, Default)]
pub struct DevicePatch {
    /// New display label; `Some(None)` clears it.
    pub name: Option<Option<String>>,
    /// New sensor measurement.
    pub salinity: Option<f64>,
    /// New desired salinity.
    pub target_salinity: Option<f64>,
    /// Guarded valve write.
    pub valve: Option<ValveWrite>,
    /// New manual-mode flag.
    pub manual_mode: Option<bool>,
    /// New completion flag.
    pub is_final: Option<bool>,
    /// New device location.
    pub location: Option<Location>,
    /// New human-readable location string.
    pub address: Option<String>,
}

impl DevicePatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the display label.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(Some(name.into()));
        self
    }

    /// Clears the display label.
    #[must_use]
    pub fn clear_name(mut self) -> Self {
        self.name = Some(None);
        self
    }

    /// Sets the sensor measurement.
    #[must_use]
    pub fn salinity(mut self, salinity: f64) -> Self {
        self.salinity = Some(salinity);
        self
    }

    /// Sets the desired salinity.
    #[must_use]
    pub fn target_salinity(mut self, target: f64) -> Self {
        self.target_salinity = Some(target);
        self
    }

    /// Sets the guarded valve write.
    #[must_use]
    pub fn valve(mut self, write: ValveWrite) -> Self {
        self.valve = Some(write);
        self
    }

    /// Sets the manual-mode flag.
    #[must_use]
    pub fn manual_mode(mut self, enabled: bool) -> Self {
        self.manual_mode = Some(enabled);
        self
    }

    /// Sets the completion flag.
    #[must_use]
    pub fn is_final(mut self, is_final: bool) -> Self {
        self.is_final = Some(is_final);
        self
    }

    /// Sets the device location.
    #[must_use]
    pub fn location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Sets the human-readable location string.
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Returns true when the patch sets no fields at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.salinity.is_none()
            && self.target_salinity.is_none()
            && self.valve.is_none()
            && self.manual_mode.is_none()
            && self.is_final.is_none()
            && self.location.is_none()
            && self.address.is_none()
    }

    /// Applies the patch to a record in place.
    ///
    /// The `UnlessManual` guard is evaluated against the record's
    /// `manual_mode` before any field of this patch is assigned.
    pub(crate) fn apply(&self, record: &mut DeviceRecord) {
        let was_manual = record.manual_mode.is_set();

        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(salinity) = self.salinity {
            record.salinity = salinity;
        }
        if let Some(target) = self.target_salinity {
            record.target_salinity = target;
        }
        match self.valve {
            Some(ValveWrite::Force(value)) => record.valve = StoredFlag::from_bool(value),
            Some(ValveWrite::UnlessManual(value)) if !was_manual => {
                record.valve = StoredFlag::from_bool(value);
            }
            _ => {}
        }
        if let Some(enabled) = self.manual_mode {
            record.manual_mode = StoredFlag::from_bool(enabled);
        }
        if let Some(is_final) = self.is_final {
            record.is_final = StoredFlag::from_bool(is_final);
        }
        if let Some(location) = self.location {
            record.location = location;
        }
        if let Some(address) = &self.address {
            record.address = Some(address.clone());
        }
    }
}

/// Returns the `updated_at` stamp for a write happening now.
///
/// `updated_at` must strictly increase on every successful write so that
/// consumers can use it as a freshness signal; if the clock has not moved
/// past the previous stamp, step one microsecond past it.
pub(crate) fn next_stamp(now: DateTime<Utc>, previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match previous {
        Some(prev) if prev >= now => prev + Duration::microseconds(1),
        _ => now,
    }
}

/// Device record store trait.
///
/// The store is the only shared resource between the reconciliation
/// engine, the fleet view projector, and the command applier; backends
/// must be safe for concurrent per-request use.
#[async_trait]
pub trait DeviceStore: Send + Sync + 'static {
    /// Applies a typed partial update to the record for `id` as a single
    /// atomic conditional operation, stamping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store is unavailable or the write
    /// fails. A `NoMatch` outcome is a normal result, not an error.
    async fn conditional_upsert(
        &self,
        id: &DeviceId,
        patch: DevicePatch,
        mode: UpsertMode,
    ) -> Result<UpsertOutcome>;

    /// Reads the record for `id`, or `None` if the device is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store is unavailable.
    async fn get(&self, id: &DeviceId) -> Result<Option<DeviceRecord>>;

    /// Reads every currently persisted record, each exactly once.
    ///
    /// No ordering is guaranteed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store is unavailable.
    async fn list_all(&self) -> Result<Vec<DeviceRecord>>;
}

/// In-memory device store for tests and local development.
///
/// Thread-safe via `RwLock`; the write lock is held for the whole
/// conditional upsert, which gives the required per-row atomicity.
/// Not durable.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<HashMap<String, DeviceRecord>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn conditional_upsert(
        &self,
        id: &DeviceId,
        patch: DevicePatch,
        mode: UpsertMode,
    ) -> Result<UpsertOutcome> {
        let mut rows = self.rows.write().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        let now = Utc::now();
        if let Some(record) = rows.get_mut(id.as_str()) {
            let stamp = next_stamp(now, Some(record.updated_at));
            patch.apply(record);
            record.updated_at = stamp;
            return Ok(UpsertOutcome::Updated);
        }

        match mode {
            UpsertMode::ExistingOnly => Ok(UpsertOutcome::NoMatch),
            UpsertMode::CreateIfMissing => {
                let mut record = DeviceRecord::with_defaults(id.clone(), now);
                patch.apply(&mut record);
                rows.insert(id.as_str().to_string(), record);
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn get(&self, id: &DeviceId) -> Result<Option<DeviceRecord>> {
        let rows = self.rows.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;
        Ok(rows.get(id.as_str()).cloned())
    }

    async fn list_all(&self) -> Result<Vec<DeviceRecord>> {
        let rows = self.rows.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;
        Ok(rows.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> DeviceId {
        DeviceId::new_unchecked(s)
    }

    #[tokio::test]
    async fn create_if_missing_creates_with_defaults_then_patch() {
        let store = MemoryStore::new();

        let outcome = store
            .conditional_upsert(
                &id("aa"),
                DevicePatch::new().salinity(3.5),
                UpsertMode::CreateIfMissing,
            )
            .await
            .expect("upsert should succeed");
        assert_eq!(outcome, UpsertOutcome::Created);

        let record = store.get(&id("aa")).await.unwrap().expect("record exists");
        assert_eq!(record.salinity, 3.5);
        assert_eq!(record.target_salinity, 100.0);
    }

    #[tokio::test]
    async fn existing_only_matches_zero_rows_when_absent() {
        let store = MemoryStore::new();

        let outcome = store
            .conditional_upsert(
                &id("ghost"),
                DevicePatch::new().target_salinity(12.0),
                UpsertMode::ExistingOnly,
            )
            .await
            .expect("upsert should succeed");
        assert_eq!(outcome, UpsertOutcome::NoMatch);
        assert!(store.get(&id("ghost")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unless_manual_guard_blocks_valve_in_manual_mode() {
        let store = MemoryStore::new();
        store
            .conditional_upsert(
                &id("aa"),
                DevicePatch::new()
                    .manual_mode(true)
                    .valve(ValveWrite::Force(true)),
                UpsertMode::CreateIfMissing,
            )
            .await
            .unwrap();

        let outcome = store
            .conditional_upsert(
                &id("aa"),
                DevicePatch::new().valve(ValveWrite::UnlessManual(false)),
                UpsertMode::ExistingOnly,
            )
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        let record = store.get(&id("aa")).await.unwrap().unwrap();
        assert!(record.valve.is_set(), "manual-mode valve must not change");
    }

    #[tokio::test]
    async fn unless_manual_guard_passes_through_in_auto_mode() {
        let store = MemoryStore::new();
        store
            .conditional_upsert(
                &id("aa"),
                DevicePatch::new().valve(ValveWrite::UnlessManual(true)),
                UpsertMode::CreateIfMissing,
            )
            .await
            .unwrap();

        let record = store.get(&id("aa")).await.unwrap().unwrap();
        assert!(record.valve.is_set());

        store
            .conditional_upsert(
                &id("aa"),
                DevicePatch::new().valve(ValveWrite::UnlessManual(false)),
                UpsertMode::ExistingOnly,
            )
            .await
            .unwrap();
        let record = store.get(&id("aa")).await.unwrap().unwrap();
        assert!(!record.valve.is_set());
    }

    #[tokio::test]
    async fn force_overrides_valve_even_in_manual_mode() {
        let store = MemoryStore::new();
        store
            .conditional_upsert(
                &id("aa"),
                DevicePatch::new()
                    .manual_mode(true)
                    .valve(ValveWrite::Force(false)),
                UpsertMode::CreateIfMissing,
            )
            .await
            .unwrap();

        store
            .conditional_upsert(
                &id("aa"),
                DevicePatch::new().valve(ValveWrite::Force(true)),
                UpsertMode::ExistingOnly,
            )
            .await
            .unwrap();

        let record = store.get(&id("aa")).await.unwrap().unwrap();
        assert!(record.valve.is_set());
    }

    #[tokio::test]
    async fn clear_name_removes_the_stored_label() {
        let store = MemoryStore::new();
        store
            .conditional_upsert(
                &id("aa"),
                DevicePatch::new().name("pond 1"),
                UpsertMode::CreateIfMissing,
            )
            .await
            .unwrap();
        let record = store.get(&id("aa")).await.unwrap().unwrap();
        assert_eq!(record.name.as_deref(), Some("pond 1"));

        store
            .conditional_upsert(
                &id("aa"),
                DevicePatch::new().clear_name(),
                UpsertMode::ExistingOnly,
            )
            .await
            .unwrap();
        let record = store.get(&id("aa")).await.unwrap().unwrap();
        assert_eq!(record.name, None);
    }

    #[tokio::test]
    async fn updated_at_strictly_increases() {
        let store = MemoryStore::new();
        store
            .conditional_upsert(
                &id("aa"),
                DevicePatch::new().salinity(1.0),
                UpsertMode::CreateIfMissing,
            )
            .await
            .unwrap();
        let first = store.get(&id("aa")).await.unwrap().unwrap().updated_at;

        store
            .conditional_upsert(
                &id("aa"),
                DevicePatch::new().salinity(1.0),
                UpsertMode::CreateIfMissing,
            )
            .await
            .unwrap();
        let second = store.get(&id("aa")).await.unwrap().unwrap().updated_at;

        assert!(second > first);
    }

    #[tokio::test]
    async fn list_all_returns_every_record_exactly_once() {
        let store = MemoryStore::new();
        for mac in ["aa", "bb", "cc"] {
            store
                .conditional_upsert(&id(mac), DevicePatch::new(), UpsertMode::CreateIfMissing)
                .await
                .unwrap();
        }

        let mut macs: Vec<String> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id.as_str().to_string())
            .collect();
        macs.sort();
        assert_eq!(macs, vec!["aa", "bb", "cc"]);
    }

    #[test]
    fn next_stamp_steps_past_stalled_clock() {
        let now = Utc::now();
        assert_eq!(next_stamp(now, None), now);
        assert_eq!(next_stamp(now, Some(now - Duration::seconds(1))), now);
        let stepped = next_stamp(now, Some(now));
        assert!(stepped > now);
    }
}
