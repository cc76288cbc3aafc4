//! State-reconciliation engine for device sync reports.
//!
//! Each device periodically reports its sensor reading and its own idea
//! of valve state. The engine merges that report with any outstanding
//! operator command: sensor fields always win, the valve only while the
//! record is not in manual mode. The device gets back its operating
//! instruction for the next control cycle.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::device::{DeviceId, DeviceRecord, Location};
use crate::error::Result;
use crate::store::{DevicePatch, DeviceStore, UpsertMode, UpsertOutcome, ValveWrite};

/// An inbound telemetry report from a device.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// Reporting device.
    pub id: DeviceId,
    /// Current sensor measurement. Stored as-is; the server imposes no
    /// range validation by design.
    pub salinity: f64,
    /// The device's own idea of its valve state.
    pub valve: bool,
    /// Current device location.
    pub location: Location,
    /// Human-readable location string resolved by the device.
    pub address: String,
}

/// The operating instruction returned to a device after a sync.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommandEcho {
    /// Whether the operator currently dictates valve state.
    pub manual_mode: bool,
    /// Desired salinity the device should drive toward.
    pub target_salinity: f64,
    /// Valve state the device should hold.
    pub valve: bool,
}

impl CommandEcho {
    /// The deterministic starting instruction for a brand-new device.
    ///
    /// `target_salinity` is 0 here, distinct from the table default of
    /// 100 on the freshly created row: firmware distinguishes "not yet
    /// configured" from "configured to 100" through this asymmetry.
    #[must_use]
    pub const fn bootstrap() -> Self {
        Self {
            manual_mode: false,
            target_salinity: 0.0,
            valve: false,
        }
    }

    fn from_record(record: &DeviceRecord) -> Self {
        Self {
            manual_mode: record.manual_mode.is_set(),
            target_salinity: record.target_salinity,
            valve: record.valve.is_set(),
        }
    }
}

/// Applies the sync protocol against the device record store.
#[derive(Clone)]
pub struct ReconciliationEngine {
    store: Arc<dyn DeviceStore>,
}

impl ReconciliationEngine {
    /// Creates an engine over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self { store }
    }

    /// Merges a telemetry report into the store and returns the device's
    /// operating instruction.
    ///
    /// Creates the record with defaults if the identifier has never been
    /// seen; in that case the bootstrap echo is returned rather than the
    /// freshly created row's defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable. The caller (device
    /// firmware) retries the entire sync on its own schedule; nothing is
    /// retried or queued here.
    pub async fn sync(&self, report: SyncReport) -> Result<CommandEcho> {
        let patch = DevicePatch::new()
            .salinity(report.salinity)
            .valve(ValveWrite::UnlessManual(report.valve))
            .location(report.location)
            .address(report.address);

        let outcome = self
            .store
            .conditional_upsert(&report.id, patch, UpsertMode::CreateIfMissing)
            .await?;

        if outcome == UpsertOutcome::Created {
            tracing::debug!(device = %report.id, "first sync from unseen device");
            return Ok(CommandEcho::bootstrap());
        }

        // Read back the possibly concurrently edited record; its state is
        // the instruction, not the report we just merged.
        let echo = match self.store.get(&report.id).await? {
            Some(record) => CommandEcho::from_record(&record),
            None => CommandEcho::bootstrap(),
        };
        tracing::debug!(
            device = %report.id,
            manual_mode = echo.manual_mode,
            valve = echo.valve,
            "device sync reconciled"
        );
        Ok(echo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn engine() -> (ReconciliationEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ReconciliationEngine::new(store.clone()), store)
    }

    fn report(mac: &str, salinity: f64, valve: bool) -> SyncReport {
        SyncReport {
            id: DeviceId::new_unchecked(mac),
            salinity,
            valve,
            location: Location::new(35.0, 126.5),
            address: "saltern".to_string(),
        }
    }

    #[tokio::test]
    async fn unseen_device_gets_bootstrap_echo_regardless_of_report() {
        let (engine, store) = engine();

        let echo = engine.sync(report("aa", 42.0, true)).await.unwrap();
        assert_eq!(echo, CommandEcho::bootstrap());
        assert_eq!(echo.target_salinity, 0.0);

        // The record itself carries the reported fields and table defaults.
        let record = store
            .get(&DeviceId::new_unchecked("aa"))
            .await
            .unwrap()
            .expect("record created on first sync");
        assert_eq!(record.salinity, 42.0);
        assert!(record.valve.is_set());
        assert_eq!(record.location, Location::new(35.0, 126.5));
        assert_eq!(record.address.as_deref(), Some("saltern"));
        assert_eq!(record.target_salinity, 100.0);
    }

    #[tokio::test]
    async fn second_sync_echoes_persisted_state() {
        let (engine, _) = engine();
        engine.sync(report("aa", 1.0, false)).await.unwrap();

        let echo = engine.sync(report("aa", 2.0, true)).await.unwrap();
        assert!(!echo.manual_mode);
        assert_eq!(echo.target_salinity, 100.0);
        assert!(echo.valve, "auto mode passes the reported valve through");
    }

    #[tokio::test]
    async fn manual_mode_locks_valve_against_sync() {
        let (engine, store) = engine();
        engine.sync(report("aa", 1.0, true)).await.unwrap();

        // Operator takes over and forces the valve open.
        store
            .conditional_upsert(
                &DeviceId::new_unchecked("aa"),
                DevicePatch::new()
                    .manual_mode(true)
                    .valve(ValveWrite::Force(true)),
                UpsertMode::ExistingOnly,
            )
            .await
            .unwrap();

        let echo = engine.sync(report("aa", 1.0, false)).await.unwrap();
        assert!(echo.manual_mode);
        assert!(echo.valve, "echo carries the operator's valve");

        let record = store
            .get(&DeviceId::new_unchecked("aa"))
            .await
            .unwrap()
            .unwrap();
        assert!(record.valve.is_set(), "sync must not clobber manual valve");
    }

    #[tokio::test]
    async fn every_sync_overwrites_the_stored_address() {
        let (engine, store) = engine();
        engine.sync(report("aa", 1.0, false)).await.unwrap();

        let mut moved = report("aa", 1.0, false);
        moved.address = "relocated pond".to_string();
        engine.sync(moved).await.unwrap();

        let record = store
            .get(&DeviceId::new_unchecked("aa"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.address.as_deref(), Some("relocated pond"));
    }

    #[tokio::test]
    async fn repeated_identical_sync_is_idempotent() {
        let (engine, store) = engine();
        engine.sync(report("aa", 5.0, false)).await.unwrap();
        let first = store
            .get(&DeviceId::new_unchecked("aa"))
            .await
            .unwrap()
            .unwrap();

        engine.sync(report("aa", 5.0, false)).await.unwrap();
        let second = store
            .get(&DeviceId::new_unchecked("aa"))
            .await
            .unwrap()
            .unwrap();

        assert!(second.updated_at > first.updated_at);
        assert_eq!(
            DeviceRecord {
                updated_at: first.updated_at,
                ..second
            },
            first,
            "identical report leaves everything but updated_at unchanged"
        );
    }
}
