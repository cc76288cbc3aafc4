//! Fleet view projection.
//!
//! Converts the row-oriented store into the keyed, client-friendly
//! aggregate the operator application consumes. Read-only.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::device::DeviceRecord;
use crate::error::Result;
use crate::store::DeviceStore;

/// The client-facing view of one device record.
///
/// Boolean-typed columns stored as 0/1 integers are coerced to true
/// booleans here; consumers treat these fields as booleans without
/// further normalization, so the coercion is part of the contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceView {
    /// Display label.
    pub name: Option<String>,
    /// Last reported sensor measurement.
    pub salinity: f64,
    /// Operator-set desired salinity.
    pub target_salinity: f64,
    /// Current commanded valve state.
    pub valve: bool,
    /// Whether the operator dictates valve state.
    pub manual_mode: bool,
    /// Operator-set completion flag.
    pub is_final: bool,
    /// Human-readable location string.
    pub address: Option<String>,
    /// Last reported device location.
    pub location: crate::device::Location,
}

impl From<&DeviceRecord> for DeviceView {
    fn from(record: &DeviceRecord) -> Self {
        Self {
            name: record.name.clone(),
            salinity: record.salinity,
            target_salinity: record.target_salinity,
            valve: record.valve.is_set(),
            manual_mode: record.manual_mode.is_set(),
            is_final: record.is_final.is_set(),
            address: record.address.clone(),
            location: record.location,
        }
    }
}

/// Projects the device record store into the fleet view.
#[derive(Clone)]
pub struct FleetViewProjector {
    store: Arc<dyn DeviceStore>,
}

impl FleetViewProjector {
    /// Creates a projector over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self { store }
    }

    /// Returns every currently persisted record exactly once, keyed by
    /// device identifier. Side-effect-free.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn list_all(&self) -> Result<BTreeMap<String, DeviceView>> {
        let records = self.store.list_all().await?;
        Ok(records
            .iter()
            .map(|record| (record.id.as_str().to_string(), DeviceView::from(record)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceId, DeviceRecord, Location, StoredFlag};
    use crate::store::{DevicePatch, MemoryStore, UpsertMode, ValveWrite};
    use chrono::Utc;

    #[tokio::test]
    async fn projects_every_record_keyed_by_id() {
        let store = Arc::new(MemoryStore::new());
        for mac in ["aa", "bb"] {
            store
                .conditional_upsert(
                    &DeviceId::new_unchecked(mac),
                    DevicePatch::new().salinity(9.0),
                    UpsertMode::CreateIfMissing,
                )
                .await
                .unwrap();
        }

        let view = FleetViewProjector::new(store).list_all().await.unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view["aa"].salinity, 9.0);
        assert_eq!(view["bb"].target_salinity, 100.0);
    }

    #[tokio::test]
    async fn stored_integer_flags_project_as_booleans() {
        let store = Arc::new(MemoryStore::new());
        store
            .conditional_upsert(
                &DeviceId::new_unchecked("aa"),
                DevicePatch::new()
                    .valve(ValveWrite::Force(true))
                    .manual_mode(false),
                UpsertMode::CreateIfMissing,
            )
            .await
            .unwrap();

        let view = FleetViewProjector::new(store).list_all().await.unwrap();
        assert_eq!(view["aa"].valve, true);
        assert_eq!(view["aa"].manual_mode, false);
    }

    #[test]
    fn coercion_uses_the_narrow_equals_one_rule() {
        let mut record =
            DeviceRecord::with_defaults(DeviceId::new_unchecked("aa"), Utc::now());
        record.valve = StoredFlag(2);
        record.manual_mode = StoredFlag(-1);
        record.is_final = StoredFlag(1);

        let view = DeviceView::from(&record);
        assert!(!view.valve, "2 is not truthy under the narrow rule");
        assert!(!view.manual_mode, "-1 is not truthy under the narrow rule");
        assert!(view.is_final);
    }

    #[test]
    fn view_serializes_in_camel_case() {
        let record = DeviceRecord {
            id: DeviceId::new_unchecked("aa"),
            name: Some("pond 1".to_string()),
            salinity: 12.0,
            target_salinity: 15.0,
            valve: StoredFlag(1),
            manual_mode: StoredFlag(0),
            is_final: StoredFlag(0),
            location: Location::new(35.0, 126.5),
            address: None,
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(DeviceView::from(&record)).unwrap();
        assert_eq!(json["targetSalinity"], 15.0);
        assert_eq!(json["manualMode"], false);
        assert_eq!(json["isFinal"], false);
        assert_eq!(json["valve"], true);
        assert_eq!(json["location"]["lat"], 35.0);
        // Missing optional fields serialize as null, matching what the
        // operator app already expects.
        assert!(json["address"].is_null());
    }
}
