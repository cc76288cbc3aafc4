//! Operator edit application.
//!
//! Validates and applies partial operator edits to a single device
//! record. "Validation" here means allow-list filtering only: the
//! editable fields are a fixed set, unknown fields are silently ignored
//! (a documented policy, not an oversight), and no value-level checks
//! are performed.

use std::sync::Arc;

use serde::Deserialize;

use crate::device::DeviceId;
use crate::error::Result;
use crate::store::{DevicePatch, DeviceStore, UpsertMode, ValveWrite};

/// A partial operator edit: any subset of the editable fields.
///
/// Unknown JSON keys are dropped during deserialization; only the fields
/// below ever reach the store.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEdit {
    /// Commanded valve state. Applied unconditionally; the manual-mode
    /// guard binds the sync path, not the operator.
    pub valve: Option<bool>,
    /// Manual-mode flag.
    pub manual_mode: Option<bool>,
    /// Desired salinity. Accepted as-is, arbitrary values included.
    pub target_salinity: Option<f64>,
    /// Completion flag.
    pub is_final: Option<bool>,
    /// Display label. An explicit JSON `null` is a present edit that
    /// clears the label; an absent key leaves it alone.
    #[serde(default, deserialize_with = "present_or_absent")]
    pub name: Option<Option<String>>,
}

/// Maps any explicitly present value, JSON `null` included, to `Some`,
/// keeping it distinct from an absent key.
fn present_or_absent<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

impl DeviceEdit {
    /// Returns true when no allow-listed field is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.valve.is_none()
            && self.manual_mode.is_none()
            && self.target_salinity.is_none()
            && self.is_final.is_none()
            && self.name.is_none()
    }

    fn into_patch(self) -> DevicePatch {
        let mut patch = DevicePatch::new();
        if let Some(valve) = self.valve {
            patch = patch.valve(ValveWrite::Force(valve));
        }
        if let Some(manual_mode) = self.manual_mode {
            patch = patch.manual_mode(manual_mode);
        }
        if let Some(target) = self.target_salinity {
            patch = patch.target_salinity(target);
        }
        if let Some(is_final) = self.is_final {
            patch = patch.is_final(is_final);
        }
        if let Some(name) = self.name {
            patch = match name {
                Some(name) => patch.name(name),
                None => patch.clear_name(),
            };
        }
        patch
    }
}

/// Outcome of applying an operator edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The filtered fields were written (or matched zero rows for an
    /// unknown identifier, which is accepted silently).
    Applied,
    /// No allow-listed field was present; the store was not touched.
    NoChanges,
}

/// Applies operator edits against the device record store.
#[derive(Clone)]
pub struct CommandApplier {
    store: Arc<dyn DeviceStore>,
}

impl CommandApplier {
    /// Creates an applier over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self { store }
    }

    /// Applies a partial edit to the record identified by `id`.
    ///
    /// An edit addressing a non-existent identifier matches zero rows and
    /// still reports `Applied`; no existence check is performed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn apply_edit(&self, id: &DeviceId, edit: DeviceEdit) -> Result<EditOutcome> {
        if edit.is_empty() {
            return Ok(EditOutcome::NoChanges);
        }

        self.store
            .conditional_upsert(id, edit.into_patch(), UpsertMode::ExistingOnly)
            .await?;
        tracing::info!(device = %id, "operator edit applied");
        Ok(EditOutcome::Applied)
    }
}
