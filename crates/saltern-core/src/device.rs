//! Device record model.
//!
//! A device is a remote salinity-sensing, valve-actuating unit identified
//! by a stable hardware address. The server keeps exactly one record per
//! device; records are created implicitly on first sync and never deleted
//! by this core.
//!
//! # Example
//!
//! ```rust
//! use saltern_core::device::DeviceId;
//!
//! let id = DeviceId::new("AA:BB:CC:DD:EE:FF").unwrap();
//! assert_eq!(id.as_str(), "aa:bb:cc:dd:ee:ff");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Operator-set desired salinity assigned to newly created records.
pub const DEFAULT_TARGET_SALINITY: f64 = 100.0;

/// A unique identifier for a device: its hardware address.
///
/// Identifiers are case-normalized to lowercase so that the same physical
/// device always maps to the same record regardless of how firmware or
/// operator tooling formats the address. They must be non-empty; no other
/// structure is imposed (callers are trusted, per the error-handling
/// design).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a new device ID, trimming whitespace and normalizing case.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is empty after trimming.
    pub fn new(id: impl AsRef<str>) -> Result<Self> {
        let id = id.as_ref().trim();
        if id.is_empty() {
            return Err(Error::InvalidId {
                message: "device identifier cannot be empty".to_string(),
            });
        }
        Ok(Self(id.to_ascii_lowercase()))
    }

    /// Creates a device ID without validation or normalization.
    ///
    /// Intended for identifiers that are already normalized (e.g., read
    /// back from the store).
    #[must_use]
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A latitude/longitude pair reported by the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl Location {
    /// Creates a location from a latitude/longitude pair.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A boolean-like column stored as an integer, as the backing row store
/// represents it.
///
/// Coercion rule: the flag is set iff the stored value equals exactly 1.
/// Any other value, including 2 and -1, coerces to false. Device firmware
/// may depend on this narrow rule, so it is deliberately not generalized
/// to "non-zero is true".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredFlag(pub i64);

impl StoredFlag {
    /// Returns true iff the stored value is exactly 1.
    #[must_use]
    pub const fn is_set(self) -> bool {
        self.0 == 1
    }

    /// Converts a boolean into its stored 0/1 representation.
    #[must_use]
    pub const fn from_bool(value: bool) -> Self {
        Self(if value { 1 } else { 0 })
    }
}

impl From<bool> for StoredFlag {
    fn from(value: bool) -> Self {
        Self::from_bool(value)
    }
}

/// One persisted record per device identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Unique key, immutable once created.
    pub id: DeviceId,
    /// Optional display label.
    pub name: Option<String>,
    /// Last reported sensor measurement.
    pub salinity: f64,
    /// Operator-set desired salinity.
    pub target_salinity: f64,
    /// Current commanded valve state.
    pub valve: StoredFlag,
    /// Whether operator control overrides device-reported valve state.
    pub manual_mode: StoredFlag,
    /// Operator-set completion flag.
    pub is_final: StoredFlag,
    /// Last reported device location.
    pub location: Location,
    /// Human-readable location string.
    pub address: Option<String>,
    /// Timestamp of last mutation, server-assigned on every write.
    pub updated_at: DateTime<Utc>,
}

impl DeviceRecord {
    /// Creates a record with the table defaults for a never-seen device.
    #[must_use]
    pub fn with_defaults(id: DeviceId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: None,
            salinity: 0.0,
            target_salinity: DEFAULT_TARGET_SALINITY,
            valve: StoredFlag::default(),
            manual_mode: StoredFlag::default(),
            is_final: StoredFlag::default(),
            location: Location::default(),
            address: None,
            updated_at: now,
        }
    }
}
