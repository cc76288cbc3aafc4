//! # saltern-core
//!
//! Core components for the saltern fleet reconciliation service:
//!
//! - **Device model**: identifiers, records, and the stored-flag
//!   representation of boolean columns
//! - **Store contract**: atomic per-row conditional upsert with memory
//!   and SQLite backends
//! - **Reconciliation engine**: merges device telemetry with outstanding
//!   operator commands
//! - **Fleet view projector**: the keyed, client-friendly read model
//! - **Command applier**: allow-listed partial operator edits
//!
//! The HTTP surface lives in `saltern-api`; this crate has no knowledge
//! of transports.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use saltern_core::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> saltern_core::error::Result<()> {
//! let store: Arc<dyn DeviceStore> = Arc::new(MemoryStore::new());
//! let engine = ReconciliationEngine::new(store);
//!
//! let echo = engine
//!     .sync(SyncReport {
//!         id: DeviceId::new("AA:BB:CC:DD:EE:FF")?,
//!         salinity: 21.5,
//!         valve: false,
//!         location: Location::new(35.0, 126.5),
//!         address: "saltern 3".to_string(),
//!     })
//!     .await?;
//! assert_eq!(echo, CommandEcho::bootstrap());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod command;
pub mod device;
pub mod error;
pub mod fleet_view;
pub mod observability;
pub mod reconcile;
pub mod sqlite_store;
pub mod store;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::command::{CommandApplier, DeviceEdit, EditOutcome};
    pub use crate::device::{DeviceId, DeviceRecord, Location, StoredFlag};
    pub use crate::error::{Error, Result};
    pub use crate::fleet_view::{DeviceView, FleetViewProjector};
    pub use crate::reconcile::{CommandEcho, ReconciliationEngine, SyncReport};
    pub use crate::sqlite_store::SqliteStore;
    pub use crate::store::{
        DevicePatch, DeviceStore, MemoryStore, UpsertMode, UpsertOutcome, ValveWrite,
    };
}

// Re-export key types at crate root for ergonomics
pub use command::{CommandApplier, DeviceEdit, EditOutcome};
pub use device::{DeviceId, DeviceRecord, Location, StoredFlag};
pub use error::{Error, Result};
pub use fleet_view::{DeviceView, FleetViewProjector};
pub use observability::{init_logging, LogFormat};
pub use reconcile::{CommandEcho, ReconciliationEngine, SyncReport};
pub use sqlite_store::SqliteStore;
pub use store::{DevicePatch, DeviceStore, MemoryStore, UpsertMode, UpsertOutcome, ValveWrite};
