//! HTTP API layer for the saltern reconciliation service.
//!
//! Exposes the device sync endpoint, the operator fleet view, and the
//! operator edit endpoint over axum, backed by a [`saltern_core::DeviceStore`].
//!
//! # Example
//!
//! ```no_run
//! use saltern_api::server::Server;
//! use saltern_api::config::Config;
//!
//! # async fn run() -> saltern_core::Result<()> {
//! let server = Server::new(Config::default());
//! server.serve().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod server;

/// Commonly used types.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::ApiError;
    pub use crate::server::{Server, ServerBuilder};
}

pub use config::Config;
pub use error::ApiError;
pub use server::{Server, ServerBuilder};
