//! Typed resource access and vendor migration for an OVN northbound database.
//!
//! [`NbClient`] wraps a [`db::Connection`] with per-kind operations on
//! address sets, load balancers and their health checks, port groups,
//! security groups and the `NB_Global` singleton, plus the one-time vendor
//! tagging migration in [`migration`]. [`db::MemoryDb`] is an in-process
//! database implementing the same connection contract.

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod migration;
pub mod model;
pub mod version;

pub use client::NbClient;
pub use config::ClientConfig;
pub use error::{Action, NbError, Result};
pub use migration::{MigrationReport, MigrationState};
