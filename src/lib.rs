//! Sparkify warehouse loader library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod background_jobs;
pub mod config;
pub mod etl;
pub mod runner;
pub mod server;
pub mod sqlite_persistence;
pub mod warehouse;

// Re-export commonly used types for convenience
pub use etl::{EtlError, EtlSettings, Operation};
pub use runner::TaskRunner;
pub use server::{run_server, RequestsLoggingLevel};
pub use warehouse::{SqliteWarehouse, WarehouseReader};
