// apbatch Infrastructure - SQLite Adapter
// Implements: TargetRegistry, CredentialStore, DeviceStatusReporter

mod connection;
mod credential_store;
mod device_status;
mod error;
mod migration;
mod target_registry;

pub use connection::create_pool;
pub use credential_store::SqliteCredentialStore;
pub use device_status::{SqliteDeviceStatus, StoredStatus};
pub use error::map_sqlx_error;
pub use migration::run_migrations;
pub use target_registry::SqliteTargetRegistry;

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
