//! libsql persistence: review queue, scan history, checkpoints, backups.

mod connection;
mod schema;
mod store;

pub use connection::Database;
pub use store::{BackupStore, EntityQueueStore, ScanStore};
