//! File safety: locking, backups, atomic writes.

mod guard;

pub use guard::{WriteGuard, WriteReceipt};
