//! Orchestration: scanning, review, and scan locking.

mod review;
mod scan_lock;
mod scanner;

pub use review::{ApproveOutcome, ReviewService};
pub use scan_lock::ScanLockManager;
pub use scanner::ScanOrchestrator;
