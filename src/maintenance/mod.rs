//! # Maintenance Scheduler
//!
//! The background process that keeps held leases valid: a periodic scan over
//! the lease cache, a worker pool issuing renew/rotate calls, and a separate
//! dispatcher running user callbacks so they can never stall the scan.

pub mod dispatch;
pub mod scheduler;

pub use dispatch::CallbackDispatcher;
pub use scheduler::MaintenanceHandle;

pub(crate) use scheduler::{start, MaintenanceContext};
